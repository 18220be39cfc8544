//! Kernel error types.
//!
//! All bus operations surface errors through [`KbusError`], which is the
//! single error type returned by every public API in this crate.  Each variant
//! carries enough context for callers to decide how to handle the failure
//! without inspecting opaque strings.
//!
//! Every failure is synchronous and leaves the device unchanged: no partial
//! binding, no consumed message id, no partial delivery.

use crate::binding::Role;
use crate::ids::EndpointId;

/// Unified error type for the KBUS routing kernel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KbusError {
    // -- Device errors ------------------------------------------------------
    /// There is no device with the requested index.
    #[error("no such kbus device: {index} (have {available})")]
    NotFound {
        /// The index that was requested.
        index: usize,
        /// How many devices the bus was configured with.
        available: usize,
    },

    /// An open mode string was neither `"r"` nor `"rw"`.
    #[error("invalid open mode `{mode}` (expected \"r\" or \"rw\")")]
    InvalidMode { mode: String },

    /// The endpoint is closed, unknown, or was opened read-only and asked to
    /// write.
    #[error("bad endpoint {endpoint}: {reason}")]
    BadFileDescriptor {
        endpoint: EndpointId,
        reason: &'static str,
    },

    // -- Name errors --------------------------------------------------------
    /// A name or pattern violates the bus name grammar.
    #[error("malformed bus name `{name}`: {reason}")]
    BadFormat { name: String, reason: &'static str },

    /// A name or pattern exceeds the configured length bound.
    #[error("bus name too long: {len} bytes (max {max})")]
    NameTooLong { len: usize, max: usize },

    // -- Binding errors -----------------------------------------------------
    /// A replier is already bound to this exact pattern.
    #[error("replier already bound to `{pattern}` by endpoint {owner}")]
    AddressInUse { pattern: String, owner: EndpointId },

    /// The endpoint holds no binding with this pattern and role.
    #[error("endpoint {endpoint} has no {role} binding for `{pattern}`")]
    NoSuchBinding {
        endpoint: EndpointId,
        pattern: String,
        role: Role,
    },

    // -- Write errors -------------------------------------------------------
    /// The message payload exceeds the configured maximum.
    #[error("message data too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Nobody would receive the message.
    #[error("no recipients for `{name}`")]
    NoRecipients { name: String },

    /// A delivery that may not be dropped found the recipient's queue full.
    #[error("queue of endpoint {endpoint} is full ({capacity} messages)")]
    QueueFull {
        endpoint: EndpointId,
        capacity: usize,
    },

    // -- Framing errors -----------------------------------------------------
    /// A wire record could not be decoded.
    #[error("malformed message record: {reason}")]
    Framing { reason: String },
}

impl KbusError {
    /// The conventional errno value a character-device front end would
    /// report for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound { .. } => errno::ENOENT,
            Self::BadFormat { .. } => errno::EBADMSG,
            Self::NameTooLong { .. } => errno::ENAMETOOLONG,
            Self::MessageTooLarge { .. } => errno::EMSGSIZE,
            Self::NoRecipients { .. } => errno::EADDRNOTAVAIL,
            Self::AddressInUse { .. } => errno::EADDRINUSE,
            Self::BadFileDescriptor { .. } => errno::EBADF,
            Self::QueueFull { .. } => errno::EBUSY,
            Self::NoSuchBinding { .. } | Self::InvalidMode { .. } | Self::Framing { .. } => {
                errno::EINVAL
            }
        }
    }

    pub(crate) fn framing(reason: impl Into<String>) -> Self {
        Self::Framing {
            reason: reason.into(),
        }
    }
}

/// Linux errno values used by [`KbusError::errno`].
pub mod errno {
    pub const ENOENT: i32 = 2;
    pub const EBADF: i32 = 9;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const ENAMETOOLONG: i32 = 36;
    pub const EBADMSG: i32 = 74;
    pub const EMSGSIZE: i32 = 90;
    pub const EADDRINUSE: i32 = 98;
    pub const EADDRNOTAVAIL: i32 = 99;
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KbusError>;
