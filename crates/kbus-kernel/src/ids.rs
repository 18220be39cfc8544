//! Endpoint and message identifiers.
//!
//! Both identifiers are non-zero `u32`s so that `0` can mean "none" in the
//! wire format.  Message ids come from an [`IdAllocator`] owned by the device
//! and advance exactly once per accepted write.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of an open endpoint within one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(u32);

impl EndpointId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Device-assigned message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u32);

impl MessageId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Monotonic per-device message id counter.
///
/// Not synchronised on its own: the device only touches it while holding the
/// routing lock, which is what gives every accepted write its place in the
/// single global order.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the counter and return the new id.  Skips `0` on wrap-around.
    pub fn next_id(&mut self) -> MessageId {
        self.last = self.last.wrapping_add(1);
        if self.last == 0 {
            self.last = 1;
        }
        MessageId(self.last)
    }

    /// The most recently allocated id, if any.
    pub fn last(&self) -> Option<MessageId> {
        (self.last != 0).then_some(MessageId(self.last))
    }
}
