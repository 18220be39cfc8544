//! KBUS routing kernel.
//!
//! This crate implements an in-memory, kernel-style message bus: endpoints
//! bind to hierarchical names, broadcast messages to listeners, and run
//! request/reply exchanges with at most one replier per request.
//!
//! - **[`name`]** -- Bus name grammar, `*`/`%` wildcard matching and pattern
//!   specificity.
//! - **[`binding`]** -- Per-device binding table with replier uniqueness.
//! - **[`router`]** -- Delivery planning: listeners, the best replier, reply
//!   targets, and queue admission.
//! - **[`device`]** -- A routing domain serialising all writes under one lock.
//! - **[`endpoint`]** -- Open endpoints in a [`DashMap`](dashmap::DashMap)
//!   registry, each with its own FIFO [`queue`].
//! - **[`ksock`]** -- The numbered device set and the RAII endpoint handle.
//! - **[`message`]** / **[`wire`]** -- Messages, delivered copies and their
//!   length-prefixed record format.
//! - **[`error`]** -- Unified error type via [`thiserror`].
//!
//! All public types are `Send + Sync`.

pub mod binding;
pub mod config;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod ids;
pub mod ksock;
pub mod message;
pub mod name;
pub mod queue;
pub mod router;
pub mod wire;

// Re-export the most commonly used types at the crate root for convenience.
pub use binding::{BindingSnapshot, BindingTable, Role};
pub use config::KbusConfig;
pub use device::Device;
pub use endpoint::{EndpointInfo, OpenMode, Readiness};
pub use error::{KbusError, Result};
pub use ids::{EndpointId, MessageId};
pub use ksock::{Kbus, Ksock};
pub use message::{Message, QueuedMessage};
pub use name::{Pattern, matches};
pub use router::MessageRouter;
