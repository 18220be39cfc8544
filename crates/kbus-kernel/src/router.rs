//! Message router.
//!
//! The router decides, for one write, who receives a copy:
//!
//! | Step | Recipient | `should_reply` | May be dropped |
//! |------|-----------|----------------|----------------|
//! | 1 | every listener binding matching the name (duplicates included) | `false` | unless the binding is guaranteed |
//! | 2 | requests only: the most specific matching replier | `true` | no |
//! | 3 | replies only: the endpoint named by `to`, if still open | `false` | no |
//!
//! An endpoint appearing in several steps receives one copy per step.  If the
//! plan is empty the write fails with [`KbusError::NoRecipients`].
//!
//! Planning is pure: it reads the [`BindingTable`] and never touches queues
//! or the id counter, so a rejected write leaves the device unchanged.  The
//! device applies a plan while still holding its routing lock.
//!
//! # Example
//!
//! ```rust
//! # use kbus_kernel::binding::{BindingTable, Role};
//! # use kbus_kernel::config::KbusConfig;
//! # use kbus_kernel::ids::EndpointId;
//! # use kbus_kernel::message::Message;
//! # use kbus_kernel::router::MessageRouter;
//! let mut table = BindingTable::new(1000);
//! table.bind(EndpointId::new(1), "$.Fred.*", Role::Listener, false).unwrap();
//! table.bind(EndpointId::new(2), "$.Fred.Jim", Role::Replier, false).unwrap();
//!
//! let router = MessageRouter::new(&KbusConfig::default());
//! let plan = router
//!     .plan(&table, &Message::request("$.Fred.Jim", "q"), |_| true)
//!     .unwrap();
//! assert_eq!(plan.deliveries().len(), 2);
//! ```

use std::collections::HashMap;

use crate::binding::BindingTable;
use crate::config::KbusConfig;
use crate::error::{KbusError, Result};
use crate::ids::EndpointId;
use crate::message::Message;
use crate::name;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Why an endpoint receives a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryKind {
    /// A listener binding matched the name.
    Listener,
    /// The endpoint is the chosen replier for a request.
    Replier,
    /// The endpoint is the addressee of a reply.
    ReplyTarget,
}

/// One copy to enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub endpoint: EndpointId,
    pub kind: DeliveryKind,
    /// Set on the replier's copy only.
    pub should_reply: bool,
    /// A full queue rejects the whole write instead of dropping this copy.
    pub must_deliver: bool,
}

/// Every copy a write would produce, in enqueue order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryPlan {
    deliveries: Vec<Delivery>,
}

/// The part of a plan that fits the recipients' queues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admitted {
    /// Copies to enqueue, in order.
    pub deliver: Vec<Delivery>,
    /// Droppable copies that did not fit.
    pub dropped: Vec<Delivery>,
}

// ---------------------------------------------------------------------------
// MessageRouter
// ---------------------------------------------------------------------------

/// Validates messages and computes their delivery plans.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    max_name_len: usize,
    max_data_len: usize,
}

impl MessageRouter {
    #[must_use]
    pub fn new(config: &KbusConfig) -> Self {
        Self {
            max_name_len: config.max_name_len,
            max_data_len: config.max_data_len,
        }
    }

    /// Check a message before routing it.
    ///
    /// The payload must fit (checked first), the name must be a valid bus
    /// name without wildcards, and a reply must name both its target and
    /// the request it answers without itself being a request.
    pub fn validate(&self, message: &Message) -> Result<()> {
        if message.data().len() > self.max_data_len {
            return Err(KbusError::MessageTooLarge {
                size: message.data().len(),
                max: self.max_data_len,
            });
        }

        name::validate_name(message.name(), self.max_name_len)?;

        if message.is_reply() {
            let reason = if message.is_request() {
                Some("a reply cannot also be a request")
            } else if message.to().is_none() {
                Some("a reply must name its target endpoint")
            } else if message.in_reply_to().is_none() {
                Some("a reply must name the request it answers")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(KbusError::BadFormat {
                    name: message.name().to_string(),
                    reason,
                });
            }
        }

        Ok(())
    }

    /// Validate `message` and compute who receives it.
    ///
    /// `is_open` reports whether a reply's target endpoint still exists; a
    /// closed target silently loses its copy.
    pub fn plan(
        &self,
        table: &BindingTable,
        message: &Message,
        is_open: impl Fn(EndpointId) -> bool,
    ) -> Result<DeliveryPlan> {
        self.validate(message)?;

        let name = message.name();
        let mut deliveries: Vec<Delivery> = table
            .listeners_matching(name)
            .into_iter()
            .map(|binding| Delivery {
                endpoint: binding.endpoint,
                kind: DeliveryKind::Listener,
                should_reply: false,
                must_deliver: binding.guaranteed,
            })
            .collect();

        if message.is_request() {
            if let Some(replier) = table.best_replier_matching(name) {
                deliveries.push(Delivery {
                    endpoint: replier.endpoint,
                    kind: DeliveryKind::Replier,
                    should_reply: true,
                    must_deliver: true,
                });
            }
        }

        if let Some(target) = message.to() {
            if is_open(target) {
                deliveries.push(Delivery {
                    endpoint: target,
                    kind: DeliveryKind::ReplyTarget,
                    should_reply: false,
                    must_deliver: true,
                });
            } else {
                tracing::debug!(to = %target, name = %name, "reply target is closed, copy dropped");
            }
        }

        if deliveries.is_empty() {
            return Err(KbusError::NoRecipients {
                name: name.to_string(),
            });
        }

        Ok(DeliveryPlan { deliveries })
    }
}

impl DeliveryPlan {
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Fit the plan into the recipients' queues.
    ///
    /// `room` reports how many more copies an endpoint's queue accepts.
    /// Copies that must be delivered are reserved first; droppable copies
    /// use whatever space is left, in plan order.  Fails with
    /// [`KbusError::QueueFull`] if any endpoint cannot take all of its
    /// must-deliver copies.
    pub fn admit(
        &self,
        room: impl Fn(EndpointId) -> usize,
        capacity: usize,
    ) -> Result<Admitted> {
        let mut required: HashMap<EndpointId, usize> = HashMap::new();
        for d in self.deliveries.iter().filter(|d| d.must_deliver) {
            *required.entry(d.endpoint).or_default() += 1;
        }

        // Spare slots per endpoint once its must-deliver copies are reserved.
        let mut spare: HashMap<EndpointId, usize> = HashMap::new();
        for d in &self.deliveries {
            if spare.contains_key(&d.endpoint) {
                continue;
            }
            let available = room(d.endpoint);
            let needed = required.get(&d.endpoint).copied().unwrap_or(0);
            if needed > available {
                return Err(KbusError::QueueFull {
                    endpoint: d.endpoint,
                    capacity,
                });
            }
            spare.insert(d.endpoint, available - needed);
        }

        let mut admitted = Admitted::default();
        for d in &self.deliveries {
            if d.must_deliver {
                admitted.deliver.push(*d);
                continue;
            }
            match spare.get_mut(&d.endpoint) {
                Some(slots) if *slots > 0 => {
                    *slots -= 1;
                    admitted.deliver.push(*d);
                }
                _ => admitted.dropped.push(*d),
            }
        }
        Ok(admitted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
