//! A single routing domain.
//!
//! A [`Device`] owns a [`BindingTable`], an [`IdAllocator`] and the registry
//! of open endpoints.  `bind`, `unbind`, `write`, `open` and `close` run under
//! one routing lock, which gives all writes a single global order: if write A
//! completes before write B starts, every endpoint receiving both sees A's
//! copy first.  `read` and `next_len` only lock the caller's own queue.
//!
//! Nothing here blocks on another endpoint; reading an empty queue returns
//! `None` immediately.
//!
//! # Example
//!
//! ```rust
//! # use kbus_kernel::{Device, KbusConfig, Message, OpenMode, Role};
//! let device = Device::new(0, KbusConfig::default());
//! let a = device.open(OpenMode::ReadWrite);
//!
//! device.bind(a, "$.B", Role::Listener, false).unwrap();
//! device.write(a, Message::new("$.B", "data")).unwrap();
//!
//! let copy = device.read(a).unwrap();
//! assert_eq!(copy.data(), b"data");
//! assert!(!copy.should_reply());
//! assert!(device.read(a).is_none());
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use crate::binding::{BindingSnapshot, BindingTable, Role};
use crate::config::KbusConfig;
use crate::endpoint::{Endpoint, EndpointInfo, EndpointRegistry, OpenMode, Readiness};
use crate::error::{KbusError, Result};
use crate::ids::{EndpointId, IdAllocator, MessageId};
use crate::message::{Message, QueuedMessage};
use crate::router::MessageRouter;

/// State that only changes under the routing lock.
#[derive(Debug)]
struct RoutingCore {
    bindings: BindingTable,
    ids: IdAllocator,
    last_endpoint: u32,
}

/// One in-memory message bus.
///
/// `Send + Sync`; share it behind an [`Arc`].
#[derive(Debug)]
pub struct Device {
    index: usize,
    config: KbusConfig,
    router: MessageRouter,
    core: Mutex<RoutingCore>,
    endpoints: EndpointRegistry,
}

impl Device {
    /// Create an empty device.  `index` is only used for diagnostics.
    #[must_use]
    pub fn new(index: usize, config: KbusConfig) -> Self {
        tracing::info!(device = index, "kbus device created");
        Self {
            index,
            router: MessageRouter::new(&config),
            core: Mutex::new(RoutingCore {
                bindings: BindingTable::new(config.max_name_len),
                ids: IdAllocator::new(),
                last_endpoint: 0,
            }),
            endpoints: EndpointRegistry::new(),
            config,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn config(&self) -> &KbusConfig {
        &self.config
    }

    fn core(&self) -> MutexGuard<'_, RoutingCore> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- Endpoint lifecycle -------------------------------------------------

    /// Open a new endpoint and return its id.
    pub fn open(&self, mode: OpenMode) -> EndpointId {
        let mut core = self.core();
        let id = self.next_endpoint_id(&mut core);
        self.endpoints.insert(Arc::new(Endpoint::new(
            id,
            mode,
            self.config.max_queue_len,
        )));
        tracing::info!(device = self.index, endpoint = %id, mode = %mode, "endpoint opened");
        id
    }

    /// Next free endpoint id.  Wraps past `u32::MAX`, skipping 0 and ids
    /// still open.
    fn next_endpoint_id(&self, core: &mut RoutingCore) -> EndpointId {
        loop {
            core.last_endpoint = core.last_endpoint.wrapping_add(1);
            let id = EndpointId::new(core.last_endpoint);
            if core.last_endpoint != 0 && !self.endpoints.contains(id) {
                return id;
            }
        }
    }

    /// Close an endpoint, releasing its bindings and pending copies.
    ///
    /// Returns `false` if the endpoint was not open.
    pub fn close(&self, id: EndpointId) -> bool {
        let mut core = self.core();
        let Some(endpoint) = self.endpoints.remove(id) else {
            return false;
        };
        let bindings = core.bindings.remove_endpoint(id);
        let discarded = endpoint.shut();
        tracing::info!(
            device = self.index,
            endpoint = %id,
            bindings,
            discarded,
            "endpoint closed"
        );
        true
    }

    pub fn is_open(&self, id: EndpointId) -> bool {
        self.endpoints.contains(id)
    }

    pub fn endpoint(&self, id: EndpointId) -> Option<Arc<Endpoint>> {
        self.endpoints.get(id)
    }

    pub fn endpoints(&self) -> Vec<EndpointInfo> {
        self.endpoints.list_all()
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.count()
    }

    // -- Bindings -----------------------------------------------------------

    /// Bind `endpoint` to `pattern` with the given role.
    pub fn bind(
        &self,
        endpoint: EndpointId,
        pattern: &str,
        role: Role,
        guaranteed: bool,
    ) -> Result<()> {
        let mut core = self.core();
        self.endpoints.require(endpoint)?;
        core.bindings.bind(endpoint, pattern, role, guaranteed)
    }

    /// Remove one of `endpoint`'s bindings with exactly this pattern and
    /// role.
    pub fn unbind(&self, endpoint: EndpointId, pattern: &str, role: Role) -> Result<()> {
        let mut core = self.core();
        self.endpoints.require(endpoint)?;
        core.bindings.unbind(endpoint, pattern, role)
    }

    /// Every binding on the device, in no particular order.
    pub fn snapshot_bindings(&self) -> Vec<BindingSnapshot> {
        self.core().bindings.snapshot()
    }

    /// The bindings snapshot as text, one binding per line, sorted.
    pub fn render_bindings(&self) -> String {
        let mut snapshot = self.snapshot_bindings();
        snapshot.sort();
        snapshot
            .iter()
            .map(|b| format!("{b}\n"))
            .collect()
    }

    // -- Messages -----------------------------------------------------------

    /// Route `message` from `writer` and return its assigned id.
    ///
    /// On error nothing is delivered and no id is consumed.
    pub fn write(&self, writer: EndpointId, message: Message) -> Result<MessageId> {
        let mut core = self.core();

        let sender = self.endpoints.require(writer)?;
        if !sender.mode().can_write() {
            return Err(KbusError::BadFileDescriptor {
                endpoint: writer,
                reason: "endpoint was opened read-only",
            });
        }

        let plan = self
            .router
            .plan(&core.bindings, &message, |id| self.endpoints.contains(id))?;
        let admitted = plan.admit(
            |id| self.endpoints.get(id).map_or(0, |e| e.room()),
            self.config.max_queue_len,
        )?;

        let id = core.ids.next_id();
        let shared = Arc::new(message.stamped(id, writer));

        for delivery in &admitted.deliver {
            if let Some(recipient) = self.endpoints.get(delivery.endpoint) {
                recipient.push(QueuedMessage::new(
                    Arc::clone(&shared),
                    delivery.should_reply,
                ));
                tracing::trace!(
                    id = %id,
                    endpoint = %delivery.endpoint,
                    kind = ?delivery.kind,
                    should_reply = delivery.should_reply,
                    "copy queued"
                );
            }
        }
        for delivery in &admitted.dropped {
            tracing::warn!(
                id = %id,
                endpoint = %delivery.endpoint,
                name = %shared.name(),
                "queue full, copy dropped"
            );
        }

        sender.record_sent(id);
        tracing::debug!(
            id = %id,
            from = %writer,
            name = %shared.name(),
            request = shared.is_request(),
            copies = admitted.deliver.len(),
            "message written"
        );
        Ok(id)
    }

    /// Pop the oldest copy queued for `endpoint`.
    pub fn read(&self, endpoint: EndpointId) -> Option<QueuedMessage> {
        self.endpoints.get(endpoint)?.pop()
    }

    /// Framed length of the next copy for `endpoint`, or 0.
    pub fn next_len(&self, endpoint: EndpointId) -> usize {
        self.endpoints.get(endpoint).map_or(0, |e| e.peek_length())
    }

    /// Id of the last message `endpoint` wrote.
    pub fn last_id(&self, endpoint: EndpointId) -> Option<MessageId> {
        self.endpoints.get(endpoint)?.last_sent()
    }

    /// Whether `endpoint` has something to read and may write.
    pub fn poll(&self, endpoint: EndpointId) -> Result<Readiness> {
        Ok(self.endpoints.require(endpoint)?.readiness())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        tracing::info!(device = self.index, "kbus device released");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device::new(0, KbusConfig::default())
    }

    #[test]
    fn endpoint_ids_are_not_reused() {
        let d = device();
        let a = d.open(OpenMode::ReadWrite);
        assert!(d.close(a));
        let b = d.open(OpenMode::ReadWrite);
        assert_ne!(a, b);
        assert!(!d.close(a));
    }

    #[test]
    fn endpoint_ids_wrap_past_open_ones() {
        let d = device();
        let first = d.open(OpenMode::ReadWrite);
        assert_eq!(first, EndpointId::new(1));

        d.core().last_endpoint = u32::MAX - 1;
        assert_eq!(d.open(OpenMode::ReadWrite), EndpointId::new(u32::MAX));
        // 0 is skipped and 1 is still open.
        assert_eq!(d.open(OpenMode::ReadWrite), EndpointId::new(2));
    }

    #[test]
    fn read_only_endpoint_cannot_write() {
        let d = device();
        let r = d.open(OpenMode::ReadOnly);
        assert!(d.read(r).is_none());
        d.bind(r, "$.Fred", Role::Listener, false).unwrap();

        let err = d.write(r, Message::new("$.Fred", "data")).unwrap_err();
        assert!(matches!(err, KbusError::BadFileDescriptor { .. }));
        assert!(d.read(r).is_none());
    }

    #[test]
    fn closed_endpoint_is_rejected() {
        let d = device();
        let a = d.open(OpenMode::ReadWrite);
        d.close(a);
        assert!(matches!(
            d.bind(a, "$.Fred", Role::Listener, false),
            Err(KbusError::BadFileDescriptor { .. })
        ));
        assert!(matches!(
            d.write(a, Message::new("$.Fred", "")),
            Err(KbusError::BadFileDescriptor { .. })
        ));
        assert_eq!(d.next_len(a), 0);
        assert!(d.poll(a).is_err());
    }

    #[test]
    fn rejected_write_does_not_consume_an_id() {
        let d = device();
        let a = d.open(OpenMode::ReadWrite);
        d.bind(a, "$.Fred", Role::Listener, false).unwrap();

        let first = d.write(a, Message::new("$.Fred", "")).unwrap();
        assert!(matches!(
            d.write(a, Message::new("$.William", "")),
            Err(KbusError::NoRecipients { .. })
        ));
        assert_eq!(d.last_id(a), Some(first));

        let second = d.write(a, Message::new("$.Fred", "")).unwrap();
        assert_eq!(second.get(), first.get() + 1);
    }

    #[test]
    fn close_releases_bindings() {
        let d = device();
        let a = d.open(OpenMode::ReadWrite);
        let b = d.open(OpenMode::ReadWrite);
        d.bind(a, "$.Fred", Role::Replier, false).unwrap();
        d.bind(a, "$.Jim", Role::Listener, false).unwrap();
        d.bind(b, "$.Jim", Role::Listener, false).unwrap();

        d.close(a);
        let snapshot = d.snapshot_bindings();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].endpoint, b);

        // The replier slot is free again.
        d.bind(b, "$.Fred", Role::Replier, false).unwrap();
    }

    #[test]
    fn render_bindings_lists_sorted_lines() {
        let d = device();
        let a = d.open(OpenMode::ReadWrite);
        d.bind(a, "$.Fred", Role::Replier, true).unwrap();
        d.bind(a, "$.Fred", Role::Listener, false).unwrap();

        assert_eq!(
            d.render_bindings(),
            "         1 L F $.Fred\n         1 R T $.Fred\n"
        );
    }

    #[test]
    fn poll_reports_readiness() {
        let d = device();
        let a = d.open(OpenMode::ReadWrite);
        d.bind(a, "$.Fred", Role::Listener, false).unwrap();
        assert_eq!(
            d.poll(a).unwrap(),
            Readiness {
                readable: false,
                writable: true
            }
        );
        d.write(a, Message::new("$.Fred", "")).unwrap();
        assert!(d.poll(a).unwrap().readable);
    }

    #[test]
    fn full_queue_drops_non_guaranteed_copies() {
        let d = Device::new(0, KbusConfig::new().with_max_queue_len(1));
        let w = d.open(OpenMode::ReadWrite);
        let slow = d.open(OpenMode::ReadOnly);
        let fast = d.open(OpenMode::ReadOnly);
        d.bind(slow, "$.Fred", Role::Listener, false).unwrap();
        d.bind(fast, "$.Fred", Role::Listener, false).unwrap();

        d.write(w, Message::new("$.Fred", "1")).unwrap();
        assert_eq!(d.read(fast).unwrap().data(), b"1");

        // `slow` is full: the write still succeeds, `slow` misses it.
        d.write(w, Message::new("$.Fred", "2")).unwrap();
        assert_eq!(d.read(fast).unwrap().data(), b"2");
        assert_eq!(d.read(slow).unwrap().data(), b"1");
        assert!(d.read(slow).is_none());
    }

    #[test]
    fn full_guaranteed_queue_rejects_the_write() {
        let d = Device::new(0, KbusConfig::new().with_max_queue_len(1));
        let w = d.open(OpenMode::ReadWrite);
        let strict = d.open(OpenMode::ReadOnly);
        let other = d.open(OpenMode::ReadOnly);
        d.bind(strict, "$.Fred", Role::Listener, true).unwrap();
        d.bind(other, "$.Fred", Role::Listener, false).unwrap();

        let first = d.write(w, Message::new("$.Fred", "1")).unwrap();
        d.read(other);

        assert!(matches!(
            d.write(w, Message::new("$.Fred", "2")),
            Err(KbusError::QueueFull { endpoint, capacity: 1 }) if endpoint == strict
        ));
        // Nobody got the rejected message and no id was used.
        assert!(d.read(other).is_none());
        d.read(strict);
        let next = d.write(w, Message::new("$.Fred", "3")).unwrap();
        assert_eq!(next.get(), first.get() + 1);
    }

    #[test]
    fn write_whose_only_copies_are_dropped_still_succeeds() {
        let d = Device::new(0, KbusConfig::new().with_max_queue_len(1));
        let w = d.open(OpenMode::ReadWrite);
        let slow = d.open(OpenMode::ReadOnly);
        d.bind(slow, "$.Fred", Role::Listener, false).unwrap();

        let first = d.write(w, Message::new("$.Fred", "1")).unwrap();
        // Nothing fits, yet the write is accepted and uses an id.
        let second = d.write(w, Message::new("$.Fred", "2")).unwrap();
        assert_eq!(second.get(), first.get() + 1);
        assert_eq!(d.last_id(w), Some(second));

        assert_eq!(d.read(slow).unwrap().data(), b"1");
        assert!(d.read(slow).is_none());
    }

    #[test]
    fn full_replier_queue_rejects_the_request() {
        let d = Device::new(0, KbusConfig::new().with_max_queue_len(1));
        let w = d.open(OpenMode::ReadWrite);
        let replier = d.open(OpenMode::ReadWrite);
        let observer = d.open(OpenMode::ReadOnly);
        d.bind(replier, "$.Fred", Role::Replier, false).unwrap();
        d.bind(observer, "$.Fred", Role::Listener, false).unwrap();

        let first = d.write(w, Message::request("$.Fred", "1")).unwrap();
        d.read(observer);

        assert!(matches!(
            d.write(w, Message::request("$.Fred", "2")),
            Err(KbusError::QueueFull { endpoint, capacity: 1 }) if endpoint == replier
        ));
        assert!(d.read(observer).is_none());
        assert_eq!(d.last_id(w), Some(first));
    }
}
