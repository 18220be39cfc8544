//! Open endpoints and their registry.
//!
//! Each open connection to a device is an [`Endpoint`]: an identity, an open
//! mode, and the queue of copies waiting to be read.  The device keeps its
//! endpoints in an [`EndpointRegistry`] backed by [`DashMap`], so readers can
//! reach their own queue without touching the device's routing lock.
//!
//! Lock order is always routing lock, then registry shard, then queue.
//! Readers take only the last two.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::error::{KbusError, Result};
use crate::ids::{EndpointId, MessageId};
use crate::message::QueuedMessage;
use crate::queue::EndpointQueue;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// How an endpoint was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpenMode {
    /// `"r"`: may bind and read, but not write.
    #[serde(rename = "r")]
    ReadOnly,
    /// `"rw"`: may also write.
    #[serde(rename = "rw")]
    ReadWrite,
}

impl OpenMode {
    pub fn can_write(self) -> bool {
        self == Self::ReadWrite
    }
}

impl FromStr for OpenMode {
    type Err = KbusError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(Self::ReadOnly),
            "rw" => Ok(Self::ReadWrite),
            other => Err(KbusError::InvalidMode {
                mode: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => f.write_str("r"),
            Self::ReadWrite => f.write_str("rw"),
        }
    }
}

/// Non-blocking readiness of an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    /// A copy is waiting to be read.
    pub readable: bool,
    /// The endpoint may write.
    pub writable: bool,
}

/// Metadata snapshot of an open endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub id: EndpointId,
    pub mode: OpenMode,
    pub opened_at: DateTime<Utc>,
    /// Copies waiting to be read.
    pub pending: usize,
    pub last_sent: Option<MessageId>,
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// One open connection to a device.
#[derive(Debug)]
pub struct Endpoint {
    id: EndpointId,
    mode: OpenMode,
    opened_at: DateTime<Utc>,
    queue: Mutex<EndpointQueue>,
    /// Id of the last message this endpoint wrote (0 = none yet).
    last_sent: AtomicU32,
    closed: AtomicBool,
    ready: Notify,
}

impl Endpoint {
    pub(crate) fn new(id: EndpointId, mode: OpenMode, queue_capacity: usize) -> Self {
        Self {
            id,
            mode,
            opened_at: Utc::now(),
            queue: Mutex::new(EndpointQueue::new(queue_capacity)),
            last_sent: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            ready: Notify::new(),
        }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    fn queue(&self) -> MutexGuard<'_, EndpointQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn push(&self, copy: QueuedMessage) {
        self.queue().push(copy);
        self.ready.notify_one();
    }

    pub(crate) fn room(&self) -> usize {
        self.queue().room()
    }

    pub fn pop(&self) -> Option<QueuedMessage> {
        self.queue().pop()
    }

    pub fn peek_length(&self) -> usize {
        self.queue().peek_length()
    }

    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    pub(crate) fn record_sent(&self, id: MessageId) {
        self.last_sent.store(id.get(), Ordering::Release);
    }

    pub fn last_sent(&self) -> Option<MessageId> {
        match self.last_sent.load(Ordering::Acquire) {
            0 => None,
            raw => Some(MessageId::new(raw)),
        }
    }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            readable: !self.queue().is_empty(),
            writable: self.mode.can_write(),
        }
    }

    pub fn info(&self) -> EndpointInfo {
        EndpointInfo {
            id: self.id,
            mode: self.mode,
            opened_at: self.opened_at,
            pending: self.pending(),
            last_sent: self.last_sent(),
        }
    }

    /// Mark closed, discard pending copies, and wake any waiter.
    pub(crate) fn shut(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let discarded = self.queue().drain().count();
        self.ready.notify_waiters();
        discarded
    }

    /// Wait until a copy is queued.
    ///
    /// Fails with [`KbusError::BadFileDescriptor`] if the endpoint is (or
    /// becomes) closed.
    pub async fn readable(&self) -> Result<()> {
        loop {
            let notified = self.ready.notified();
            if self.closed.load(Ordering::Acquire) {
                return Err(KbusError::BadFileDescriptor {
                    endpoint: self.id,
                    reason: "endpoint closed",
                });
            }
            if !self.queue().is_empty() {
                return Ok(());
            }
            notified.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Concurrent endpoint registry backed by [`DashMap`].
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    inner: DashMap<EndpointId, Arc<Endpoint>>,
}

impl EndpointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, endpoint: Arc<Endpoint>) {
        self.inner.insert(endpoint.id(), endpoint);
    }

    pub(crate) fn remove(&self, id: EndpointId) -> Option<Arc<Endpoint>> {
        self.inner.remove(&id).map(|(_, endpoint)| endpoint)
    }

    /// A handle to an open endpoint.  No registry lock is held afterwards.
    pub fn get(&self, id: EndpointId) -> Option<Arc<Endpoint>> {
        self.inner.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Like [`EndpointRegistry::get`], failing with
    /// [`KbusError::BadFileDescriptor`] if the endpoint is not open.
    pub fn require(&self, id: EndpointId) -> Result<Arc<Endpoint>> {
        self.get(id).ok_or(KbusError::BadFileDescriptor {
            endpoint: id,
            reason: "endpoint is not open",
        })
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.inner.contains_key(&id)
    }

    pub fn list_all(&self) -> Vec<EndpointInfo> {
        self.inner.iter().map(|e| e.value().info()).collect()
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
