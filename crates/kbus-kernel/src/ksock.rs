//! Device set and endpoint handles.
//!
//! [`Kbus`] stands in for the set of numbered bus devices: opening index `i`
//! yields a [`Ksock`], an owning handle on a fresh endpoint of device `i`.
//! A device exists only while some endpoint holds it; when the last `Ksock`
//! on it is dropped the device (bindings, queues, id counter) goes away and
//! the next open starts from scratch.
//!
//! # Example
//!
//! ```rust
//! # use kbus_kernel::{Kbus, KbusConfig, Message, OpenMode, Role};
//! let bus = Kbus::new(KbusConfig::default());
//! let listener = bus.open(0, OpenMode::ReadOnly).unwrap();
//! let writer = bus.open(0, OpenMode::ReadWrite).unwrap();
//!
//! listener.bind("$.Fred.*", Role::Listener, false).unwrap();
//! writer.send(Message::new("$.Fred.Jim", "hello")).unwrap();
//!
//! let copy = listener.read_next().unwrap();
//! assert_eq!(copy.name(), "$.Fred.Jim");
//! ```

use std::sync::{Arc, Mutex, Weak};

use crate::binding::Role;
use crate::config::KbusConfig;
use crate::device::Device;
use crate::endpoint::{OpenMode, Readiness};
use crate::error::{KbusError, Result};
use crate::ids::{EndpointId, MessageId};
use crate::message::{Message, QueuedMessage};

// ---------------------------------------------------------------------------
// Kbus
// ---------------------------------------------------------------------------

/// A fixed set of numbered devices.
#[derive(Debug)]
pub struct Kbus {
    config: KbusConfig,
    devices: Mutex<Vec<Weak<Device>>>,
}

impl Kbus {
    #[must_use]
    pub fn new(config: KbusConfig) -> Self {
        let devices = (0..config.num_devices).map(|_| Weak::new()).collect();
        Self {
            config,
            devices: Mutex::new(devices),
        }
    }

    pub fn config(&self) -> &KbusConfig {
        &self.config
    }

    pub fn num_devices(&self) -> usize {
        self.config.num_devices
    }

    /// Open a new endpoint on device `index`.
    pub fn open(&self, index: usize, mode: OpenMode) -> Result<Ksock> {
        let device = {
            let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
            let slot = devices.get_mut(index).ok_or(KbusError::NotFound {
                index,
                available: self.config.num_devices,
            })?;
            match slot.upgrade() {
                Some(device) => device,
                None => {
                    let device = Arc::new(Device::new(index, self.config.clone()));
                    *slot = Arc::downgrade(&device);
                    device
                }
            }
        };
        let id = device.open(mode);
        Ok(Ksock { device, id, mode })
    }

    /// Like [`Kbus::open`], taking the mode as `"r"` or `"rw"`.
    pub fn open_str(&self, index: usize, mode: &str) -> Result<Ksock> {
        self.open(index, mode.parse()?)
    }

    /// The device at `index`, if any endpoint currently holds it open.
    pub fn device(&self, index: usize) -> Option<Arc<Device>> {
        let devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        devices.get(index).and_then(Weak::upgrade)
    }
}

impl Default for Kbus {
    fn default() -> Self {
        Self::new(KbusConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Ksock
// ---------------------------------------------------------------------------

/// An open endpoint.  Closed when dropped.
#[derive(Debug)]
pub struct Ksock {
    device: Arc<Device>,
    id: EndpointId,
    mode: OpenMode,
}

impl Ksock {
    /// This endpoint's id, as seen in `from`/`to` fields and binding
    /// snapshots.
    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn bind(&self, pattern: &str, role: Role, guaranteed: bool) -> Result<()> {
        self.device.bind(self.id, pattern, role, guaranteed)
    }

    pub fn unbind(&self, pattern: &str, role: Role) -> Result<()> {
        self.device.unbind(self.id, pattern, role)
    }

    /// Write a message, returning the id the device assigned.
    pub fn send(&self, message: Message) -> Result<MessageId> {
        self.device.write(self.id, message)
    }

    /// Pop the next queued copy, if any.
    pub fn read_next(&self) -> Option<QueuedMessage> {
        self.device.read(self.id)
    }

    /// Framed length of the next queued copy, or 0.
    pub fn next_len(&self) -> usize {
        self.device.next_len(self.id)
    }

    /// Id of the last message this endpoint sent.
    pub fn last_msg_id(&self) -> Option<MessageId> {
        self.device.last_id(self.id)
    }

    pub fn poll(&self) -> Result<Readiness> {
        self.device.poll(self.id)
    }

    /// Wait until a copy is queued for this endpoint.
    pub async fn readable(&self) -> Result<()> {
        let endpoint = self.device.endpoint(self.id).ok_or(KbusError::BadFileDescriptor {
            endpoint: self.id,
            reason: "endpoint is not open",
        })?;
        endpoint.readable().await
    }

    /// Drain the queued copies in order.  Later sends can be drained again.
    pub fn messages(&self) -> impl Iterator<Item = QueuedMessage> + '_ {
        std::iter::from_fn(move || self.read_next())
    }

    /// Close the endpoint now rather than at drop.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Ksock {
    fn drop(&mut self) {
        self.device.close(self.id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
