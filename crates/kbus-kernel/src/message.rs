//! Messages and delivered copies.
//!
//! A [`Message`] is built by the writer and becomes immutable once the device
//! accepts it: the device stamps its id and sender, wraps it in an [`Arc`],
//! and enqueues one [`QueuedMessage`] per delivery.  Copies share the payload
//! and differ only in their `should_reply` flag, so marking one delivery as
//! the replier's copy never affects another.
//!
//! # Kinds
//!
//! | Kind | Built with | Delivered to |
//! |------|------------|--------------|
//! | Announcement | [`Message::new`] | matching listeners |
//! | Request | [`Message::request`] | matching listeners + the best matching replier |
//! | Reply | [`Message::reply_to`] | matching listeners + the requester |

use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ids::{EndpointId, MessageId};
use crate::wire;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A bus message.
///
/// `id` and `from` are assigned by the device when the message is written;
/// anything a writer puts there is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: Option<MessageId>,
    name: String,
    data: Vec<u8>,
    is_request: bool,
    in_reply_to: Option<MessageId>,
    to: Option<EndpointId>,
    from: Option<EndpointId>,
}

impl Message {
    /// A plain announcement: delivered to listeners, never needs a reply.
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: None,
            name: name.into(),
            data: data.into(),
            is_request: false,
            in_reply_to: None,
            to: None,
            from: None,
        }
    }

    /// A request soliciting one reply from the best matching replier.
    pub fn request(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            is_request: true,
            ..Self::new(name, data)
        }
    }

    /// A reply addressed by hand.
    ///
    /// `in_reply_to` should be the id of the request copy being answered and
    /// `to` that copy's sender.  The device does not check either.
    pub fn reply(
        name: impl Into<String>,
        data: impl Into<Vec<u8>>,
        in_reply_to: MessageId,
        to: EndpointId,
    ) -> Self {
        Self {
            in_reply_to: Some(in_reply_to),
            to: Some(to),
            ..Self::new(name, data)
        }
    }

    /// A reply to a received request copy, under the request's name.
    ///
    /// Returns `None` if the copy has not been through a device (no id or
    /// sender to answer).
    pub fn reply_to(request: &Message, data: impl Into<Vec<u8>>) -> Option<Self> {
        Some(Self::reply(
            request.name.clone(),
            data,
            request.id?,
            request.from?,
        ))
    }

    pub(crate) fn from_parts(
        id: Option<MessageId>,
        name: String,
        data: Vec<u8>,
        is_request: bool,
        in_reply_to: Option<MessageId>,
        to: Option<EndpointId>,
        from: Option<EndpointId>,
    ) -> Self {
        Self {
            id,
            name,
            data,
            is_request,
            in_reply_to,
            to,
            from,
        }
    }

    /// Stamp the device-assigned id and sender.
    pub(crate) fn stamped(mut self, id: MessageId, from: EndpointId) -> Self {
        self.id = Some(id);
        self.from = Some(from);
        self
    }

    pub fn id(&self) -> Option<MessageId> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_request(&self) -> bool {
        self.is_request
    }

    pub fn in_reply_to(&self) -> Option<MessageId> {
        self.in_reply_to
    }

    pub fn to(&self) -> Option<EndpointId> {
        self.to
    }

    pub fn from(&self) -> Option<EndpointId> {
        self.from
    }

    /// Whether this message is addressed back to a requester.
    pub fn is_reply(&self) -> bool {
        self.in_reply_to.is_some() || self.to.is_some()
    }

    /// Same content, ignoring the device-assigned id and sender.
    pub fn equivalent(&self, other: &Message) -> bool {
        self.name == other.name
            && self.data == other.data
            && self.is_request == other.is_request
            && self.in_reply_to == other.in_reply_to
            && self.to == other.to
    }

    /// Size of this message as a framed wire record.
    pub fn wire_len(&self) -> usize {
        wire::encoded_len(self)
    }
}

// ---------------------------------------------------------------------------
// QueuedMessage
// ---------------------------------------------------------------------------

/// One delivery of a message to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    message: Arc<Message>,
    should_reply: bool,
}

impl QueuedMessage {
    pub(crate) fn new(message: Arc<Message>, should_reply: bool) -> Self {
        Self {
            message,
            should_reply,
        }
    }

    /// `true` only on the copy handed to the chosen replier of a request.
    pub fn should_reply(&self) -> bool {
        self.should_reply
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Share the underlying message.
    pub fn shared(&self) -> Arc<Message> {
        Arc::clone(&self.message)
    }

    /// Build the reply to this copy.
    pub fn reply(&self, data: impl Into<Vec<u8>>) -> Option<Message> {
        Message::reply_to(&self.message, data)
    }

    /// Encode this copy as a wire record.
    pub fn encode(&self) -> Vec<u8> {
        wire::encode(&self.message, self.should_reply)
    }

    /// Framed length of this copy.
    pub fn wire_len(&self) -> usize {
        self.message.wire_len()
    }
}

impl Deref for QueuedMessage {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.message
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
