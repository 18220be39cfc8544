//! Length-prefixed message records.
//!
//! Every field is a little-endian `u32`; the name and data are zero-padded to
//! a 4-byte boundary:
//!
//! ```text
//! +--------+-------+----+-------------+----+------+-------+----------+----------+------+------+--------+
//! | "Kbus" | total | id | in_reply_to | to | from | flags | name_len | data_len | name | data | "subK" |
//! +--------+-------+----+-------------+----+------+-------+----------+----------+------+------+--------+
//! ```
//!
//! `0` in `id`, `in_reply_to`, `to` or `from` means "absent".  `total` is the
//! length of the whole record including both guards.

use crate::error::{KbusError, Result};
use crate::ids::{EndpointId, MessageId};
use crate::message::Message;

pub const START_GUARD: [u8; 4] = *b"Kbus";
pub const END_GUARD: [u8; 4] = *b"subK";

/// The message is a request.
pub const FLAG_WANT_REPLY: u32 = 1 << 0;
/// This copy was delivered to the chosen replier.
pub const FLAG_SHOULD_REPLY: u32 = 1 << 1;

const HEADER_WORDS: usize = 9;
const HEADER_LEN: usize = HEADER_WORDS * 4;

/// A record decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub message: Message,
    pub should_reply: bool,
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

/// Length of the record [`encode`] would produce for `message`.
pub fn encoded_len(message: &Message) -> usize {
    HEADER_LEN + padded(message.name().len()) + padded(message.data().len()) + END_GUARD.len()
}

/// Encode a message (and the per-copy `should_reply` flag) as one record.
pub fn encode(message: &Message, should_reply: bool) -> Vec<u8> {
    let total = encoded_len(message);
    let mut out = Vec::with_capacity(total);

    let mut flags = 0;
    if message.is_request() {
        flags |= FLAG_WANT_REPLY;
    }
    if should_reply {
        flags |= FLAG_SHOULD_REPLY;
    }

    out.extend_from_slice(&START_GUARD);
    for word in [
        total as u32,
        message.id().map_or(0, MessageId::get),
        message.in_reply_to().map_or(0, MessageId::get),
        message.to().map_or(0, EndpointId::get),
        message.from().map_or(0, EndpointId::get),
        flags,
        message.name().len() as u32,
        message.data().len() as u32,
    ] {
        out.extend_from_slice(&word.to_le_bytes());
    }
    put_padded(&mut out, message.name().as_bytes());
    put_padded(&mut out, message.data());
    out.extend_from_slice(&END_GUARD);

    debug_assert_eq!(out.len(), total);
    out
}

/// Decode one record.  `bytes` must hold exactly one record.
pub fn decode(bytes: &[u8]) -> Result<Decoded> {
    if bytes.len() < HEADER_LEN + END_GUARD.len() {
        return Err(KbusError::framing(format!(
            "record too short: {} bytes",
            bytes.len()
        )));
    }
    if bytes[..4] != START_GUARD {
        return Err(KbusError::framing("bad start guard"));
    }

    let word = |index: usize| -> u32 {
        let at = index * 4;
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    };

    let total = word(1) as usize;
    if total != bytes.len() {
        return Err(KbusError::framing(format!(
            "length field says {total} bytes, record has {}",
            bytes.len()
        )));
    }

    let id = word(2);
    let in_reply_to = word(3);
    let to = word(4);
    let from = word(5);
    let flags = word(6);
    let name_len = word(7) as usize;
    let data_len = word(8) as usize;

    let expected = HEADER_LEN + padded(name_len) + padded(data_len) + END_GUARD.len();
    if expected != total {
        return Err(KbusError::framing(format!(
            "name/data lengths ({name_len}/{data_len}) do not fit a {total} byte record"
        )));
    }
    if bytes[total - 4..] != END_GUARD {
        return Err(KbusError::framing("bad end guard"));
    }

    let name_start = HEADER_LEN;
    let data_start = name_start + padded(name_len);
    let name = std::str::from_utf8(&bytes[name_start..name_start + name_len])
        .map_err(|e| KbusError::framing(format!("name is not utf-8: {e}")))?
        .to_string();
    let data = bytes[data_start..data_start + data_len].to_vec();

    let message = Message::from_parts(
        (id != 0).then_some(MessageId::new(id)),
        name,
        data,
        flags & FLAG_WANT_REPLY != 0,
        (in_reply_to != 0).then_some(MessageId::new(in_reply_to)),
        (to != 0).then_some(EndpointId::new(to)),
        (from != 0).then_some(EndpointId::new(from)),
    );

    Ok(Decoded {
        message,
        should_reply: flags & FLAG_SHOULD_REPLY != 0,
    })
}

fn put_padded(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes);
    out.resize(out.len() + (padded(bytes.len()) - bytes.len()), 0);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
