//! Wire codec boundary.
//!
//! A codec turns requests into bytes and inbound bytes into typed messages.
//! Decoding is incremental: the caller owns the receive buffer and calls
//! [`Codec::decode`] until it reports [`Decoded::NeedMore`].

use crate::{CommandKind, CustomEvent, PinValueChangedEvent, ReplyEvent, Request, Result};
use bytes::BytesMut;

/// A typed message decoded from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    PinValueChanged(PinValueChangedEvent),
    Reply(ReplyEvent),
    Custom(CustomEvent),
    /// The device finished booting.
    Ready,
}

/// Outcome of one decode step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// No complete frame is buffered yet.
    NeedMore,
    /// One frame was consumed and understood.
    Frame(Inbound),
    /// One frame (or an oversized run of bytes) was consumed but not understood.
    Unrecognized(String),
}

/// Encodes requests and decodes inbound frames for one wire protocol.
pub trait Codec: Send + Sync {
    /// Appends the encoded request to `dst`.
    fn encode(&self, request: &Request, dst: &mut BytesMut) -> Result<()>;

    /// Consumes at most one frame from the front of `src`.
    fn decode(&self, src: &mut BytesMut) -> Decoded;

    /// Returns false for commands this protocol cannot express.
    fn supports(&self, _kind: CommandKind) -> bool {
        true
    }
}
