//! Message delivery.
//!
//! The kernel hands every outgoing message to a [`Transport`], which places
//! it into the bottom-half channel of its receiver. Delivery must preserve all
//! logical fields of the envelope, in particular the mark and the timestamps.
use std::fmt;

use crate::channel::Channel;
use crate::message::Msg;

/// A bottom-half channel of an LP.
pub(crate) type MsgChannel = Channel<Msg>;

/// A delivery error.
#[derive(Debug)]
pub struct TransportError {
    description: String,
}

impl TransportError {
    fn new(description: impl fmt::Display) -> Self {
        Self {
            description: description.to_string(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message delivery failed: {}", self.description)
    }
}

impl std::error::Error for TransportError {}

/// Delivery of messages to their receiver.
pub(crate) trait Transport: Send + Sync {
    /// Delivers a message to the bottom-half channel of its receiver.
    fn deliver(&self, msg: Msg) -> Result<(), TransportError>;

    /// Notifies remote kernels, if any, that this kernel may terminate.
    fn broadcast_termination(&self) {}

    /// Returns `true` once all remote kernels, if any, may terminate.
    fn all_kernels_terminated(&self) -> bool {
        true
    }
}

/// Direct delivery through shared memory.
pub(crate) struct ChannelTransport<'a> {
    channels: &'a [MsgChannel],
}

impl<'a> ChannelTransport<'a> {
    pub(crate) fn new(channels: &'a [MsgChannel]) -> Self {
        Self { channels }
    }
}

impl Transport for ChannelTransport<'_> {
    fn deliver(&self, msg: Msg) -> Result<(), TransportError> {
        let channel = self
            .channels
            .get(msg.receiver.index())
            .ok_or_else(|| TransportError::new(format_args!("no channel for {}", msg.receiver)))?;
        channel.send(msg);

        Ok(())
    }
}

/// Delivery through a CBOR serialization round trip.
///
/// Every envelope is encoded and decoded before insertion, as it would be when
/// crossing a kernel boundary.
pub(crate) struct CborLoopback<'a> {
    inner: ChannelTransport<'a>,
}

impl<'a> CborLoopback<'a> {
    pub(crate) fn new(channels: &'a [MsgChannel]) -> Self {
        Self {
            inner: ChannelTransport::new(channels),
        }
    }
}

impl Transport for CborLoopback<'_> {
    fn deliver(&self, msg: Msg) -> Result<(), TransportError> {
        let bytes = msg.to_cbor().map_err(TransportError::new)?;
        let msg = Msg::from_cbor(&bytes).map_err(TransportError::new)?;

        self.inner.deliver(msg)
    }
}
