//! Message envelope.
//!
//! A [`Msg`] is the unit of causality exchanged between LPs. Positive messages
//! carry events, negative messages (antimessages) cancel a previously sent
//! positive message with the same mark, and control messages drive the
//! rendezvous state machine.
use std::io;

use serde::{Deserialize, Serialize};

use crate::model::LpId;
use crate::time::SimTime;

/// Event type of the per-LP initialization event.
pub(crate) const INIT: i32 = -1;

/// Event type of the control message that resumes a suspended LP.
pub(crate) const UNBLOCK: i32 = -2;

/// The polarity of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum MessageKind {
    Positive,
    Negative,
    Control,
    NegativeControl,
}

impl MessageKind {
    /// Returns the kind of the antimessage cancelling a message of this kind.
    pub(crate) fn anti(self) -> Self {
        match self {
            Self::Positive | Self::Negative => Self::Negative,
            Self::Control | Self::NegativeControl => Self::NegativeControl,
        }
    }
}

/// A message exchanged between LPs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct Msg {
    pub(crate) sender: LpId,
    pub(crate) receiver: LpId,
    pub(crate) event_type: i32,
    pub(crate) kind: MessageKind,
    pub(crate) timestamp: SimTime,
    pub(crate) send_time: SimTime,
    pub(crate) mark: u64,
    /// Mark of the rendezvous a control message belongs to, if any.
    pub(crate) rendezvous_mark: u64,
    pub(crate) payload: Box<[u8]>,
    /// Ordinal of the last forward execution of this event by its receiver.
    ///
    /// Receiver-local bookkeeping: it is never transmitted.
    #[serde(skip)]
    pub(crate) exec_seq: u64,
}

impl Msg {
    /// Creates the INIT message of an LP.
    pub(crate) fn init(lp: LpId) -> Self {
        Self {
            sender: lp,
            receiver: lp,
            event_type: INIT,
            kind: MessageKind::Positive,
            timestamp: SimTime::ZERO,
            send_time: SimTime::ZERO,
            mark: 0,
            rendezvous_mark: 0,
            payload: Box::new([]),
            exec_seq: 0,
        }
    }

    /// Returns the payload-free copy kept by the sender for antimessage
    /// generation.
    ///
    /// `producer` is the execution ordinal of the event that sent the message.
    pub(crate) fn header(&self, producer: u64) -> MsgHeader {
        MsgHeader {
            sender: self.sender,
            receiver: self.receiver,
            event_type: self.event_type,
            kind: self.kind,
            timestamp: self.timestamp,
            send_time: self.send_time,
            mark: self.mark,
            rendezvous_mark: self.rendezvous_mark,
            producer,
        }
    }

    /// Serializes the message to CBOR.
    pub(crate) fn to_cbor(&self) -> Result<Vec<u8>, ciborium::ser::Error<io::Error>> {
        let mut buffer = Vec::new();
        ciborium::into_writer(self, &mut buffer)?;

        Ok(buffer)
    }

    /// Deserializes a message from CBOR.
    pub(crate) fn from_cbor(bytes: &[u8]) -> Result<Self, ciborium::de::Error<io::Error>> {
        ciborium::from_reader(bytes)
    }
}

/// The record of a sent message kept in the output queue of its sender.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct MsgHeader {
    pub(crate) sender: LpId,
    pub(crate) receiver: LpId,
    pub(crate) event_type: i32,
    pub(crate) kind: MessageKind,
    pub(crate) timestamp: SimTime,
    pub(crate) send_time: SimTime,
    pub(crate) mark: u64,
    pub(crate) rendezvous_mark: u64,
    /// Execution ordinal of the event that sent the message.
    pub(crate) producer: u64,
}

impl MsgHeader {
    /// Builds the antimessage cancelling the message this header records.
    pub(crate) fn antimessage(&self) -> Msg {
        Msg {
            sender: self.sender,
            receiver: self.receiver,
            event_type: self.event_type,
            kind: self.kind.anti(),
            timestamp: self.timestamp,
            send_time: self.send_time,
            mark: self.mark,
            rendezvous_mark: self.rendezvous_mark,
            payload: Box::new([]),
            exec_seq: 0,
        }
    }
}

/// Generates a unique mark from an LP index and a per-LP counter.
///
/// This is the Cantor pairing function, which is a bijection between pairs of
/// naturals and naturals. Uniqueness is lost once the result overflows, which
/// requires in the order of 2^31 messages sent by a single LP.
pub(crate) fn generate_mark(gid: LpId, counter: u64) -> u64 {
    let k1 = gid.index() as u64;
    let k2 = counter;
    let s = k1.wrapping_add(k2);

    (s.wrapping_mul(s.wrapping_add(1)) / 2).wrapping_add(k2)
}

/// Recovers the index of the LP that generated a mark.
///
/// This is a debugging aid: the inverse of [`generate_mark`] with respect to
/// its first argument.
pub(crate) fn mark_to_gid(mark: u64) -> LpId {
    let triangular = |w: u128| w * (w + 1) / 2;
    let mark = u128::from(mark);

    let mut w = (((8.0 * mark as f64 + 1.0).sqrt() - 1.0) / 2.0).floor() as u128;
    // Correct for rounding errors of the floating-point estimate.
    while w > 0 && triangular(w) > mark {
        w -= 1;
    }
    while triangular(w + 1) <= mark {
        w += 1;
    }
    let k2 = mark - triangular(w);

    LpId::new((w - k2) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_are_unique_and_invertible() {
        let mut marks = std::collections::HashSet::new();
        for gid in 0..50 {
            for counter in 0..200 {
                let mark = generate_mark(LpId::new(gid), counter);
                assert!(marks.insert(mark));
                assert_eq!(mark_to_gid(mark), LpId::new(gid));
            }
        }
    }

    #[test]
    fn large_marks_are_invertible() {
        let gid = LpId::new(123_456);
        let mark = generate_mark(gid, 987_654_321);

        assert_eq!(mark_to_gid(mark), gid);
    }

    #[test]
    fn cbor_preserves_logical_fields() {
        let msg = Msg {
            sender: LpId::new(3),
            receiver: LpId::new(8),
            event_type: 12,
            kind: MessageKind::Positive,
            timestamp: SimTime::new(1.0 / 3.0).unwrap(),
            send_time: SimTime::new(0.25).unwrap(),
            mark: generate_mark(LpId::new(3), 77),
            rendezvous_mark: 0,
            payload: vec![1, 2, 3, 255].into_boxed_slice(),
            exec_seq: 0,
        };

        let bytes = msg.to_cbor().unwrap();
        let decoded = Msg::from_cbor(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(
            decoded.timestamp.as_f64().to_bits(),
            msg.timestamp.as_f64().to_bits()
        );
    }

    #[test]
    fn antimessage_mirrors_header() {
        let mut msg = Msg::init(LpId::new(1));
        msg.event_type = 4;
        msg.mark = 9;
        msg.payload = vec![7; 16].into_boxed_slice();

        let anti = msg.header(0).antimessage();
        assert_eq!(anti.kind, MessageKind::Negative);
        assert_eq!(anti.mark, msg.mark);
        assert_eq!(anti.timestamp, msg.timestamp);
        assert!(anti.payload.is_empty());

        msg.kind = MessageKind::Control;
        assert_eq!(msg.header(0).antimessage().kind, MessageKind::NegativeControl);
    }
}
