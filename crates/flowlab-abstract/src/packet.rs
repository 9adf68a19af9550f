use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Simulated time, measured from the start of the run.
pub type SimTime = Duration;

/// Segment flags
pub mod flags {
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Transport endpoint: a node plus a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub node: NodeId,
    pub port: u16,
}

impl Address {
    pub fn new(node: NodeId, port: u16) -> Self {
        Self { node, port }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.port)
    }
}

/// Opaque handle to a connection-oriented socket held by the engine.
///
/// Deliberately neither `Clone` nor `Copy`: whoever holds the handle owns the
/// connection.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SocketId(u32);

impl SocketId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHeader {
    pub src: Address,
    pub dst: Address,
    pub seq_num: u32,
    pub ack_num: u32,
    pub flags: u8,
    /// Time the segment left its sender, used for one-way delay accounting.
    pub sent_at: SimTime,
}

impl SegmentHeader {
    pub fn is_data(&self) -> bool {
        self.flags & flags::PSH != 0
    }
}

#[derive(Debug, Clone)]
pub struct Packet {
    pub header: SegmentHeader,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(header: SegmentHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Create a pure ACK travelling back along the reverse path of `header`.
    pub fn ack_for(header: &SegmentHeader, sent_at: SimTime) -> Self {
        Self {
            header: SegmentHeader {
                src: header.dst,
                dst: header.src,
                seq_num: 0,
                ack_num: header.seq_num.wrapping_add(1),
                flags: flags::ACK,
                sent_at,
            },
            payload: Bytes::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
