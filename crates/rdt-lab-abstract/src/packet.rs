use serde::{Deserialize, Serialize};
use std::fmt;

use crate::checksum;

/// Fixed payload length of every application message and every packet.
pub const MSG_SIZE: usize = 20;

/// Application-layer unit handed down to entity A and delivered up at entity B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    pub data: [u8; MSG_SIZE],
}

impl Message {
    pub fn new(data: [u8; MSG_SIZE]) -> Self {
        Self { data }
    }

    /// The `index`-th message the simulator originates: twenty copies of a
    /// lowercase letter cycling through `a..=z`.
    pub fn pattern(index: u64) -> Self {
        let letter = b'a' + (index % 26) as u8;
        Self {
            data: [letter; MSG_SIZE],
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Msg(data={})", String::from_utf8_lossy(&self.data))
    }
}

/// Wire unit carried by the channel.
///
/// Packets are values: the channel never edits one in place, it builds a new
/// packet when it simulates corruption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub seqnum: u32,
    pub acknum: u32,
    pub checksum: u32,
    pub payload: [u8; MSG_SIZE],
}

impl Packet {
    /// Build a packet and seal it with its checksum.
    pub fn new(seqnum: u32, acknum: u32, payload: [u8; MSG_SIZE]) -> Self {
        Self {
            seqnum,
            acknum,
            checksum: checksum::compute(seqnum, acknum, &payload),
            payload,
        }
    }

    /// Build a packet with an explicit checksum, valid or not.
    pub fn from_parts(seqnum: u32, acknum: u32, checksum: u32, payload: [u8; MSG_SIZE]) -> Self {
        Self {
            seqnum,
            acknum,
            checksum,
            payload,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        !checksum::verify(self)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pkt(seqnum={}, acknum={}, checksum={:08X}, payload={})",
            self.seqnum,
            self.acknum,
            self.checksum,
            String::from_utf8_lossy(&self.payload)
        )
    }
}
