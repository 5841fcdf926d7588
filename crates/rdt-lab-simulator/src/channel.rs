//! Unreliable channel between entity A and entity B.
//!
//! For every packet handed to it the channel decides whether the packet is
//! lost, whether and how it is corrupted, and when it arrives. Arrivals at a
//! given entity are scheduled in non-decreasing time order, so each direction
//! behaves as a FIFO link even though the per-packet delay is random.

use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;

use rdt_lab_abstract::{ArrivalJitter, CorruptionProfile, Packet, SimConfig};

use crate::engine::NodeId;
use crate::error::ContractViolation;

/// First payload byte written by payload corruption.
pub const CORRUPTION_SENTINEL: u8 = b'Z';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum Corruption {
    Payload,
    Seqnum { bit: u32 },
    Acknum { bit: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fate {
    Lost,
    Arrives {
        packet: Packet,
        at: f64,
        corruption: Option<Corruption>,
    },
}

/// Number of bits needed to represent every value in `[0, seqnum_limit)`.
pub fn seqnum_bits(seqnum_limit: u32) -> u32 {
    if seqnum_limit < 2 {
        0
    } else {
        u32::BITS - (seqnum_limit - 1).leading_zeros()
    }
}

#[derive(Debug)]
pub struct Channel {
    seqnum_limit: u32,
    seqnum_bits: u32,
    loss_prob: f64,
    corrupt_prob: f64,
    corruption: CorruptionProfile,
    jitter: ArrivalJitter,
    last_arrival: HashMap<NodeId, f64>,
}

impl Channel {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            seqnum_limit: config.seqnum_limit,
            seqnum_bits: seqnum_bits(config.seqnum_limit),
            loss_prob: config.loss_prob,
            corrupt_prob: config.corrupt_prob,
            corruption: config.corruption,
            jitter: config.jitter,
            last_arrival: HashMap::new(),
        }
    }

    /// Reject packets an entity should never have built.
    pub fn validate(&self, packet: &Packet) -> Result<(), ContractViolation> {
        if packet.seqnum >= self.seqnum_limit {
            return Err(ContractViolation::SeqnumOutOfRange {
                seqnum: packet.seqnum,
                limit: self.seqnum_limit,
            });
        }
        if packet.acknum >= self.seqnum_limit {
            return Err(ContractViolation::AcknumOutOfRange {
                acknum: packet.acknum,
                limit: self.seqnum_limit,
            });
        }
        Ok(())
    }

    /// Decide the fate of `packet` travelling towards `to`.
    ///
    /// Draws, in order: loss, corruption, corruption kind (and bit), arrival
    /// jitter. Lost packets stop after the first draw.
    pub fn transmit<R: Rng>(&mut self, rng: &mut R, now: f64, to: NodeId, packet: Packet) -> Fate {
        if rng.random::<f64>() < self.loss_prob {
            return Fate::Lost;
        }

        let mut corruption = None;
        let mut packet = packet;
        if rng.random::<f64>() < self.corrupt_prob {
            let (damaged, how) = self.corrupt(rng, packet);
            packet = damaged;
            corruption = Some(how);
        }

        let floor = self.last_arrival.get(&to).copied().unwrap_or(now).max(now);
        let at = floor + self.jitter.min_delay + self.jitter.spread * rng.random::<f64>();
        self.last_arrival.insert(to, at);

        Fate::Arrives {
            packet,
            at,
            corruption,
        }
    }

    fn corrupt<R: Rng>(&self, rng: &mut R, packet: Packet) -> (Packet, Corruption) {
        let Packet {
            mut seqnum,
            mut acknum,
            checksum,
            mut payload,
        } = packet;
        let (payload_threshold, seqnum_threshold) = self.corruption.thresholds();
        let x = rng.random::<f64>();

        let how = if x < payload_threshold || self.seqnum_bits == 0 {
            payload[0] = CORRUPTION_SENTINEL;
            Corruption::Payload
        } else if x < seqnum_threshold {
            // May leave [0, seqnum_limit) when the limit is not a power of two.
            let bit = rng.random_range(0..self.seqnum_bits);
            seqnum ^= 1 << bit;
            Corruption::Seqnum { bit }
        } else {
            let bit = rng.random_range(0..self.seqnum_bits);
            acknum ^= 1 << bit;
            Corruption::Acknum { bit }
        };

        (Packet::from_parts(seqnum, acknum, checksum, payload), how)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rdt_lab_abstract::Message;

    fn channel(loss_prob: f64, corrupt_prob: f64, seqnum_limit: u32) -> Channel {
        Channel::new(&SimConfig {
            loss_prob,
            corrupt_prob,
            seqnum_limit,
            ..Default::default()
        })
    }

    fn packet(seqnum: u32) -> Packet {
        Packet::new(seqnum, 0, Message::pattern(seqnum as u64).data)
    }

    #[test]
    fn bits_cover_the_sequence_space() {
        assert_eq!(seqnum_bits(0), 0);
        assert_eq!(seqnum_bits(1), 0);
        assert_eq!(seqnum_bits(2), 1);
        assert_eq!(seqnum_bits(16), 4);
        assert_eq!(seqnum_bits(17), 5);
    }

    #[test]
    fn validate_rejects_out_of_range_numbers() {
        let channel = channel(0.0, 0.0, 8);
        assert_eq!(channel.validate(&packet(7)), Ok(()));
        assert_eq!(
            channel.validate(&packet(8)),
            Err(ContractViolation::SeqnumOutOfRange { seqnum: 8, limit: 8 })
        );
        assert_eq!(
            channel.validate(&Packet::new(0, 9, [0; 20])),
            Err(ContractViolation::AcknumOutOfRange { acknum: 9, limit: 8 })
        );
    }

    #[test]
    fn certain_loss_drops_everything() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut channel = channel(1.0, 0.0, 16);
        for seqnum in 0..16 {
            assert_eq!(channel.transmit(&mut rng, 0.0, NodeId::B, packet(seqnum)), Fate::Lost);
        }
    }

    #[test]
    fn clean_channel_delivers_intact_packets_within_jitter() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut channel = channel(0.0, 0.0, 16);
        let now = 40.0;
        match channel.transmit(&mut rng, now, NodeId::B, packet(4)) {
            Fate::Arrives {
                packet: arrived,
                at,
                corruption,
            } => {
                assert_eq!(arrived, packet(4));
                assert!(!arrived.is_corrupt());
                assert!(corruption.is_none());
                assert!((now + 1.0..=now + 9.0).contains(&at), "arrival {at}");
            }
            Fate::Lost => panic!("clean channel lost a packet"),
        }
    }

    #[test]
    fn arrivals_per_direction_never_go_backwards() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut channel = channel(0.0, 0.0, 16);
        let mut last = 0.0;
        for i in 0..200 {
            let Fate::Arrives { at, .. } = channel.transmit(&mut rng, i as f64 * 0.5, NodeId::A, packet(i % 16)) else {
                panic!("lost");
            };
            assert!(at >= last + 1.0, "arrival {at} after {last}");
            last = at;
        }
    }

    #[test]
    fn directions_are_independent() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut channel = channel(0.0, 0.0, 16);
        for _ in 0..10 {
            channel.transmit(&mut rng, 0.0, NodeId::B, packet(0));
        }
        let Fate::Arrives { at, .. } = channel.transmit(&mut rng, 0.0, NodeId::A, packet(0)) else {
            panic!("lost");
        };
        assert!(at <= 9.0);
    }

    #[test]
    fn corruption_is_always_detectable() {
        let mut rng = StdRng::seed_from_u64(1234);
        let mut channel = channel(0.0, 1.0, 16);
        let mut seen = [0usize; 3];
        for i in 0..400 {
            let Fate::Arrives {
                packet: arrived,
                corruption,
                ..
            } = channel.transmit(&mut rng, i as f64, NodeId::B, packet(i % 16))
            else {
                panic!("lost");
            };
            assert!(arrived.is_corrupt());
            match corruption.expect("corrupted") {
                Corruption::Payload => {
                    assert_eq!(arrived.payload[0], CORRUPTION_SENTINEL);
                    seen[0] += 1;
                }
                Corruption::Seqnum { bit } => {
                    assert!(bit < 4);
                    seen[1] += 1;
                }
                Corruption::Acknum { bit } => {
                    assert!(bit < 4);
                    seen[2] += 1;
                }
            }
        }
        assert!(seen.iter().all(|n| *n > 0), "{seen:?}");
        assert!(seen[0] > seen[1] + seen[2]);
    }

    #[test]
    fn tiny_sequence_space_only_corrupts_payload() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut channel = channel(0.0, 1.0, 1);
        for i in 0..100 {
            let Fate::Arrives { corruption, .. } = channel.transmit(&mut rng, i as f64, NodeId::A, packet(0)) else {
                panic!("lost");
            };
            assert_eq!(corruption, Some(Corruption::Payload));
        }
    }

    #[test]
    fn same_seed_same_fates() {
        let run = || {
            let mut rng = StdRng::seed_from_u64(77);
            let mut channel = channel(0.3, 0.3, 16);
            (0..100)
                .map(|i| channel.transmit(&mut rng, i as f64, NodeId::B, packet(i % 16)))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
