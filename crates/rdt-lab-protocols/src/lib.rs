//! Built-in reliable-data-transfer entities.
//!
//! Both variants implement [`TransportProtocol`], so the simulator drives a
//! stop-and-wait pair and a go-back-N pair through the same code path.

pub mod alternating_bit;
pub mod go_back_n;
pub mod lookup;

#[cfg(test)]
mod testing;

use rdt_lab_abstract::{ProtocolKind, SimConfig, TransportProtocol};

pub use alternating_bit::{AltBitReceiver, AltBitSender};
pub use go_back_n::{GbnReceiver, GbnSender};
pub use lookup::protocol_by_name;

pub fn sender(kind: ProtocolKind, seqnum_limit: u32, timeout: Option<f64>) -> Box<dyn TransportProtocol> {
    match (kind, timeout) {
        (ProtocolKind::AlternatingBit, Some(t)) => Box::new(AltBitSender::new(t)),
        (ProtocolKind::AlternatingBit, None) => Box::new(AltBitSender::default()),
        (ProtocolKind::GoBackN, Some(t)) => Box::new(GbnSender::with_timeout(seqnum_limit, t)),
        (ProtocolKind::GoBackN, None) => Box::new(GbnSender::new(seqnum_limit)),
    }
}

pub fn receiver(kind: ProtocolKind, seqnum_limit: u32) -> Box<dyn TransportProtocol> {
    match kind {
        ProtocolKind::AlternatingBit => Box::new(AltBitReceiver::default()),
        ProtocolKind::GoBackN => Box::new(GbnReceiver::new(seqnum_limit)),
    }
}

/// Entity A and entity B for the protocol selected in `config`.
pub fn build_pair(config: &SimConfig) -> (Box<dyn TransportProtocol>, Box<dyn TransportProtocol>) {
    (
        sender(config.protocol, config.seqnum_limit, config.retransmit_timeout),
        receiver(config.protocol, config.seqnum_limit),
    )
}
