use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use rdt_lab_abstract::{Message, SimConfig};

use crate::channel::Corruption;
use crate::engine::NodeId;

/// Run counters. Only the simulator writes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub messages_originated: u64,
    pub sent_by_a: u64,
    pub sent_by_b: u64,
    pub lost: u64,
    pub corrupted: u64,
    pub delivered_by_a: u64,
    pub delivered_by_b: u64,
    pub contract_violations: u64,
}

impl Stats {
    pub fn sent_by(&self, node: NodeId) -> u64 {
        match node {
            NodeId::A => self.sent_by_a,
            NodeId::B => self.sent_by_b,
        }
    }

    pub fn delivered_by(&self, node: NodeId) -> u64 {
        match node {
            NodeId::A => self.delivered_by_a,
            NodeId::B => self.delivered_by_b,
        }
    }

    pub(crate) fn record_sent(&mut self, node: NodeId) {
        match node {
            NodeId::A => self.sent_by_a += 1,
            NodeId::B => self.sent_by_b += 1,
        }
    }

    pub(crate) fn record_delivered(&mut self, node: NodeId) {
        match node {
            NodeId::A => self.delivered_by_a += 1,
            NodeId::B => self.delivered_by_b += 1,
        }
    }
}

/// A message handed up to the application at `node`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub time: f64,
    pub node: NodeId,
    pub message: Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkEventKind {
    Scheduled { arrival: f64 },
    Corrupted { arrival: f64, corruption: Corruption },
    Lost,
    /// Dropped by a deterministic fault registered on the simulator.
    ForcedDrop,
}

/// One transmission attempt, as seen by the channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkEvent {
    pub time: f64,
    pub from: NodeId,
    pub seqnum: u32,
    pub acknum: u32,
    #[serde(flatten)]
    pub kind: LinkEventKind,
}

impl fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.3}] {}->{} seq={} ack={} ",
            self.time,
            self.from,
            self.from.peer(),
            self.seqnum,
            self.acknum
        )?;
        match self.kind {
            LinkEventKind::Scheduled { arrival } => write!(f, "SEND (arrives {arrival:.3})"),
            LinkEventKind::Corrupted { arrival, corruption } => {
                write!(f, "CORRUPT {corruption:?} (arrives {arrival:.3})")
            }
            LinkEventKind::Lost => f.write_str("DROP (random loss)"),
            LinkEventKind::ForcedDrop => f.write_str("DROP (deterministic)"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    /// Seed actually used, even when the configuration left it to the clock.
    pub seed: u64,
    pub elapsed: f64,
    pub stats: Stats,
    /// Most packets entity A ever had unacknowledged at once.
    pub peak_outstanding: usize,
    pub deliveries: Vec<Delivery>,
    pub metrics: HashMap<String, Vec<(f64, f64)>>,
    pub link_events: Vec<LinkEvent>,
}

impl SimulationReport {
    /// Messages delivered at B per unit of virtual time.
    pub fn throughput(&self) -> f64 {
        if self.elapsed > 0.0 {
            self.stats.delivered_by_b as f64 / self.elapsed
        } else {
            0.0
        }
    }

    pub fn delivered_at(&self, node: NodeId) -> impl Iterator<Item = &Message> + '_ {
        self.deliveries
            .iter()
            .filter(move |d| d.node == node)
            .map(|d| &d.message)
    }

    /// True when B received messages `0..n` exactly once each, in order.
    pub fn delivered_in_order(&self) -> bool {
        self.delivered_at(NodeId::B)
            .enumerate()
            .all(|(i, m)| *m == Message::pattern(i as u64))
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "SIMULATION SUMMARY")?;
        writeln!(f, "--------------------------------")?;
        writeln!(f, "# layer 5 messages provided to A: {}", s.messages_originated)?;
        writeln!(f, "# elapsed time units: {}", self.elapsed)?;
        writeln!(f)?;
        for node in [NodeId::A, NodeId::B] {
            writeln!(f, "# layer 3 packets sent by {node}: {}", s.sent_by(node))?;
        }
        writeln!(f, "# layer 3 packets lost: {}", s.lost)?;
        writeln!(f, "# layer 3 packets corrupted: {}", s.corrupted)?;
        for node in [NodeId::A, NodeId::B] {
            writeln!(f, "# layer 5 messages delivered by {node}: {}", s.delivered_by(node))?;
        }
        writeln!(f, "# layer 5 messages by B / elapsed time: {}", self.throughput())?;
        if s.contract_violations > 0 {
            writeln!(f, "# ignored entity calls: {}", s.contract_violations)?;
        }
        write!(f, "--------------------------------")
    }
}

/// Configuration banner printed before a run.
pub struct ConfigEcho<'a> {
    pub config: &'a SimConfig,
    pub seed: u64,
}

impl fmt::Display for ConfigEcho<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.config;
        writeln!(f, "SIMULATION CONFIGURATION")?;
        writeln!(f, "--------------------------------------")?;
        writeln!(f, "(-p) protocol: {}", c.protocol)?;
        writeln!(f, "(-n) # layer 5 msgs to be provided: {}", c.num_msgs)?;
        writeln!(f, "(-d) avg layer 5 msg interarrival time: {}", c.interarrival_time)?;
        writeln!(f, "(-z) transport protocol seqnum limit: {}", c.seqnum_limit)?;
        writeln!(f, "(-l) layer 3 packet loss prob: {}", c.loss_prob)?;
        writeln!(f, "(-c) layer 3 packet corruption prob: {}", c.corrupt_prob)?;
        writeln!(f, "(-s) simulation random seed: {}", self.seed)?;
        writeln!(f, "(-v) trace level: {}", c.trace)?;
        write!(f, "--------------------------------------")
    }
}
