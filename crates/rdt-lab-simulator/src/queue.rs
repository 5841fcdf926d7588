use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rdt_lab_abstract::Packet;

use crate::engine::NodeId;

#[derive(Debug)]
pub enum EventKind {
    /// The application above entity A hands down a new message.
    MessageArrival,
    PacketArrival { packet: Packet },
    TimerExpiry,
}

#[derive(Debug)]
pub struct Event {
    pub time: f64,
    pub target: NodeId,
    pub kind: EventKind,
    seq: u64, // Insertion order, breaks ties between equal timestamps
}

// Custom Ord for Min-Heap (earliest time, then earliest insertion, pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending events ordered by virtual time, FIFO among equal timestamps.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Event>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: f64, target: NodeId, kind: EventKind) {
        self.heap.push(Event {
            time,
            target,
            kind,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop()
    }

    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove every pending timer expiry addressed to `target`.
    pub fn cancel_timer(&mut self, target: NodeId) -> usize {
        let before = self.heap.len();
        self.heap
            .retain(|e| !(e.target == target && matches!(e.kind, EventKind::TimerExpiry)));
        before - self.heap.len()
    }
}
