use crate::packet::{Message, Packet};

/// The capability the simulator hands to an entity for the duration of one
/// callback. Calls are applied by the simulator in the order they were made.
pub trait SystemContext {
    /// Hand a packet to the unreliable channel towards the peer entity.
    fn send_packet(&mut self, packet: Packet);

    /// Arm this entity's single retransmit timer `delay` time units from now.
    /// Arming an already running timer is a caller defect and is ignored.
    fn start_timer(&mut self, delay: f64);

    /// Disarm this entity's timer.
    fn stop_timer(&mut self);

    /// Deliver a message to the application layer above this entity.
    fn deliver(&mut self, message: Message);

    /// Log a message to the simulator's diagnostic output.
    fn log(&mut self, message: &str);

    /// Current virtual time.
    fn now(&self) -> f64;

    /// Record a numeric sample (e.g. a backoff factor) for the run report.
    fn record_metric(&mut self, _name: &str, _value: f64) {}
}

/// A protocol entity driven by the simulator.
pub trait TransportProtocol {
    /// Called once before the first event is dispatched.
    fn init(&mut self, _ctx: &mut dyn SystemContext) {}

    /// Called when a packet arrives from the channel.
    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet);

    /// Called when this entity's timer expires.
    fn on_timer(&mut self, ctx: &mut dyn SystemContext);

    /// Called when the application layer hands down a message to transfer.
    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, message: Message);

    /// Number of packets sent but not yet acknowledged.
    fn outstanding(&self) -> usize {
        0
    }
}
