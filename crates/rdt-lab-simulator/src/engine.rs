use crate::channel::{Channel, Fate};
use crate::error::ContractViolation;
use crate::queue::{EventKind, EventQueue};
use crate::trace::{ConfigEcho, Delivery, LinkEvent, LinkEventKind, SimulationReport, Stats};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rdt_lab_abstract::{Message, Packet, SimConfig, StopPolicy};
use rdt_lab_abstract::{SystemContext, TransportProtocol};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeId {
    /// The sending entity; application messages originate here.
    A,
    /// The receiving entity.
    B,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            NodeId::A => NodeId::B,
            NodeId::B => NodeId::A,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::A => f.write_str("A"),
            NodeId::B => f.write_str("B"),
        }
    }
}

/// One call an entity made on its context.
enum Action {
    Send(Packet),
    Deliver(Message),
    StartTimer(f64),
    StopTimer,
    Log(String),
    Metric(String, f64),
}

/// Actions buffered during an entity callback, kept in call order.
#[derive(Default)]
struct ActionBuffer {
    actions: Vec<Action>,
}

/// Context handed to an entity for the duration of one callback
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    now: f64,
}

impl SystemContext for ScopedContext<'_> {
    fn send_packet(&mut self, packet: Packet) {
        self.buffer.actions.push(Action::Send(packet));
    }

    fn start_timer(&mut self, delay: f64) {
        self.buffer.actions.push(Action::StartTimer(delay));
    }

    fn stop_timer(&mut self) {
        self.buffer.actions.push(Action::StopTimer);
    }

    fn deliver(&mut self, message: Message) {
        self.buffer.actions.push(Action::Deliver(message));
    }

    fn log(&mut self, message: &str) {
        self.buffer.actions.push(Action::Log(message.to_string()));
    }

    fn now(&self) -> f64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.buffer.actions.push(Action::Metric(name.to_string(), value));
    }
}

/// Which entity callback an event turns into.
enum Callback {
    Init,
    Packet(Packet),
    Timer,
    AppData(Message),
}

pub type DeliveryCallback = Box<dyn FnMut(&Message)>;

pub struct Simulator {
    time: f64,
    queue: EventQueue,

    config: SimConfig,
    seed: u64,
    rng: StdRng,
    channel: Channel,

    pub entity_a: Box<dyn TransportProtocol>,
    pub entity_b: Box<dyn TransportProtocol>,

    stats: Stats,
    peak_outstanding: usize,
    deliveries: Vec<Delivery>,
    /// Samples recorded via `SystemContext::record_metric`, keyed by name.
    metrics: HashMap<String, Vec<(f64, f64)>>,
    link_events: Vec<LinkEvent>,
    callbacks: HashMap<NodeId, DeliveryCallback>,

    // Deterministic fault injection: drop the first packet from A with a given seqnum
    drop_sender_seq_once: Vec<u32>,
    // and the first packet from B with a given acknum.
    drop_receiver_ack_once: Vec<u32>,

    /// Expiry time of each entity's armed timer.
    armed_timers: HashMap<NodeId, f64>,
    initialized: bool,
    halted: bool,
}

impl Simulator {
    pub fn new(config: SimConfig, entity_a: Box<dyn TransportProtocol>, entity_b: Box<dyn TransportProtocol>) -> Self {
        let seed = config.seed.unwrap_or_else(wall_clock_seed);
        let channel = Channel::new(&config);

        Self {
            time: 0.0,
            queue: EventQueue::new(),
            config,
            seed,
            rng: StdRng::seed_from_u64(seed),
            channel,
            entity_a,
            entity_b,
            stats: Stats::default(),
            peak_outstanding: 0,
            deliveries: Vec::new(),
            metrics: HashMap::new(),
            link_events: Vec::new(),
            callbacks: HashMap::new(),
            drop_sender_seq_once: Vec::new(),
            drop_receiver_ack_once: Vec::new(),
            armed_timers: HashMap::new(),
            initialized: false,
            halted: false,
        }
    }

    /// Simulator driving the built-in pair selected by `config.protocol`.
    pub fn with_protocol(config: SimConfig) -> Self {
        let (entity_a, entity_b) = rdt_lab_protocols::build_pair(&config);
        Self::new(config, entity_a, entity_b)
    }

    /// Observe every message `node` hands to its application layer.
    pub fn on_delivery(&mut self, node: NodeId, callback: impl FnMut(&Message) + 'static) {
        self.callbacks.insert(node, Box::new(callback));
    }

    /// Register a deterministic fault: drop the first packet sent by A whose seqnum equals `seq`.
    pub fn add_drop_sender_seq_once(&mut self, seq: u32) {
        self.drop_sender_seq_once.push(seq);
    }

    /// Register a deterministic fault: drop the first packet sent by B whose acknum equals `ack`.
    pub fn add_drop_receiver_ack_once(&mut self, ack: u32) {
        self.drop_receiver_ack_once.push(ack);
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Seed actually driving the run.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config_echo(&self) -> ConfigEcho<'_> {
        ConfigEcho {
            config: &self.config,
            seed: self.seed,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// True if the run stopped at the configured time limit with events pending.
    pub fn timed_out(&self) -> bool {
        self.halted
    }

    pub fn remaining_events(&self) -> usize {
        self.queue.len()
    }

    /// Run both entities' `init` hooks and schedule the first message.
    /// Idempotent; `step` and `run` call it on demand.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        self.dispatch(NodeId::A, Callback::Init);
        self.dispatch(NodeId::B, Callback::Init);

        if self.config.num_msgs > 0 {
            self.schedule_next_message();
        }
    }

    /// True once the configured stop policy says no further event matters.
    /// Always false before `init`.
    pub fn finished(&self) -> bool {
        if !self.initialized {
            return false;
        }
        if self.halted {
            return true;
        }
        let all_originated = self.stats.messages_originated >= self.config.num_msgs;
        match self.config.stop_policy {
            StopPolicy::Originated => all_originated,
            // Retransmissions over a channel that never delivers would keep the
            // queue busy forever.
            StopPolicy::Drained => self.queue.is_empty() || (all_originated && self.channel_is_dead()),
        }
    }

    /// True if no packet can ever arrive intact.
    fn channel_is_dead(&self) -> bool {
        self.config.loss_prob >= 1.0 || self.config.corrupt_prob >= 1.0
    }

    /// Process the next event. Returns true if an event was processed, false if
    /// the queue is empty or the time limit was reached.
    pub fn step(&mut self) -> bool {
        self.init();
        if self.halted {
            return false;
        }

        if let Some(limit) = self.config.time_limit
            && let Some(next) = self.queue.peek_time()
            && next > limit
        {
            warn!(
                limit,
                pending = self.queue.len(),
                "time limit reached before the event queue drained"
            );
            self.halted = true;
            return false;
        }

        let Some(event) = self.queue.pop() else {
            return false;
        };

        self.time = event.time;
        debug!("Processing event at {:.3}: {:?} -> {}", self.time, event.kind, event.target);

        match event.kind {
            EventKind::MessageArrival => self.originate(),
            EventKind::PacketArrival { packet } => self.dispatch(event.target, Callback::Packet(packet)),
            EventKind::TimerExpiry => {
                self.armed_timers.remove(&event.target);
                self.dispatch(event.target, Callback::Timer);
            }
        }

        self.peak_outstanding = self.peak_outstanding.max(self.entity_a.outstanding());
        true
    }

    /// Drive the run to completion under the configured stop policy.
    pub fn run(&mut self) -> SimulationReport {
        self.init();
        info!(
            seed = self.seed,
            protocol = %self.config.protocol,
            "===== SIMULATION BEGINS"
        );
        while !self.finished() && self.step() {}
        info!(elapsed = self.time, "===== SIMULATION ENDS");
        self.export_report()
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            seed: self.seed,
            elapsed: self.time,
            stats: self.stats.clone(),
            peak_outstanding: self.peak_outstanding,
            deliveries: self.deliveries.clone(),
            metrics: self.metrics.clone(),
            link_events: self.link_events.clone(),
        }
    }

    fn schedule_next_message(&mut self) {
        let gap = self.config.interarrival_time * 2.0 * self.rng.random::<f64>();
        self.queue.push(self.time + gap, NodeId::A, EventKind::MessageArrival);
    }

    fn originate(&mut self) {
        let index = self.stats.messages_originated;
        self.stats.messages_originated += 1;
        if self.stats.messages_originated < self.config.num_msgs {
            self.schedule_next_message();
        }

        let message = Message::pattern(index);
        trace!("GENERATE NEXT ARRIVAL: data given to A: {message}");
        self.dispatch(NodeId::A, Callback::AppData(message));
    }

    fn dispatch(&mut self, node: NodeId, callback: Callback) {
        let mut buffer = ActionBuffer::default();
        {
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                now: self.time,
            };
            let entity = match node {
                NodeId::A => &mut self.entity_a,
                NodeId::B => &mut self.entity_b,
            };
            match callback {
                Callback::Init => entity.init(&mut ctx),
                Callback::Packet(packet) => entity.on_packet(&mut ctx, packet),
                Callback::Timer => entity.on_timer(&mut ctx),
                Callback::AppData(message) => entity.on_app_data(&mut ctx, message),
            }
        }
        self.process_actions(node, buffer);
    }

    fn process_actions(&mut self, node: NodeId, buffer: ActionBuffer) {
        for action in buffer.actions {
            let outcome = match action {
                Action::Send(packet) => self.transmit(node, packet),
                Action::Deliver(message) => {
                    self.deliver(node, message);
                    Ok(())
                }
                Action::StartTimer(delay) => self.start_timer(node, delay),
                Action::StopTimer => self.stop_timer(node),
                Action::Log(line) => {
                    info!("[{}] {}", node, line);
                    Ok(())
                }
                Action::Metric(name, value) => {
                    self.metrics.entry(name).or_default().push((self.time, value));
                    Ok(())
                }
            };

            if let Err(violation) = outcome {
                self.stats.contract_violations += 1;
                warn!(entity = %node, time = self.time, "{violation}; call ignored");
            }
        }
    }

    fn transmit(&mut self, from: NodeId, packet: Packet) -> Result<(), ContractViolation> {
        self.channel.validate(&packet)?;
        self.stats.record_sent(from);

        let (seqnum, acknum) = (packet.seqnum, packet.acknum);
        let to = from.peer();

        let kind = if self.take_forced_drop(from, &packet) {
            self.stats.lost += 1;
            debug!("[{from}->{to}] deterministically dropping seq={seqnum} ack={acknum}");
            LinkEventKind::ForcedDrop
        } else {
            match self.channel.transmit(&mut self.rng, self.time, to, packet) {
                Fate::Lost => {
                    self.stats.lost += 1;
                    debug!("TO_LAYER3: packet being lost");
                    LinkEventKind::Lost
                }
                Fate::Arrives {
                    packet,
                    at,
                    corruption,
                } => {
                    self.queue.push(at, to, EventKind::PacketArrival { packet });
                    match corruption {
                        Some(corruption) => {
                            self.stats.corrupted += 1;
                            debug!("TO_LAYER3: packet being corrupted ({corruption:?})");
                            LinkEventKind::Corrupted { arrival: at, corruption }
                        }
                        None => LinkEventKind::Scheduled { arrival: at },
                    }
                }
            }
        };

        let event = LinkEvent {
            time: self.time,
            from,
            seqnum,
            acknum,
            kind,
        };
        trace!("{event}");
        self.link_events.push(event);
        Ok(())
    }

    /// Consume a registered drop matching `packet`, if any.
    fn take_forced_drop(&mut self, from: NodeId, packet: &Packet) -> bool {
        let (pending, key) = match from {
            NodeId::A => (&mut self.drop_sender_seq_once, packet.seqnum),
            NodeId::B => (&mut self.drop_receiver_ack_once, packet.acknum),
        };
        match pending.iter().position(|k| *k == key) {
            Some(pos) => {
                pending.remove(pos);
                true
            }
            None => false,
        }
    }

    fn deliver(&mut self, node: NodeId, message: Message) {
        self.stats.record_delivered(node);
        trace!("TO_LAYER5: data received at {node}: {message}");
        if let Some(callback) = self.callbacks.get_mut(&node) {
            callback(&message);
        }
        self.deliveries.push(Delivery {
            time: self.time,
            node,
            message,
        });
    }

    fn start_timer(&mut self, node: NodeId, delay: f64) -> Result<(), ContractViolation> {
        if !delay.is_finite() || delay < 0.0 {
            return Err(ContractViolation::InvalidDelay(delay));
        }
        if self.armed_timers.contains_key(&node) {
            return Err(ContractViolation::TimerAlreadyRunning);
        }
        let expiry = self.time + delay;
        trace!("START TIMER at {}: fires at {expiry:.3}", node);
        self.armed_timers.insert(node, expiry);
        self.queue.push(expiry, node, EventKind::TimerExpiry);
        Ok(())
    }

    fn stop_timer(&mut self, node: NodeId) -> Result<(), ContractViolation> {
        if self.armed_timers.remove(&node).is_none() {
            return Err(ContractViolation::TimerNotRunning);
        }
        self.queue.cancel_timer(node);
        trace!("STOP TIMER at {}", node);
        Ok(())
    }
}

fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
