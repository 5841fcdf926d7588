use rdt_lab_abstract::{Message, Packet, SystemContext};

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Sent(Packet),
    Delivered(Message),
    TimerStarted(f64),
    TimerStopped,
}

/// Context that records every call instead of acting on it.
#[derive(Default)]
pub struct RecordingContext {
    pub now: f64,
    pub calls: Vec<Recorded>,
    pub logs: Vec<String>,
    pub metrics: Vec<(String, f64)>,
}

impl RecordingContext {
    pub fn take(&mut self) -> Vec<Recorded> {
        std::mem::take(&mut self.calls)
    }

    pub fn sent(calls: &[Recorded]) -> Vec<&Packet> {
        calls
            .iter()
            .filter_map(|c| match c {
                Recorded::Sent(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

impl SystemContext for RecordingContext {
    fn send_packet(&mut self, packet: Packet) {
        self.calls.push(Recorded::Sent(packet));
    }

    fn start_timer(&mut self, delay: f64) {
        self.calls.push(Recorded::TimerStarted(delay));
    }

    fn stop_timer(&mut self) {
        self.calls.push(Recorded::TimerStopped);
    }

    fn deliver(&mut self, message: Message) {
        self.calls.push(Recorded::Delivered(message));
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn now(&self) -> f64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.metrics.push((name.to_string(), value));
    }
}
