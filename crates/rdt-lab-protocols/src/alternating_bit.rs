use std::collections::VecDeque;
use rdt_lab_abstract::{Message, Packet, SystemContext, TransportProtocol};

/// Longer than the channel's worst-case round trip (two legs of `1 + 8·U`),
/// so a clean channel never triggers a retransmission.
pub const WAIT_TIME: f64 = 20.0;

enum SenderState {
    Idle,
    AwaitingAck { sent: Packet },
}

/// Stop-and-wait sender: one packet in flight, tagged with an alternating bit.
pub struct AltBitSender {
    bit: u32,
    state: SenderState,
    pending: VecDeque<Message>,
    timeout: f64,
}

impl Default for AltBitSender {
    fn default() -> Self {
        Self::new(WAIT_TIME)
    }
}

impl AltBitSender {
    pub fn new(timeout: f64) -> Self {
        Self {
            bit: 0,
            state: SenderState::Idle,
            pending: VecDeque::new(),
            timeout,
        }
    }

    fn try_send(&mut self, ctx: &mut dyn SystemContext) {
        if !matches!(self.state, SenderState::Idle) {
            return;
        }
        if let Some(message) = self.pending.pop_front() {
            let packet = Packet::new(self.bit, 0, message.data);
            ctx.log(&format!("ABP send seq={} ({} queued)", self.bit, self.pending.len()));
            ctx.send_packet(packet.clone());
            ctx.start_timer(self.timeout);
            self.state = SenderState::AwaitingAck { sent: packet };
        }
    }
}

impl TransportProtocol for AltBitSender {
    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        if matches!(self.state, SenderState::Idle) {
            return;
        }
        if packet.is_corrupt() || packet.acknum != self.bit {
            ctx.log(&format!(
                "ABP discard ack={} (expecting {}, corrupt={})",
                packet.acknum,
                self.bit,
                packet.is_corrupt()
            ));
            return;
        }
        ctx.log(&format!("ABP received ACK for seq {}", self.bit));
        ctx.stop_timer();
        self.bit = 1 - self.bit;
        self.state = SenderState::Idle;
        self.try_send(ctx);
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext) {
        match &self.state {
            SenderState::AwaitingAck { sent } => {
                ctx.log(&format!("ABP timeout, retransmitting seq {}", sent.seqnum));
                ctx.send_packet(sent.clone());
                ctx.start_timer(self.timeout);
            }
            SenderState::Idle => ctx.log("ABP ignoring unexpected timeout"),
        }
    }

    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, message: Message) {
        self.pending.push_back(message);
        self.try_send(ctx);
    }

    fn outstanding(&self) -> usize {
        match self.state {
            SenderState::Idle => 0,
            SenderState::AwaitingAck { .. } => 1,
        }
    }
}

#[derive(Default)]
pub struct AltBitReceiver {
    expecting_bit: u32,
}

impl AltBitReceiver {
    fn send_ack(&self, ctx: &mut dyn SystemContext, acknum: u32, received: &Packet) {
        ctx.send_packet(Packet::new(0, acknum, received.payload));
    }
}

impl TransportProtocol for AltBitReceiver {
    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        if packet.is_corrupt() || packet.seqnum != self.expecting_bit {
            ctx.log(&format!(
                "ABP unexpected seq {} (expect {}), re-ACK {}",
                packet.seqnum,
                self.expecting_bit,
                1 - self.expecting_bit
            ));
            self.send_ack(ctx, 1 - self.expecting_bit, &packet);
            return;
        }
        ctx.log(&format!("ABP received seq {}", packet.seqnum));
        ctx.deliver(Message::new(packet.payload));
        self.send_ack(ctx, self.expecting_bit, &packet);
        self.expecting_bit = 1 - self.expecting_bit;
    }

    fn on_timer(&mut self, _ctx: &mut dyn SystemContext) {}

    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, _message: Message) {
        ctx.log("ABP receiver does not originate data; message ignored");
    }
}
