//! Go-Back-N sender and receiver.
//!
//! A single timer covers the whole window and is timed from the oldest
//! unacknowledged packet. Acks are cumulative: an ack for seqnum `k` retires
//! every outstanding packet up to and including `k`. On timeout the whole
//! outstanding window is resent in order.

use std::collections::VecDeque;
use rdt_lab_abstract::{Message, Packet, SystemContext, TransportProtocol};

/// Default base timeout for a window of `window_size` packets.
pub fn default_timeout(window_size: usize) -> f64 {
    10.0 + 4.0 * window_size as f64
}

pub struct GbnSender {
    seqnum_limit: u32,
    window_size: usize,
    timeout: f64,
    /// Seqnum of the oldest unacknowledged packet.
    base: u32,
    outstanding: VecDeque<Packet>,
    pending: VecDeque<Message>,
    made_progress: bool,
    no_progress: u32,
}

impl GbnSender {
    pub fn new(seqnum_limit: u32) -> Self {
        let window_size = (seqnum_limit as usize / 2).max(1);
        Self::with_timeout(seqnum_limit, default_timeout(window_size))
    }

    pub fn with_timeout(seqnum_limit: u32, timeout: f64) -> Self {
        Self {
            seqnum_limit: seqnum_limit.max(1),
            window_size: (seqnum_limit as usize / 2).max(1),
            timeout,
            base: 0,
            outstanding: VecDeque::new(),
            pending: VecDeque::new(),
            made_progress: true,
            no_progress: 0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    fn next_seqnum(&self) -> u32 {
        ((self.base as u64 + self.outstanding.len() as u64) % self.seqnum_limit as u64) as u32
    }

    fn admit_pending(&mut self, ctx: &mut dyn SystemContext) {
        while self.outstanding.len() < self.window_size {
            let Some(message) = self.pending.pop_front() else {
                break;
            };
            let packet = Packet::new(self.next_seqnum(), 0, message.data);
            ctx.log(&format!(
                "GBN send seq={} (base {}, {} in flight)",
                packet.seqnum,
                self.base,
                self.outstanding.len() + 1
            ));
            ctx.send_packet(packet.clone());
            self.outstanding.push_back(packet);
            if self.outstanding.len() == 1 {
                ctx.start_timer(self.timeout);
            }
        }
    }
}

impl TransportProtocol for GbnSender {
    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        if packet.is_corrupt() {
            ctx.log("GBN discard corrupt ack");
            return;
        }
        let Some(index) = self
            .outstanding
            .iter()
            .position(|p| p.seqnum == packet.acknum)
        else {
            ctx.log(&format!("GBN stale ack {} (base {})", packet.acknum, self.base));
            return;
        };

        let acked = index + 1;
        self.outstanding.drain(..acked);
        self.base = ((self.base as u64 + acked as u64) % self.seqnum_limit as u64) as u32;
        if self.no_progress > 0 && !self.made_progress {
            ctx.log(&format!("GBN base {} made progress after {} timeouts", self.base, self.no_progress));
        }
        self.made_progress = true;
        self.no_progress = 0;

        ctx.stop_timer();
        if !self.outstanding.is_empty() {
            ctx.start_timer(self.timeout);
        }
        self.admit_pending(ctx);
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext) {
        if self.outstanding.is_empty() {
            ctx.log("GBN timer fired with nothing outstanding; ignored");
            return;
        }
        if !self.made_progress {
            self.no_progress += 1;
            ctx.log(&format!("GBN base {} no progress for {} timeouts", self.base, self.no_progress));
        }
        self.made_progress = false;

        ctx.log(&format!("GBN timeout, resending {} packets from base {}", self.outstanding.len(), self.base));
        for packet in &self.outstanding {
            ctx.send_packet(packet.clone());
        }
        let backoff = (self.no_progress + 1) as f64;
        ctx.record_metric("gbn_backoff", backoff);
        ctx.start_timer(self.timeout * backoff);
    }

    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, message: Message) {
        self.pending.push_back(message);
        self.admit_pending(ctx);
    }

    fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}

pub struct GbnReceiver {
    seqnum_limit: u32,
    expected_seqnum: u32,
    last_acked: u32,
}

impl GbnReceiver {
    pub fn new(seqnum_limit: u32) -> Self {
        let seqnum_limit = seqnum_limit.max(1);
        Self {
            seqnum_limit,
            expected_seqnum: 0,
            // Nothing acknowledged yet.
            last_acked: seqnum_limit - 1,
        }
    }
}

impl TransportProtocol for GbnReceiver {
    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        if packet.is_corrupt() || packet.seqnum != self.expected_seqnum {
            ctx.log(&format!(
                "GBN unexpected seq {} (expect {}), re-ACK {}",
                packet.seqnum, self.expected_seqnum, self.last_acked
            ));
            ctx.send_packet(Packet::new(0, self.last_acked, packet.payload));
            return;
        }
        ctx.log(&format!("GBN received seq {}", packet.seqnum));
        ctx.deliver(Message::new(packet.payload));
        ctx.send_packet(Packet::new(0, self.expected_seqnum, packet.payload));
        self.last_acked = self.expected_seqnum;
        self.expected_seqnum = (self.expected_seqnum + 1) % self.seqnum_limit;
    }

    fn on_timer(&mut self, _ctx: &mut dyn SystemContext) {}

    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, _message: Message) {
        ctx.log("GBN receiver does not originate data; message ignored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recorded, RecordingContext};

    fn ack(acknum: u32) -> Packet {
        Packet::new(0, acknum, Message::pattern(0).data)
    }

    fn seqnums(calls: &[Recorded]) -> Vec<u32> {
        RecordingContext::sent(calls).iter().map(|p| p.seqnum).collect()
    }

    fn timers(calls: &[Recorded]) -> Vec<f64> {
        calls
            .iter()
            .filter_map(|c| match c {
                Recorded::TimerStarted(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn window_is_half_the_sequence_space() {
        assert_eq!(GbnSender::new(16).window_size(), 8);
        assert_eq!(GbnSender::new(2).window_size(), 1);
        assert_eq!(GbnSender::new(3).window_size(), 1);
    }

    #[test]
    fn fills_window_then_queues() {
        let mut ctx = RecordingContext::default();
        let mut sender = GbnSender::new(8);

        for i in 0..6 {
            sender.on_app_data(&mut ctx, Message::pattern(i));
        }

        let calls = ctx.take();
        assert_eq!(seqnums(&calls), vec![0, 1, 2, 3]);
        // Only the first outstanding packet arms the timer.
        assert_eq!(timers(&calls), vec![default_timeout(4)]);
        assert_eq!(sender.outstanding(), 4);
    }

    #[test]
    fn cumulative_ack_slides_window_and_admits_queue() {
        let mut ctx = RecordingContext::default();
        let mut sender = GbnSender::new(8);
        for i in 0..6 {
            sender.on_app_data(&mut ctx, Message::pattern(i));
        }
        ctx.take();

        sender.on_packet(&mut ctx, ack(1));

        let calls = ctx.take();
        assert_eq!(calls[0], Recorded::TimerStopped);
        assert_eq!(calls[1], Recorded::TimerStarted(default_timeout(4)));
        assert_eq!(seqnums(&calls), vec![4, 5]);
        assert_eq!(sender.outstanding(), 4);
    }

    #[test]
    fn full_ack_stops_timer_without_rearming() {
        let mut ctx = RecordingContext::default();
        let mut sender = GbnSender::new(8);
        sender.on_app_data(&mut ctx, Message::pattern(0));
        sender.on_app_data(&mut ctx, Message::pattern(1));
        ctx.take();

        sender.on_packet(&mut ctx, ack(1));

        assert_eq!(ctx.take(), vec![Recorded::TimerStopped]);
        assert_eq!(sender.outstanding(), 0);
    }

    #[test]
    fn stale_and_corrupt_acks_are_ignored() {
        let mut ctx = RecordingContext::default();
        let mut sender = GbnSender::new(8);
        sender.on_app_data(&mut ctx, Message::pattern(0));
        ctx.take();

        sender.on_packet(&mut ctx, ack(7));
        let good = ack(0);
        sender.on_packet(&mut ctx, Packet::from_parts(good.seqnum, good.acknum, !good.checksum, good.payload));

        assert!(ctx.take().is_empty());
        assert_eq!(sender.outstanding(), 1);
    }

    #[test]
    fn timeout_resends_whole_window_in_order() {
        let mut ctx = RecordingContext::default();
        let mut sender = GbnSender::new(16);
        for i in 0..5 {
            sender.on_app_data(&mut ctx, Message::pattern(i));
        }
        sender.on_packet(&mut ctx, ack(1));
        ctx.take();

        sender.on_timer(&mut ctx);

        let calls = ctx.take();
        assert_eq!(seqnums(&calls), vec![2, 3, 4]);
        let resent = RecordingContext::sent(&calls);
        assert_eq!(resent[0].payload, Message::pattern(2).data);
        assert_eq!(timers(&calls), vec![default_timeout(8)]);
    }

    #[test]
    fn consecutive_fruitless_timeouts_back_off() {
        let mut ctx = RecordingContext::default();
        let mut sender = GbnSender::with_timeout(16, 10.0);
        sender.on_app_data(&mut ctx, Message::pattern(0));
        ctx.take();

        sender.on_timer(&mut ctx);
        assert_eq!(timers(&ctx.take()), vec![10.0]);
        sender.on_timer(&mut ctx);
        assert_eq!(timers(&ctx.take()), vec![20.0]);
        sender.on_timer(&mut ctx);
        assert_eq!(timers(&ctx.take()), vec![30.0]);

        sender.on_app_data(&mut ctx, Message::pattern(1));
        sender.on_packet(&mut ctx, ack(0));
        ctx.take();
        sender.on_timer(&mut ctx);
        assert_eq!(timers(&ctx.take()), vec![10.0]);
        assert_eq!(ctx.metrics.last(), Some(&("gbn_backoff".to_string(), 1.0)));
    }

    #[test]
    fn timer_with_empty_window_does_nothing() {
        let mut ctx = RecordingContext::default();
        let mut sender = GbnSender::new(16);

        sender.on_timer(&mut ctx);

        assert!(ctx.take().is_empty());
    }

    #[test]
    fn sequence_numbers_wrap() {
        let mut ctx = RecordingContext::default();
        let mut sender = GbnSender::new(4);
        for i in 0..2 {
            sender.on_app_data(&mut ctx, Message::pattern(i));
        }
        sender.on_packet(&mut ctx, ack(1));
        for i in 2..4 {
            sender.on_app_data(&mut ctx, Message::pattern(i));
        }
        sender.on_packet(&mut ctx, ack(3));
        ctx.take();

        sender.on_app_data(&mut ctx, Message::pattern(4));
        assert_eq!(seqnums(&ctx.take()), vec![0]);
    }

    #[test]
    fn receiver_first_nack_reports_nothing_acked() {
        let mut ctx = RecordingContext::default();
        let mut receiver = GbnReceiver::new(16);

        receiver.on_packet(&mut ctx, Packet::new(3, 0, Message::pattern(3).data));

        let calls = ctx.take();
        assert_eq!(calls.len(), 1);
        assert_eq!(RecordingContext::sent(&calls)[0].acknum, 15);
    }

    #[test]
    fn receiver_delivers_in_order_only_once() {
        let mut ctx = RecordingContext::default();
        let mut receiver = GbnReceiver::new(16);

        receiver.on_packet(&mut ctx, Packet::new(0, 0, Message::pattern(0).data));
        receiver.on_packet(&mut ctx, Packet::new(2, 0, Message::pattern(2).data));
        receiver.on_packet(&mut ctx, Packet::new(0, 0, Message::pattern(0).data));
        receiver.on_packet(&mut ctx, Packet::new(1, 0, Message::pattern(1).data));

        let calls = ctx.take();
        let delivered: Vec<Message> = calls
            .iter()
            .filter_map(|c| match c {
                Recorded::Delivered(m) => Some(*m),
                _ => None,
            })
            .collect();
        assert_eq!(delivered, vec![Message::pattern(0), Message::pattern(1)]);
        let acks: Vec<u32> = RecordingContext::sent(&calls).iter().map(|p| p.acknum).collect();
        assert_eq!(acks, vec![0, 0, 0, 1]);
    }
}
