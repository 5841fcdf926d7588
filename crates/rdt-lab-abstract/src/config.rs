use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which built-in sender/receiver pair drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// Stop-and-wait with a one-bit sequence number.
    AlternatingBit,
    /// Sliding window of `seqnum_limit / 2` with cumulative acks.
    #[default]
    GoBackN,
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolKind::AlternatingBit => f.write_str("alternating-bit"),
            ProtocolKind::GoBackN => f.write_str("go-back-n"),
        }
    }
}

/// When the driver stops dispatching events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Stop as soon as the last message has been handed to entity A.
    Originated,
    /// Stop originating at the budget, then run until the event queue is empty.
    #[default]
    Drained,
}

impl fmt::Display for StopPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopPolicy::Originated => f.write_str("originated"),
            StopPolicy::Drained => f.write_str("drained"),
        }
    }
}

/// Relative weights of the three ways the channel can damage a packet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorruptionProfile {
    pub payload: f64,
    pub seqnum: f64,
    pub acknum: f64,
}

impl Default for CorruptionProfile {
    fn default() -> Self {
        Self {
            payload: 0.75,
            seqnum: 0.125,
            acknum: 0.125,
        }
    }
}

impl CorruptionProfile {
    /// Cumulative thresholds `(payload, payload + seqnum)` after normalizing
    /// the weights to sum to one.
    pub fn thresholds(&self) -> (f64, f64) {
        let total = self.payload + self.seqnum + self.acknum;
        let payload = self.payload / total;
        (payload, payload + self.seqnum / total)
    }
}

/// One-way delay added on top of the per-direction FIFO floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrivalJitter {
    pub min_delay: f64,
    pub spread: f64,
}

impl Default for ArrivalJitter {
    fn default() -> Self {
        Self {
            min_delay: 1.0,
            spread: 8.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub protocol: ProtocolKind,
    /// Number of application messages to originate.
    pub num_msgs: u64,
    /// Mean spacing between originated messages.
    pub interarrival_time: f64,
    /// Size of the seqnum/acknum space.
    pub seqnum_limit: u32,
    pub loss_prob: f64,
    pub corrupt_prob: f64,
    /// `None` derives a seed from the wall clock.
    pub seed: Option<u64>,
    /// Diagnostic verbosity, no effect on protocol behavior.
    pub trace: u8,
    pub stop_policy: StopPolicy,
    pub time_limit: Option<f64>,
    /// Sender base retransmit timeout; `None` keeps the protocol default.
    pub retransmit_timeout: Option<f64>,
    pub corruption: CorruptionProfile,
    pub jitter: ArrivalJitter,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolKind::default(),
            num_msgs: 10,
            interarrival_time: 100.0,
            seqnum_limit: 16,
            loss_prob: 0.0,
            corrupt_prob: 0.0,
            seed: None,
            trace: 0,
            stop_policy: StopPolicy::default(),
            time_limit: None,
            retransmit_timeout: None,
            corruption: CorruptionProfile::default(),
            jitter: ArrivalJitter::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a probability in [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },

    #[error("interarrival time must be finite and non-negative, got {0}")]
    Interarrival(f64),

    #[error("seqnum limit must be at least 2, got {0}")]
    SeqnumLimit(u32),

    #[error("corruption weights must be finite, non-negative and not all zero")]
    CorruptionProfile,

    #[error("arrival jitter must be finite and non-negative (min_delay={min_delay}, spread={spread})")]
    Jitter { min_delay: f64, spread: f64 },

    #[error("{name} must be finite and positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
}

impl SimConfig {
    /// Reject settings the simulator cannot run meaningfully.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("loss probability", self.loss_prob),
            ("corruption probability", self.corrupt_prob),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }

        if !self.interarrival_time.is_finite() || self.interarrival_time < 0.0 {
            return Err(ConfigError::Interarrival(self.interarrival_time));
        }

        if self.seqnum_limit < 2 {
            return Err(ConfigError::SeqnumLimit(self.seqnum_limit));
        }

        let weights = [
            self.corruption.payload,
            self.corruption.seqnum,
            self.corruption.acknum,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
            return Err(ConfigError::CorruptionProfile);
        }

        let ArrivalJitter { min_delay, spread } = self.jitter;
        if !min_delay.is_finite() || !spread.is_finite() || min_delay < 0.0 || spread < 0.0 {
            return Err(ConfigError::Jitter { min_delay, spread });
        }

        for (name, value) in [
            ("time limit", self.time_limit),
            ("retransmit timeout", self.retransmit_timeout),
        ] {
            if let Some(value) = value
                && (!value.is_finite() || value <= 0.0)
            {
                return Err(ConfigError::NonPositive { name, value });
            }
        }

        Ok(())
    }

    /// Largest window the go-back-N sender may keep in flight.
    pub fn window_size(&self) -> usize {
        (self.seqnum_limit as usize / 2).max(1)
    }
}
