use crate::config::{ProtocolKind, SimConfig, StopPolicy};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub protocol: Option<ProtocolKind>,
    pub num_msgs: Option<u64>,
    pub interarrival_time: Option<f64>,
    pub seqnum_limit: Option<u32>,
    pub loss_prob: Option<f64>,
    pub corrupt_prob: Option<f64>,
    pub seed: Option<u64>,
    pub stop_policy: Option<StopPolicy>,
    pub time_limit: Option<f64>,
    pub retransmit_timeout: Option<f64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.protocol {
            config.protocol = v;
        }
        if let Some(v) = self.num_msgs {
            config.num_msgs = v;
        }
        if let Some(v) = self.interarrival_time {
            config.interarrival_time = v;
        }
        if let Some(v) = self.seqnum_limit {
            config.seqnum_limit = v;
        }
        if let Some(v) = self.loss_prob {
            config.loss_prob = v;
        }
        if let Some(v) = self.corrupt_prob {
            config.corrupt_prob = v;
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }
        if let Some(v) = self.stop_policy {
            config.stop_policy = v;
        }
        if let Some(v) = self.time_limit {
            config.time_limit = Some(v);
        }
        if let Some(v) = self.retransmit_timeout {
            config.retransmit_timeout = Some(v);
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Deterministically drop the first packet sent by A with given seq number
    DropNextFromSenderSeq { seq: u32 },
    /// Deterministically drop the first ACK sent by B with given ack number
    DropNextFromReceiverAck { ack: u32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Number of messages delivered at B is within range
    DeliveredCount { min: u64, max: Option<u64> },
    /// B delivered exactly the originated messages, in order, without gaps or duplicates
    DeliveredInOrder,
    /// Total number of packets sent by A is within range
    SenderPacketCount { min: u64, max: Option<u64> },
    /// Number of packets lost in the channel (random or forced) is within range
    LostCount { min: u64, max: Option<u64> },
    /// A never had more than `max` packets outstanding
    MaxOutstanding { max: usize },
    /// Simulation finishes within the given virtual time
    MaxDuration { time: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_actions_and_assertions() {
        let scenario: TestScenario = toml::from_str(
            r#"
            name = "forced loss"

            [config]
            protocol = "go_back_n"
            seed = 7

            [[actions]]
            type = "drop_next_from_sender_seq"
            seq = 2

            [[assertions]]
            type = "delivered_count"
            min = 5

            [[assertions]]
            type = "delivered_in_order"
            "#,
        )
        .expect("parse scenario");

        assert_eq!(scenario.description, "");
        assert!(matches!(scenario.actions[0], TestAction::DropNextFromSenderSeq { seq: 2 }));
        assert!(matches!(
            scenario.assertions[0],
            TestAssertion::DeliveredCount { min: 5, max: None }
        ));
        assert!(matches!(scenario.assertions[1], TestAssertion::DeliveredInOrder));
    }

    #[test]
    fn override_only_touches_given_fields() {
        let mut config = SimConfig::default();
        let overrides = SimConfigOverride {
            protocol: Some(ProtocolKind::AlternatingBit),
            seed: Some(1),
            loss_prob: Some(0.2),
            ..Default::default()
        };
        overrides.apply_to(&mut config);

        assert_eq!(config.protocol, ProtocolKind::AlternatingBit);
        assert_eq!(config.seed, Some(1));
        assert_eq!(config.loss_prob, 0.2);
        assert_eq!(config.num_msgs, 10);
        assert_eq!(config.stop_policy, StopPolicy::Drained);
    }
}
