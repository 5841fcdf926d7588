pub mod checksum;
pub mod config;
pub mod interface;
pub mod packet;
pub mod scenario;

pub use interface::{SystemContext, TransportProtocol};
pub use packet::{MSG_SIZE, Message, Packet};

pub use config::{ArrivalJitter, ConfigError, CorruptionProfile, ProtocolKind, SimConfig, StopPolicy};
pub use scenario::{SimConfigOverride, TestAction, TestAssertion, TestScenario};
