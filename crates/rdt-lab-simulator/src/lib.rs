pub mod channel;
pub mod engine;
pub mod error;
pub mod queue;
pub mod scenario_runner;
pub mod trace;

pub use channel::{Corruption, Fate};
pub use engine::{NodeId, Simulator};
pub use error::ContractViolation;
pub use trace::{ConfigEcho, Delivery, LinkEvent, LinkEventKind, SimulationReport, Stats};
