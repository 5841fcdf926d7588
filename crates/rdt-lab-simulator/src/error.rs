use thiserror::Error;

/// An entity asked the simulator for something it must not do.
///
/// These are defects in an entity, not network conditions: the simulator
/// logs them, counts them and ignores the call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContractViolation {
    #[error("seqnum {seqnum} outside [0, {limit})")]
    SeqnumOutOfRange { seqnum: u32, limit: u32 },

    #[error("acknum {acknum} outside [0, {limit})")]
    AcknumOutOfRange { acknum: u32, limit: u32 },

    #[error("attempt to start a timer that is already started")]
    TimerAlreadyRunning,

    #[error("unable to stop timer; it was not running")]
    TimerNotRunning,

    #[error("timer delay {0} is negative or not finite")]
    InvalidDelay(f64),
}
