/// Error types for structural problems in the input.
///
/// Data-quality anomalies (an unmatched heal, an unknown spell id, a spurious
/// cast success) are not errors; they are absorbed where they occur and only
/// counted in the per-run diagnostics. Everything here aborts the run.
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event {index} at {timestamp_ms}ms is earlier than the previous event at {previous_ms}ms")]
pub struct OrderError {
    pub index:        usize,
    pub previous_ms:  u64,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelateError {
    #[error("cast events out of order")]
    OutOfOrder(#[from] OrderError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackError {
    #[error("heal/damage events out of order")]
    OutOfOrder(#[from] OrderError),

    #[error("{unit} was resurrected at {resurrect_ms}ms before dying at {death_ms}ms")]
    ResurrectBeforeDeath {
        unit:         String,
        resurrect_ms: u64,
        death_ms:     u64,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("encounter duration must be positive, got {0}s")]
    NonPositiveDuration(f64),

    #[error("time step must be positive, got {0}s")]
    NonPositiveTimeStep(f64),

    #[error("time step {step}s is below the {min}s minimum")]
    TimeStepTooSmall { step: f64, min: f64 },

    #[error("deficit timeline is empty")]
    EmptyTimeline,

    #[error("invalid character profile: {0}")]
    InvalidProfile(String),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("encounter {ended:?} ended while {started:?} was in progress")]
    MismatchedEncounterEnd { started: String, ended: String },

    #[error("asked for encounter {requested}, but the log only has {available}")]
    EncounterOutOfRange { requested: usize, available: usize },

    #[error("log contains no timestamped lines")]
    EmptyLog,

    #[error("could not read combat log")]
    Io(#[from] std::io::Error),
}
