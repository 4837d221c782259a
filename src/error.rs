// Error taxonomy for bracket generation and scoring.
// Configuration problems and broken invariants are fatal for the trial (and the batch);
// sparse historical data is never an error, it is handled by the uniform fallback in patterns.rs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown pattern {0:?}")]
    UnknownPattern(String),

    #[error("malformed pattern {name:?}: {reason}")]
    MalformedPattern { name: String, reason: String },

    #[error("no seed distribution parameters for year {0} (supported: 2013-2019)")]
    UnsupportedYear(u32),

    #[error("unknown annealing model {0:?}")]
    UnknownAnnealingModel(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("corpus error: {0}")]
    Corpus(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
