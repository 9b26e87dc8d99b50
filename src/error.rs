use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("empty result sequence")]
    EmptySequence,

    #[error("malformed fingerprint {raw:?}: {reason}")]
    FingerprintDecode { raw: String, reason: &'static str },

    #[error("learning outcome {id} already settled with {existing}")]
    DoubleSettlement { id: i64, existing: bool },

    #[error("learning outcome {0} not found")]
    UnknownOutcome(i64),

    #[error("unknown pattern type {0:?}")]
    UnknownPattern(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type PatternResult<T> = Result<T, PatternError>;
