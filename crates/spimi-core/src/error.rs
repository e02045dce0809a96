use thiserror::Error;

/// Errors raised while building, writing or decoding an index
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Malformed token {term:?}: {reason}")]
    MalformedToken { term: String, reason: String },

    #[error("Cannot encode {0}: gap codes are defined for positive integers only")]
    Codec(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Inconsistent index state: {0}")]
    InconsistentState(String),

    #[error("Corrupt index data: {0}")]
    Corrupt(String),

    #[error("Offset {0} does not fit in a 32-bit pointer")]
    OffsetOverflow(u64),

    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub(crate) fn malformed(term: &str, reason: impl Into<String>) -> Self {
        IndexError::MalformedToken {
            term: term.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        IndexError::Corrupt(reason.into())
    }
}
