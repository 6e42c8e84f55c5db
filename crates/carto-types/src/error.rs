use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq)]
pub enum TypeError {
    #[error("identifier must not be empty")]
    EmptyId,

    #[error("invalid identifier {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("invalid opacity {0}: expected a value in 0.0..=1.0")]
    InvalidOpacity(f64),

    #[error("serialization error: {0}")]
    Serialization(String),
}
