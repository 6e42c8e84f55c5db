//! Error types for entity stores.

use carto_store::StoreError;

/// Errors from typed entity operations.
#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    /// Storage engine failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A persisted record could not be decoded into its entity type.
    #[error("cannot decode {store}/{key}: {reason}")]
    Decode {
        store: &'static str,
        key: String,
        reason: String,
    },

    /// An entity could not be encoded into a record.
    #[error("cannot encode entity for {store}: {reason}")]
    Encode { store: &'static str, reason: String },
}

impl EntityError {
    /// See [`StoreError::is_disconnect`].
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_disconnect())
    }
}

/// Convenience alias for entity results.
pub type EntityResult<T> = Result<T, EntityError>;
