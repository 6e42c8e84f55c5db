use thiserror::Error;

use carto_entities::EntityError;
use carto_store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("entity error: {0}")]
    Entity(#[from] EntityError),

    #[error("not watching {0}")]
    NotWatching(String),

    #[error("sync task failed: {0}")]
    TaskFailed(String),
}

impl SyncError {
    /// `true` for faults caused by the database having been disconnected or
    /// replaced under a running watcher.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Entity(e) if e.is_disconnect())
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        Self::Entity(EntityError::Store(err))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
