use thiserror::Error;

use carto_entities::EntityError;
use carto_history::HistoryError;
use carto_store::StoreError;
use carto_sync::SyncError;
use carto_types::ProjectId;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("entity error: {0}")]
    Entity(#[from] EntityError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("no project is open")]
    NoActiveProject,

    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("project {0} is open; close it first")]
    ProjectOpen(ProjectId),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl WorkspaceError {
    /// Message suitable for a user-facing notification.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::History(_) => "Could not undo/redo this action.",
            Self::NoActiveProject => "No project is open.",
            Self::ProjectNotFound(_) => "The project could not be found.",
            Self::ProjectOpen(_) => "Close the current project first.",
            Self::Config(_) => "The workspace configuration is invalid.",
            Self::Store(_) | Self::Entity(_) | Self::Sync(_) => {
                "Could not save or load the project."
            }
        }
    }
}

pub type WorkspaceResult<T> = Result<T, WorkspaceError>;
