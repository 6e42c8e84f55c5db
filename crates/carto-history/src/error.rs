use std::fmt;

use thiserror::Error;

use carto_types::HistoryKey;

use crate::changeset::{ChangesetError, ChangesetId};

/// The changeset operation that was being performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryAction {
    Apply,
    Undo,
    Redo,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => f.write_str("apply"),
            Self::Undo => f.write_str("undo"),
            Self::Redo => f.write_str("redo"),
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    /// A changeset handed to `perform` failed to apply. Nothing was
    /// registered.
    #[error("changeset {id} in {key} failed to apply: {source}")]
    Changeset {
        key: HistoryKey,
        id: ChangesetId,
        #[source]
        source: ChangesetError,
    },

    /// A registered changeset rejected an undo or redo. The stacks are left
    /// as they were before the operation.
    #[error("could not {action} changeset {id} in {key}: {source}")]
    Reversal {
        key: HistoryKey,
        id: ChangesetId,
        action: HistoryAction,
        #[source]
        source: ChangesetError,
    },
}

impl HistoryError {
    pub fn action(&self) -> HistoryAction {
        match self {
            Self::Changeset { .. } => HistoryAction::Apply,
            Self::Reversal { action, .. } => *action,
        }
    }

    pub fn key(&self) -> &HistoryKey {
        match self {
            Self::Changeset { key, .. } | Self::Reversal { key, .. } => key,
        }
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;
