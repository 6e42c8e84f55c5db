//! Key-scoped undo/redo for the Carto workspace.
//!
//! Every user-visible mutation is wrapped in a [`Changeset`] and registered
//! with the [`HistoryEngine`] under a [`carto_types::HistoryKey`]. Undo and
//! redo replay the changeset through the same mutation paths the original
//! edit used, so persistence observes them like any other edit.
//!
//! # Design Rules
//!
//! 1. Registering clears the redo stack of that key. History is linear.
//! 2. Distinct keys have fully independent stacks.
//! 3. A changeset that fails to undo or redo stays where it was and the
//!    error is returned to the caller.
//! 4. Changesets are runtime-only and never serialized.

pub mod changeset;
pub mod engine;
pub mod error;

pub use changeset::{Changeset, ChangesetError, ChangesetId, ChangesetState};
pub use engine::{HistoryEngine, DEFAULT_HISTORY_LIMIT};
pub use error::{HistoryAction, HistoryError, HistoryResult};
