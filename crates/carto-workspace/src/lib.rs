//! Editing session of the Carto workspace.
//!
//! A [`Workspace`] owns the storage client, the entity stores, the feature
//! watcher, one persistence bridge per store-driven aggregate and the
//! history engine. It is created from a [`WorkspaceConfig`] and scoped to
//! one open project at a time.
//!
//! # Design Rules
//!
//! 1. Closing a project stops every adapter before the client disconnects.
//!    Opening one connects before any adapter starts.
//! 2. Live sources ([`ProjectSources`]) are mutated by callers and by
//!    changesets, never by the adapters that persist them.
//! 3. Undo and redo go through the same sources as fresh edits, so they are
//!    persisted the same way.
//! 4. History does not outlive the project it was recorded in.

pub mod changesets;
pub mod config;
pub mod error;
pub mod state;
pub mod workspace;

pub use changesets::{DispatchChangeset, FeatureChangeset, FeatureEdit};
pub use config::WorkspaceConfig;
pub use error::{WorkspaceError, WorkspaceResult};
pub use state::ProjectState;
pub use workspace::{ProjectSources, Workspace};
