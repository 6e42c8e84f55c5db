use std::fmt;

use async_trait::async_trait;

/// Error returned by a changeset implementation.
pub type ChangesetError = Box<dyn std::error::Error + Send + Sync>;

/// A reversible unit of mutation.
///
/// A changeset is built in the *pending* state, performs its forward effect
/// on [`apply`](Changeset::apply) and reverses it on
/// [`undo`](Changeset::undo). The engine guarantees that `apply` and `undo`
/// alternate; a changeset does not need to guard against being undone twice.
/// [`dispose`](Changeset::dispose) is called once, when the engine drops the
/// changeset for good.
#[async_trait]
pub trait Changeset: Send + Sync {
    async fn apply(&self) -> Result<(), ChangesetError>;

    async fn undo(&self) -> Result<(), ChangesetError>;

    async fn dispose(&self) {}

    /// Short label for logs.
    fn describe(&self) -> String {
        "changeset".to_string()
    }
}

/// Handle to a registered changeset, unique per engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangesetId(pub(crate) u64);

impl ChangesetId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChangesetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a registered changeset currently sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangesetState {
    /// Forward effect in place; on the undo stack.
    Applied,
    /// Effect reversed; on the redo stack.
    Undone,
}
