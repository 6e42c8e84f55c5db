use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace partitioning independent undo/redo stacks.
///
/// Edits made under different keys never interfere: undoing an export
/// layout change does not touch map edits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HistoryKey(Cow<'static, str>);

impl HistoryKey {
    /// Edits to map layers and features.
    pub const MAP: HistoryKey = HistoryKey(Cow::Borrowed("Map"));
    /// Edits to export layouts.
    pub const EXPORT: HistoryKey = HistoryKey(Cow::Borrowed("Export"));
    /// Edits to shared views.
    pub const SHARED_VIEWS: HistoryKey = HistoryKey(Cow::Borrowed("SharedViews"));

    /// A custom key.
    pub fn custom(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HistoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_key_equals_builtin_with_same_name() {
        assert_eq!(HistoryKey::custom("Map"), HistoryKey::MAP);
        assert_ne!(HistoryKey::MAP, HistoryKey::EXPORT);
        assert_eq!(HistoryKey::SHARED_VIEWS.to_string(), "SharedViews");
    }
}
