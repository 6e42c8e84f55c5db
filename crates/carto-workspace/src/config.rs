use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{WorkspaceError, WorkspaceResult};

/// Settings of a [`Workspace`](crate::Workspace).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Root of the on-disk engine. `None` keeps databases in memory.
    pub data_dir: Option<PathBuf>,
    /// Prefix of per-project database names.
    pub database_prefix: String,
    /// Batch window of the feature watcher, in milliseconds.
    pub feature_debounce_ms: u64,
    /// Throttle interval of the persistence bridges, in milliseconds.
    pub bridge_throttle_ms: u64,
    /// Maximum undoable changesets per history key.
    pub history_limit: usize,
    /// Write buffered edits before closing a project.
    pub flush_on_close: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database_prefix: "carto-project-".to_string(),
            feature_debounce_ms: 500,
            bridge_throttle_ms: 1000,
            history_limit: 100,
            flush_on_close: true,
        }
    }
}

impl WorkspaceConfig {
    pub fn from_toml_str(raw: &str) -> WorkspaceResult<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| WorkspaceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> WorkspaceResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WorkspaceError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> WorkspaceResult<()> {
        if self.feature_debounce_ms == 0 {
            return Err(WorkspaceError::Config(
                "feature_debounce_ms must be positive".into(),
            ));
        }
        if self.bridge_throttle_ms == 0 {
            return Err(WorkspaceError::Config(
                "bridge_throttle_ms must be positive".into(),
            ));
        }
        if self.history_limit == 0 {
            return Err(WorkspaceError::Config(
                "history_limit must be positive".into(),
            ));
        }
        if self.database_prefix.is_empty() {
            return Err(WorkspaceError::Config(
                "database_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn feature_debounce(&self) -> Duration {
        Duration::from_millis(self.feature_debounce_ms)
    }

    pub fn bridge_throttle(&self) -> Duration {
        Duration::from_millis(self.bridge_throttle_ms)
    }
}
