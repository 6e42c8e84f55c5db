/// Errors from storage operations.
///
/// Absence of a row is never an error: reads return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No database is connected.
    #[error("storage client is not connected")]
    NotConnected,

    /// A write was attempted with a token from a previous connection.
    #[error("stale connection: token for {database} (epoch {epoch}) is no longer current")]
    StaleConnection { database: String, epoch: u64 },

    /// The named object store does not exist in the connected database.
    #[error("unknown object store: {0}")]
    UnknownStore(String),

    /// The named index does not exist on the object store.
    #[error("unknown index {index} on store {store}")]
    UnknownIndex { store: String, index: String },

    /// The database on disk is newer than the schema the caller knows.
    #[error("schema version conflict for {database}: requested {requested}, found {found}")]
    VersionConflict {
        database: String,
        requested: u32,
        found: u32,
    },

    /// Keys must be non-empty.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// Database and store names must be filesystem safe.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Persisted data failed its integrity check.
    #[error("corrupt data in {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// The schema upgrade callback rejected the upgrade.
    #[error("schema upgrade failed: {0}")]
    Upgrade(String),

    /// I/O error from the underlying storage engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// `true` for faults caused by writing after the connection moved on.
    ///
    /// These are expected when a timer outlives its project and are discarded
    /// at the callback boundary instead of being surfaced.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::NotConnected | Self::StaleConnection { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
