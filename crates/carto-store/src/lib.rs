//! Per-project local database for the Carto workspace.
//!
//! A database is a set of named object stores holding JSON records by
//! string key, with optional secondary indices over record fields. Each
//! project lives in its own database and only one database is connected at
//! a time.
//!
//! # Components
//!
//! - [`StorageClient`] -- async CRUD surface over the connected database
//! - [`DatabaseEngine`] -- durable backend trait
//! - [`MemoryEngine`] -- `HashMap`-based engine for tests and embedding
//! - [`FileEngine`] -- directory-of-JSON-files engine with atomic renames
//!
//! # Design Rules
//!
//! 1. Absence is not an error: reads return `Ok(None)`.
//! 2. A batch (`put_all`, `delete_all`, `clear_stores`) is atomic: a rejected
//!    commit leaves no key of the batch visible.
//! 3. Operations are serialized in submission order.
//! 4. Connecting to another database closes the current one first; tokens
//!    from earlier connections are rejected by [`StorageClient::check`].
//! 5. The store never talks to the network.

pub mod client;
pub mod engine;
pub mod error;
pub mod file;
pub mod memory;
pub mod schema;

pub use client::{ClearOptions, ConnectionToken, StorageClient};
pub use engine::{Change, DatabaseEngine};
pub use error::{StoreError, StoreResult};
pub use file::FileEngine;
pub use memory::MemoryEngine;
pub use schema::{DatabaseImage, IndexSpec, SchemaUpgrade, StoreImage, UpgradeTx};
