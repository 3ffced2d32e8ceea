//! IndexedDB storage engine for Kura stores (browser WASM)
//!
//! This crate implements the kura-core `Engine`/`Connection` contract on top
//! of the browser's IndexedDB, so a `Store<IdbEngine>` offers the same async
//! query/get/put/delete operations in the browser as `Store<MemoryEngine>`
//! does natively.
//!
//! # Schema
//!
//! Collections map to object stores. They are created inside the
//! `upgradeneeded` transaction when the configured version is newer than the
//! database on disk, using each collection's `keyPath` and `autoIncrement`
//! options. Records are stored as plain JS objects (JSON round-trip).
//!
//! # Example
//!
//! ```rust,ignore
//! use kura_core::{CollectionConfig, StoreConfig};
//! use serde_json::{json, Value};
//!
//! let store = kura_indexeddb::open(
//!     StoreConfig::new("db1", 1).collection("notes", CollectionConfig::new().key_path("id")),
//! );
//!
//! store.put("notes", &json!({"id": 1, "text": "a"})).await?;
//! let note: Option<Value> = store.get("notes", 1).await?;
//! assert!(note.is_some());
//! ```

pub mod engine;
pub mod error;
pub mod idb;
pub mod js;

pub use engine::{IdbConnection, IdbEngine};
pub use error::{IndexedDbError, Result};

use kura_core::{Store, StoreConfig};

/// A store handle backed by IndexedDB.
pub type IndexedDb = Store<IdbEngine>;

/// Create an IndexedDB-backed store handle. The database opens on first use.
pub fn open(config: StoreConfig) -> IndexedDb {
    Store::new(IdbEngine::new(), config)
}

/// Delete an IndexedDB database by name (for testing/cleanup).
pub async fn delete_database(db_name: &str) -> Result<()> {
    idb::delete_database(db_name).await
}
