//! Kura Core
//!
//! Awaitable get/put/delete/query operations over an embedded, versioned
//! object store. The store is reached through the [`Engine`] and
//! [`Connection`] traits, implemented here by the in-memory
//! [`MemoryEngine`] and by IndexedDB in the `kura-indexeddb` crate.
//!
//! # Example
//!
//! ```rust
//! use kura_core::{CollectionConfig, MemoryEngine, Store, StoreConfig};
//! use serde_json::{json, Value};
//!
//! # futures::executor::block_on(async {
//! let config = StoreConfig::new("db1", 1)
//!     .collection("notes", CollectionConfig::new().key_path("id"));
//! let store = Store::new(MemoryEngine::new(), config);
//!
//! store.put("notes", &json!({"id": 1, "text": "a"})).await.unwrap();
//! let note: Option<Value> = store.get("notes", 1).await.unwrap();
//! assert_eq!(note, Some(json!({"id": 1, "text": "a"})));
//!
//! store.delete("notes", 1).await.unwrap();
//! let gone: Option<Value> = store.get("notes", 1).await.unwrap();
//! assert!(gone.is_none());
//! # });
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod key;
pub mod logging;
pub mod memory;
pub mod schema;
pub mod store;

// Re-export main types at crate root
pub use config::StoreConfig;
pub use engine::{Connection, Cursor, Engine};
pub use error::{EngineError, EngineResult, StoreError, StoreResult};
pub use key::Key;
pub use memory::{MemoryConnection, MemoryEngine};
pub use schema::{CollectionConfig, KeyPath, Schema, UpgradePlan};
pub use store::Store;
