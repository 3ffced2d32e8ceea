//! Storage engine contract
//!
//! An engine is the host's embedded object store (IndexedDB in the browser,
//! [`MemoryEngine`](crate::memory::MemoryEngine) everywhere else). The
//! [`Store`](crate::Store) handle only talks to engines through these traits.
//!
//! Engines are single-threaded: futures are `?Send` and connections are shared
//! through `Rc`, matching the browser's event loop.

use async_trait::async_trait;
use futures::stream::LocalBoxStream;
use serde_json::Value;

use crate::error::EngineResult;
use crate::key::Key;
use crate::schema::Schema;

/// Records of one collection in natural key order, produced by a read-only cursor.
///
/// The stream ends after the last record, or right after yielding the first error.
pub type Cursor = LocalBoxStream<'static, EngineResult<Value>>;

/// Opens and deletes databases.
#[async_trait(?Send)]
pub trait Engine: 'static {
    type Connection: Connection + 'static;

    /// Open `name` at `version`.
    ///
    /// A `version` above the on-disk version runs an upgrade that creates every
    /// collection of `schema` not present yet. A lower version fails with
    /// `EngineError::Version`.
    async fn open(
        &self,
        name: &str,
        version: u32,
        schema: &Schema,
    ) -> EngineResult<Self::Connection>;

    /// Delete a database and all its collections.
    async fn delete_database(&self, name: &str) -> EngineResult<()>;
}

/// An opened database.
///
/// Each operation runs in its own transaction scoped to one collection:
/// `open_cursor`, `get` and `count` read-only; `put`, `delete` and `clear` read-write.
#[async_trait(?Send)]
pub trait Connection {
    fn name(&self) -> String;

    fn version(&self) -> u32;

    fn collection_names(&self) -> Vec<String>;

    /// Start iterating every record of `collection` in key order.
    fn open_cursor(&self, collection: &str) -> EngineResult<Cursor>;

    async fn get(&self, collection: &str, key: &Key) -> EngineResult<Option<Value>>;

    /// Write `value` at `key`, or at the key the collection derives when `key` is `None`.
    /// Resolves once the transaction commits.
    async fn put(&self, collection: &str, value: Value, key: Option<Key>) -> EngineResult<()>;

    /// Remove the record at `key`; absent keys are not an error.
    async fn delete(&self, collection: &str, key: &Key) -> EngineResult<()>;

    async fn count(&self, collection: &str) -> EngineResult<usize>;

    async fn clear(&self, collection: &str) -> EngineResult<()>;

    fn close(&self);
}
