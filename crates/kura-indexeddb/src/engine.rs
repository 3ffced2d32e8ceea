//! IndexedDB engine implementing the kura-core `Engine` and `Connection` traits.
//!
//! Every operation opens its own single-collection transaction. Writes resolve
//! only after the transaction's `complete` event, reads after their request
//! succeeds.

use std::fmt;

use async_trait::async_trait;
use kura_core::{Connection, Cursor, Engine, EngineResult, Key, Schema};
use serde_json::Value;
use web_sys::{IdbDatabase, IdbTransactionMode};

use crate::error::IndexedDbError;
use crate::{idb, js};

/// The browser's IndexedDB as a kura storage engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdbEngine;

impl IdbEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl Engine for IdbEngine {
    type Connection = IdbConnection;

    async fn open(
        &self,
        name: &str,
        version: u32,
        schema: &Schema,
    ) -> EngineResult<IdbConnection> {
        let db = idb::open_database(name, version, schema).await?;
        let on_version_change = idb::close_on_version_change(&db);
        Ok(IdbConnection {
            db,
            _on_version_change: on_version_change,
        })
    }

    async fn delete_database(&self, name: &str) -> EngineResult<()> {
        idb::delete_database(name).await?;
        Ok(())
    }
}

/// An open IndexedDB database.
///
/// Closes itself when another context upgrades or deletes the database.
pub struct IdbConnection {
    db: IdbDatabase,
    _on_version_change: idb::EventClosure,
}

impl fmt::Debug for IdbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdbConnection")
            .field("db", &self.db)
            .finish_non_exhaustive()
    }
}

impl Drop for IdbConnection {
    fn drop(&mut self) {
        self.db.set_onversionchange(None);
    }
}

impl IdbConnection {
    /// The underlying `IDBDatabase`.
    pub fn database(&self) -> &IdbDatabase {
        &self.db
    }
}

#[async_trait(?Send)]
impl Connection for IdbConnection {
    fn name(&self) -> String {
        self.db.name()
    }

    fn version(&self) -> u32 {
        self.db.version() as u32
    }

    fn collection_names(&self) -> Vec<String> {
        idb::object_store_names(&self.db)
    }

    fn open_cursor(&self, collection: &str) -> EngineResult<Cursor> {
        idb::open_cursor(&self.db, collection)
    }

    async fn get(&self, collection: &str, key: &Key) -> EngineResult<Option<Value>> {
        let (_tx, store) =
            idb::begin_transaction(&self.db, collection, IdbTransactionMode::Readonly)?;

        let req = store
            .get(&js::key_to_js(key))
            .map_err(IndexedDbError::from)?;
        let result = idb::await_request(&req).await?;

        if result.is_undefined() {
            return Ok(None);
        }
        Ok(Some(js::value_from_js(&result)?))
    }

    async fn put(&self, collection: &str, value: Value, key: Option<Key>) -> EngineResult<()> {
        let js_val = js::value_to_js(&value)?;

        let (tx, store) =
            idb::begin_transaction(&self.db, collection, IdbTransactionMode::Readwrite)?;
        let committed = idb::transaction_done(&tx);

        let req = match &key {
            Some(key) => store.put_with_key(&js_val, &js::key_to_js(key)),
            None => store.put(&js_val),
        }
        .map_err(IndexedDbError::from)?;

        idb::await_request(&req).await?;
        committed.await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &Key) -> EngineResult<()> {
        let (tx, store) =
            idb::begin_transaction(&self.db, collection, IdbTransactionMode::Readwrite)?;
        let committed = idb::transaction_done(&tx);

        let req = store
            .delete(&js::key_to_js(key))
            .map_err(IndexedDbError::from)?;

        idb::await_request(&req).await?;
        committed.await?;
        Ok(())
    }

    async fn count(&self, collection: &str) -> EngineResult<usize> {
        let (_tx, store) =
            idb::begin_transaction(&self.db, collection, IdbTransactionMode::Readonly)?;

        let req = store.count().map_err(IndexedDbError::from)?;
        let result = idb::await_request(&req).await?;

        js::count_from_js(&result)
    }

    async fn clear(&self, collection: &str) -> EngineResult<()> {
        let (tx, store) =
            idb::begin_transaction(&self.db, collection, IdbTransactionMode::Readwrite)?;
        let committed = idb::transaction_done(&tx);

        let req = store.clear().map_err(IndexedDbError::from)?;

        idb::await_request(&req).await?;
        committed.await?;
        Ok(())
    }

    fn close(&self) {
        self.db.close();
    }
}
