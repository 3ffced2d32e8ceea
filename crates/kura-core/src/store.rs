//! The lazily connected store handle.
//!
//! A [`Store`] captures a database name, version and schema at construction
//! and opens the database on first use. Every operation awaits the same
//! connection; concurrent first operations share one in-flight open instead of
//! racing separate open requests.

use std::cell::RefCell;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::engine::{Connection, Engine};
use crate::error::{StoreError, StoreResult};
use crate::key::Key;
use crate::logging::prefix;

/// An open attempt shared by every caller that arrives while it is in flight.
type PendingConnection<C> = Shared<LocalBoxFuture<'static, StoreResult<Rc<C>>>>;

/// Handle over one named, versioned database.
///
/// Records are any serde type; engines store them as JSON values.
/// All methods are async because the underlying engine is callback-based.
pub struct Store<E: Engine> {
    engine: Rc<E>,
    config: Rc<StoreConfig>,
    connection: RefCell<Option<PendingConnection<E::Connection>>>,
}

impl<E: Engine> Store<E> {
    /// Capture the configuration. Performs no I/O.
    pub fn new(engine: E, config: StoreConfig) -> Self {
        Self {
            engine: Rc::new(engine),
            config: Rc::new(config),
            connection: RefCell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn version(&self) -> u32 {
        self.config.version
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Return the live connection, opening (and upgrading) the database on first use.
    ///
    /// A failed open is not cached; the next call starts a fresh attempt.
    pub async fn connect(&self) -> StoreResult<Rc<E::Connection>> {
        let pending = self.pending_connection();
        let result = pending.clone().await;

        if let Err(err) = &result {
            let mut slot = self.connection.borrow_mut();
            if slot.as_ref().is_some_and(|current| current.ptr_eq(&pending)) {
                warn!("{} failed to open {}: {}", prefix::OPEN, self.config.name, err);
                *slot = None;
            }
        }
        result
    }

    fn pending_connection(&self) -> PendingConnection<E::Connection> {
        let mut slot = self.connection.borrow_mut();
        if let Some(pending) = slot.as_ref() {
            return pending.clone();
        }

        let engine = Rc::clone(&self.engine);
        let config = Rc::clone(&self.config);
        let pending = async move {
            config.validate()?;
            debug!(
                "{} opening {} v{}",
                prefix::OPEN,
                config.name,
                config.version
            );
            let conn = engine
                .open(&config.name, config.version, &config.collections)
                .await
                .map_err(StoreError::Open)?;
            Ok::<_, StoreError>(Rc::new(conn))
        }
        .boxed_local()
        .shared();

        *slot = Some(pending.clone());
        pending
    }

    /// Every record of `collection`, in key order.
    pub async fn query_all<T: DeserializeOwned>(&self, collection: &str) -> StoreResult<Vec<T>> {
        self.query(collection, |_: &T| true).await
    }

    /// Records of `collection` for which `predicate` returns true, in key order.
    ///
    /// The cursor is drained eagerly; any cursor error fails the whole query.
    pub async fn query<T, P>(&self, collection: &str, predicate: P) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned,
        P: Fn(&T) -> bool,
    {
        let conn = self.connect().await?;
        let mut cursor = conn.open_cursor(collection).map_err(StoreError::Read)?;

        let mut records = Vec::new();
        let mut scanned = 0usize;
        while let Some(next) = cursor.next().await {
            let raw = next.map_err(|err| {
                warn!("{} cursor on {} failed: {}", prefix::DB, collection, err);
                StoreError::Read(err)
            })?;
            scanned += 1;
            let record: T = serde_json::from_value(raw)?;
            if predicate(&record) {
                records.push(record);
            }
        }

        debug!(
            "{} query {}: {} of {} records matched",
            prefix::DB,
            collection,
            records.len(),
            scanned
        );
        Ok(records)
    }

    /// Retrieve the record at `key`.
    /// Returns `None` if not found.
    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: impl Into<Key>,
    ) -> StoreResult<Option<T>> {
        let key = key.into();
        let conn = self.connect().await?;
        let raw = conn.get(collection, &key).await.map_err(StoreError::Read)?;
        debug!("{} get {} {:?} -> {}", prefix::DB, collection, key, raw.is_some());

        match raw {
            Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
            None => Ok(None),
        }
    }

    /// Write `value` at the key the collection derives from it (key path or generator).
    pub async fn put<T: Serialize + ?Sized>(&self, collection: &str, value: &T) -> StoreResult<()> {
        self.write(collection, value, None).await
    }

    /// Write or overwrite `value` at an explicit `key`.
    pub async fn put_at<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        value: &T,
        key: impl Into<Key>,
    ) -> StoreResult<()> {
        self.write(collection, value, Some(key.into())).await
    }

    async fn write<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        value: &T,
        key: Option<Key>,
    ) -> StoreResult<()> {
        let raw = serde_json::to_value(value)?;
        let conn = self.connect().await?;
        debug!("{} put {} {:?}", prefix::DB, collection, key);
        conn.put(collection, raw, key)
            .await
            .map_err(StoreError::Write)
    }

    /// Remove the record at `key`. Absent keys are not an error.
    pub async fn delete(&self, collection: &str, key: impl Into<Key>) -> StoreResult<()> {
        let key = key.into();
        let conn = self.connect().await?;
        debug!("{} delete {} {:?}", prefix::DB, collection, key);
        conn.delete(collection, &key)
            .await
            .map_err(StoreError::Write)
    }

    /// Get the number of records in `collection`.
    pub async fn count(&self, collection: &str) -> StoreResult<usize> {
        let conn = self.connect().await?;
        conn.count(collection).await.map_err(StoreError::Read)
    }

    /// Remove every record of `collection`.
    pub async fn clear(&self, collection: &str) -> StoreResult<()> {
        let conn = self.connect().await?;
        debug!("{} clear {}", prefix::DB, collection);
        conn.clear(collection).await.map_err(StoreError::Write)
    }

    /// Close the connection. The next operation reopens.
    ///
    /// An open still in flight is awaited and its connection closed, so the
    /// handle never leaves a live connection behind.
    pub async fn close(&self) {
        let pending = self.connection.borrow_mut().take();
        let Some(pending) = pending else {
            return;
        };
        if let Ok(conn) = pending.await {
            debug!("{} closing {}", prefix::CLOSE, self.config.name);
            conn.close();
        }
    }

    /// Close the connection and delete the whole database.
    pub async fn delete_database(&self) -> StoreResult<()> {
        self.close().await;
        debug!("{} deleting database {}", prefix::CLOSE, self.config.name);
        self.engine
            .delete_database(&self.config.name)
            .await
            .map_err(StoreError::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::memory::MemoryEngine;
    use crate::schema::CollectionConfig;
    use futures::executor::block_on;
    use serde_json::{json, Value};

    fn store() -> Store<MemoryEngine> {
        Store::new(
            MemoryEngine::new(),
            StoreConfig::new("db1", 1).collection("notes", CollectionConfig::new().key_path("id")),
        )
    }

    #[test]
    fn test_new_performs_no_io() {
        let store = store();
        assert_eq!(store.engine().open_count(), 0);
        assert_eq!(store.name(), "db1");
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_connection_is_reused() {
        let store = store();
        let first = block_on(store.connect()).unwrap();
        let second = block_on(store.connect()).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(store.engine().open_count(), 1);
    }

    #[test]
    fn test_invalid_config_fails_open_and_retries() {
        let store = Store::new(MemoryEngine::new(), StoreConfig::new("db1", 0));
        assert!(matches!(block_on(store.connect()), Err(StoreError::Config(_))));
        assert!(matches!(block_on(store.connect()), Err(StoreError::Config(_))));
        assert_eq!(store.engine().open_count(), 0);
    }

    #[test]
    fn test_close_then_reopen() {
        let store = store();
        block_on(store.put("notes", &json!({"id": 1, "text": "a"}))).unwrap();
        let first = block_on(store.connect()).unwrap();

        block_on(store.close());
        assert!(matches!(
            block_on(first.count("notes")),
            Err(EngineError::InvalidState(_))
        ));

        let record: Option<Value> = block_on(store.get("notes", 1)).unwrap();
        assert_eq!(record, Some(json!({"id": 1, "text": "a"})));
        assert_eq!(store.engine().open_count(), 2);
    }

    #[test]
    fn test_undecodable_record() {
        let store = store();
        block_on(store.put("notes", &json!({"id": 1, "text": "a"}))).unwrap();
        let result: StoreResult<Option<u32>> = block_on(store.get("notes", 1));
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
