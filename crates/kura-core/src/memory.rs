//! In-memory storage engine
//!
//! A BTreeMap-based engine for native hosts, testing and development.
//! Databases live as long as the engine (and its clones), so reopening a name
//! sees earlier data and versions. Not persistent across processes.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::engine::{Connection, Cursor, Engine};
use crate::error::{EngineError, EngineResult};
use crate::key::{resolve_key, Key, KeyGenerator};
use crate::logging::prefix;
use crate::schema::{CollectionConfig, Schema};

/// In-memory engine.
///
/// Cloning shares the underlying databases. Useful for:
/// - Unit testing
/// - Native hosts without a browser
/// - Short-lived processes that don't need persistence
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    state: Rc<RefCell<EngineState>>,
}

#[derive(Debug, Default)]
struct EngineState {
    databases: HashMap<String, Rc<RefCell<MemoryDatabase>>>,
    opens: usize,
}

#[derive(Debug, Default)]
struct MemoryDatabase {
    version: u32,
    collections: BTreeMap<String, MemoryCollection>,
}

#[derive(Debug)]
struct MemoryCollection {
    config: CollectionConfig,
    records: BTreeMap<Key, Value>,
    generator: KeyGenerator,
}

impl MemoryCollection {
    fn new(config: CollectionConfig) -> Self {
        Self {
            config,
            records: BTreeMap::new(),
            generator: KeyGenerator::new(),
        }
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open sequences started so far.
    pub fn open_count(&self) -> usize {
        self.state.borrow().opens
    }

    /// On-disk version of a database, if it exists.
    pub fn database_version(&self, name: &str) -> Option<u32> {
        self.state
            .borrow()
            .databases
            .get(name)
            .map(|db| db.borrow().version)
    }
}

#[async_trait(?Send)]
impl Engine for MemoryEngine {
    type Connection = MemoryConnection;

    async fn open(
        &self,
        name: &str,
        version: u32,
        schema: &Schema,
    ) -> EngineResult<MemoryConnection> {
        if version == 0 {
            return Err(EngineError::InvalidArgument(
                "version must be a positive integer".into(),
            ));
        }
        self.state.borrow_mut().opens += 1;

        // The host answers open requests on a later tick
        YieldNow::default().await;

        let db = Rc::clone(
            self.state
                .borrow_mut()
                .databases
                .entry(name.to_string())
                .or_default(),
        );

        {
            let mut database = db.borrow_mut();
            if version < database.version {
                return Err(EngineError::Version {
                    requested: version,
                    existing: database.version,
                });
            }
            if version > database.version {
                let existing: Vec<String> = database.collections.keys().cloned().collect();
                let plan = schema.plan_upgrade(database.version, version, existing.as_slice());
                debug!(
                    "{} upgrading {} from v{} to v{}, creating {:?}",
                    prefix::DB,
                    name,
                    plan.old_version,
                    plan.new_version,
                    plan.collection_names()
                );
                for (collection, config) in plan.create {
                    database
                        .collections
                        .insert(collection.to_string(), MemoryCollection::new(config.clone()));
                }
                database.version = version;
            }
        }

        Ok(MemoryConnection {
            name: name.to_string(),
            version,
            db,
            closed: Cell::new(false),
        })
    }

    async fn delete_database(&self, name: &str) -> EngineResult<()> {
        self.state.borrow_mut().databases.remove(name);
        Ok(())
    }
}

/// Connection to an in-memory database.
#[derive(Debug)]
pub struct MemoryConnection {
    name: String,
    version: u32,
    db: Rc<RefCell<MemoryDatabase>>,
    closed: Cell<bool>,
}

impl MemoryConnection {
    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed.get() {
            return Err(EngineError::InvalidState("connection is closed".into()));
        }
        Ok(())
    }

    /// Run `f` against one collection, as a single-collection transaction would.
    fn with_collection<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut MemoryCollection) -> EngineResult<T>,
    ) -> EngineResult<T> {
        self.ensure_open()?;
        let mut db = self.db.borrow_mut();
        let target = db
            .collections
            .get_mut(collection)
            .ok_or_else(|| EngineError::NotFound(collection.to_string()))?;
        f(target)
    }
}

#[async_trait(?Send)]
impl Connection for MemoryConnection {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn collection_names(&self) -> Vec<String> {
        self.db.borrow().collections.keys().cloned().collect()
    }

    fn open_cursor(&self, collection: &str) -> EngineResult<Cursor> {
        // Read-only snapshot taken when the transaction starts
        let snapshot: Vec<Value> =
            self.with_collection(collection, |c| Ok(c.records.values().cloned().collect()))?;
        Ok(stream::iter(snapshot.into_iter().map(Ok)).boxed_local())
    }

    async fn get(&self, collection: &str, key: &Key) -> EngineResult<Option<Value>> {
        key.validate()?;
        self.with_collection(collection, |c| Ok(c.records.get(key).cloned()))
    }

    async fn put(&self, collection: &str, value: Value, key: Option<Key>) -> EngineResult<()> {
        self.with_collection(collection, |c| {
            let mut value = value;
            let key = resolve_key(&c.config, &mut value, key, &mut c.generator)?;
            c.records.insert(key, value);
            Ok(())
        })
    }

    async fn delete(&self, collection: &str, key: &Key) -> EngineResult<()> {
        key.validate()?;
        self.with_collection(collection, |c| {
            c.records.remove(key);
            Ok(())
        })
    }

    async fn count(&self, collection: &str) -> EngineResult<usize> {
        self.with_collection(collection, |c| Ok(c.records.len()))
    }

    async fn clear(&self, collection: &str) -> EngineResult<()> {
        self.with_collection(collection, |c| {
            c.records.clear();
            Ok(())
        })
    }

    fn close(&self) {
        self.closed.set(true);
    }
}

/// Suspends exactly once before completing.
#[derive(Debug, Default)]
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    fn notes_schema() -> Schema {
        let mut schema = Schema::new();
        schema.insert("notes", CollectionConfig::new().key_path("id"));
        schema
    }

    #[test]
    fn test_open_creates_collections() {
        let engine = MemoryEngine::new();
        let conn = block_on(engine.open("db1", 1, &notes_schema())).unwrap();
        assert_eq!(conn.collection_names(), vec!["notes"]);
        assert_eq!(conn.version(), 1);
        assert_eq!(engine.database_version("db1"), Some(1));
        assert_eq!(engine.open_count(), 1);
    }

    #[test]
    fn test_open_rejects_version_zero() {
        let engine = MemoryEngine::new();
        let result = block_on(engine.open("db1", 0, &notes_schema()));
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
        assert_eq!(engine.database_version("db1"), None);
    }

    #[test]
    fn test_open_rejects_downgrade() {
        let engine = MemoryEngine::new();
        block_on(engine.open("db1", 3, &notes_schema())).unwrap();
        let result = block_on(engine.open("db1", 2, &notes_schema()));
        assert!(matches!(
            result,
            Err(EngineError::Version {
                requested: 2,
                existing: 3
            })
        ));
    }

    #[test]
    fn test_records_in_key_order() {
        let engine = MemoryEngine::new();
        let conn = block_on(engine.open("db1", 1, &notes_schema())).unwrap();
        for id in [3, 1, 2] {
            block_on(conn.put("notes", json!({"id": id}), None)).unwrap();
        }
        let records: Vec<Value> = block_on(
            conn.open_cursor("notes")
                .unwrap()
                .map(|r| r.unwrap())
                .collect::<Vec<_>>(),
        );
        assert_eq!(records, vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
    }

    #[test]
    fn test_missing_collection() {
        let engine = MemoryEngine::new();
        let conn = block_on(engine.open("db1", 1, &notes_schema())).unwrap();
        assert!(matches!(
            conn.open_cursor("tags"),
            Err(EngineError::NotFound(name)) if name == "tags"
        ));
        assert!(matches!(
            block_on(conn.put("tags", json!({}), Some(Key::from(1)))),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn test_closed_connection() {
        let engine = MemoryEngine::new();
        let conn = block_on(engine.open("db1", 1, &notes_schema())).unwrap();
        conn.close();
        assert!(matches!(
            block_on(conn.count("notes")),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn test_delete_database() {
        let engine = MemoryEngine::new();
        block_on(engine.open("db1", 1, &notes_schema())).unwrap();
        block_on(engine.delete_database("db1")).unwrap();
        assert_eq!(engine.database_version("db1"), None);
    }
}
