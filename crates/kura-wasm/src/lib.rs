//! Browser bindings for Kura stores
//!
//! Exposes [`KuraDb`], a JavaScript class over an IndexedDB-backed
//! [`kura_indexeddb::IndexedDb`] handle:
//!
//! ```js
//! const db = new KuraDb("db1", 1, { notes: { keyPath: "id" } });
//! await db.put("notes", { id: 1, text: "a" });
//! const note = await db.get("notes", 1);          // { id: 1, text: "a" }
//! const long = await db.query("notes", n => n.text.length > 10);
//! await db.delete("notes", 1);
//! ```
//!
//! Every method returns a Promise. Failures reject with the error message,
//! e.g. `"read failed: no such collection: tags"`.

use std::fmt::Display;
use std::rc::Rc;

use js_sys::{Array, Function, Promise};
use kura_core::{EngineError, Key, Schema, StoreConfig, StoreError};
use kura_indexeddb::js::{key_from_js, value_from_js, value_to_js};
use kura_indexeddb::IndexedDb;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

fn js_error(err: impl Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn parse_key(key: &JsValue) -> Result<Key, JsValue> {
    match key_from_js(key) {
        Some(key) => key.validate().map(|_| key).map_err(js_error),
        None => Err(JsValue::from_str("data error: value is not a valid key")),
    }
}

fn parse_schema(stores: &JsValue) -> Result<Schema, JsValue> {
    if stores.is_undefined() || stores.is_null() {
        return Ok(Schema::new());
    }
    let value =
        value_from_js(stores).map_err(|e| js_error(StoreError::Config(e.to_string())))?;
    serde_json::from_value(value)
        .map_err(|e| JsValue::from_str(&format!("invalid store configuration: {}", e)))
}

/// A named, versioned IndexedDB database opened on first use.
#[wasm_bindgen]
pub struct KuraDb {
    store: Rc<IndexedDb>,
}

#[wasm_bindgen]
impl KuraDb {
    /// Capture name, version and `{ storeName: { keyPath?, autoIncrement? } }`.
    /// Performs no I/O; throws on an invalid configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(name: String, version: u32, stores: JsValue) -> Result<KuraDb, JsValue> {
        // Route Rust panics to console.error instead of "RuntimeError: unreachable"
        console_error_panic_hook::set_once();

        let config = StoreConfig {
            name,
            version,
            collections: parse_schema(&stores)?,
        };
        config.validate().map_err(js_error)?;

        Ok(KuraDb {
            store: Rc::new(kura_indexeddb::open(config)),
        })
    }

    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.store.name().to_string()
    }

    #[wasm_bindgen(getter)]
    pub fn version(&self) -> u32 {
        self.store.version()
    }

    /// Open (and upgrade) the database now instead of on first use.
    pub fn connect(&self) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            store.connect().await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Records of `store` in key order, filtered by `predicate` when given.
    ///
    /// An exception thrown by the predicate rejects the query.
    pub fn query(&self, store_name: String, predicate: Option<Function>) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            let records: Vec<Value> = store.query_all(&store_name).await.map_err(js_error)?;

            let matched = Array::new();
            for record in &records {
                let record = value_to_js(record).map_err(js_error)?;
                let keep = match &predicate {
                    Some(predicate) => predicate.call1(&JsValue::NULL, &record)?.is_truthy(),
                    None => true,
                };
                if keep {
                    matched.push(&record);
                }
            }
            Ok(matched.into())
        })
    }

    /// The record at `key`, or `undefined`.
    pub fn get(&self, store_name: String, key: JsValue) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            let key = parse_key(&key)?;
            let record: Option<Value> = store.get(&store_name, key).await.map_err(js_error)?;
            match record {
                Some(record) => value_to_js(&record).map_err(js_error),
                None => Ok(JsValue::UNDEFINED),
            }
        })
    }

    /// Write `data`. Without `key` the store's key path or generator decides.
    ///
    /// Rejects records JSON cannot represent exactly (`Date`, typed arrays,
    /// `undefined`, `NaN`, functions) without writing anything.
    pub fn put(&self, store_name: String, data: JsValue, key: JsValue) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            let data = value_from_js(&data)
                .map_err(|e| js_error(StoreError::Write(EngineError::from(e))))?;
            if key.is_undefined() || key.is_null() {
                store.put(&store_name, &data).await.map_err(js_error)?;
            } else {
                let key = parse_key(&key)?;
                store.put_at(&store_name, &data, key).await.map_err(js_error)?;
            }
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Remove the record at `key`. Absent keys resolve normally.
    pub fn delete(&self, store_name: String, key: JsValue) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            let key = parse_key(&key)?;
            store.delete(&store_name, key).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn count(&self, store_name: String) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            let count = store.count(&store_name).await.map_err(js_error)?;
            Ok(JsValue::from_f64(count as f64))
        })
    }

    pub fn clear(&self, store_name: String) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            store.clear(&store_name).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Close the connection, waiting for an open in flight. The next
    /// operation reopens it.
    pub fn close(&self) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            store.close().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Close the connection and delete the database.
    #[wasm_bindgen(js_name = deleteDatabase)]
    pub fn delete_database(&self) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            store.delete_database().await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }
}
