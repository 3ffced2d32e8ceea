//! Low-level IndexedDB helpers using web-sys
//!
//! Wraps the callback-based IndexedDB API into Rust futures using
//! `wasm_bindgen_futures::JsFuture` and `js_sys::Promise`.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use futures::channel::mpsc;
use futures::StreamExt;
use js_sys::Promise;
use kura_core::logging::prefix;
use kura_core::{Cursor, EngineError, EngineResult, Schema};
use serde_json::Value;
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    IdbCursorWithValue, IdbDatabase, IdbFactory, IdbObjectStore, IdbOpenDbRequest, IdbRequest,
    IdbTransaction, IdbTransactionMode, IdbVersionChangeEvent,
};

use crate::error::{IndexedDbError, Result};
use crate::js;

pub type EventClosure = Closure<dyn FnMut(web_sys::Event)>;

/// Closures attached to an open request, kept alive until the request settles
type OpenClosures = Rc<RefCell<Option<(Closure<dyn FnMut(IdbVersionChangeEvent)>, EventClosure)>>>;

/// Get the global IndexedDB factory.
pub fn idb_factory() -> Result<IdbFactory> {
    let global = js_sys::global();

    let idb: JsValue = js_sys::Reflect::get(&global, &"indexedDB".into())
        .map_err(|_| IndexedDbError::NotAvailable("no indexedDB on global".into()))?;

    if idb.is_undefined() || idb.is_null() {
        return Err(IndexedDbError::NotAvailable(
            "indexedDB is null/undefined".into(),
        ));
    }

    idb.dyn_into::<IdbFactory>()
        .map_err(|_| IndexedDbError::NotAvailable("indexedDB is not IdbFactory".into()))
}

/// Rejection value for a failed request: its DOMException when there is one.
fn request_error(req: &IdbRequest) -> JsValue {
    req.error()
        .ok()
        .flatten()
        .map(JsValue::from)
        .unwrap_or_else(|| JsValue::from_str("unknown IDB error"))
}

/// Rejection value for a failed or aborted transaction.
fn transaction_error(tx: &IdbTransaction) -> JsValue {
    tx.error().map(JsValue::from).unwrap_or_else(|| {
        web_sys::DomException::new_with_message_and_name("transaction aborted", "AbortError")
            .map(JsValue::from)
            .unwrap_or_else(|_| JsValue::from_str("transaction aborted"))
    })
}

/// Convert an IdbRequest into a JS Promise that resolves with the request's result.
fn request_to_promise(req: &IdbRequest) -> Promise {
    let req_success = req.clone();
    let req_error = req.clone();

    Promise::new(&mut move |resolve, reject| {
        // Store closures in Rc<RefCell> to manage their lifetime without leaking
        let closures: Rc<RefCell<Option<(EventClosure, EventClosure)>>> =
            Rc::new(RefCell::new(None));

        let req_s = req_success.clone();
        let closures_for_success = closures.clone();
        let on_success = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let result = req_s.result().unwrap_or(JsValue::UNDEFINED);
            let _ = resolve.call1(&JsValue::UNDEFINED, &result);
            *closures_for_success.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let req_e = req_error.clone();
        let closures_for_error = closures.clone();
        let on_error = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = reject.call1(&JsValue::UNDEFINED, &request_error(&req_e));
            *closures_for_error.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        req_success.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        req_error.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        // Keep both closures alive until one fires
        *closures.borrow_mut() = Some((on_success, on_error));
    })
}

/// Convert an IdbTransaction completion into a JS Promise.
///
/// Rejects on `error` or `abort`, whichever fires first.
fn transaction_to_promise(tx: &IdbTransaction) -> Promise {
    let tx = tx.clone();

    Promise::new(&mut move |resolve, reject| {
        let closures: Rc<RefCell<Option<(EventClosure, EventClosure, EventClosure)>>> =
            Rc::new(RefCell::new(None));

        let closures_for_complete = closures.clone();
        let on_complete = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = resolve.call0(&JsValue::UNDEFINED);
            *closures_for_complete.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let tx_e = tx.clone();
        let reject_e = reject.clone();
        let closures_for_error = closures.clone();
        let on_error = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = reject_e.call1(&JsValue::UNDEFINED, &transaction_error(&tx_e));
            *closures_for_error.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let tx_a = tx.clone();
        let closures_for_abort = closures.clone();
        let on_abort = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = reject.call1(&JsValue::UNDEFINED, &transaction_error(&tx_a));
            *closures_for_abort.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        tx.set_oncomplete(Some(on_complete.as_ref().unchecked_ref()));
        tx.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        tx.set_onabort(Some(on_abort.as_ref().unchecked_ref()));

        *closures.borrow_mut() = Some((on_complete, on_error, on_abort));
    })
}

/// Create every collection the schema declares but the database lacks.
fn run_upgrade(event: &IdbVersionChangeEvent, name: &str, schema: &Schema) -> Result<()> {
    let req: IdbOpenDbRequest = event
        .target()
        .ok_or_else(|| IndexedDbError::JsValue("upgrade event has no target".into()))?
        .unchecked_into();
    let db: IdbDatabase = req.result()?.unchecked_into();

    let existing = object_store_names(&db);
    let old_version = event.old_version() as u32;
    let new_version = event
        .new_version()
        .map(|v| v as u32)
        .unwrap_or(old_version);
    let plan = schema.plan_upgrade(old_version, new_version, existing.as_slice());

    debug!(
        "{} upgrading {} from v{} to v{}, creating {:?}",
        prefix::DB,
        name,
        plan.old_version,
        plan.new_version,
        plan.collection_names()
    );

    for (collection, config) in plan.create {
        let params = web_sys::IdbObjectStoreParameters::new();
        if let Some(key_path) = &config.key_path {
            js_sys::Reflect::set(&params, &"keyPath".into(), &js::key_path_to_js(key_path))?;
        }
        if config.auto_increment {
            js_sys::Reflect::set(&params, &"autoIncrement".into(), &JsValue::TRUE)?;
        }
        db.create_object_store_with_optional_parameters(collection, &params)?;
    }
    Ok(())
}

/// Names of the object stores in an open database.
pub fn object_store_names(db: &IdbDatabase) -> Vec<String> {
    let list = db.object_store_names();
    (0..list.length()).filter_map(|i| list.get(i)).collect()
}

/// Open (or create and upgrade) a database.
pub async fn open_database(
    name: &str,
    version: u32,
    schema: &Schema,
) -> EngineResult<IdbDatabase> {
    if version == 0 {
        return Err(EngineError::InvalidArgument(
            "version must be a positive integer".into(),
        ));
    }
    let factory = idb_factory()?;

    let open_req: IdbOpenDbRequest = factory
        .open_with_u32(name, version)
        .map_err(IndexedDbError::from)?;

    let upgrade_failure: Rc<RefCell<Option<EngineError>>> = Rc::new(RefCell::new(None));
    let closures: OpenClosures = Rc::new(RefCell::new(None));

    let db_name = name.to_string();
    let desired = schema.clone();
    let failure_slot = upgrade_failure.clone();
    let on_upgrade = Closure::wrap(Box::new(move |event: IdbVersionChangeEvent| {
        if let Err(err) = run_upgrade(&event, &db_name, &desired) {
            warn!("{} upgrade of {} failed: {}", prefix::DB, db_name, err);
            // Abort the versionchange transaction so the open request fails
            if let Some(tx) = event
                .target()
                .and_then(|t| t.dyn_into::<IdbOpenDbRequest>().ok())
                .and_then(|req| req.transaction())
            {
                let _ = tx.abort();
            }
            *failure_slot.borrow_mut() = Some(err.into());
        }
    }) as Box<dyn FnMut(IdbVersionChangeEvent)>);

    let blocked_name = name.to_string();
    let on_blocked = Closure::wrap(Box::new(move |_event: web_sys::Event| {
        warn!(
            "{} upgrade of {} blocked by another open connection",
            prefix::DB,
            blocked_name
        );
    }) as Box<dyn FnMut(web_sys::Event)>);

    open_req.set_onupgradeneeded(Some(on_upgrade.as_ref().unchecked_ref()));
    open_req.set_onblocked(Some(on_blocked.as_ref().unchecked_ref()));
    *closures.borrow_mut() = Some((on_upgrade, on_blocked));

    let result = JsFuture::from(request_to_promise(open_req.unchecked_ref())).await;

    // Clean up open closures now that the request settled
    *closures.borrow_mut() = None;

    let opened = match result {
        Ok(opened) => opened,
        Err(err) => {
            if let Some(failure) = upgrade_failure.borrow_mut().take() {
                return Err(failure);
            }
            return Err(open_error(&factory, name, version, err).await);
        }
    };

    opened
        .dyn_into::<IdbDatabase>()
        .map_err(|_| IndexedDbError::JsValue("open result is not IdbDatabase".into()).into())
}

/// Close `db` when another context needs a version change or deletion.
///
/// The returned closure backs the handler and must outlive it; clear the
/// handler with `set_onversionchange(None)` before dropping it.
pub fn close_on_version_change(db: &IdbDatabase) -> EventClosure {
    let target = db.clone();
    let on_version_change = Closure::wrap(Box::new(move |_event: web_sys::Event| {
        debug!(
            "{} closing {} for a version change elsewhere",
            prefix::CLOSE,
            target.name()
        );
        target.close();
    }) as Box<dyn FnMut(web_sys::Event)>);
    db.set_onversionchange(Some(on_version_change.as_ref().unchecked_ref()));
    on_version_change
}

/// Classify an open failure, resolving the on-disk version for `VersionError`.
async fn open_error(
    factory: &IdbFactory,
    name: &str,
    requested: u32,
    err: JsValue,
) -> EngineError {
    let err = IndexedDbError::from(err);
    if !matches!(&err, IndexedDbError::Dom { name: dom_name, .. } if dom_name == "VersionError") {
        return err.into();
    }

    // Opening without a version never upgrades an existing database
    let existing = match factory.open(name) {
        Ok(req) => JsFuture::from(request_to_promise(req.unchecked_ref()))
            .await
            .ok()
            .and_then(|db| db.dyn_into::<IdbDatabase>().ok())
            .map(|db| {
                let version = db.version() as u32;
                db.close();
                version
            }),
        Err(_) => None,
    };

    match existing {
        Some(existing) => EngineError::Version {
            requested,
            existing,
        },
        None => err.into(),
    }
}

/// Start a single-collection transaction.
pub fn begin_transaction(
    db: &IdbDatabase,
    collection: &str,
    mode: IdbTransactionMode,
) -> EngineResult<(IdbTransaction, IdbObjectStore)> {
    let tx = db
        .transaction_with_str_and_mode(collection, mode)
        .map_err(|e| match IndexedDbError::from(e) {
            IndexedDbError::Dom { name, .. } if name == "NotFoundError" => {
                EngineError::NotFound(collection.to_string())
            }
            other => other.into(),
        })?;
    let store = tx.object_store(collection).map_err(IndexedDbError::from)?;
    Ok((tx, store))
}

/// Await an IdbRequest, resolving to its result JsValue.
pub async fn await_request(req: &IdbRequest) -> Result<JsValue> {
    JsFuture::from(request_to_promise(req))
        .await
        .map_err(IndexedDbError::from)
}

/// Future resolving once `tx` commits.
///
/// Listeners are attached immediately, so create it before issuing requests
/// and await it after them.
pub fn transaction_done(tx: &IdbTransaction) -> impl Future<Output = Result<()>> {
    let done = JsFuture::from(transaction_to_promise(tx));
    async move {
        done.await.map_err(IndexedDbError::from)?;
        Ok(())
    }
}

/// Iterate every record of `collection` in key order.
///
/// The cursor is driven from its `onsuccess` callback, so iteration never
/// outlives the transaction; records and the first error are forwarded
/// through a channel.
pub fn open_cursor(db: &IdbDatabase, collection: &str) -> EngineResult<Cursor> {
    let (_tx, store) = begin_transaction(db, collection, IdbTransactionMode::Readonly)?;
    let req = store.open_cursor().map_err(IndexedDbError::from)?;

    let (sender, receiver) = mpsc::unbounded::<EngineResult<Value>>();
    let closures: Rc<RefCell<Option<(EventClosure, EventClosure)>>> = Rc::new(RefCell::new(None));

    let req_s = req.clone();
    let sender_s = sender.clone();
    let closures_for_success = closures.clone();
    let on_success = Closure::wrap(Box::new(move |_event: web_sys::Event| {
        let keep_going = match cursor_step(&req_s) {
            Ok(Some((cursor, value))) => {
                sender_s.unbounded_send(Ok(value)).is_ok()
                    && match cursor.continue_() {
                        Ok(()) => true,
                        Err(e) => {
                            let _ = sender_s.unbounded_send(Err(IndexedDbError::from(e).into()));
                            false
                        }
                    }
            }
            Ok(None) => false,
            Err(err) => {
                let _ = sender_s.unbounded_send(Err(err.into()));
                false
            }
        };
        if !keep_going {
            sender_s.close_channel();
            *closures_for_success.borrow_mut() = None;
        }
    }) as Box<dyn FnMut(web_sys::Event)>);

    let req_e = req.clone();
    let closures_for_error = closures.clone();
    let on_error = Closure::wrap(Box::new(move |_event: web_sys::Event| {
        let err = IndexedDbError::from(request_error(&req_e));
        let _ = sender.unbounded_send(Err(err.into()));
        sender.close_channel();
        *closures_for_error.borrow_mut() = None;
    }) as Box<dyn FnMut(web_sys::Event)>);

    req.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
    req.set_onerror(Some(on_error.as_ref().unchecked_ref()));
    *closures.borrow_mut() = Some((on_success, on_error));

    Ok(receiver.boxed_local())
}

/// Read the cursor's current record, or `None` once iteration is exhausted.
fn cursor_step(req: &IdbRequest) -> Result<Option<(IdbCursorWithValue, Value)>> {
    let result = req.result()?;
    if result.is_null() || result.is_undefined() {
        return Ok(None);
    }
    let cursor: IdbCursorWithValue = result.unchecked_into();
    let value = js::value_from_js(&cursor.value()?)?;
    Ok(Some((cursor, value)))
}

/// Delete an IndexedDB database by name.
pub async fn delete_database(db_name: &str) -> Result<()> {
    let factory = idb_factory()?;
    let req = factory.delete_database(db_name)?;
    JsFuture::from(request_to_promise(req.unchecked_ref()))
        .await
        .map_err(IndexedDbError::from)?;
    Ok(())
}
