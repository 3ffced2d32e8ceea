//! JS <-> Rust conversion for keys, key paths and records
//!
//! Records cross the boundary as JSON (`JSON.parse` / `JSON.stringify`), so
//! only values JSON represents exactly are accepted: `null`, booleans, finite
//! numbers, strings, arrays and plain objects of those. Anything else (a
//! `Date`, typed arrays, `undefined`, `NaN`, functions) fails with a data error
//! instead of being coerced. Keys use native JS values so IndexedDB orders
//! them itself: numbers, strings, `Date`, `Uint8Array` and arrays.

use js_sys::{Array, ArrayBuffer, Date, Object, Uint8Array};
use kura_core::{EngineError, EngineResult, Key, KeyPath};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::error::{IndexedDbError, Result};

/// Convert a record to a JS value for storage.
pub fn value_to_js(value: &Value) -> Result<JsValue> {
    let text = serde_json::to_string(value)?;
    js_sys::JSON::parse(&text).map_err(IndexedDbError::from)
}

/// Convert a JS value to a record.
///
/// Fails with [`EngineError::Data`] when the value would not survive a JSON
/// round trip unchanged.
pub fn value_from_js(val: &JsValue) -> Result<Value> {
    ensure_json_exact(val, "value")?;
    let text = js_sys::JSON::stringify(val).map_err(IndexedDbError::from)?;
    match text.as_string() {
        Some(text) => Ok(serde_json::from_str(&text)?),
        None => Err(unrepresentable("value", "undefined")),
    }
}

fn unrepresentable(at: &str, what: &str) -> IndexedDbError {
    EngineError::Data(format!("{} is {}, which JSON cannot represent", at, what)).into()
}

fn ensure_json_exact(val: &JsValue, at: &str) -> Result<()> {
    if val.is_null() || val.as_bool().is_some() || val.is_string() {
        return Ok(());
    }
    if let Some(n) = val.as_f64() {
        if !n.is_finite() {
            return Err(unrepresentable(at, "a non-finite number"));
        }
        return Ok(());
    }
    if val.is_undefined() {
        return Err(unrepresentable(at, "undefined"));
    }
    if val.is_function() {
        return Err(unrepresentable(at, "a function"));
    }
    if !val.is_object() {
        return Err(unrepresentable(at, "a symbol or bigint"));
    }

    if Array::is_array(val) {
        let array: &Array = val.unchecked_ref();
        for (i, item) in array.iter().enumerate() {
            ensure_json_exact(&item, &format!("{}[{}]", at, i))?;
        }
        return Ok(());
    }

    let object: &Object = val.unchecked_ref();
    let proto = JsValue::from(Object::get_prototype_of(val));
    let plain = JsValue::from(Object::get_prototype_of(&Object::new()));
    if !(proto.is_null() || proto == plain) {
        let class = object.constructor().name();
        return Err(unrepresentable(at, &format!("a {}", String::from(class))));
    }
    for entry in Object::entries(object).iter() {
        let pair: &Array = entry.unchecked_ref();
        let field = pair.get(0).as_string().unwrap_or_default();
        ensure_json_exact(&pair.get(1), &format!("{}.{}", at, field))?;
    }
    Ok(())
}

/// Interpret the result of an object store `count()` request.
pub fn count_from_js(val: &JsValue) -> EngineResult<usize> {
    match val.as_f64() {
        Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as usize),
        _ => Err(EngineError::Backend(format!(
            "count returned a non-count value: {:?}",
            val
        ))),
    }
}

/// Convert a key to the JS value IndexedDB expects.
pub fn key_to_js(key: &Key) -> JsValue {
    match key {
        Key::Number(n) => JsValue::from_f64(*n),
        Key::Date(ms) => Date::new(&JsValue::from_f64(*ms)).into(),
        Key::String(s) => JsValue::from_str(s),
        Key::Binary(bytes) => Uint8Array::from(bytes.as_slice()).into(),
        Key::Array(items) => items.iter().map(key_to_js).collect::<Array>().into(),
    }
}

/// Convert a JS value to a key.
///
/// Returns `None` for values IndexedDB does not accept as keys.
pub fn key_from_js(val: &JsValue) -> Option<Key> {
    if let Some(n) = val.as_f64() {
        return Some(Key::Number(n));
    }
    if let Some(s) = val.as_string() {
        return Some(Key::String(s));
    }
    if let Some(date) = val.dyn_ref::<Date>() {
        return Some(Key::Date(date.get_time()));
    }
    if Array::is_array(val) {
        let array: &Array = val.unchecked_ref();
        return array
            .iter()
            .map(|item| key_from_js(&item))
            .collect::<Option<Vec<_>>>()
            .map(Key::Array);
    }
    if let Some(buffer) = val.dyn_ref::<ArrayBuffer>() {
        return Some(Key::Binary(Uint8Array::new(buffer).to_vec()));
    }
    if ArrayBuffer::is_view(val) {
        let view: &Uint8Array = val.unchecked_ref();
        let bytes = Uint8Array::new_with_byte_offset_and_length(
            &view.buffer(),
            view.byte_offset(),
            view.byte_length(),
        );
        return Some(Key::Binary(bytes.to_vec()));
    }
    None
}

/// Convert a key path to the `keyPath` option value.
pub fn key_path_to_js(path: &KeyPath) -> JsValue {
    match path {
        KeyPath::Single(path) => JsValue::from_str(path),
        KeyPath::Compound(paths) => paths
            .iter()
            .map(|p| JsValue::from_str(p))
            .collect::<Array>()
            .into(),
    }
}
