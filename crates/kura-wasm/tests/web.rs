//! Browser tests for the JavaScript-facing `KuraDb` class
#![cfg(target_arch = "wasm32")]

use js_sys::{Date, Function, Promise, Reflect, JSON};
use kura_wasm::KuraDb;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn js(text: &str) -> JsValue {
    JSON::parse(text).unwrap()
}

fn text(val: &JsValue) -> String {
    JSON::stringify(val).unwrap().as_string().unwrap()
}

async fn resolve(promise: Promise) -> Result<JsValue, JsValue> {
    JsFuture::from(promise).await
}

async fn fresh(name: &str, stores: &str) -> KuraDb {
    let db = KuraDb::new(name.to_string(), 1, js(stores)).unwrap();
    resolve(db.delete_database()).await.unwrap();
    db
}

#[wasm_bindgen_test]
async fn test_put_get_delete() {
    let db = fresh("kura-wasm-notes", r#"{"notes":{"keyPath":"id"}}"#).await;

    resolve(db.put(
        "notes".into(),
        js(r#"{"id":1,"text":"a"}"#),
        JsValue::UNDEFINED,
    ))
    .await
    .unwrap();

    let note = resolve(db.get("notes".into(), JsValue::from(1))).await.unwrap();
    assert_eq!(text(&note), r#"{"id":1,"text":"a"}"#);

    resolve(db.delete("notes".into(), JsValue::from(1))).await.unwrap();
    let gone = resolve(db.get("notes".into(), JsValue::from(1))).await.unwrap();
    assert!(gone.is_undefined());

    resolve(db.delete_database()).await.unwrap();
}

#[wasm_bindgen_test]
async fn test_query_with_predicate() {
    let db = fresh("kura-wasm-query", r#"{"notes":{"keyPath":"id"}}"#).await;
    for note in [r#"{"id":2,"tag":"x"}"#, r#"{"id":1,"tag":"y"}"#, r#"{"id":3,"tag":"x"}"#] {
        resolve(db.put("notes".into(), js(note), JsValue::UNDEFINED))
            .await
            .unwrap();
    }

    let all = resolve(db.query("notes".into(), None)).await.unwrap();
    assert_eq!(
        text(&all),
        r#"[{"id":1,"tag":"y"},{"id":2,"tag":"x"},{"id":3,"tag":"x"}]"#
    );

    let only_x = Function::new_with_args("note", "return note.tag === 'x'");
    let matched = resolve(db.query("notes".into(), Some(only_x))).await.unwrap();
    assert_eq!(text(&matched), r#"[{"id":2,"tag":"x"},{"id":3,"tag":"x"}]"#);

    let throws = Function::new_with_args("note", "throw new Error('boom')");
    assert!(resolve(db.query("notes".into(), Some(throws))).await.is_err());

    resolve(db.delete_database()).await.unwrap();
}

#[wasm_bindgen_test]
async fn test_out_of_line_keys_and_count() {
    let db = fresh("kura-wasm-kv", r#"{"kv":{}}"#).await;

    resolve(db.put("kv".into(), js(r#""first""#), JsValue::from("a")))
        .await
        .unwrap();
    resolve(db.put("kv".into(), js(r#""second""#), JsValue::from("b")))
        .await
        .unwrap();

    let count = resolve(db.count("kv".into())).await.unwrap();
    assert_eq!(count.as_f64(), Some(2.0));

    resolve(db.clear("kv".into())).await.unwrap();
    let count = resolve(db.count("kv".into())).await.unwrap();
    assert_eq!(count.as_f64(), Some(0.0));

    resolve(db.delete_database()).await.unwrap();
}

#[wasm_bindgen_test]
async fn test_errors_reject_with_message() {
    let db = fresh("kura-wasm-errors", r#"{"notes":{"keyPath":"id"}}"#).await;

    let err = resolve(db.query("tags".into(), None)).await.unwrap_err();
    assert_eq!(err.as_string().as_deref(), Some("read failed: no such collection: tags"));

    let err = resolve(db.get("notes".into(), JsValue::TRUE)).await.unwrap_err();
    assert!(err.as_string().unwrap().starts_with("data error"));

    resolve(db.delete_database()).await.unwrap();
}

#[wasm_bindgen_test]
async fn test_records_json_cannot_hold_are_rejected() {
    let db = fresh("kura-wasm-dates", r#"{"events":{"keyPath":"id"}}"#).await;

    let dated = js(r#"{"id":1}"#);
    Reflect::set(&dated, &"when".into(), &Date::new_0()).unwrap();
    let err = resolve(db.put("events".into(), dated, JsValue::UNDEFINED))
        .await
        .unwrap_err();
    assert!(err
        .as_string()
        .unwrap()
        .starts_with("write failed: data error: value.when is a Date"));

    let err = resolve(db.put("events".into(), JsValue::UNDEFINED, JsValue::from(2)))
        .await
        .unwrap_err();
    assert!(err.as_string().unwrap().contains("data error"));

    let count = resolve(db.count("events".into())).await.unwrap();
    assert_eq!(count.as_f64(), Some(0.0));

    let plain = r#"{"id":3,"tags":["a",1.5,null],"when":"1970-01-01T00:00:00.000Z"}"#;
    resolve(db.put("events".into(), js(plain), JsValue::UNDEFINED))
        .await
        .unwrap();
    let stored = resolve(db.get("events".into(), JsValue::from(3))).await.unwrap();
    assert_eq!(text(&stored), plain);

    resolve(db.delete_database()).await.unwrap();
}

#[wasm_bindgen_test]
async fn test_close_then_reopen() {
    let db = fresh("kura-wasm-close", r#"{"notes":{"keyPath":"id"}}"#).await;
    let connecting = db.connect();
    resolve(db.close()).await.unwrap();
    resolve(connecting).await.unwrap();

    resolve(db.put("notes".into(), js(r#"{"id":1}"#), JsValue::UNDEFINED))
        .await
        .unwrap();
    let count = resolve(db.count("notes".into())).await.unwrap();
    assert_eq!(count.as_f64(), Some(1.0));

    resolve(db.delete_database()).await.unwrap();
}

#[wasm_bindgen_test]
fn test_invalid_configuration_throws() {
    assert!(KuraDb::new("db".into(), 0, JsValue::UNDEFINED).is_err());
    assert!(KuraDb::new("db".into(), 1, js(r#"{"notes":{"keyPath":7}}"#)).is_err());

    let db = KuraDb::new("db".into(), 3, JsValue::UNDEFINED).unwrap();
    assert_eq!(db.name(), "db");
    assert_eq!(db.version(), 3);
}
