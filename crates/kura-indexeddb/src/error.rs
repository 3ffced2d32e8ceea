//! Error types for the IndexedDB engine

use kura_core::EngineError;
use thiserror::Error;
use wasm_bindgen::JsCast;

/// Result type for IndexedDB operations
pub type Result<T> = std::result::Result<T, IndexedDbError>;

/// Errors that can occur while talking to IndexedDB
#[derive(Debug, Error)]
pub enum IndexedDbError {
    /// IndexedDB is not available in this environment
    #[error("IndexedDB not available: {0}")]
    NotAvailable(String),

    /// A DOMException raised by IndexedDB (request, transaction or open)
    #[error("{name}: {message}")]
    Dom { name: String, message: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JavaScript value conversion error
    #[error("JS conversion error: {0}")]
    JsValue(String),

    /// Already classified engine error
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<wasm_bindgen::JsValue> for IndexedDbError {
    fn from(val: wasm_bindgen::JsValue) -> Self {
        if let Some(dom) = val.dyn_ref::<web_sys::DomException>() {
            return IndexedDbError::Dom {
                name: dom.name(),
                message: dom.message(),
            };
        }
        if let Some(msg) = val.as_string() {
            return IndexedDbError::JsValue(msg);
        }
        if let Some(err) = val.dyn_ref::<js_sys::Error>() {
            return IndexedDbError::JsValue(String::from(err.message()));
        }
        let msg = js_sys::JSON::stringify(&val)
            .ok()
            .and_then(|s| s.as_string())
            .unwrap_or_else(|| format!("{:?}", val));
        IndexedDbError::JsValue(msg)
    }
}

/// Convert IndexedDbError to EngineError for the engine traits
impl From<IndexedDbError> for EngineError {
    fn from(err: IndexedDbError) -> Self {
        match err {
            IndexedDbError::NotAvailable(msg) => EngineError::NotAvailable(msg),
            IndexedDbError::Dom { name, message } => match name.as_str() {
                "NotFoundError" => EngineError::NotFound(message),
                "DataError" => EngineError::Data(message),
                "ConstraintError" | "QuotaExceededError" => EngineError::Constraint(message),
                "InvalidStateError" | "TransactionInactiveError" | "ReadOnlyError" => {
                    EngineError::InvalidState(message)
                }
                "AbortError" => EngineError::Aborted(message),
                "InvalidAccessError" | "TypeError" => EngineError::InvalidArgument(message),
                _ => EngineError::Backend(format!("{}: {}", name, message)),
            },
            IndexedDbError::Json(e) => EngineError::Data(format!("record is not JSON: {}", e)),
            IndexedDbError::JsValue(msg) => EngineError::Backend(msg),
            IndexedDbError::Engine(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dom(name: &str) -> IndexedDbError {
        IndexedDbError::Dom {
            name: name.to_string(),
            message: "detail".to_string(),
        }
    }

    #[test]
    fn test_dom_names_map_to_engine_errors() {
        assert_eq!(
            EngineError::from(dom("NotFoundError")),
            EngineError::NotFound("detail".into())
        );
        assert_eq!(
            EngineError::from(dom("DataError")),
            EngineError::Data("detail".into())
        );
        assert_eq!(
            EngineError::from(dom("QuotaExceededError")),
            EngineError::Constraint("detail".into())
        );
        assert_eq!(
            EngineError::from(dom("TransactionInactiveError")),
            EngineError::InvalidState("detail".into())
        );
        assert_eq!(
            EngineError::from(dom("AbortError")),
            EngineError::Aborted("detail".into())
        );
        assert_eq!(
            EngineError::from(dom("UnknownError")),
            EngineError::Backend("UnknownError: detail".into())
        );
    }

    #[test]
    fn test_engine_errors_pass_through() {
        let err = IndexedDbError::from(EngineError::Version {
            requested: 1,
            existing: 2,
        });
        assert_eq!(
            EngineError::from(err),
            EngineError::Version {
                requested: 1,
                existing: 2
            }
        );
    }
}
