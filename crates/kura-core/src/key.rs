//! Record keys and key generation
//!
//! Keys follow IndexedDB's valid-key domain and comparison rules so every
//! engine iterates a collection in the same natural order:
//! numbers < dates < strings < binary < arrays, then by value.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::schema::CollectionConfig;

/// Largest key a generator may hand out (2^53).
const MAX_GENERATED_KEY: u64 = 1 << 53;

/// A record key within one collection.
#[derive(Debug, Clone)]
pub enum Key {
    Number(f64),
    /// Milliseconds since the Unix epoch
    Date(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Key>),
}

impl Key {
    /// Convert a JSON value into a key.
    ///
    /// Returns `None` for values that are not valid keys (booleans, null, objects).
    pub fn from_json(value: &Value) -> Option<Key> {
        match value {
            Value::Number(n) => n.as_f64().map(Key::Number),
            Value::String(s) => Some(Key::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
            _ => None,
        }
    }

    /// Convert the key into its JSON form.
    ///
    /// Integral numbers become JSON integers so generated keys read back as `1`, not `1.0`.
    pub fn to_json(&self) -> Value {
        match self {
            Key::Number(n) | Key::Date(n) => number_to_json(*n),
            Key::String(s) => Value::String(s.clone()),
            Key::Binary(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_json).collect()),
        }
    }

    /// Reject keys IndexedDB would reject (NaN numbers or dates, nested invalid keys).
    pub fn validate(&self) -> EngineResult<()> {
        match self {
            Key::Number(n) | Key::Date(n) if n.is_nan() => {
                Err(EngineError::Data("NaN is not a valid key".into()))
            }
            Key::Array(items) => items.iter().try_for_each(Key::validate),
            _ => Ok(()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Date(_) => 1,
            Key::String(_) => 2,
            Key::Binary(_) => 3,
            Key::Array(_) => 4,
        }
    }
}

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_GENERATED_KEY as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn compare_numbers(a: f64, b: f64) -> Ordering {
    // -0 and 0 compare equal; NaN never passes validation
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) | (Key::Date(a), Key::Date(b)) => {
                compare_numbers(*a, *b)
            }
            (Key::String(a), Key::String(b)) => a.encode_utf16().cmp(b.encode_utf16()),
            (Key::Binary(a), Key::Binary(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::Number(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Number(n as f64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Key::Array(items)
    }
}

/// Per-collection key generator for `autoIncrement` collections.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    current: u64,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self { current: 1 }
    }

    /// Hand out the next key.
    pub fn next_key(&mut self) -> EngineResult<Key> {
        if self.current > MAX_GENERATED_KEY {
            return Err(EngineError::Constraint("key generator exhausted".into()));
        }
        let key = Key::Number(self.current as f64);
        self.current += 1;
        Ok(key)
    }

    /// Account for an explicitly supplied key so later generated keys stay above it.
    pub fn observe(&mut self, key: &Key) {
        if let Key::Number(n) = key {
            if *n < self.current as f64 {
                return;
            }
            let value = n.floor().min(MAX_GENERATED_KEY as f64) as u64;
            if value >= self.current {
                self.current = value + 1;
            }
        }
    }
}

/// Resolve the key a `put` writes to, following IndexedDB's in-line/out-of-line rules.
///
/// When the collection generates in-line keys the generated key is injected into `value`.
pub fn resolve_key(
    config: &CollectionConfig,
    value: &mut Value,
    explicit: Option<Key>,
    generator: &mut KeyGenerator,
) -> EngineResult<Key> {
    match (&config.key_path, explicit) {
        (Some(_), Some(_)) => Err(EngineError::Data(
            "collection uses in-line keys; an explicit key is not allowed".into(),
        )),
        (Some(path), None) => match path.extract(value)? {
            Some(key) => {
                key.validate()?;
                if config.auto_increment {
                    generator.observe(&key);
                }
                Ok(key)
            }
            None if config.auto_increment => {
                let key = generator.next_key()?;
                path.inject(value, &key)?;
                Ok(key)
            }
            None => Err(EngineError::Data(format!(
                "value has no key at key path {}",
                path
            ))),
        },
        (None, Some(key)) => {
            key.validate()?;
            if config.auto_increment {
                generator.observe(&key);
            }
            Ok(key)
        }
        (None, None) if config.auto_increment => generator.next_key(),
        (None, None) => Err(EngineError::Data(
            "collection has no key path or key generator; a key is required".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::KeyPath;
    use serde_json::json;

    #[test]
    fn test_type_ordering() {
        let mut keys = vec![
            Key::Array(vec![]),
            Key::Binary(vec![0]),
            Key::from("a"),
            Key::Date(0.0),
            Key::from(10),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Key::from(10),
                Key::Date(0.0),
                Key::from("a"),
                Key::Binary(vec![0]),
                Key::Array(vec![]),
            ]
        );
    }

    #[test]
    fn test_value_ordering() {
        assert!(Key::from(2) < Key::from(10));
        assert!(Key::from("B") < Key::from("a"));
        assert!(Key::Array(vec![Key::from(1)]) < Key::Array(vec![Key::from(1), Key::from(0)]));
        assert_eq!(Key::from(0.0), Key::from(-0.0));
    }

    #[test]
    fn test_json_conversion() {
        assert_eq!(Key::from_json(&json!(1)), Some(Key::from(1)));
        assert_eq!(
            Key::from_json(&json!(["a", 2])),
            Some(Key::Array(vec![Key::from("a"), Key::from(2)]))
        );
        assert_eq!(Key::from_json(&json!(true)), None);
        assert_eq!(Key::from_json(&json!([{}])), None);
        assert_eq!(Key::from(3).to_json(), json!(3));
        assert_eq!(Key::from(1.5).to_json(), json!(1.5));
    }

    #[test]
    fn test_nan_rejected() {
        assert!(Key::from(f64::NAN).validate().is_err());
        assert!(Key::Array(vec![Key::Date(f64::NAN)]).validate().is_err());
    }

    #[test]
    fn test_generator_observes_explicit_keys() {
        let mut generator = KeyGenerator::new();
        assert_eq!(generator.next_key().unwrap(), Key::from(1));
        generator.observe(&Key::from(7.5));
        assert_eq!(generator.next_key().unwrap(), Key::from(8));
        generator.observe(&Key::from(3));
        assert_eq!(generator.next_key().unwrap(), Key::from(9));
        generator.observe(&Key::from("x"));
        assert_eq!(generator.next_key().unwrap(), Key::from(10));
    }

    #[test]
    fn test_generator_exhaustion() {
        let mut generator = KeyGenerator::new();
        generator.observe(&Key::from(1e300));
        assert!(matches!(
            generator.next_key(),
            Err(EngineError::Constraint(_))
        ));
    }

    #[test]
    fn test_resolve_inline_key() {
        let config = CollectionConfig::new().key_path("id");
        let mut generator = KeyGenerator::new();
        let mut value = json!({"id": 4, "text": "a"});
        let key = resolve_key(&config, &mut value, None, &mut generator).unwrap();
        assert_eq!(key, Key::from(4));

        let err = resolve_key(&config, &mut value, Some(Key::from(1)), &mut generator);
        assert!(matches!(err, Err(EngineError::Data(_))));

        let mut missing = json!({"text": "b"});
        let err = resolve_key(&config, &mut missing, None, &mut generator);
        assert!(matches!(err, Err(EngineError::Data(_))));
    }

    #[test]
    fn test_resolve_generated_inline_key() {
        let config = CollectionConfig::new()
            .key_path(KeyPath::from("meta.id"))
            .auto_increment(true);
        let mut generator = KeyGenerator::new();
        let mut value = json!({"text": "a"});
        let key = resolve_key(&config, &mut value, None, &mut generator).unwrap();
        assert_eq!(key, Key::from(1));
        assert_eq!(value, json!({"text": "a", "meta": {"id": 1}}));
    }

    #[test]
    fn test_resolve_out_of_line_key() {
        let config = CollectionConfig::new();
        let mut generator = KeyGenerator::new();
        let mut value = json!("plain");
        let key = resolve_key(&config, &mut value, Some(Key::from("k")), &mut generator).unwrap();
        assert_eq!(key, Key::from("k"));
        assert!(resolve_key(&config, &mut value, None, &mut generator).is_err());

        let generated = CollectionConfig::new().auto_increment(true);
        let key = resolve_key(&generated, &mut value, None, &mut generator).unwrap();
        assert_eq!(key, Key::from(1));
        assert_eq!(value, json!("plain"));
    }
}
