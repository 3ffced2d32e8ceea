//! Declarative collection schema and upgrade planning
//!
//! The schema lists every collection a database should contain. Opening a
//! database at a newer version diffs this desired schema against the
//! collections that already exist and creates only the missing ones.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};
use crate::key::Key;

/// Where a collection finds the key inside each record.
///
/// Serialized the way IndexedDB's `keyPath` option is written: a string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    /// Dot-separated path; the empty string is the record itself
    Single(String),
    /// Several paths combined into an array key
    Compound(Vec<String>),
}

impl KeyPath {
    /// Evaluate the key path against a record.
    ///
    /// `Ok(None)` means a single path is absent from the record, which lets a key
    /// generator fill it in. A present value that is not a valid key is a `Data` error.
    pub fn extract(&self, value: &Value) -> EngineResult<Option<Key>> {
        match self {
            KeyPath::Single(path) => match lookup(value, path) {
                Some(found) => Key::from_json(found).map(Some).ok_or_else(|| {
                    EngineError::Data(format!("value at key path '{}' is not a valid key", path))
                }),
                None => Ok(None),
            },
            KeyPath::Compound(paths) => {
                let mut parts = Vec::with_capacity(paths.len());
                for path in paths {
                    let found = lookup(value, path).ok_or_else(|| {
                        EngineError::Data(format!("value has no key at key path '{}'", path))
                    })?;
                    let key = Key::from_json(found).ok_or_else(|| {
                        EngineError::Data(format!(
                            "value at key path '{}' is not a valid key",
                            path
                        ))
                    })?;
                    parts.push(key);
                }
                Ok(Some(Key::Array(parts)))
            }
        }
    }

    /// Write a generated key into the record at this key path, creating intermediate objects.
    pub fn inject(&self, value: &mut Value, key: &Key) -> EngineResult<()> {
        let path = match self {
            KeyPath::Single(path) if !path.is_empty() => path,
            _ => {
                return Err(EngineError::Data(format!(
                    "cannot inject a generated key at key path {}",
                    self
                )))
            }
        };

        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop().unwrap_or_default();

        let mut current = value;
        for segment in segments {
            let object = current.as_object_mut().ok_or_else(|| not_an_object(path))?;
            current = object
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        current
            .as_object_mut()
            .ok_or_else(|| not_an_object(path))?
            .insert(last.to_string(), key.to_json());
        Ok(())
    }

    /// Whether the path is a single, non-empty path that a key generator can write to.
    fn supports_generator(&self) -> bool {
        matches!(self, KeyPath::Single(path) if !path.is_empty())
    }
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

fn not_an_object(path: &str) -> EngineError {
    EngineError::Data(format!(
        "cannot inject a key at '{}': value is not an object",
        path
    ))
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Single(path) => write!(f, "'{}'", path),
            KeyPath::Compound(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        KeyPath::Single(path.to_string())
    }
}

impl From<String> for KeyPath {
    fn from(path: String) -> Self {
        KeyPath::Single(path)
    }
}

impl From<Vec<&str>> for KeyPath {
    fn from(paths: Vec<&str>) -> Self {
        KeyPath::Compound(paths.into_iter().map(String::from).collect())
    }
}

/// Creation options for one collection, applied only when it is created during an upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<KeyPath>,
    #[serde(default)]
    pub auto_increment: bool,
}

impl CollectionConfig {
    /// Out-of-line keys, no key generator.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_path(mut self, key_path: impl Into<KeyPath>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }

    /// Reject option combinations IndexedDB refuses at creation time.
    pub fn validate(&self, name: &str) -> Result<(), String> {
        match &self.key_path {
            Some(path) if self.auto_increment && !path.supports_generator() => Err(format!(
                "collection '{}': autoIncrement requires a single non-empty key path, got {}",
                name, path
            )),
            Some(KeyPath::Compound(paths)) if paths.is_empty() => Err(format!(
                "collection '{}': compound key path must not be empty",
                name
            )),
            _ => Ok(()),
        }
    }
}

/// The desired set of collections, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    collections: BTreeMap<String, CollectionConfig>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a collection definition.
    pub fn insert(&mut self, name: impl Into<String>, config: CollectionConfig) {
        self.collections.insert(name.into(), config);
    }

    pub fn get(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CollectionConfig)> {
        self.collections
            .iter()
            .map(|(name, config)| (name.as_str(), config))
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Diff the desired schema against the collections that already exist.
    pub fn plan_upgrade<S: AsRef<str>>(
        &self,
        old_version: u32,
        new_version: u32,
        existing: &[S],
    ) -> UpgradePlan<'_> {
        let create = self
            .iter()
            .filter(|(name, _)| !existing.iter().any(|e| e.as_ref() == *name))
            .collect();
        UpgradePlan {
            old_version,
            new_version,
            create,
        }
    }
}

impl FromIterator<(String, CollectionConfig)> for Schema {
    fn from_iter<I: IntoIterator<Item = (String, CollectionConfig)>>(iter: I) -> Self {
        Self {
            collections: iter.into_iter().collect(),
        }
    }
}

/// Collections to create while upgrading from `old_version` to `new_version`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradePlan<'a> {
    pub old_version: u32,
    pub new_version: u32,
    pub create: Vec<(&'a str, &'a CollectionConfig)>,
}

impl UpgradePlan<'_> {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
    }

    /// Names of the collections the plan creates.
    pub fn collection_names(&self) -> Vec<&str> {
        self.create.iter().map(|(name, _)| *name).collect()
    }
}
