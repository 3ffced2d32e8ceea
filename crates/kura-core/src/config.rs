//! Store configuration

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::schema::{CollectionConfig, Schema};

/// Name, version and collection schema of one database.
///
/// Deserializes from the same shape a browser caller would pass to IndexedDB:
///
/// ```json
/// { "name": "db1", "version": 1, "collections": { "notes": { "keyPath": "id" } } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub name: String,
    pub version: u32,
    #[serde(default, alias = "stores")]
    pub collections: Schema,
}

impl StoreConfig {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            collections: Schema::new(),
        }
    }

    /// Declare a collection (builder style).
    pub fn collection(mut self, name: impl Into<String>, config: CollectionConfig) -> Self {
        self.collections.insert(name, config);
        self
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let config: StoreConfig =
            serde_json::from_str(json).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.name.is_empty() {
            return Err(StoreError::Config("database name must not be empty".into()));
        }
        if self.version == 0 {
            return Err(StoreError::Config("version must be a positive integer".into()));
        }
        for (name, collection) in self.collections.iter() {
            collection.validate(name).map_err(StoreError::Config)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::KeyPath;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_json() {
        let config = StoreConfig::from_json(
            r#"{"name":"db1","version":2,"stores":{"notes":{"keyPath":"id"},"log":{"autoIncrement":true}}}"#,
        )
        .unwrap();

        assert_eq!(
            config,
            StoreConfig::new("db1", 2)
                .collection("notes", CollectionConfig::new().key_path("id"))
                .collection("log", CollectionConfig::new().auto_increment(true))
        );
        assert_eq!(
            config.collections.get("notes").unwrap().key_path,
            Some(KeyPath::from("id"))
        );
    }

    #[test]
    fn test_collections_default_to_empty() {
        let config = StoreConfig::from_json(r#"{"name":"db1","version":1}"#).unwrap();
        assert!(config.collections.is_empty());
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            StoreConfig::new("", 1).validate(),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::new("db", 0).validate(),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_json(r#"{"name":"db","version":1,"collections":{"a":{"keyPath":["x","y"],"autoIncrement":true}}}"#),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_json("not json"),
            Err(StoreError::Config(_))
        ));
    }
}
