use std::{fs, path::Path};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{ReferenceStore, StoreError};

/// Table-backed reference store.
///
/// The serialized form doubles as the `--store` file format of the command-line binary:
///
/// ```yaml
/// blocks:
///   secret:
///     deploy-token:
///       value: ghp_example
///   gitcredentials:
///     ci:
///       username: marvin42
///       password: hunter2
/// variables:
///   region: us-east-1
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemoryReferenceStore {
    #[serde(default)]
    blocks: IndexMap<String, IndexMap<String, Value>>,
    #[serde(default)]
    variables: IndexMap<String, Value>,
}

impl InMemoryReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style block insert.
    pub fn with_block(mut self, block_type: impl Into<String>, name: impl Into<String>, document: Value) -> Self {
        self.insert_block(block_type, name, document);
        self
    }

    /// Builder-style variable insert.
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert_variable(name, value);
        self
    }

    pub fn insert_block(&mut self, block_type: impl Into<String>, name: impl Into<String>, document: Value) {
        let block_type = block_type.into().to_ascii_lowercase();
        self.blocks.entry(block_type).or_default().insert(name.into(), document);
    }

    pub fn insert_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Parse a YAML (or JSON) store document.
    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        let parsed: Self = serde_yaml::from_str(content)?;
        let mut store = Self {
            blocks: IndexMap::new(),
            variables: parsed.variables,
        };
        for (block_type, documents) in parsed.blocks {
            for (name, document) in documents {
                store.insert_block(block_type.as_str(), name, document);
            }
        }
        Ok(store)
    }

    /// Load a store document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|error| StoreError::Load {
            path: path.to_path_buf(),
            error: error.to_string(),
        })?;
        let store = Self::from_yaml_str(&content).map_err(|error| StoreError::Load {
            path: path.to_path_buf(),
            error: error.to_string(),
        })?;
        debug!(
            path = %path.display(),
            block_types = store.blocks.len(),
            variables = store.variables.len(),
            "loaded reference store file"
        );
        Ok(store)
    }
}

impl ReferenceStore for InMemoryReferenceStore {
    fn read_block(&self, block_type: &str, name: &str) -> Result<Value, StoreError> {
        self.blocks
            .get(&block_type.to_ascii_lowercase())
            .and_then(|documents| documents.get(name))
            .cloned()
            .ok_or_else(|| StoreError::BlockNotFound {
                block_type: block_type.to_string(),
                name: name.to_string(),
            })
    }

    fn read_variable(&self, name: &str) -> Result<Value, StoreError> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::VariableNotFound { name: name.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_types_compare_case_insensitively() {
        let store = InMemoryReferenceStore::new().with_block("GitCredentials", "ci", json!({"username": "marvin42"}));
        assert_eq!(store.read_block("gitcredentials", "ci").expect("block"), json!({"username": "marvin42"}));
        assert_eq!(store.read_block("GITCREDENTIALS", "ci").expect("block"), json!({"username": "marvin42"}));
    }

    #[test]
    fn missing_entries_are_reported() {
        let store = InMemoryReferenceStore::new().with_variable("region", json!("us"));
        assert_eq!(store.read_variable("region").expect("variable"), json!("us"));

        let error = store.read_variable("stage").expect_err("missing variable");
        assert_eq!(error.to_string(), "variable 'stage' was not found");
        let error = store.read_block("secret", "token").expect_err("missing block");
        assert_eq!(error.to_string(), "block 'secret/token' was not found");
    }

    #[test]
    fn loads_yaml_store_file() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("store.yaml");
        fs::write(
            &path,
            r#"
blocks:
  Secret:
    deploy-token:
      value: ghp_example
variables:
  test_variable_1: test_value_1
"#,
        )
        .expect("write store file");

        let store = InMemoryReferenceStore::from_file(&path).expect("load store");
        assert_eq!(store.read_block("secret", "deploy-token").expect("block"), json!({"value": "ghp_example"}));
        assert_eq!(store.read_variable("test_variable_1").expect("variable"), json!("test_value_1"));
    }

    #[test]
    fn unreadable_file_is_a_load_error() {
        let directory = tempfile::tempdir().expect("tempdir");
        let error = InMemoryReferenceStore::from_file(directory.path().join("missing.yaml")).expect_err("missing file");
        assert!(matches!(error, StoreError::Load { .. }));
    }
}
