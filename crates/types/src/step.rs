//! Step entries as authored in a pipeline document.
//!
//! A step entry is a mapping with exactly one key, the qualified step name, whose value is
//! the parameter mapping handed to the step operation:
//!
//! ```yaml
//! - rigger.steps.run_shell_script:
//!     id: greet
//!     script: echo hello
//! ```
//!
//! The reserved parameters `id` and `requires` are lifted out of the parameter mapping while
//! parsing so that they never reach the operation itself.

use serde_json::{Map as JsonMap, Value};
use thiserror::Error;

/// Reserved parameter naming the step for later `{{ <id>.<field> }}` references.
pub const STEP_ID_KEY: &str = "id";
/// Reserved parameter naming the package(s) expected to provide the step.
pub const STEP_REQUIRES_KEY: &str = "requires";
/// All parameters removed from the mapping before resolution.
pub const RESERVED_PARAMETER_KEYS: [&str; 2] = [STEP_ID_KEY, STEP_REQUIRES_KEY];

/// A validated step entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSpec {
    /// Fully qualified step name, for example `rigger.steps.git_clone`.
    pub name: String,
    /// Optional identifier under which the step result is stored.
    pub id: Option<String>,
    /// Packages declared through the `requires` parameter.
    pub requires: Vec<String>,
    /// Parameters with the reserved keys removed; placeholders are still unresolved.
    pub parameters: JsonMap<String, Value>,
}

impl StepSpec {
    /// Validate a raw step entry and split out its reserved parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] when the entry is not a mapping, carries zero or more than one
    /// top-level key, has a non-mapping parameter value, or declares a reserved parameter with
    /// the wrong type. A `null` parameter value is accepted as an empty mapping.
    pub fn from_value(entry: &Value) -> Result<Self, FormatError> {
        let Value::Object(entry_map) = entry else {
            return Err(FormatError::NotAMapping {
                found: json_kind(entry),
            });
        };

        if entry_map.len() > 1 {
            return Err(FormatError::AdditionalKeys {
                keys: entry_map.keys().cloned().collect(),
            });
        }

        let Some((name, raw_parameters)) = entry_map.iter().next() else {
            return Err(FormatError::Empty);
        };
        if name.trim().is_empty() {
            return Err(FormatError::Empty);
        }

        let mut parameters = match raw_parameters {
            Value::Object(map) => map.clone(),
            Value::Null => JsonMap::new(),
            other => {
                return Err(FormatError::ParametersNotAMapping {
                    name: name.clone(),
                    found: json_kind(other),
                });
            }
        };

        let id = match parameters.remove(STEP_ID_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(identifier)) if !identifier.trim().is_empty() => Some(identifier),
            Some(_) => return Err(FormatError::InvalidId { name: name.clone() }),
        };

        let requires = match parameters.remove(STEP_REQUIRES_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(package)) => vec![package],
            Some(Value::Array(packages)) => packages
                .into_iter()
                .map(|package| match package {
                    Value::String(package) => Ok(package),
                    _ => Err(FormatError::InvalidRequires { name: name.clone() }),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(FormatError::InvalidRequires { name: name.clone() }),
        };

        Ok(Self {
            name: name.clone(),
            id,
            requires,
            parameters,
        })
    }

    /// Last dot-separated segment of the qualified name, used in progress lines.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(self.name.as_str())
    }
}

/// Malformed step entry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("step entry has an unexpected shape: expected a mapping with a single step name, found {found}")]
    NotAMapping { found: &'static str },

    #[error("step entry has an unexpected shape: no step name was provided")]
    Empty,

    #[error("step entry has unexpected additional keys: expected exactly one step name, found {}", .keys.join(", "))]
    AdditionalKeys { keys: Vec<String> },

    #[error("step '{name}' has unexpected parameters: expected a mapping, found {found}")]
    ParametersNotAMapping { name: String, found: &'static str },

    #[error("step '{name}' has an unexpected 'id': expected a non-empty string")]
    InvalidId { name: String },

    #[error("step '{name}' has an unexpected 'requires': expected a string or a list of strings")]
    InvalidRequires { name: String },
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_splits_reserved_parameters() {
        let entry = json!({
            "rigger.steps.run_shell_script": {
                "id": "greet",
                "requires": "rigger-extras>=1.0",
                "script": "echo hello"
            }
        });

        let spec = StepSpec::from_value(&entry).expect("valid step");
        assert_eq!(spec.name, "rigger.steps.run_shell_script");
        assert_eq!(spec.id.as_deref(), Some("greet"));
        assert_eq!(spec.requires, vec!["rigger-extras>=1.0".to_string()]);
        assert_eq!(spec.parameters.len(), 1);
        assert_eq!(spec.parameters["script"], "echo hello");
        assert_eq!(spec.short_name(), "run_shell_script");
    }

    #[test]
    fn from_value_rejects_additional_keys() {
        let entry = json!({
            "rigger.steps.run_shell_script": {"script": "echo 'this is a test'"},
            "jedi": 0
        });

        let error = StepSpec::from_value(&entry).expect_err("two keys are rejected");
        assert!(matches!(error, FormatError::AdditionalKeys { .. }));
        assert!(error.to_string().contains("unexpected"), "message: {error}");
        assert!(error.to_string().contains("jedi"), "message: {error}");
    }

    #[test]
    fn from_value_rejects_empty_and_non_mapping_entries() {
        let empty = StepSpec::from_value(&json!({})).expect_err("empty mapping is rejected");
        assert_eq!(empty, FormatError::Empty);
        assert!(empty.to_string().contains("unexpected"));

        let scalar = StepSpec::from_value(&json!("rigger.steps.git_clone")).expect_err("string entry is rejected");
        assert!(scalar.to_string().contains("found a string"), "message: {scalar}");
    }

    #[test]
    fn from_value_treats_null_parameters_as_empty() {
        let yaml = "rigger.steps.pip_install_requirements:\n";
        let entry: Value = serde_yaml::from_str(yaml).expect("yaml parses");

        let spec = StepSpec::from_value(&entry).expect("null parameters are allowed");
        assert!(spec.parameters.is_empty());
        assert!(spec.id.is_none());
    }

    #[test]
    fn from_value_validates_reserved_parameter_types() {
        let numeric_id = json!({"a.b": {"id": 7}});
        assert!(matches!(StepSpec::from_value(&numeric_id), Err(FormatError::InvalidId { .. })));

        let bad_requires = json!({"a.b": {"requires": [1, 2]}});
        assert!(matches!(StepSpec::from_value(&bad_requires), Err(FormatError::InvalidRequires { .. })));

        let list_requires = json!({"a.b": {"requires": ["one", "two"]}});
        let spec = StepSpec::from_value(&list_requires).expect("list of packages");
        assert_eq!(spec.requires, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn short_name_without_dots_is_the_full_name() {
        let spec = StepSpec::from_value(&json!({"deploy": {}})).expect("valid step");
        assert_eq!(spec.short_name(), "deploy");
    }
}
