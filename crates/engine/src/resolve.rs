//! # Placeholder Resolution
//!
//! Substitutes `{{ ... }}` placeholders inside arbitrary parameter trees before a step runs.
//!
//! ## Namespaces
//!
//! Expressions are matched against these shapes, in order:
//!
//! - `{{ store.blocks.<type>.<name> }}` - a block document from the [`ReferenceStore`]; a document
//!   consisting only of `value` collapses to that value, and trailing segments select a field
//! - `{{ store.variables.<name> }}` - a stored variable
//! - `{{ $NAME }}` - an environment variable; when unset the text `$NAME` is kept
//! - `{{ <step_id>.<field> }}` / `{{ <field> }}` - a step output, falling back to the root view
//!
//! ## Types
//!
//! A string that is exactly one placeholder is replaced by the resolved value with its native
//! type, so `"{{ store.blocks.gitcredentials.ci }}"` becomes a mapping. Placeholders embedded in
//! other text are stringified and concatenated.
//!
//! ## Usage
//!
//! ```rust
//! use rigger_engine::{OutputContext, resolve::{ResolutionContext, resolve_value}};
//! use rigger_util::{InMemoryReferenceStore, StaticEnvironment};
//! use serde_json::json;
//!
//! let mut outputs = OutputContext::new();
//! outputs.record(Some("clone"), json!({"directory": "api-service"}));
//! let environment = StaticEnvironment::new().with_var("STAGE", "prod");
//! let store = InMemoryReferenceStore::new().with_variable("region", json!("us"));
//! let context = ResolutionContext::new(&outputs, &environment, &store);
//!
//! let resolved = resolve_value(
//!     &json!({"cwd": "{{ clone.directory }}", "tag": "{{ $STAGE }}-{{ store.variables.region }}"}),
//!     &context,
//! )?;
//! assert_eq!(resolved, json!({"cwd": "api-service", "tag": "prod-us"}));
//! # Ok::<(), rigger_engine::resolve::ResolutionError>(())
//! ```

use rigger_util::{EnvironmentProvider, ReferenceStore, StoreError};
use serde_json::{Map as JsonMap, Value};
use thiserror::Error;
use tracing::debug;

use crate::{
    context::{OutputContext, select_segments},
    templates::{Reference, TemplateSegment, parse_reference, parse_template},
};

/// Sources consulted while resolving one step's parameters.
#[derive(Clone, Copy)]
pub struct ResolutionContext<'a> {
    pub outputs: &'a OutputContext,
    pub environment: &'a dyn EnvironmentProvider,
    pub store: &'a dyn ReferenceStore,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(outputs: &'a OutputContext, environment: &'a dyn EnvironmentProvider, store: &'a dyn ReferenceStore) -> Self {
        Self {
            outputs,
            environment,
            store,
        }
    }
}

/// A placeholder that could not be substituted.
#[derive(Debug, Error, Clone)]
pub enum ResolutionError {
    #[error("unresolved placeholder '{expression}': no step output or root field matches")]
    Unresolved { expression: String },

    #[error(
        "malformed placeholder '{expression}': expected store.blocks.<type>.<name>, store.variables.<name>, $NAME, or <step_id>.<field>"
    )]
    Malformed { expression: String },

    #[error("unresolved placeholder '{expression}': {source}")]
    Store {
        expression: String,
        #[source]
        source: StoreError,
    },

    #[error("unresolved placeholder '{expression}': the referenced document has no such field")]
    MissingField { expression: String },
}

/// Recursively resolves every placeholder in a JSON value.
///
/// Mapping keys are left untouched, sequence order is preserved, and non-string scalars pass
/// through unchanged.
///
/// # Errors
///
/// Returns the first [`ResolutionError`] encountered in traversal order.
pub fn resolve_value(value: &Value, context: &ResolutionContext<'_>) -> Result<Value, ResolutionError> {
    match value {
        Value::String(string_value) => resolve_string(string_value, context),
        Value::Array(array_values) => array_values
            .iter()
            .map(|array_value| resolve_value(array_value, context))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(object_map) => resolve_parameters(object_map, context).map(Value::Object),
        _ => Ok(value.clone()),
    }
}

/// Resolves each value of a parameter mapping.
pub fn resolve_parameters(
    parameters: &JsonMap<String, Value>,
    context: &ResolutionContext<'_>,
) -> Result<JsonMap<String, Value>, ResolutionError> {
    let mut resolved = JsonMap::new();
    for (key, value) in parameters {
        resolved.insert(key.clone(), resolve_value(value, context)?);
    }
    Ok(resolved)
}

fn resolve_string(input_string: &str, context: &ResolutionContext<'_>) -> Result<Value, ResolutionError> {
    let segments = parse_template(input_string);

    if let [TemplateSegment::Placeholder(expression)] = segments.as_slice() {
        return resolve_expression(expression, context);
    }

    let mut output_string = String::with_capacity(input_string.len());
    for segment in segments {
        match segment {
            TemplateSegment::Literal(text) => output_string.push_str(&text),
            TemplateSegment::Placeholder(expression) => {
                output_string.push_str(&format_json_value(&resolve_expression(expression, context)?));
            }
        }
    }
    Ok(Value::String(output_string))
}

/// Resolves a single placeholder expression (without delimiters) to its value.
pub fn resolve_expression(expression: &str, context: &ResolutionContext<'_>) -> Result<Value, ResolutionError> {
    let reference = parse_reference(expression).ok_or_else(|| ResolutionError::Malformed {
        expression: expression.to_string(),
    })?;

    match reference {
        Reference::Block { block_type, name, path } => {
            let document = context
                .store
                .read_block(block_type, name)
                .map_err(|source| ResolutionError::Store {
                    expression: expression.to_string(),
                    source,
                })?;
            if path.is_empty() {
                return Ok(collapse_block_document(document));
            }
            select_segments(&document, &path)
                .cloned()
                .ok_or_else(|| ResolutionError::MissingField {
                    expression: expression.to_string(),
                })
        }
        Reference::Variable { name, path } => {
            let value = context
                .store
                .read_variable(name)
                .map_err(|source| ResolutionError::Store {
                    expression: expression.to_string(),
                    source,
                })?;
            select_segments(&value, &path)
                .cloned()
                .ok_or_else(|| ResolutionError::MissingField {
                    expression: expression.to_string(),
                })
        }
        Reference::Environment { name } => match context.environment.var(name) {
            Some(value) => Ok(Value::String(value)),
            None => {
                debug!(variable = %name, "environment variable is unset; keeping placeholder text");
                Ok(Value::String(format!("${name}")))
            }
        },
        Reference::Output { path } => context
            .outputs
            .lookup(&path)
            .cloned()
            .ok_or_else(|| ResolutionError::Unresolved {
                expression: expression.to_string(),
            }),
    }
}

/// A block whose document is only `{"value": ...}` stands for that value.
fn collapse_block_document(document: Value) -> Value {
    match document {
        Value::Object(mut fields) if fields.len() == 1 && fields.contains_key("value") => {
            fields.remove("value").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Formats a JSON value for embedding into surrounding text.
///
/// - **Strings**: Returned as-is
/// - **Numbers / Booleans**: Display representation
/// - **Null**: Empty string
/// - **Objects / Arrays**: Compact JSON
pub fn format_json_value(value: &Value) -> String {
    match value {
        Value::String(string_value) => string_value.clone(),
        Value::Number(number_value) => number_value.to_string(),
        Value::Bool(boolean_value) => boolean_value.to_string(),
        Value::Null => String::new(),
        other_value => other_value.to_string(),
    }
}
