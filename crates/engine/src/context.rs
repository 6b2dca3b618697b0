//! Output context threaded through a pipeline run.
//!
//! Step results are reachable two ways: by the step's `id` (`{{ clone.directory }}`) and through
//! a flattened *root view* (`{{ directory }}`). The root view is a per-key last-write-wins merge
//! of every mapping result, so an untagged reference always sees the most recent step that
//! produced that key.

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value};

/// Accumulated step results for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputContext {
    steps: IndexMap<String, Value>,
    root: JsonMap<String, Value>,
}

impl OutputContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose root view starts out as `seed`.
    ///
    /// Nested mappings in the seed are reachable with dotted references, so a caller can hand
    /// over outputs of an earlier run in their merged form.
    pub fn seeded(seed: JsonMap<String, Value>) -> Self {
        Self {
            steps: IndexMap::new(),
            root: seed,
        }
    }

    /// Result stored under a step id.
    pub fn step_output(&self, id: &str) -> Option<&Value> {
        self.steps.get(id)
    }

    /// Ids of tagged steps in execution order.
    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    /// Flattened view of the most recent values per key.
    pub fn root(&self) -> &JsonMap<String, Value> {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.root.is_empty()
    }

    /// Merge a successful step result.
    ///
    /// Mapping results overwrite the matching keys of the root view; any result is stored in
    /// full under `id` when one was declared.
    pub fn record(&mut self, id: Option<&str>, output: Value) {
        if let Value::Object(fields) = &output {
            for (key, value) in fields {
                self.root.insert(key.clone(), value.clone());
            }
        }
        if let Some(id) = id {
            self.steps.insert(id.to_string(), output);
        }
    }

    /// Resolve a reference path: the named step's result first, then the root view.
    ///
    /// `["clone", "directory"]` finds the `directory` field of step `clone`; a single segment
    /// returns a whole step result or a root-view value. Numeric segments index into sequences.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (head, rest) = path.split_first()?;
        let head = head.as_ref();
        if let Some(output) = self.steps.get(head)
            && let Some(found) = select_segments(output, rest)
        {
            return Some(found);
        }
        select_segments(self.root.get(head)?, rest)
    }

    /// The flat mapping handed back to callers: the root view with every step id on top.
    pub fn merged(&self) -> JsonMap<String, Value> {
        let mut merged = self.root.clone();
        for (id, output) in &self.steps {
            merged.insert(id.clone(), output.clone());
        }
        merged
    }

    pub fn into_merged(self) -> JsonMap<String, Value> {
        let mut merged = self.root;
        merged.extend(self.steps);
        merged
    }
}

/// Walk `segments` into `value`, indexing mappings by key and sequences by position.
pub(crate) fn select_segments<'a, S: AsRef<str>>(value: &'a Value, segments: &[S]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        let segment = segment.as_ref();
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_stores_tagged_results_and_overwrites_root_keys() {
        let mut context = OutputContext::new();
        context.record(Some("a"), json!({"stdout": "X", "stderr": ""}));
        context.record(None, json!({"stdout": "Y"}));

        assert_eq!(context.lookup(&["a", "stdout"]), Some(&json!("X")));
        assert_eq!(context.lookup(&["stdout"]), Some(&json!("Y")));
        assert_eq!(context.lookup(&["stderr"]), Some(&json!("")));
        assert_eq!(context.step_ids().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn non_mapping_results_only_land_under_their_id() {
        let mut context = OutputContext::new();
        context.record(Some("count"), json!(3));
        context.record(None, json!("ignored"));

        assert_eq!(context.lookup(&["count"]), Some(&json!(3)));
        assert!(context.root().is_empty());
    }

    #[test]
    fn lookup_falls_back_to_root_and_indexes_sequences() {
        let mut seed = JsonMap::new();
        seed.insert("deploy".into(), json!({"targets": [{"host": "a"}, {"host": "b"}]}));
        let mut context = OutputContext::seeded(seed);
        context.record(Some("deploy"), json!({"status": "ok"}));

        assert_eq!(context.lookup(&["deploy", "status"]), Some(&json!("ok")));
        // The tagged result has no `targets`, so the seeded root value answers.
        assert_eq!(context.lookup(&["deploy", "targets", "1", "host"]), Some(&json!("b")));
        assert_eq!(context.lookup(&["deploy", "targets", "9"]), None);
        assert_eq!(context.lookup(&["targets", "1", "host"]), None);
        assert_eq!(context.lookup::<&str>(&[]), None);
    }

    #[test]
    fn merged_places_step_ids_over_root_keys() {
        let mut context = OutputContext::new();
        context.record(Some("why_not_to_panic"), json!({"stdout": "this is a test", "stderr": ""}));
        context.record(None, json!({"stdout": "Don't Panic: this is a test", "stderr": ""}));

        let expected = json!({
            "why_not_to_panic": {"stdout": "this is a test", "stderr": ""},
            "stdout": "Don't Panic: this is a test",
            "stderr": ""
        });
        assert_eq!(Value::Object(context.merged()), expected);
        assert_eq!(Value::Object(context.into_merged()), expected);
    }
}
