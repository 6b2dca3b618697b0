//! Pipeline documents grouping step entries into named sections.
//!
//! Two authoring shapes are accepted:
//!
//! ```yaml
//! # a bare sequence, exposed as the `steps` section
//! - rigger.steps.run_shell_script:
//!     script: echo hello
//! ```
//!
//! ```yaml
//! name: api-service
//! build: []
//! pull:
//!   - rigger.steps.git_clone:
//!       repository: https://github.com/org/api-service.git
//! ```
//!
//! Entries stay raw JSON values here; their shape is validated by the engine right before a
//! section runs so that format errors carry the entry's position.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Section name given to documents authored as a bare sequence.
pub const DEFAULT_SECTION: &str = "steps";
/// Section preferred when a document declares several and none was requested.
const PREFERRED_SECTION: &str = "pull";

/// Parsed pipeline document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawPipelineDocument")]
pub struct PipelineDocument {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Step entries per section, in authoring order.
    pub sections: IndexMap<String, Vec<Value>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPipelineDocument {
    Steps(Vec<Value>),
    Sections {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(flatten)]
        sections: IndexMap<String, Value>,
    },
}

impl TryFrom<RawPipelineDocument> for PipelineDocument {
    type Error = DocumentError;

    fn try_from(raw: RawPipelineDocument) -> Result<Self, Self::Error> {
        match raw {
            RawPipelineDocument::Steps(entries) => {
                let mut sections = IndexMap::new();
                sections.insert(DEFAULT_SECTION.to_string(), entries);
                Ok(Self {
                    name: None,
                    description: None,
                    sections,
                })
            }
            RawPipelineDocument::Sections {
                name,
                description,
                sections: raw_sections,
            } => {
                let mut sections = IndexMap::with_capacity(raw_sections.len());
                for (section_name, value) in raw_sections {
                    let entries = match value {
                        Value::Array(entries) => entries,
                        Value::Null => Vec::new(),
                        _ => return Err(DocumentError::SectionNotASequence { section: section_name }),
                    };
                    sections.insert(section_name, entries);
                }
                Ok(Self {
                    name,
                    description,
                    sections,
                })
            }
        }
    }
}

impl PipelineDocument {
    /// Step entries of the named section.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::MissingSection`] listing the available sections.
    pub fn section(&self, name: &str) -> Result<&[Value], DocumentError> {
        self.sections
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| DocumentError::MissingSection {
                section: name.to_string(),
                available: self.sections.keys().cloned().collect(),
            })
    }

    /// Section to run when the caller did not name one.
    ///
    /// A single section is always chosen; otherwise `pull` wins, then `steps`.
    pub fn default_section_name(&self) -> Option<&str> {
        if self.sections.len() == 1 {
            return self.sections.keys().next().map(String::as_str);
        }
        [PREFERRED_SECTION, DEFAULT_SECTION]
            .into_iter()
            .find(|candidate| self.sections.contains_key(*candidate))
    }
}

/// Problems with the overall document layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("section '{section}' must be a sequence of steps")]
    SectionNotASequence { section: String },

    #[error("section '{section}' was not found; available sections: {}", .available.join(", "))]
    MissingSection { section: String, available: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_sequence_becomes_steps_section() {
        let yaml = r#"
- rigger.steps.run_shell_script:
    script: echo one
- rigger.steps.run_shell_script:
    script: echo two
"#;
        let document: PipelineDocument = serde_yaml::from_str(yaml).expect("parse bare sequence");
        assert_eq!(document.default_section_name(), Some(DEFAULT_SECTION));
        assert_eq!(document.section(DEFAULT_SECTION).expect("steps section").len(), 2);
    }

    #[test]
    fn sections_keep_authoring_order_and_prefer_pull() {
        let yaml = r#"
name: api-service
build: null
push: []
pull:
  - rigger.steps.git_clone:
      repository: https://github.com/org/api-service.git
"#;
        let document: PipelineDocument = serde_yaml::from_str(yaml).expect("parse sectioned document");
        assert_eq!(document.name.as_deref(), Some("api-service"));
        let names: Vec<&str> = document.sections.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["build", "push", "pull"]);
        assert!(document.section("build").expect("build section").is_empty());
        assert_eq!(document.default_section_name(), Some("pull"));
    }

    #[test]
    fn missing_section_lists_available_names() {
        let document: PipelineDocument = serde_yaml::from_str("build: []\npush: []\n").expect("parse");
        let error = document.section("deploy").expect_err("deploy is absent");
        assert_eq!(error.to_string(), "section 'deploy' was not found; available sections: build, push");
        assert_eq!(document.default_section_name(), None);
    }

    #[test]
    fn scalar_section_is_rejected() {
        let result = serde_yaml::from_str::<PipelineDocument>("pull: 3\n");
        assert!(result.is_err());
    }
}
