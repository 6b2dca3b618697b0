//! Placeholder scanning and reference parsing.
//!
//! A placeholder is a `{{ <expr> }}` span inside a string. `\{{` is an escaped literal `{{`,
//! and an opening `{{` without a matching `}}` (or with an empty expression) is plain text.

use serde_json::Value;

const PLACEHOLDER_OPEN: &str = "{{";
const PLACEHOLDER_CLOSE: &str = "}}";
const BLOCKS_PREFIX: &str = "store.blocks.";
const VARIABLES_PREFIX: &str = "store.variables.";

/// One piece of a scanned string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSegment<'a> {
    /// Literal text with escapes already applied.
    Literal(String),
    /// Trimmed placeholder expression without delimiters.
    Placeholder(&'a str),
}

/// Split a string into literal and placeholder segments.
pub fn parse_template(input: &str) -> Vec<TemplateSegment<'_>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut remainder = input;

    while let Some(start) = remainder.find(PLACEHOLDER_OPEN) {
        let before = &remainder[..start];
        if let Some(escaped_prefix) = before.strip_suffix('\\') {
            literal.push_str(escaped_prefix);
            literal.push_str(PLACEHOLDER_OPEN);
            remainder = &remainder[start + PLACEHOLDER_OPEN.len()..];
            continue;
        }
        literal.push_str(before);

        let after_open = &remainder[start + PLACEHOLDER_OPEN.len()..];
        let Some(end) = after_open.find(PLACEHOLDER_CLOSE) else {
            // No closing marker: the rest of the string is literal text.
            literal.push_str(&remainder[start..]);
            remainder = "";
            break;
        };

        let expression = after_open[..end].trim();
        let consumed = start + PLACEHOLDER_OPEN.len() + end + PLACEHOLDER_CLOSE.len();
        if expression.is_empty() {
            literal.push_str(&remainder[start..consumed]);
        } else {
            if !literal.is_empty() {
                segments.push(TemplateSegment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(TemplateSegment::Placeholder(expression));
        }
        remainder = &remainder[consumed..];
    }

    literal.push_str(remainder);
    if !literal.is_empty() {
        segments.push(TemplateSegment::Literal(literal));
    }
    segments
}

/// Extracts placeholder expressions from a string value, in order of appearance.
pub fn extract_placeholders(value: &str) -> Vec<&str> {
    parse_template(value)
        .into_iter()
        .filter_map(|segment| match segment {
            TemplateSegment::Placeholder(expression) => Some(expression),
            TemplateSegment::Literal(_) => None,
        })
        .collect()
}

/// What a placeholder expression refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference<'a> {
    /// `store.blocks.<type>.<name>[.<field>...]`
    Block {
        block_type: &'a str,
        name: &'a str,
        path: Vec<String>,
    },
    /// `store.variables.<name>[.<field>...]`
    Variable { name: &'a str, path: Vec<String> },
    /// `$NAME`
    Environment { name: &'a str },
    /// `<step_id>.<field>...` or a bare `<field>`
    Output { path: Vec<String> },
}

impl Reference<'_> {
    /// Short namespace label used in diagnostics and `rigger check` output.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Block { .. } => "block",
            Self::Variable { .. } => "variable",
            Self::Environment { .. } => "environment",
            Self::Output { .. } => "output",
        }
    }
}

/// Classify a placeholder expression.
///
/// Returns `None` for expressions that fit no namespace shape, such as `store.blocks.secret`
/// (missing block name) or a path with an unterminated bracket.
pub fn parse_reference(expression: &str) -> Option<Reference<'_>> {
    let expression = expression.trim();

    if let Some(remaining) = expression.strip_prefix(BLOCKS_PREFIX) {
        let mut parts = remaining.splitn(3, '.');
        let block_type = parts.next().filter(|part| !part.is_empty())?;
        let name = parts.next().filter(|part| !part.is_empty())?;
        let path = match parts.next() {
            Some(field_path) => parse_reference_path(field_path)?,
            None => Vec::new(),
        };
        return Some(Reference::Block { block_type, name, path });
    }

    if let Some(remaining) = expression.strip_prefix(VARIABLES_PREFIX) {
        let (name, field_path) = match remaining.split_once('.') {
            Some((name, field_path)) => (name, Some(field_path)),
            None => (remaining, None),
        };
        if name.is_empty() {
            return None;
        }
        let path = match field_path {
            Some(field_path) => parse_reference_path(field_path)?,
            None => Vec::new(),
        };
        return Some(Reference::Variable { name, path });
    }

    if let Some(name) = expression.strip_prefix('$') {
        return is_environment_name(name).then_some(Reference::Environment { name });
    }

    parse_reference_path(expression).map(|path| Reference::Output { path })
}

fn is_environment_name(name: &str) -> bool {
    let mut characters = name.chars();
    matches!(characters.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && characters.all(|character| character.is_ascii_alphanumeric() || character == '_')
}

/// Split a dotted path into segments, turning `items[0]` into `items`, `0`.
///
/// Returns `None` for empty paths, empty segments, and unterminated brackets.
pub fn parse_reference_path(path: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut characters = path.chars();
    let mut after_bracket = false;

    while let Some(character) = characters.next() {
        match character {
            '.' => {
                if current.is_empty() && !after_bracket {
                    return None;
                }
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                after_bracket = false;
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let mut inner = String::new();
                let mut closed = false;
                for next_character in characters.by_ref() {
                    if next_character == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(next_character);
                }
                let inner = inner.trim();
                if !closed || inner.is_empty() {
                    return None;
                }
                segments.push(inner.to_string());
                after_bracket = true;
            }
            _ => {
                current.push(character);
                after_bracket = false;
            }
        }
    }

    if !current.is_empty() {
        segments.push(current);
    } else if !after_bracket {
        return None;
    }
    Some(segments)
}

/// Placeholder found while walking a parameter tree.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PlaceholderRef {
    /// Location of the string inside the tree, for example `parameters.env.TOKEN`.
    pub source_path: String,
    /// Raw expression without delimiters.
    pub expression: String,
}

/// Collect every placeholder in an arbitrary JSON value tree.
pub fn collect_placeholders_from_value(value: &Value, source_path: &str, found: &mut Vec<PlaceholderRef>) {
    match value {
        Value::String(raw_text) => {
            for expression in extract_placeholders(raw_text) {
                found.push(PlaceholderRef {
                    source_path: source_path.to_string(),
                    expression: expression.to_string(),
                });
            }
        }
        Value::Array(values) => {
            for (index, nested_value) in values.iter().enumerate() {
                collect_placeholders_from_value(nested_value, format!("{source_path}[{index}]").as_str(), found);
            }
        }
        Value::Object(map) => {
            for (key, nested_value) in map {
                collect_placeholders_from_value(nested_value, format!("{source_path}.{key}").as_str(), found);
            }
        }
        _ => {}
    }
}
