//! Capture-value templating for action commands, URLs and JSON bodies.
//!
//! A template is literal text with `{{ name }}` substitutions. Whitespace
//! inside the braces is optional and a leading dot (`{{ .name }}`) is
//! accepted. Rendering never fails on a missing name: it produces
//! [`MISSING_VALUE`] instead. Only malformed syntax is an error.

use thiserror::Error;

use crate::matcher::CaptureMap;

/// Text substituted for a name that has no value in the capture map.
pub const MISSING_VALUE: &str = "<no value>";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Error returned when a template string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A `{{` without a matching `}}`.
    #[error("unclosed action starting at byte {offset}")]
    Unclosed {
        /// Byte offset of the opening braces.
        offset: usize,
    },
    /// A `{{ }}` with nothing inside.
    #[error("empty action at byte {offset}")]
    Empty {
        /// Byte offset of the opening braces.
        offset: usize,
    },
    /// The expression is not a plain value name.
    #[error("invalid value name '{name}' at byte {offset}")]
    InvalidName {
        /// The offending expression, trimmed.
        name: String,
        /// Byte offset of the opening braces.
        offset: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Value(String),
}

/// A parsed template, ready to be rendered any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template string.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] for an unclosed `{{`, an empty action or an
    /// expression that is not a value name.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut consumed = 0_usize;

        loop {
            let rest = &source[consumed..];
            let Some(start) = rest.find(OPEN) else {
                if !rest.is_empty() {
                    segments.push(Segment::Literal(rest.to_owned()));
                }
                break;
            };

            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_owned()));
            }

            let offset = consumed.saturating_add(start);
            let inner = &rest[start..][OPEN.len()..];
            let Some(end) = inner.find(CLOSE) else {
                return Err(TemplateError::Unclosed { offset });
            };

            let expr = inner[..end].trim();
            if expr.is_empty() {
                return Err(TemplateError::Empty { offset });
            }
            let name = expr.strip_prefix('.').unwrap_or(expr);
            if !is_value_name(name) {
                return Err(TemplateError::InvalidName {
                    name: expr.to_owned(),
                    offset,
                });
            }
            segments.push(Segment::Value(name.to_owned()));

            consumed = offset
                .saturating_add(OPEN.len())
                .saturating_add(end)
                .saturating_add(CLOSE.len());
        }

        Ok(Self { segments })
    }

    /// Render against a capture map. Missing names render as [`MISSING_VALUE`].
    pub fn render(&self, values: &CaptureMap) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Value(name) => {
                    out.push_str(values.get(name).map_or(MISSING_VALUE, String::as_str));
                }
            }
        }
        out
    }

    /// Names referenced by the template, in order of appearance.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Value(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

/// Parse and render a template in one step.
///
/// # Errors
///
/// Returns [`TemplateError`] if the template is malformed.
pub fn render(source: &str, values: &CaptureMap) -> Result<String, TemplateError> {
    Ok(Template::parse(source)?.render(values))
}

fn is_value_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
