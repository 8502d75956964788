//! Regex matching with named-capture extraction.

use std::collections::BTreeMap;

use regex::Regex;

/// Capture-group name to matched text, produced by a successful match.
pub type CaptureMap = BTreeMap<String, String>;

/// A compiled regular expression.
///
/// Syntax is that of the [`regex`] crate; named groups are written
/// `(?P<name>...)` or `(?<name>...)`.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex compilation error.
    pub fn compile(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(source)?,
        })
    }

    /// The source text the pattern was compiled from.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Whether the pattern matches anywhere in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Names of all named capture groups, in group order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.regex.capture_names().flatten()
    }

    /// Match once against `text` and collect every named group.
    ///
    /// Returns `None` when the pattern does not match. Named groups that did
    /// not take part in the match map to an empty string, so the key set is
    /// always exactly [`Pattern::group_names`].
    pub fn captures(&self, text: &str) -> Option<CaptureMap> {
        let caps = self.regex.captures(text)?;
        let map = self
            .group_names()
            .map(|name| {
                let value = caps.name(name).map_or("", |m| m.as_str());
                (name.to_owned(), value.to_owned())
            })
            .collect();
        Some(map)
    }
}
