//! Grouping of a file's lines into records.
//!
//! Without a delimiter every line is a record. With a delimiter, lines are
//! buffered until one matches the delimiter; that line closes the record and
//! is itself dropped, unless nothing was buffered, in which case the
//! delimiter line alone is the record.

use crate::matcher::Pattern;

/// Turns an ordered line stream into complete records.
#[derive(Debug, Clone)]
pub struct RecordAssembler {
    delimiter: Option<Pattern>,
    buffer: String,
}

impl RecordAssembler {
    /// Create an assembler. `None` means one record per line.
    pub fn new(delimiter: Option<Pattern>) -> Self {
        Self {
            delimiter,
            buffer: String::new(),
        }
    }

    /// Feed the next line (without its terminator).
    ///
    /// Returns the record this line completes, if any.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        let Some(delimiter) = &self.delimiter else {
            return Some(line.to_owned());
        };

        // The delimiter sees the line with its terminator restored.
        let terminated = format!("{line}\n");
        if !delimiter.is_match(&terminated) {
            self.buffer.push_str(&terminated);
            return None;
        }

        if self.buffer.is_empty() {
            return Some(line.to_owned());
        }
        Some(std::mem::take(&mut self.buffer))
    }

    /// Text buffered towards a record that has not been closed yet.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Whether a delimiter pattern is in use.
    pub fn is_delimited(&self) -> bool {
        self.delimiter.is_some()
    }
}
