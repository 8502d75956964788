//! A watched file and everything configured for it.

use std::path::{Path, PathBuf};

use crate::matcher::Pattern;
use crate::trigger::Trigger;

/// One file under observation.
#[derive(Debug, Clone)]
pub struct WatchedFile {
    path: PathBuf,
    delimiter: Option<Pattern>,
    triggers: Vec<Trigger>,
}

impl WatchedFile {
    /// Create a watched file. `delimiter` of `None` means one record per line.
    pub fn new(path: impl Into<PathBuf>, delimiter: Option<Pattern>, triggers: Vec<Trigger>) -> Self {
        Self {
            path: path.into(),
            delimiter,
            triggers,
        }
    }

    /// Absolute path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record delimiter pattern.
    pub fn delimiter(&self) -> Option<&Pattern> {
        self.delimiter.as_ref()
    }

    /// Triggers evaluated against each record.
    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }
}
