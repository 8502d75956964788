//! Triggers: a named pattern plus the actions it fires.

use crate::executor::Action;
use crate::matcher::{CaptureMap, Pattern};

/// A named pattern and the actions to run when a record matches it.
#[derive(Debug, Clone)]
pub struct Trigger {
    name: String,
    pattern: Pattern,
    actions: Vec<Action>,
}

impl Trigger {
    /// Create a trigger. A trigger without actions is valid but never does
    /// anything.
    pub fn new(name: impl Into<String>, pattern: Pattern, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            pattern,
            actions,
        }
    }

    /// Trigger name, unique within its watched file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The match pattern.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Actions in the order they run.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Match the pattern once against the whole record.
    pub fn evaluate(&self, record: &str) -> Option<CaptureMap> {
        self.pattern.captures(record)
    }
}

/// Evaluate every trigger against a record, keeping those that match.
///
/// Triggers are independent: one trigger's match never affects another's.
pub fn evaluate_triggers<'a>(triggers: &'a [Trigger], record: &str) -> Vec<(&'a Trigger, CaptureMap)> {
    triggers
        .iter()
        .filter_map(|trigger| trigger.evaluate(record).map(|captures| (trigger, captures)))
        .collect()
}
