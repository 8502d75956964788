//! Runs a matched trigger's actions.

use tracing::instrument;

use crate::executor::{Action, ExecutionResult, Executor};
use crate::matcher::CaptureMap;
use crate::trigger::Trigger;

/// Runs the actions of matched triggers for one watched file.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    file: String,
    executor: Executor,
}

impl Dispatcher {
    /// Create a dispatcher for the file at `file`.
    pub fn new(file: impl Into<String>, executor: Executor) -> Self {
        Self {
            file: file.into(),
            executor,
        }
    }

    /// Run every action of `trigger` in order with the same captures.
    ///
    /// Actions run one at a time; a failed action does not stop the rest.
    pub async fn dispatch(&self, trigger: &Trigger, captures: &CaptureMap) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(trigger.actions().len());
        for action in trigger.actions() {
            results.push(self.run_action(trigger.name(), action, captures).await);
        }
        results
    }

    #[instrument(
        name = "action",
        skip_all,
        fields(file = %self.file, trigger = %trigger, action = %action.name(), kind = action.kind().tag())
    )]
    async fn run_action(&self, trigger: &str, action: &Action, captures: &CaptureMap) -> ExecutionResult {
        self.executor.execute(action, captures).await
    }
}
