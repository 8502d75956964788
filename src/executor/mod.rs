//! Action model and execution.
//!
//! An [`Action`] is either a local shell command or a REST call. Running one
//! never returns an error: every outcome, including template and transport
//! failures, is classified into an [`ExecutionResult`] and logged.

use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, info, warn};

use crate::matcher::CaptureMap;
use crate::template::TemplateError;

pub mod local;
pub mod rest;

/// Placeholder that replaces line terminators in captured output.
pub const LINE_PLACEHOLDER: &str = "\u{2424}";

/// Longest output, in characters, written to a single log line.
const MAX_LOGGED_OUTPUT_CHARS: usize = 512;

/// A named action attached to a trigger.
#[derive(Debug, Clone)]
pub struct Action {
    name: String,
    kind: ActionKind,
}

impl Action {
    /// Create an action.
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Action name, unique within its trigger.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the action does.
    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }
}

/// The side effect an action performs.
#[derive(Debug, Clone)]
pub enum ActionKind {
    /// Run a shell command.
    Local(LocalAction),
    /// Send an HTTP request.
    Rest(RestAction),
}

impl ActionKind {
    /// Configuration tag of this kind (`local` or `rest`).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Rest(_) => "rest",
        }
    }
}

/// A shell command rendered from captured values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAction {
    /// Template for the command line passed to the shell.
    pub run_template: String,
}

/// An HTTP request rendered from captured values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestAction {
    /// Template for the request URL.
    pub url_template: String,
    /// HTTP method.
    pub method: reqwest::Method,
    /// Template for the JSON request body. `None` sends no body.
    pub json_template: Option<String>,
    /// Precomputed `Authorization` header value.
    pub basic_auth: Option<String>,
}

impl RestAction {
    /// Create a `POST` action with no body and no credentials.
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            method: reqwest::Method::POST,
            json_template: None,
            basic_auth: None,
        }
    }
}

/// Build a Basic-Auth `Authorization` header value.
pub fn basic_auth_header(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
}

/// Why an action invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// The action succeeded.
    None,
    /// A template could not be rendered; nothing was executed.
    Template,
    /// The local command failed or timed out.
    Runtime,
    /// The HTTP exchange could not be completed.
    Connection,
    /// The HTTP exchange completed with a 4xx or 5xx status.
    Rest,
}

impl FailureCategory {
    /// Label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Template => "template",
            Self::Runtime => "runtime",
            Self::Connection => "connection",
            Self::Rest => "REST",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one action invocation.
///
/// Built by one of the constructors at the point where the outcome is known;
/// never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    has_run: bool,
    category: FailureCategory,
    output: String,
    http_status: Option<u16>,
    error: Option<String>,
}

impl ExecutionResult {
    /// A template failed to render before anything ran.
    pub fn template_failure(err: &TemplateError) -> Self {
        Self {
            has_run: false,
            category: FailureCategory::Template,
            output: String::new(),
            http_status: None,
            error: Some(err.to_string()),
        }
    }

    /// A command exited cleanly with the given raw output.
    pub fn completed(raw_output: &str) -> Self {
        Self {
            has_run: true,
            category: FailureCategory::None,
            output: single_line(raw_output),
            http_status: None,
            error: None,
        }
    }

    /// A command failed, timed out or could not be started.
    pub fn runtime_failure(raw_output: &str, error: impl Into<String>) -> Self {
        Self {
            has_run: true,
            category: FailureCategory::Runtime,
            output: single_line(raw_output),
            http_status: None,
            error: Some(error.into()),
        }
    }

    /// No HTTP response was received.
    pub fn connection_failure(error: impl Into<String>) -> Self {
        Self {
            has_run: false,
            category: FailureCategory::Connection,
            output: String::new(),
            http_status: None,
            error: Some(error.into()),
        }
    }

    /// An HTTP response was received. Statuses 400-599 are failures whose
    /// message is the response body.
    pub fn http_response(status: u16, raw_body: &str) -> Self {
        let body = single_line(raw_body);
        let failed = (400..=599).contains(&status);
        Self {
            has_run: true,
            category: if failed {
                FailureCategory::Rest
            } else {
                FailureCategory::None
            },
            error: failed.then(|| body.clone()),
            output: body,
            http_status: Some(status),
        }
    }

    /// Whether the command or request was actually carried out.
    pub fn has_run(&self) -> bool {
        self.has_run
    }

    /// Whether the action succeeded.
    pub fn success(&self) -> bool {
        self.category == FailureCategory::None
    }

    /// Failure classification, [`FailureCategory::None`] on success.
    pub fn category(&self) -> FailureCategory {
        self.category
    }

    /// Command output or response body, trimmed and on a single line.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// HTTP status, when a response was received.
    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    /// Failure message.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Trim surrounding whitespace and replace every line terminator with
/// [`LINE_PLACEHOLDER`].
pub fn single_line(raw: &str) -> String {
    raw.trim()
        .replace("\r\n", LINE_PLACEHOLDER)
        .replace(['\n', '\r'], LINE_PLACEHOLDER)
}

/// Runs actions with a shared HTTP client and per-action timeout.
#[derive(Debug, Clone)]
pub struct Executor {
    client: reqwest::Client,
    timeout: Duration,
}

impl Executor {
    /// Create an executor whose actions are each bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }

    /// Run one action with the given captures.
    pub async fn execute(&self, action: &Action, captures: &CaptureMap) -> ExecutionResult {
        let result = match action.kind() {
            ActionKind::Local(local) => local::run(local, captures, self.timeout).await,
            ActionKind::Rest(rest) => rest::run(&self.client, rest, captures, self.timeout).await,
        };
        log_outcome(&result);
        result
    }
}

fn log_outcome(result: &ExecutionResult) {
    let output = truncate_for_log(result.output());
    match result.category() {
        FailureCategory::None => {
            info!(success = true, status = result.http_status(), "action finished");
        }
        category => {
            warn!(
                success = false,
                category = %category,
                status = result.http_status(),
                error = result.error().unwrap_or_default(),
                "action failed"
            );
        }
    }
    if result.has_run() {
        debug!(output = %output, "action output");
    }
}

fn truncate_for_log(output: &str) -> String {
    if output.is_empty() {
        return "<none>".to_owned();
    }
    if output.chars().count() > MAX_LOGGED_OUTPUT_CHARS {
        let shortened = output
            .chars()
            .take(MAX_LOGGED_OUTPUT_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }
    output.to_owned()
}
