//! Configuration loading and validation.
//!
//! A configuration maps each watched file to its triggers, and each trigger
//! to its actions. It is written in YAML, or in TOML when the file name ends
//! in `.toml`. Validation does not stop at the first problem: every defect is
//! collected into [`ConfigErrors`] so they can all be fixed in one pass.
//!
//! Regex and template values starting with `@` are replaced by the contents
//! of the file they name, resolved against the configuration directory, with
//! a single trailing line terminator removed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::executor::{basic_auth_header, Action, ActionKind, LocalAction, RestAction};
use crate::matcher::Pattern;
use crate::template::Template;
use crate::trigger::Trigger;
use crate::watch::WatchedFile;

mod sample;

pub use sample::SAMPLE_CONFIG;

/// Configuration file used when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "tailtrigger.yaml";

/// Per-action timeout used when none is given.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Process-wide knobs that are not part of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Upper bound for each command or REST call.
    pub action_timeout: Duration,
    /// Log rendered commands, requests and outputs.
    pub verbose: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verbose: false,
        }
    }
}

/// Parsed but unvalidated configuration: file name to file block.
pub type ConfigFile = BTreeMap<String, FileBlock>;

/// Settings for one watched file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileBlock {
    /// Regex for the line that closes a multi-line record.
    #[serde(default)]
    pub record_delimiter: Option<String>,

    /// Triggers by name.
    #[serde(default)]
    pub triggers: Option<BTreeMap<String, TriggerBlock>>,
}

/// Settings for one trigger.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TriggerBlock {
    /// Regex matched against each record.
    #[serde(default)]
    pub match_regex: Option<String>,

    /// Actions by name.
    #[serde(default)]
    pub actions: Option<BTreeMap<String, ActionBlock>>,
}

/// Settings for one action.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ActionBlock {
    /// `local` or `rest`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Command template for `local` actions.
    #[serde(default)]
    pub run_template: Option<String>,

    /// URL template for `rest` actions.
    #[serde(default)]
    pub url_template: Option<String>,

    /// HTTP method for `rest` actions (default `POST`).
    #[serde(default)]
    pub http_verb: Option<String>,

    /// JSON body template for `rest` actions.
    #[serde(default)]
    pub json_template: Option<String>,

    /// Basic-Auth user for `rest` actions.
    #[serde(default)]
    pub user: Option<String>,

    /// Basic-Auth password for `rest` actions.
    #[serde(default)]
    pub pass: Option<String>,
}

/// Where in the configuration a problem was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Watched file name as written in the configuration.
    pub file: String,
    /// Trigger name.
    pub trigger: Option<String>,
    /// Action name.
    pub action: Option<String>,
}

impl Location {
    fn file(name: &str) -> Self {
        Self {
            file: name.to_owned(),
            trigger: None,
            action: None,
        }
    }

    fn trigger(&self, name: &str) -> Self {
        Self {
            trigger: Some(name.to_owned()),
            ..self.clone()
        }
    }

    fn action(&self, name: &str) -> Self {
        Self {
            action: Some(name.to_owned()),
            ..self.clone()
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file: {}", self.file)?;
        if let Some(trigger) = &self.trigger {
            write!(f, ", trigger: {trigger}")?;
        }
        if let Some(action) = &self.action {
            write!(f, ", action: {action}")?;
        }
        Ok(())
    }
}

/// A single configuration defect.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// Configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration file is not valid YAML/TOML for this schema.
    #[error("failed to parse {}: {message}", .path.display())]
    Parse {
        /// Configuration file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
    /// The configuration declares no files.
    #[error("no files to watch")]
    NoWatches,
    /// A required field is absent or empty.
    #[error("\"{field}\" missing [{location}]")]
    MissingField {
        /// Field name as written in the configuration.
        field: &'static str,
        /// Where the field was expected.
        location: Location,
    },
    /// A regex does not compile.
    #[error("\"{field}\" is not a valid regex [{location}]: {source}")]
    InvalidPattern {
        /// Field name as written in the configuration.
        field: &'static str,
        /// Where the regex was found.
        location: Location,
        /// Compiler error.
        source: regex::Error,
    },
    /// An `@` include could not be read.
    #[error("\"{field}\" include {} could not be read [{location}]: {source}", .path.display())]
    Include {
        /// Field name as written in the configuration.
        field: &'static str,
        /// Resolved include path.
        path: PathBuf,
        /// Where the include was found.
        location: Location,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The action `type` is neither `local` nor `rest`.
    #[error("\"type\" must be \"local\" or \"rest\", got \"{value}\" [{location}]")]
    UnknownActionType {
        /// The given type.
        value: String,
        /// Where the action was declared.
        location: Location,
    },
    /// The `http-verb` is not a valid HTTP method.
    #[error("\"http-verb\" is not a valid HTTP method: \"{value}\" [{location}]")]
    InvalidHttpVerb {
        /// The given verb.
        value: String,
        /// Where the action was declared.
        location: Location,
    },
    /// Only one of `user` and `pass` was given.
    #[error("\"user\" and \"pass\" must be given together [{location}]")]
    PartialCredentials {
        /// Where the action was declared.
        location: Location,
    },
}

/// Every defect found in a configuration.
#[derive(Debug)]
pub struct ConfigErrors(Vec<ConfigError>);

impl ConfigErrors {
    /// The individual errors, in the order they were found.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigError> {
        self.0.iter()
    }

    /// Number of errors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false` for errors returned by this module.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume into the list of errors.
    pub fn into_vec(self) -> Vec<ConfigError> {
        self.0
    }
}

impl From<ConfigError> for ConfigErrors {
    fn from(err: ConfigError) -> Self {
        Self(vec![err])
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigErrors {}

/// Syntax of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML (the default).
    Yaml,
    /// TOML, for files ending in `.toml`.
    Toml,
}

impl ConfigFormat {
    /// Pick the format from the file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

/// Parse configuration text without validating it.
///
/// # Errors
///
/// Returns the parser's message when the text does not fit the schema.
pub fn parse_config(contents: &str, format: ConfigFormat) -> Result<ConfigFile, String> {
    if contents.trim().is_empty() {
        return Ok(ConfigFile::new());
    }
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
        ConfigFormat::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
    }
}

/// Read, parse and validate a configuration file.
///
/// Relative watched file names and `@` includes resolve against the
/// directory holding the configuration file.
///
/// # Errors
///
/// Returns every defect found; a read or parse failure is reported alone.
pub fn load_config(path: &Path) -> Result<Vec<WatchedFile>, ConfigErrors> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&contents, ConfigFormat::from_path(path)).map_err(|message| {
        ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        }
    })?;
    build_watches(config, &config_dir(path))
}

/// Validate a parsed configuration into watched files.
///
/// # Errors
///
/// Returns every defect found. No watched file is returned unless the whole
/// configuration is valid.
pub fn build_watches(config: ConfigFile, base_dir: &Path) -> Result<Vec<WatchedFile>, ConfigErrors> {
    if config.is_empty() {
        return Err(ConfigError::NoWatches.into());
    }

    let mut builder = Builder {
        base_dir,
        errors: Vec::new(),
    };
    let watches: Vec<WatchedFile> = config
        .into_iter()
        .map(|(name, block)| builder.file(&name, block))
        .collect();

    if builder.errors.is_empty() {
        Ok(watches)
    } else {
        Err(ConfigErrors(builder.errors))
    }
}

/// Directory that relative paths in the configuration resolve against.
fn config_dir(path: &Path) -> PathBuf {
    std::path::absolute(path)
        .ok()
        .and_then(|abs| abs.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn resolve_path(name: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Accumulates errors while turning blocks into domain types.
struct Builder<'a> {
    base_dir: &'a Path,
    errors: Vec<ConfigError>,
}

impl Builder<'_> {
    fn file(&mut self, name: &str, block: FileBlock) -> WatchedFile {
        let location = Location::file(name);

        let delimiter = non_empty(block.record_delimiter)
            .and_then(|raw| self.pattern("record-delimiter", &raw, &location));

        let triggers = block
            .triggers
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(trigger_name, trigger)| {
                self.trigger(&location.trigger(&trigger_name), &trigger_name, trigger)
            })
            .collect();

        WatchedFile::new(resolve_path(name, self.base_dir), delimiter, triggers)
    }

    fn trigger(&mut self, location: &Location, name: &str, block: TriggerBlock) -> Option<Trigger> {
        let pattern = match non_empty(block.match_regex) {
            Some(raw) => self.pattern("match-regex", &raw, location),
            None => {
                self.errors.push(ConfigError::MissingField {
                    field: "match-regex",
                    location: location.clone(),
                });
                None
            }
        };

        let actions: Vec<Action> = block
            .actions
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(action_name, action)| {
                self.action(&location.action(&action_name), &action_name, action)
            })
            .collect();

        let pattern = pattern?;
        warn_unknown_names(&pattern, &actions, location);
        Some(Trigger::new(name, pattern, actions))
    }

    fn action(&mut self, location: &Location, name: &str, block: ActionBlock) -> Option<Action> {
        let tag = block.kind.clone().unwrap_or_default();
        let kind = match tag.trim().to_ascii_lowercase().as_str() {
            "" => {
                self.errors.push(ConfigError::MissingField {
                    field: "type",
                    location: location.clone(),
                });
                return None;
            }
            "local" => self.local_action(location, block)?,
            "rest" => self.rest_action(location, block)?,
            _ => {
                self.errors.push(ConfigError::UnknownActionType {
                    value: tag,
                    location: location.clone(),
                });
                return None;
            }
        };
        Some(Action::new(name, kind))
    }

    fn local_action(&mut self, location: &Location, block: ActionBlock) -> Option<ActionKind> {
        let Some(raw) = non_empty(block.run_template) else {
            self.errors.push(ConfigError::MissingField {
                field: "run-template",
                location: location.clone(),
            });
            return None;
        };
        let run_template = self.expand("run-template", &raw, location)?;
        Some(ActionKind::Local(LocalAction { run_template }))
    }

    fn rest_action(&mut self, location: &Location, block: ActionBlock) -> Option<ActionKind> {
        let url_template = match non_empty(block.url_template) {
            Some(raw) => self.expand("url-template", &raw, location),
            None => {
                self.errors.push(ConfigError::MissingField {
                    field: "url-template",
                    location: location.clone(),
                });
                None
            }
        };

        let method = self.method(block.http_verb.as_deref(), location);

        let json_template = match non_empty(block.json_template) {
            Some(raw) => self
                .expand("json-template", &raw, location)
                .map(|json| Some(json).filter(|j| !j.is_empty())),
            None => Some(None),
        };

        let basic_auth = self.credentials(block.user, block.pass, location);

        Some(ActionKind::Rest(RestAction {
            url_template: url_template?,
            method: method?,
            json_template: json_template?,
            basic_auth: basic_auth?,
        }))
    }

    fn method(&mut self, verb: Option<&str>, location: &Location) -> Option<reqwest::Method> {
        let verb = verb.map(str::trim).unwrap_or_default();
        if verb.is_empty() {
            return Some(reqwest::Method::POST);
        }
        match reqwest::Method::from_bytes(verb.to_ascii_uppercase().as_bytes()) {
            Ok(method) => Some(method),
            Err(_) => {
                self.errors.push(ConfigError::InvalidHttpVerb {
                    value: verb.to_owned(),
                    location: location.clone(),
                });
                None
            }
        }
    }

    /// `Some(None)` when no credentials are configured.
    fn credentials(
        &mut self,
        user: Option<String>,
        pass: Option<String>,
        location: &Location,
    ) -> Option<Option<String>> {
        let user = user.filter(|u| !u.is_empty());
        let pass = pass.filter(|p| !p.is_empty());
        match (user, pass) {
            (Some(user), Some(pass)) => Some(Some(basic_auth_header(&user, &pass))),
            (None, None) => Some(None),
            _ => {
                self.errors.push(ConfigError::PartialCredentials {
                    location: location.clone(),
                });
                None
            }
        }
    }

    fn pattern(&mut self, field: &'static str, raw: &str, location: &Location) -> Option<Pattern> {
        let source = self.expand(field, raw, location)?;
        match Pattern::compile(&source) {
            Ok(pattern) => Some(pattern),
            Err(source) => {
                self.errors.push(ConfigError::InvalidPattern {
                    field,
                    location: location.clone(),
                    source,
                });
                None
            }
        }
    }

    /// Resolve an `@` include, or return the value unchanged.
    fn expand(&mut self, field: &'static str, raw: &str, location: &Location) -> Option<String> {
        let Some(include) = raw.strip_prefix('@') else {
            return Some(raw.to_owned());
        };
        let path = resolve_path(include.trim_start_matches('@'), self.base_dir);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let trimmed = contents.strip_suffix('\n').unwrap_or(&contents);
                let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
                Some(trimmed.to_owned())
            }
            Err(source) => {
                self.errors.push(ConfigError::Include {
                    field,
                    path,
                    location: location.clone(),
                    source,
                });
                None
            }
        }
    }
}

/// Warn about template names the trigger's regex never captures; they
/// render as a placeholder at runtime.
fn warn_unknown_names(pattern: &Pattern, actions: &[Action], location: &Location) {
    let groups: BTreeSet<&str> = pattern.group_names().collect();
    for action in actions {
        let templates: Vec<&str> = match action.kind() {
            ActionKind::Local(local) => vec![local.run_template.as_str()],
            ActionKind::Rest(rest) => {
                let mut templates = vec![rest.url_template.as_str()];
                templates.extend(rest.json_template.as_deref());
                templates
            }
        };
        for source in templates {
            let Ok(template) = Template::parse(source) else {
                continue;
            };
            for name in template.names().filter(|name| !groups.contains(name)) {
                warn!(
                    location = %location.action(action.name()),
                    name,
                    "template uses a value the match-regex does not capture"
                );
            }
        }
    }
}
