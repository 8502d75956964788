//! Configuration parsing, validation and path resolution.

use std::fs;
use std::path::Path;

use tailtrigger::config::{
    build_watches, load_config, parse_config, ConfigError, ConfigFormat, RuntimeSettings,
};
use tailtrigger::executor::ActionKind;
use tailtrigger::watch::WatchedFile;

fn build_yaml(yaml: &str, base_dir: &Path) -> Result<Vec<WatchedFile>, Vec<ConfigError>> {
    let config = parse_config(yaml, ConfigFormat::Yaml).expect("yaml should parse");
    build_watches(config, base_dir).map_err(|errors| errors.into_vec())
}

#[test]
fn default_settings() {
    let settings = RuntimeSettings::default();
    assert_eq!(settings.action_timeout.as_secs(), 5);
    assert!(!settings.verbose);
}

#[test]
fn valid_config_yields_one_watch_per_file() {
    let yaml = r#"
app.log:
  triggers:
    errors:
      match-regex: 'ERROR (?P<what>\w+)'
      actions:
        echo:
          type: local
          run-template: "echo {{what}}"
        notify:
          type: REST
          url-template: "http://localhost/alert?what={{what}}"
          http-verb: put
          user: foo
          pass: bar
/var/log/audit.log:
  record-delimiter: '^#'
  triggers: {}
"#;
    let watches = build_yaml(yaml, Path::new("/etc/tailtrigger")).expect("config should be valid");
    assert_eq!(watches.len(), 2);

    let audit = watches
        .iter()
        .find(|w| w.path() == Path::new("/var/log/audit.log"))
        .expect("absolute path kept as is");
    assert!(audit.delimiter().is_some());
    assert!(audit.triggers().is_empty());

    let app = watches
        .iter()
        .find(|w| w.path() == Path::new("/etc/tailtrigger/app.log"))
        .expect("relative path resolved against config dir");
    assert!(app.delimiter().is_none());
    let trigger = &app.triggers()[0];
    assert_eq!(trigger.name(), "errors");
    assert_eq!(trigger.actions().len(), 2);

    let ActionKind::Rest(rest) = trigger.actions()[1].kind() else {
        panic!("notify should be a rest action");
    };
    assert_eq!(rest.method, reqwest::Method::PUT);
    assert_eq!(rest.basic_auth.as_deref(), Some("Basic Zm9vOmJhcg=="));
    assert!(rest.json_template.is_none());
}

#[test]
fn http_verb_defaults_to_post() {
    let yaml = r#"
app.log:
  triggers:
    t:
      match-regex: 'x'
      actions:
        call:
          type: rest
          url-template: "http://localhost/"
"#;
    let watches = build_yaml(yaml, Path::new("/tmp")).expect("config should be valid");
    let ActionKind::Rest(rest) = watches[0].triggers()[0].actions()[0].kind() else {
        panic!("call should be a rest action");
    };
    assert_eq!(rest.method, reqwest::Method::POST);
    assert!(rest.basic_auth.is_none());
}

#[test]
fn local_action_without_command_is_rejected() {
    let yaml = r#"
app.log:
  triggers:
    t:
      match-regex: 'x'
      actions:
        broken:
          type: local
"#;
    let errors = build_yaml(yaml, Path::new("/tmp")).expect_err("config should be invalid");
    assert_eq!(errors.len(), 1);
    let message = errors[0].to_string();
    assert!(message.contains("run-template"), "unexpected message: {message}");
    assert!(message.contains("file: app.log, trigger: t, action: broken"));
}

#[test]
fn every_defect_is_reported() {
    let yaml = r#"
a.log:
  record-delimiter: '('
  triggers:
    no-regex:
      actions:
        x:
          type: local
          run-template: "true"
    bad-actions:
      match-regex: 'ok'
      actions:
        no-type:
          run-template: "true"
        weird:
          type: carrier-pigeon
        no-url:
          type: rest
        bad-verb:
          type: rest
          url-template: "http://localhost/"
          http-verb: "NOT A VERB"
        half-auth:
          type: rest
          url-template: "http://localhost/"
          user: foo
b.log:
  triggers:
    bad-regex:
      match-regex: '[unclosed'
"#;
    let errors = build_yaml(yaml, Path::new("/tmp")).expect_err("config should be invalid");
    assert_eq!(errors.len(), 8, "errors: {errors:#?}");

    let count = |pred: fn(&ConfigError) -> bool| errors.iter().filter(|e| pred(e)).count();
    assert_eq!(count(|e| matches!(e, ConfigError::InvalidPattern { .. })), 2);
    assert_eq!(count(|e| matches!(e, ConfigError::MissingField { .. })), 3);
    assert_eq!(count(|e| matches!(e, ConfigError::UnknownActionType { .. })), 1);
    assert_eq!(count(|e| matches!(e, ConfigError::InvalidHttpVerb { .. })), 1);
    assert_eq!(count(|e| matches!(e, ConfigError::PartialCredentials { .. })), 1);
}

#[test]
fn empty_config_is_rejected() {
    let errors = build_yaml("", Path::new("/tmp")).expect_err("nothing to watch");
    assert!(matches!(errors[0], ConfigError::NoWatches));
}

#[test]
fn unparsable_yaml_reports_parse_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tailtrigger.yaml");
    fs::write(&path, "app.log: [not, a, block").expect("write config");

    let errors = load_config(&path).expect_err("config should not parse");
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors.iter().next(), Some(ConfigError::Parse { .. })));
}

#[test]
fn includes_resolve_against_config_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir(dir.path().join("templates")).expect("create templates dir");
    fs::write(dir.path().join("templates/lock.regex"), "^locked (?P<user>\\w+)\r\n")
        .expect("write regex include");
    fs::write(dir.path().join("templates/lock.json"), "{\"user\": \"{{user}}\"}\n\n")
        .expect("write json include");
    let config = dir.path().join("tailtrigger.yaml");
    fs::write(
        &config,
        r#"
audit.log:
  triggers:
    lock:
      match-regex: '@templates/lock.regex'
      actions:
        call:
          type: rest
          url-template: "http://localhost/"
          json-template: '@templates/lock.json'
"#,
    )
    .expect("write config");

    let watches = load_config(&config).expect("config should be valid");
    assert_eq!(watches[0].path(), dir.path().join("audit.log"));

    let trigger = &watches[0].triggers()[0];
    assert_eq!(trigger.pattern().as_str(), "^locked (?P<user>\\w+)");
    let ActionKind::Rest(rest) = trigger.actions()[0].kind() else {
        panic!("call should be a rest action");
    };
    // Only the last line break is removed.
    assert_eq!(rest.json_template.as_deref(), Some("{\"user\": \"{{user}}\"}\n"));
}

#[test]
fn missing_include_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let yaml = r#"
app.log:
  triggers:
    t:
      match-regex: '@missing.regex'
"#;
    let errors = build_yaml(yaml, dir.path()).expect_err("include should fail");
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        ConfigError::Include { field: "match-regex", .. }
    ));
}

#[test]
fn toml_config_is_supported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("tailtrigger.toml");
    fs::write(
        &config,
        r#"
["app.log".triggers.errors]
match-regex = 'ERROR (?P<what>\w+)'

["app.log".triggers.errors.actions.echo]
type = "local"
run-template = "echo {{what}}"
"#,
    )
    .expect("write config");

    let watches = load_config(&config).expect("config should be valid");
    assert_eq!(watches.len(), 1);
    assert_eq!(watches[0].triggers()[0].actions()[0].name(), "echo");
}

#[test]
fn errors_display_one_per_line() {
    let yaml = r#"
app.log:
  triggers:
    t:
      actions:
        a:
          type: local
"#;
    let config = parse_config(yaml, ConfigFormat::Yaml).expect("yaml should parse");
    let errors = build_watches(config, Path::new("/tmp")).expect_err("config should be invalid");
    let rendered = errors.to_string();
    assert_eq!(rendered.lines().count(), 2);
    assert!(rendered.contains("\"match-regex\" missing [file: app.log, trigger: t]"));
}
