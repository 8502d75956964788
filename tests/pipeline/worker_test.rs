//! File watch worker and supervisor tests.

use std::time::Duration;

use tailtrigger::config::RuntimeSettings;
use tailtrigger::executor::{Action, ActionKind, FailureCategory, LocalAction, LINE_PLACEHOLDER};
use tailtrigger::matcher::Pattern;
use tailtrigger::tail::ChannelLineSource;
use tailtrigger::trigger::Trigger;
use tailtrigger::watch::WatchedFile;
use tailtrigger::worker::{FileWatchWorker, Supervisor};

fn local(name: &str, run_template: &str) -> Action {
    Action::new(
        name,
        ActionKind::Local(LocalAction {
            run_template: run_template.to_owned(),
        }),
    )
}

fn pattern(source: &str) -> Pattern {
    Pattern::compile(source).expect("pattern should compile")
}

fn worker(watch: WatchedFile) -> FileWatchWorker {
    FileWatchWorker::new(watch, &RuntimeSettings::default()).expect("worker should build")
}

#[tokio::test]
async fn matching_line_runs_action_with_captures() {
    let trigger = Trigger::new("dn", pattern(r"(?P<dn>^dn:.+)$"), vec![local("echo", "echo {{dn}}")]);
    let mut worker = worker(WatchedFile::new("/var/log/audit.log", None, vec![trigger]));

    let results = worker.handle_line("dn: uid=bob").await;
    assert_eq!(results.len(), 1);
    assert!(results[0].has_run());
    assert!(results[0].success());
    assert_eq!(results[0].category(), FailureCategory::None);
    assert_eq!(results[0].output(), "dn: uid=bob");
}

#[tokio::test]
async fn non_matching_line_runs_nothing() {
    let trigger = Trigger::new("dn", pattern(r"^dn:"), vec![local("echo", "echo hit")]);
    let mut worker = worker(WatchedFile::new("/var/log/audit.log", None, vec![trigger]));

    assert!(worker.handle_line("uid: bob").await.is_empty());
}

#[tokio::test]
async fn delimited_record_excludes_delimiter_line() {
    let trigger = Trigger::new(
        "body",
        pattern(r"(?s)^(?P<body>.+)$"),
        vec![local("echo", "echo \"{{body}}\"")],
    );
    let watch = WatchedFile::new("/var/log/audit.log", Some(pattern("^#")), vec![trigger]);
    let mut worker = worker(watch);

    assert!(worker.handle_line("a").await.is_empty());
    assert!(worker.handle_line("b").await.is_empty());
    let results = worker.handle_line("#c").await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].output(), format!("a{LINE_PLACEHOLDER}b"));
}

#[tokio::test]
async fn failing_trigger_does_not_block_others() {
    let failing = Trigger::new("fail", pattern("ERROR"), vec![local("exit", "exit 3")]);
    let echo = Trigger::new(
        "echo",
        pattern(r"ERROR (?P<what>\w+)"),
        vec![local("echo", "echo {{what}}")],
    );
    let mut worker = worker(WatchedFile::new("/var/log/app.log", None, vec![failing, echo]));

    let results = worker.handle_line("ERROR disk").await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].category(), FailureCategory::Runtime);
    assert!(results[1].success());
    assert_eq!(results[1].output(), "disk");
}

#[tokio::test]
async fn supervisor_runs_workers_until_sources_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out.txt");
    let command = format!("echo {{{{user}}}} >> '{}'", out.display());
    let trigger = Trigger::new(
        "login",
        pattern(r"login (?P<user>\w+)"),
        vec![local("record", &command)],
    );
    let watch = WatchedFile::new(dir.path().join("app.log"), None, vec![trigger]);

    let mut senders = Vec::new();
    let mut supervisor = Supervisor::start_with(vec![watch], &RuntimeSettings::default(), |_| {
        let (tx, source) = ChannelLineSource::channel(8);
        senders.push(tx);
        Ok(source)
    })
    .expect("supervisor should start");
    assert_eq!(supervisor.len(), 1);

    let tx = senders.pop().expect("one source opened");
    for line in ["login alice", "noise", "login bob"] {
        tx.send(line.to_owned()).await.expect("worker should receive");
    }
    drop(tx);

    tokio::time::timeout(Duration::from_secs(10), supervisor.wait())
        .await
        .expect("workers should stop when sources end");
    assert!(supervisor.is_empty());

    let written = std::fs::read_to_string(&out).expect("actions should write output");
    assert_eq!(written, "alice\nbob\n");
}

#[tokio::test]
async fn shutdown_stops_idle_workers() {
    let watches = vec![
        WatchedFile::new("/var/log/a.log", None, Vec::new()),
        WatchedFile::new("/var/log/b.log", None, Vec::new()),
    ];
    let mut senders = Vec::new();
    let supervisor = Supervisor::start_with(watches, &RuntimeSettings::default(), |_| {
        let (tx, source) = ChannelLineSource::channel(1);
        senders.push(tx);
        Ok(source)
    })
    .expect("supervisor should start");
    assert_eq!(supervisor.len(), 2);

    tokio::time::timeout(Duration::from_secs(5), supervisor.shutdown())
        .await
        .expect("shutdown should not hang while sources stay open");
    drop(senders);
}
