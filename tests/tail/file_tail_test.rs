//! Following files on disk.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tailtrigger::tail::{FileTail, LineSource, TailOptions};

fn options() -> TailOptions {
    TailOptions {
        poll_interval: Duration::from_millis(20),
        from_start: false,
    }
}

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("open for append");
    file.write_all(text.as_bytes()).expect("append");
}

async fn next(tail: &mut FileTail) -> String {
    tokio::time::timeout(Duration::from_secs(5), tail.next_line())
        .await
        .expect("a line should arrive")
        .expect("read should succeed")
        .expect("tail never ends")
}

#[tokio::test]
async fn starts_at_end_of_existing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    append(&path, "old line\n");

    let mut tail = FileTail::open(&path, &options()).expect("open tail");
    append(&path, "new line\n");
    assert_eq!(next(&mut tail).await, "new line");
}

#[tokio::test]
async fn from_start_reads_existing_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    append(&path, "first\nsecond\n");

    let opts = TailOptions {
        from_start: true,
        ..options()
    };
    let mut tail = FileTail::open(&path, &opts).expect("open tail");
    assert_eq!(next(&mut tail).await, "first");
    assert_eq!(next(&mut tail).await, "second");
}

#[tokio::test]
async fn partial_line_waits_for_terminator() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    append(&path, "");

    let mut tail = FileTail::open(&path, &options()).expect("open tail");
    append(&path, "half");
    let early = tokio::time::timeout(Duration::from_millis(200), tail.next_line()).await;
    assert!(early.is_err(), "unterminated line must not be yielded");

    append(&path, " done\r\n");
    assert_eq!(next(&mut tail).await, "half done");
}

#[tokio::test]
async fn waits_for_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("later.log");

    let mut tail = FileTail::open(&path, &options()).expect("missing file is not an error");
    assert_eq!(tail.path(), path.as_path());

    append(&path, "created\n");
    assert_eq!(next(&mut tail).await, "created");
}

#[tokio::test]
async fn truncation_restarts_from_beginning() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    append(&path, "");

    let mut tail = FileTail::open(&path, &options()).expect("open tail");
    append(&path, "a fairly long line before rotation\n");
    assert_eq!(next(&mut tail).await, "a fairly long line before rotation");

    fs::write(&path, "short\n").expect("truncate and rewrite");
    assert_eq!(next(&mut tail).await, "short");
}

#[cfg(unix)]
#[tokio::test]
async fn replaced_file_is_read_from_start() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    append(&path, "");

    let mut tail = FileTail::open(&path, &options()).expect("open tail");
    append(&path, "before\n");
    assert_eq!(next(&mut tail).await, "before");

    let rotated = dir.path().join("app.log.1");
    fs::rename(&path, &rotated).expect("rotate");
    let staged = dir.path().join("app.log.new");
    fs::write(&staged, "after rotation with more bytes\n").expect("write new file");
    fs::rename(&staged, &path).expect("move new file in place");

    assert_eq!(next(&mut tail).await, "after rotation with more bytes");
}

#[tokio::test]
async fn large_file_is_read_in_order_across_chunks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    let contents: String = (0..20_000).map(|i| format!("line {i:05}\n")).collect();
    fs::write(&path, contents).expect("write file");

    let opts = TailOptions {
        from_start: true,
        ..options()
    };
    let mut tail = FileTail::open(&path, &opts).expect("open tail");
    for i in 0..20_000 {
        assert_eq!(next(&mut tail).await, format!("line {i:05}"));
    }
}
