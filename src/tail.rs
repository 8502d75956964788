//! Line sources for file watch workers.
//!
//! [`FileTail`] follows a growing file much like `tail -F`: it starts at the
//! current end, waits for the file if it does not exist yet, and starts over
//! from the beginning when the file is truncated or replaced. Reads are
//! synchronous `std::fs` calls since they are quick local operations; a
//! [`notify`] watcher on the parent directory wakes the reader early, with a
//! poll interval as fallback.

use std::collections::VecDeque;
use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

/// Lines longer than this are dropped.
const MAX_LINE_LEN: usize = 1_048_576; // 1 MB safety limit.

/// Most bytes read from the file per check.
const READ_CHUNK: u64 = 65_536;

/// Errors produced while following a file.
#[derive(Debug, Error)]
pub enum TailError {
    /// The file exists but could not be opened.
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        /// File being followed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// File being followed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// An ordered, gap-free supply of lines for one watched file.
#[async_trait]
pub trait LineSource: Send {
    /// Wait for the next line, without its terminator.
    ///
    /// `Ok(None)` means the source has ended and no more lines will come.
    async fn next_line(&mut self) -> Result<Option<String>, TailError>;
}

/// Lines pushed through a channel. Ends when every sender is dropped.
#[derive(Debug)]
pub struct ChannelLineSource {
    rx: mpsc::Receiver<String>,
}

impl ChannelLineSource {
    /// Wrap an existing receiver.
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Create a bounded channel and the source reading from it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl LineSource for ChannelLineSource {
    async fn next_line(&mut self) -> Result<Option<String>, TailError> {
        Ok(self.rx.recv().await)
    }
}

/// How a [`FileTail`] follows its file.
#[derive(Debug, Clone)]
pub struct TailOptions {
    /// Longest wait between two checks of the file.
    pub poll_interval: Duration,
    /// Read existing content instead of starting at the current end.
    pub from_start: bool,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            from_start: false,
        }
    }
}

/// Identifies the file behind a path so replacement can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    // Replacement is only detected through truncation here.
    #[cfg(not(unix))]
    fn of(_metadata: &Metadata) -> Self {
        Self { dev: 0, ino: 0 }
    }
}

/// Follows one file and yields its new lines in order.
pub struct FileTail {
    path: PathBuf,
    poll_interval: Duration,
    identity: Option<FileIdentity>,
    offset: u64,
    partial: Vec<u8>,
    skipping_long_line: bool,
    ready: VecDeque<String>,
    wake: Arc<Notify>,
    _watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for FileTail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTail")
            .field("path", &self.path)
            .field("offset", &self.offset)
            .field("buffered_lines", &self.ready.len())
            .field("watching", &self._watcher.is_some())
            .finish()
    }
}

impl FileTail {
    /// Start following `path`.
    ///
    /// A missing file is not an error: lines are read from its start once it
    /// appears.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but its metadata cannot be read.
    pub fn open(path: impl Into<PathBuf>, options: &TailOptions) -> Result<Self, TailError> {
        let path = path.into();
        let (identity, offset) = match std::fs::metadata(&path) {
            Ok(metadata) => {
                let offset = if options.from_start { 0 } else { metadata.len() };
                (Some(FileIdentity::of(&metadata)), offset)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(file = %path.display(), "file does not exist yet, waiting for it");
                (None, 0)
            }
            Err(e) => return Err(TailError::Open { path, source: e }),
        };

        let wake = Arc::new(Notify::new());
        let watcher = start_watcher(&path, Arc::clone(&wake));

        Ok(Self {
            path,
            poll_interval: options.poll_interval,
            identity,
            offset,
            partial: Vec::new(),
            skipping_long_line: false,
            ready: VecDeque::new(),
            wake,
            _watcher: watcher,
        })
    }

    /// The followed path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read up to [`READ_CHUNK`] bytes appended since the last check.
    ///
    /// Returns `true` when more unread content remains.
    fn poll(&mut self) -> Result<bool, TailError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.identity.take().is_some() {
                    info!(file = %self.path.display(), "file removed, waiting for it to reappear");
                }
                return Ok(false);
            }
            Err(e) => {
                return Err(TailError::Open {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let metadata = file.metadata().map_err(|e| self.read_error(e))?;
        let identity = FileIdentity::of(&metadata);
        if self.identity != Some(identity) {
            if self.identity.is_some() {
                info!(file = %self.path.display(), "file replaced, reading from start");
            } else {
                debug!(file = %self.path.display(), "file appeared, reading from start");
            }
            self.restart();
            self.identity = Some(identity);
        }

        let len = metadata.len();
        if len < self.offset {
            info!(file = %self.path.display(), "file truncated, reading from start");
            self.restart();
        }
        if len == self.offset {
            return Ok(false);
        }

        file.seek(SeekFrom::Start(self.offset))
            .map_err(|e| self.read_error(e))?;
        let mut buf = Vec::new();
        file.by_ref()
            .take(len.saturating_sub(self.offset).min(READ_CHUNK))
            .read_to_end(&mut buf)
            .map_err(|e| self.read_error(e))?;

        self.offset = self
            .offset
            .saturating_add(u64::try_from(buf.len()).unwrap_or(u64::MAX));
        self.split_lines(&buf);
        Ok(!buf.is_empty() && self.offset < len)
    }

    /// Move complete lines from `bytes` into the ready queue, holding back a
    /// trailing partial line.
    fn split_lines(&mut self, bytes: &[u8]) {
        for chunk in bytes.split_inclusive(|b| *b == b'\n') {
            let Some(content) = chunk.strip_suffix(b"\n") else {
                if !self.skipping_long_line {
                    self.partial.extend_from_slice(chunk);
                    if self.partial.len() > MAX_LINE_LEN {
                        warn!(file = %self.path.display(), "line exceeds 1 MB, skipping it");
                        self.partial.clear();
                        self.skipping_long_line = true;
                    }
                }
                continue;
            };

            if self.skipping_long_line {
                self.skipping_long_line = false;
                self.partial.clear();
                continue;
            }

            self.partial.extend_from_slice(content);
            let mut line = std::mem::take(&mut self.partial);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.len() > MAX_LINE_LEN {
                warn!(file = %self.path.display(), "line exceeds 1 MB, skipping it");
                continue;
            }
            self.ready
                .push_back(String::from_utf8_lossy(&line).into_owned());
        }
    }

    fn restart(&mut self) {
        self.offset = 0;
        self.partial.clear();
        self.skipping_long_line = false;
    }

    fn read_error(&self, source: io::Error) -> TailError {
        TailError::Read {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl LineSource for FileTail {
    async fn next_line(&mut self) -> Result<Option<String>, TailError> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }
            let more = self.poll()?;
            if more || !self.ready.is_empty() {
                continue;
            }
            tokio::select! {
                () = self.wake.notified() => {}
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

/// Watch the file's directory and wake the reader on changes to the file.
///
/// Falls back to polling only when the watcher cannot be set up.
fn start_watcher(path: &Path, wake: Arc<Notify>) -> Option<RecommendedWatcher> {
    let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty())?;
    let file_name = path.file_name()?.to_owned();

    let watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if let Ok(evt) = event {
            if evt
                .paths
                .iter()
                .any(|p| p.file_name() == Some(file_name.as_os_str()))
            {
                wake.notify_one();
            }
        }
    });
    let mut watcher = match watcher {
        Ok(watcher) => watcher,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "file watcher unavailable, polling only");
            return None;
        }
    };

    if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
        debug!(dir = %dir.display(), error = %e, "cannot watch directory, polling only");
        return None;
    }
    Some(watcher)
}
