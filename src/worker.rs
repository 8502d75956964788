//! File watch workers and their supervisor.
//!
//! Each watched file gets one worker task that owns the file's record
//! assembler and runs matched actions itself, so records of one file are
//! handled strictly in order. Workers share nothing; one worker stopping or
//! panicking never affects another.

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::RuntimeSettings;
use crate::dispatch::Dispatcher;
use crate::executor::{ExecutionResult, Executor};
use crate::record::RecordAssembler;
use crate::tail::{FileTail, LineSource, TailError, TailOptions};
use crate::trigger::evaluate_triggers;
use crate::watch::WatchedFile;

/// Reasons a worker cannot start or has to stop.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The HTTP client for REST actions could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    /// The watched file could not be followed.
    #[error(transparent)]
    Tail(#[from] TailError),
}

/// Processes the lines of one watched file.
#[derive(Debug)]
pub struct FileWatchWorker {
    watch: WatchedFile,
    assembler: RecordAssembler,
    dispatcher: Dispatcher,
    verbose: bool,
}

impl FileWatchWorker {
    /// Create a worker for `watch`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(watch: WatchedFile, settings: &RuntimeSettings) -> Result<Self, WorkerError> {
        let executor = Executor::new(settings.action_timeout)?;
        let dispatcher = Dispatcher::new(watch.path().display().to_string(), executor);
        let assembler = RecordAssembler::new(watch.delimiter().cloned());
        Ok(Self {
            watch,
            assembler,
            dispatcher,
            verbose: settings.verbose,
        })
    }

    /// The file this worker watches.
    pub fn watched_file(&self) -> &WatchedFile {
        &self.watch
    }

    /// Feed one line; run the actions of every trigger matching the record
    /// it completes.
    ///
    /// Returns the results of all actions run, in order.
    pub async fn handle_line(&mut self, line: &str) -> Vec<ExecutionResult> {
        let Some(record) = self.assembler.push_line(line) else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for (trigger, captures) in evaluate_triggers(self.watch.triggers(), &record) {
            if self.verbose {
                info!(
                    file = %self.watch.path().display(),
                    trigger = trigger.name(),
                    captures = ?captures,
                    "trigger matched"
                );
            } else {
                info!(file = %self.watch.path().display(), trigger = trigger.name(), "trigger matched");
            }
            results.extend(self.dispatcher.dispatch(trigger, &captures).await);
        }
        results
    }

    /// Process lines from `source` until it ends, fails, or `shutdown`
    /// turns `true`.
    ///
    /// # Errors
    ///
    /// Returns the source's error if reading fails.
    pub async fn run<S: LineSource>(
        mut self,
        mut source: S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), WorkerError> {
        info!(
            file = %self.watch.path().display(),
            started_at = %chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            delimited = self.assembler.is_delimited(),
            triggers = self.watch.triggers().len(),
            "starting triggers"
        );

        let outcome = loop {
            if *shutdown.borrow() {
                break Ok(());
            }
            tokio::select! {
                next = source.next_line() => match next {
                    Ok(Some(line)) => {
                        self.handle_line(&line).await;
                    }
                    Ok(None) => {
                        debug!(file = %self.watch.path().display(), "line source ended");
                        break Ok(());
                    }
                    Err(e) => break Err(WorkerError::from(e)),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                }
            }
        };

        if !self.assembler.pending().is_empty() {
            debug!(
                file = %self.watch.path().display(),
                pending = self.assembler.pending(),
                "discarding unterminated record"
            );
        }
        outcome
    }
}

/// Owns one worker task per watched file.
#[derive(Debug)]
pub struct Supervisor {
    tasks: JoinSet<(PathBuf, Result<(), WorkerError>)>,
    shutdown_tx: watch::Sender<bool>,
}

impl Supervisor {
    /// Start a worker following each watched file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error, without starting anything, if any worker cannot
    /// be created.
    pub fn start(
        watches: Vec<WatchedFile>,
        settings: &RuntimeSettings,
        options: &TailOptions,
    ) -> Result<Self, WorkerError> {
        Self::start_with(watches, settings, |watch| FileTail::open(watch.path(), options))
    }

    /// Start a worker per watched file, reading lines from the source
    /// `open` returns for it.
    ///
    /// # Errors
    ///
    /// Returns an error, without starting anything, if any worker or source
    /// cannot be created.
    pub fn start_with<S, F>(
        watches: Vec<WatchedFile>,
        settings: &RuntimeSettings,
        mut open: F,
    ) -> Result<Self, WorkerError>
    where
        S: LineSource + 'static,
        F: FnMut(&WatchedFile) -> Result<S, TailError>,
    {
        let mut prepared = Vec::with_capacity(watches.len());
        for watch in watches {
            let source = open(&watch)?;
            prepared.push((FileWatchWorker::new(watch, settings)?, source));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        for (worker, source) in prepared {
            let path = worker.watched_file().path().to_path_buf();
            let shutdown = shutdown_rx.clone();
            tasks.spawn(async move { (path, worker.run(source, shutdown).await) });
        }
        info!(workers = tasks.len(), "workers started");

        Ok(Self { tasks, shutdown_tx })
    }

    /// Number of workers still running.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether every worker has stopped.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait until every worker has stopped, logging how each one ended.
    pub async fn wait(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((path, Ok(()))) => {
                    info!(file = %path.display(), "worker stopped");
                }
                Ok((path, Err(e))) => {
                    error!(file = %path.display(), error = %e, "worker failed");
                }
                Err(e) if e.is_panic() => {
                    error!(error = %e, "worker panicked");
                }
                Err(e) => {
                    warn!(error = %e, "worker cancelled");
                }
            }
        }
    }

    /// Signal every worker to stop and wait for them.
    ///
    /// Actions already running are allowed to finish.
    pub async fn shutdown(mut self) {
        info!(workers = self.tasks.len(), "stopping workers");
        // Err only when every worker is already gone.
        let _ = self.shutdown_tx.send(true);
        self.wait().await;
    }
}
