//! Tailtrigger: run actions when lines or records in log files match.
//!
//! Each configured file is followed like `tail -F`. New lines are grouped
//! into records, every trigger's regex is matched against each record, and
//! the actions of matching triggers run with the regex's named captures
//! substituted into their templates. Actions either run a local command or
//! send a REST request.
//!
//! See `DESIGN.md` for the architecture.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod matcher;
pub mod record;
pub mod template;
pub mod trigger;
pub mod watch;

pub mod dispatch;
pub mod executor;

pub mod tail;
pub mod worker;
