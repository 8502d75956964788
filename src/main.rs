//! Tailtrigger CLI entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use tailtrigger::config::{
    self, ConfigErrors, RuntimeSettings, DEFAULT_CONFIG_FILE, DEFAULT_TIMEOUT_SECS, SAMPLE_CONFIG,
};
use tailtrigger::logging;
use tailtrigger::tail::TailOptions;
use tailtrigger::worker::Supervisor;

/// Trigger actions by matching regexes in log files.
#[derive(Debug, Parser)]
#[command(name = "tailtrigger", version, about, disable_version_flag = true)]
struct Cli {
    /// Print version.
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,

    /// Configuration file.
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log rendered commands, requests and action output.
    #[arg(short = 'd', long)]
    debug: bool,

    /// Timeout in seconds for each action.
    #[arg(
        short = 't',
        long,
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// Print a sample configuration and exit.
    #[arg(short = 's', long)]
    sample_config: bool,

    /// Also write JSON logs to this directory, rotated daily.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.sample_config {
        println!("{SAMPLE_CONFIG}");
        return Ok(());
    }

    anyhow::ensure!(cli.config.exists(), "can not find {}", cli.config.display());

    let _log_guard = match &cli.log_dir {
        Some(dir) => Some(logging::init_production(dir, cli.debug)?),
        None => {
            logging::init_cli(cli.debug);
            None
        }
    };

    let watches = match config::load_config(&cli.config) {
        Ok(watches) => watches,
        Err(errors) => {
            report_config_errors(&errors);
            std::process::exit(1);
        }
    };

    let settings = RuntimeSettings {
        action_timeout: Duration::from_secs(cli.timeout),
        verbose: cli.debug,
    };
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        files = watches.len(),
        timeout_secs = cli.timeout,
        "tailtrigger starting"
    );

    let mut supervisor = Supervisor::start(watches, &settings, &TailOptions::default())
        .context("failed to start workers")?;

    tokio::select! {
        () = supervisor.wait() => {
            warn!("all workers stopped");
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("received shutdown signal, stopping workers");
        }
    }

    supervisor.shutdown().await;
    Ok(())
}

fn report_config_errors(errors: &ConfigErrors) {
    eprintln!("Errors found:");
    for err in errors.iter() {
        eprintln!("{err}.");
    }
    eprintln!("Bailing out...");
}
