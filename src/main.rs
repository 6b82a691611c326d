//! Fit Runner - runs table-driven acceptance test documents
//!
//! Executes every matching document below a source directory and writes a
//! hierarchical HTML summary of the results.

use anyhow::Result;
use clap::Parser;
use fit_runner::{Cli, CommandExecutor, Config, RunOutcome, TestRunner};
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// CLI Output Module
mod cli_output {
    //! Styled end-of-run summary on stdout

    use crossterm::{
        QueueableCommand,
        style::{Color, Print, Stylize},
    };
    use fit_runner::{Counts, FileTestResult};
    use std::io::{self, Write};
    use std::path::Path;

    const RULE_WIDTH: usize = 60;

    fn rule(out: &mut impl Write) -> io::Result<()> {
        out.queue(Print(format!("{}\n", "─".repeat(RULE_WIDTH))))?;
        Ok(())
    }

    /// Heading between two rules, centered
    pub fn heading(out: &mut impl Write, title: &str) -> io::Result<()> {
        let padding = RULE_WIDTH.saturating_sub(title.len()) / 2;
        rule(out)?;
        out.queue(Print(" ".repeat(padding)))?
            .queue(Print(title.bold()))?
            .queue(Print("\n"))?;
        rule(out)
    }

    /// One line per tally; non-zero problem counts are colored
    pub fn counts(out: &mut impl Write, counts: Counts) -> io::Result<()> {
        let lines = [
            ("right", counts.right, Color::Green),
            ("wrong", counts.wrong, Color::Red),
            ("exceptions", counts.exceptions, Color::Red),
            ("ignored", counts.ignored, Color::Yellow),
        ];
        for (key, value, color) in lines {
            let value = if value == 0 {
                value.to_string().bold()
            } else {
                value.to_string().with(color).bold()
            };
            field(out, key, value)?;
        }
        Ok(())
    }

    pub fn field(out: &mut impl Write, key: &str, value: impl std::fmt::Display) -> io::Result<()> {
        out.queue(Print(format!("  {}: ", key.with(Color::DarkGrey))))?
            .queue(Print(value))?
            .queue(Print("\n"))?;
        Ok(())
    }

    /// Documents that produced no result, with the reason
    pub fn failed_documents(out: &mut impl Write, failed: &[&FileTestResult]) -> io::Result<()> {
        if failed.is_empty() {
            return Ok(());
        }
        rule(out)?;
        out.queue(Print("✗ ".red().bold()))?.queue(Print(format!(
            "{} documents could not be executed\n",
            failed.len()
        )))?;
        for result in failed {
            let reason = result.error.as_deref().unwrap_or("unknown error");
            field(out, &result.relative_path.display().to_string(), reason.red())?;
        }
        Ok(())
    }

    /// Where the report went; the check mark only on a clean run
    pub fn report_location(out: &mut impl Write, path: &Path, clean: bool) -> io::Result<()> {
        rule(out)?;
        if clean {
            out.queue(Print("✓ ".green().bold()))?
                .queue(Print(format!("report: {}\n", path.display())))?;
            Ok(())
        } else {
            field(out, "report", path.display().to_string().cyan())
        }
    }

    pub fn failure(out: &mut impl Write, message: &str) -> io::Result<()> {
        out.queue(Print("✗ ".red().bold()))?
            .queue(Print(format!("{}\n", message)))?;
        Ok(())
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.print_sample_config {
        print!("{}", Config::sample_config());
        return Ok(ExitCode::SUCCESS);
    }

    // Held until main returns so the file log is flushed on every exit path
    let _guard = setup_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Fit Runner starting");

    let config = load_config(&cli)?;
    if config.verbose {
        info!(?config, "Configuration loaded");
    }

    // Configuration problems are reported before anything is traversed
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        eprintln!("Error: {}", e);
        return Ok(ExitCode::from(2));
    }
    let Some(executor) = CommandExecutor::from_command(&config.fixture_command) else {
        error!("No fixture command configured");
        eprintln!(
            "Error: no fixture command configured (pass it after `--` or set fixture_command)"
        );
        return Ok(ExitCode::from(2));
    };
    info!(program = executor.program(), "Using fixture runner");

    let runner = TestRunner::new(&config, executor)?;

    match runner.run() {
        Ok(outcome) => {
            print_outcome(&outcome)?;
            info!("Result: {}", outcome.counts());

            if let Some(message) = outcome.failure_message(config.ignore_failures) {
                error!("{}", message);
                let mut out = io::stdout().lock();
                cli_output::failure(&mut out, &message)?;
                out.flush()?;
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "Fit run aborted");
            eprintln!("Error: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Print the end-of-run summary
fn print_outcome(outcome: &RunOutcome) -> io::Result<()> {
    let counts = outcome.counts();
    let failed: Vec<_> = outcome.failed_files().collect();
    let mut out = io::stdout().lock();

    cli_output::heading(&mut out, "Fit Tests Complete")?;
    cli_output::counts(&mut out, counts)?;
    cli_output::field(&mut out, "files processed", outcome.summary.files_processed)?;
    cli_output::field(
        &mut out,
        "directories processed",
        outcome.summary.directories_processed,
    )?;
    cli_output::failed_documents(&mut out, &failed)?;
    cli_output::report_location(&mut out, &outcome.summary_path, !counts.has_failures())?;
    out.flush()
}

/// Load configuration from file or CLI arguments
fn load_config(cli: &Cli) -> Result<Config> {
    let config = if let Some(ref config_path) = cli.config {
        info!(config_file = %config_path.display(), "Loading configuration from file");
        let file_config = Config::load_from_file(config_path)?;
        cli.merge_with_config(file_config)
    } else {
        cli.to_config()
    };

    Ok(config)
}

/// Setup logging: stderr, plus an optional log file
fn setup_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    let Some(log_path) = cli.log_file.as_deref() else {
        subscriber.init();
        return Ok(None);
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(open_log_file(log_path)?);

    if cli.json_log {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .init();
    }

    Ok(Some(guard))
}

fn open_log_file(log_path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)?;

    Ok(file)
}
