//! Boundary to the fixture engine that actually runs a test document
//!
//! The runner only needs one capability: hand over the text of a document and
//! get back the annotated document together with its tally. How fixtures are
//! looked up and bound to table rows is entirely up to the implementation.

use crate::counts::Counts;
use regex::Regex;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Outcome of running one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// The document annotated with per-cell results
    pub rendered: String,
    pub counts: Counts,
    pub elapsed: Duration,
}

/// A document could not be executed at all.
///
/// Failing checks inside a document are never reported this way; they end up
/// in [`Execution::counts`].
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("failed to start fixture runner '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("fixture runner IO failed: {0}")]
    Io(#[from] io::Error),

    #[error("fixture runner produced invalid output: {0}")]
    InvalidOutput(String),

    #[error("fixture runner exited with {status} without reporting counts: {stderr}")]
    MissingCounts { status: String, stderr: String },
}

/// Something that can execute a test document
pub trait FixtureExecutor: Sync {
    fn execute(&self, document: &str) -> Result<Execution, ExecutionError>;
}

impl<F> FixtureExecutor for F
where
    F: Fn(&str) -> Result<Execution, ExecutionError> + Sync,
{
    fn execute(&self, document: &str) -> Result<Execution, ExecutionError> {
        self(document)
    }
}

static COUNTS_PATTERN: OnceLock<Regex> = OnceLock::new();

fn counts_pattern() -> &'static Regex {
    COUNTS_PATTERN.get_or_init(|| {
        Regex::new(r"(\d+) right, (\d+) wrong, (\d+) ignored, (\d+) exceptions").unwrap()
    })
}

/// Parse the last counts line (`2 right, 0 wrong, 0 ignored, 1 exceptions`) in `text`
pub fn parse_counts(text: &str) -> Option<Counts> {
    let caps = counts_pattern().captures_iter(text).last()?;
    let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
    Some(Counts {
        right: field(1)?,
        wrong: field(2)?,
        ignored: field(3)?,
        exceptions: field(4)?,
    })
}

/// Runs an external fixture runner once per document.
///
/// The document goes to the runner's stdin, the annotated document is read
/// from stdout and the counts line is taken from stderr. Runners
/// conventionally exit with `wrong + exceptions`, so the exit status alone is
/// not treated as a failure.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a `[program, args...]` list; `None` when the list is empty
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl FixtureExecutor for CommandExecutor {
    fn execute(&self, document: &str) -> Result<Execution, ExecutionError> {
        let start = Instant::now();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecutionError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecutionError::InvalidOutput("stdin not captured".into()))?;

        // Feed stdin from a separate thread so a chatty runner cannot deadlock us
        let output = std::thread::scope(|scope| {
            let feeder = scope.spawn(move || stdin.write_all(document.as_bytes()));
            let output = child.wait_with_output();
            match feeder.join() {
                Ok(Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => {
                    warn!(error = %e, "Failed to feed document to fixture runner");
                }
                _ => {}
            }
            output
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let counts = parse_counts(&stderr).ok_or_else(|| ExecutionError::MissingCounts {
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        })?;
        let rendered = String::from_utf8(output.stdout)
            .map_err(|e| ExecutionError::InvalidOutput(format!("stdout is not UTF-8: {}", e)))?;

        debug!(
            program = %self.program,
            status = %output.status,
            %counts,
            "Fixture runner finished"
        );

        Ok(Execution {
            rendered,
            counts,
            elapsed: start.elapsed(),
        })
    }
}
