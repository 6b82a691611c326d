//! Fit Runner - runs table-driven acceptance test documents
//!
//! This library discovers test documents below a source directory, executes
//! each through a fixture engine and writes a hierarchical HTML report:
//! - Include-pattern filtering with configurable case sensitivity
//! - Charset-aware reading of documents and writing of results
//! - Per-directory subtotals and a run-level summary
//! - Parallel execution within a directory with Rayon
//! - Failures isolated to the document that caused them

pub mod charset;
pub mod cli;
pub mod config;
pub mod counts;
pub mod error;
pub mod filter;
pub mod fixture;
pub mod outcome;
pub mod report;
pub mod runner;

pub use charset::Charset;
pub use cli::Cli;
pub use config::{Config, ConfigError};
pub use counts::Counts;
pub use error::{Error, Result};
pub use fixture::{CommandExecutor, Execution, ExecutionError, FixtureExecutor};
pub use outcome::{DirectoryReport, FileTestResult, RunOutcome, RunSummary};
pub use runner::TestRunner;
