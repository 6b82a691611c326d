//! CLI argument parsing with clap

use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

/// Fit Runner - runs table-driven acceptance test documents
///
/// Executes every matching document below the source directory through a
/// fixture runner, writes the annotated documents to a mirrored output tree
/// and summarizes the results in summary.html.
///
/// The fixture runner command goes after `--`, for example:
///   fit-runner -s src/test/fit -- java -cp fit.jar fit.StdinRunner
#[derive(Parser, Debug)]
#[command(name = "fit-runner")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file (TOML format)
    ///
    /// When specified, settings from the config file are used as defaults.
    /// CLI arguments will override config file settings.
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Directory containing the test documents
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Output directory for rendered documents and summary.html
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Wildcard(s) selecting test documents, comma separated
    #[arg(short, long)]
    pub include: Option<String>,

    /// Match the include pattern case insensitively
    #[arg(long)]
    pub ignore_case: bool,

    /// Encoding of the test documents
    #[arg(long, env = "FIT_SOURCE_ENCODING")]
    pub source_encoding: Option<String>,

    /// Encoding of the generated output
    #[arg(long, env = "FIT_OUTPUT_ENCODING")]
    pub output_encoding: Option<String>,

    /// Succeed even if documents have wrong results or exceptions
    #[arg(long)]
    pub ignore_failures: bool,

    /// Number of threads executing documents (0 = auto)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output log format as JSON
    #[arg(long)]
    pub json_log: bool,

    /// Also write the log to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Print a sample configuration file and exit
    #[arg(long)]
    pub print_sample_config: bool,

    /// Fixture runner command and its arguments
    #[arg(last = true)]
    pub fixture_command: Vec<String>,
}

impl Cli {
    /// Merge CLI arguments with config from file
    /// CLI arguments take precedence over config file settings
    pub fn merge_with_config(&self, mut config: Config) -> Config {
        if let Some(ref source) = self.source {
            config.source_dir = source.clone();
        }
        if let Some(ref output) = self.output {
            config.output_dir = output.clone();
        }
        if let Some(ref include) = self.include {
            config.include = include.clone();
        }
        if self.ignore_case {
            config.case_sensitive = false;
        }
        if let Some(ref encoding) = self.source_encoding {
            config.source_encoding = encoding.clone();
        }
        if let Some(ref encoding) = self.output_encoding {
            config.output_encoding = encoding.clone();
        }
        if self.ignore_failures {
            config.ignore_failures = true;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if !self.fixture_command.is_empty() {
            config.fixture_command = self.fixture_command.clone();
        }
        if self.verbose {
            config.verbose = true;
        }

        config
    }

    /// Convert CLI arguments to Config (when no config file is used)
    pub fn to_config(&self) -> Config {
        self.merge_with_config(Config::default())
    }
}
