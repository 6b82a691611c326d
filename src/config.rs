//! Configuration types for the fit runner

use crate::charset::Charset;
use crate::error::{Error, Result};
use crate::filter::{DEFAULT_INCLUDE, IncludeFilter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Configuration for a fit run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory containing the test documents
    pub source_dir: PathBuf,

    /// Directory receiving rendered documents and summary.html
    pub output_dir: PathBuf,

    /// Wildcard(s) selecting test documents, comma separated
    pub include: String,

    /// Whether `include` is matched case sensitively
    pub case_sensitive: bool,

    /// Encoding of the test documents
    pub source_encoding: String,

    /// Encoding of everything written to the output directory
    pub output_encoding: String,

    /// Report success even if documents have wrong results or exceptions
    pub ignore_failures: bool,

    /// Number of threads executing documents (0 = auto)
    pub threads: usize,

    /// Fixture runner command: program followed by its arguments
    pub fixture_command: Vec<String>,

    /// Verbose output
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("src/test/fit"),
            output_dir: PathBuf::from("target/fit"),
            include: DEFAULT_INCLUDE.to_string(),
            case_sensitive: true,
            source_encoding: "UTF-8".to_string(),
            output_encoding: "UTF-8".to_string(),
            ignore_failures: false,
            threads: 0, // Auto-detect
            fixture_command: vec![],
            verbose: false,
        }
    }
}

impl Config {
    /// Check everything that can be checked before traversal starts
    pub fn validate(&self) -> Result<()> {
        if !self.source_dir.is_dir() {
            return Err(Error::Config(format!(
                "source directory {} does not exist!",
                self.source_dir.display()
            )));
        }

        if self.include.split(',').all(|p| p.trim().is_empty()) {
            return Err(Error::Config("include pattern is empty".into()));
        }
        IncludeFilter::new(&self.include, self.case_sensitive)?;
        Charset::for_label(&self.source_encoding)?;
        Charset::for_output_label(&self.output_encoding)?;

        // Rendered output inside the source tree would be picked up as input
        let source = self
            .source_dir
            .canonicalize()
            .unwrap_or_else(|_| self.source_dir.clone());
        let output = absolute_lexical(&self.output_dir);
        if output.starts_with(&source) {
            return Err(Error::Config(format!(
                "output directory {} is inside source directory {}",
                self.output_dir.display(),
                self.source_dir.display()
            )));
        }

        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# Fit Runner Configuration File
# This file uses TOML format (https://toml.io)

# Directory containing the test documents
source_dir = "src/test/fit"

# Directory receiving the rendered documents and summary.html
# Must not be inside source_dir
output_dir = "target/fit"

# Wildcards selecting test documents; several can be given comma separated
include = "*.html"

# Whether include is matched case sensitively
case_sensitive = true

# Encoding of the test documents and of the generated output
source_encoding = "UTF-8"
output_encoding = "UTF-8"

# Report success even when documents contain wrong results or exceptions
ignore_failures = false

# Number of threads executing documents (0 = auto-detect)
threads = 0

# Fixture runner: reads a document on stdin, writes the annotated document
# to stdout and prints "N right, N wrong, N ignored, N exceptions" on stderr
fixture_command = ["java", "-cp", "target/test-classes:fit.jar", "fit.StdinRunner"]

# Verbose output
verbose = false
"#
        .to_string()
    }
}

/// Absolute form of a path that may not exist yet.
///
/// The deepest existing ancestor is canonicalized and the rest appended, so
/// symlinked parents compare equal to their canonical source directory.
fn absolute_lexical(path: &Path) -> PathBuf {
    let mut resolved = match std::env::current_dir() {
        Ok(cwd) if path.is_relative() => cwd,
        _ => PathBuf::new(),
    };
    for component in path.components() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            other => resolved.push(other.as_os_str()),
        }
    }

    let canonical = resolved.ancestors().find_map(|ancestor| {
        let canonical = ancestor.canonicalize().ok()?;
        let rest = resolved.strip_prefix(ancestor).ok()?;
        Some(canonical.join(rest))
    });
    canonical.unwrap_or(resolved)
}

/// Errors that can occur when loading configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read configuration file
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse configuration file
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}
