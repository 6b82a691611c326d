//! Wildcard matching for test document names

use crate::error::Result;
use glob::{MatchOptions, Pattern};

/// Default include pattern
pub const DEFAULT_INCLUDE: &str = "*.html";

/// Matches file names against one or more comma-separated wildcards
#[derive(Debug, Clone)]
pub struct IncludeFilter {
    patterns: Vec<Pattern>,
    options: MatchOptions,
}

impl IncludeFilter {
    pub fn new(includes: &str, case_sensitive: bool) -> Result<Self> {
        let patterns = includes
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Pattern::new)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            options: MatchOptions {
                case_sensitive,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            },
        })
    }

    /// Whether a bare file name matches any include pattern
    pub fn matches(&self, file_name: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(file_name, self.options))
    }
}
