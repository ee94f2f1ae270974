use crate::ConfigError;
use regex::Regex;

/// Include/exclude filter applied to canonical link paths
///
/// Patterns are regular expressions matched against the path-plus-query of a
/// normalized URL. Exclusion takes precedence: a path matching any exclude
/// pattern is always dropped. When include patterns exist, a path must match
/// at least one of them to survive.
#[derive(Debug, Default)]
pub struct LinkFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl LinkFilter {
    /// Compiles a filter from the configured pattern lists
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, ConfigError> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>, ConfigError> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p)
                        .map_err(|e| ConfigError::InvalidPattern(format!("{}: {}", p, e)))
                })
                .collect()
        };

        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Returns true when the filter has no patterns at all
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Checks whether a path survives the filter
    pub fn accepts(&self, path: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(path)) {
            return false;
        }
        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(path)) {
            return false;
        }
        true
    }
}
