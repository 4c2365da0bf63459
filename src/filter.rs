//! Regex filter over a catalog
//!
//! A run may carry at most one pattern, either excluding the entries it
//! matches (`-e`) or keeping only those (`-a`). With no pattern the shard is
//! passed through borrowed.

use crate::catalog::{Catalog, FileEntry};
use crate::error::ConfigError;
use regex::Regex;
use std::borrow::Cow;
use tracing::debug;

/// Which pattern, if any, to apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    None,
    /// Keep entries that do NOT match
    Exclude(String),
    /// Keep entries that match
    Match(String),
}

impl FilterMode {
    /// Resolve the two CLI options into one mode. Exclude wins when both are
    /// given; the caller is expected to warn about the dropped match pattern.
    pub fn from_options(exclude: Option<String>, matching: Option<String>) -> Self {
        match (exclude, matching) {
            (Some(pattern), _) => FilterMode::Exclude(pattern),
            (None, Some(pattern)) => FilterMode::Match(pattern),
            (None, None) => FilterMode::None,
        }
    }

    pub fn pattern(&self) -> Option<&str> {
        match self {
            FilterMode::None => None,
            FilterMode::Exclude(p) | FilterMode::Match(p) => Some(p),
        }
    }
}

/// What part of the path the pattern is tested against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchOn {
    #[default]
    FullPath,
    BaseName,
}

/// Compile `pattern`, mapping failures to a configuration error
pub fn compile_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn is_match(regex: &Regex, entry: &FileEntry, on: MatchOn) -> bool {
    let subject = match on {
        MatchOn::FullPath => entry.path.to_string_lossy(),
        MatchOn::BaseName => entry.base_name().to_string_lossy(),
    };
    regex.is_match(&subject)
}

/// The entries of `catalog` that survive `mode`
pub fn filter<'a>(
    catalog: &'a Catalog,
    mode: &FilterMode,
    on: MatchOn,
) -> Result<Cow<'a, Catalog>, ConfigError> {
    let (pattern, keep_matches) = match mode {
        FilterMode::None => return Ok(Cow::Borrowed(catalog)),
        FilterMode::Exclude(p) => (p, false),
        FilterMode::Match(p) => (p, true),
    };

    let regex = compile_pattern(pattern)?;
    let kept = catalog.subset(|entry| is_match(&regex, entry, on) == keep_matches);

    debug!(
        pattern = %pattern,
        before = catalog.len(),
        after = kept.len(),
        "Filtered catalog"
    );

    Ok(Cow::Owned(kept))
}
