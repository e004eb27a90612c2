//! Config validation: checks that must pass before any route is planned.

use crate::config::{MethodSet, ModelConfiguration};
use crate::error::ConfigError;
use regex::Regex;
use std::sync::OnceLock;

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.~-]+$").expect("static regex"))
}

/// Validates one configuration and returns its normalized method set.
pub fn validate(config: &ModelConfiguration) -> Result<MethodSet, ConfigError> {
    if config.include_columns.is_some() && config.exclude_columns.is_some() {
        return Err(ConfigError::IncludeAndExclude);
    }
    if config.results_per_page == 0 || config.max_results_per_page == 0 {
        return Err(ConfigError::InvalidPagination {
            results_per_page: config.results_per_page,
            max_results_per_page: config.max_results_per_page,
        });
    }
    validate_url_prefix(&config.url_prefix)?;
    MethodSet::parse(&config.methods)
}

/// A collection name becomes one path segment.
pub fn validate_collection_name(name: &str) -> Result<(), ConfigError> {
    if segment_pattern().is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidCollectionName(name.to_string()))
    }
}

/// Strips trailing `/`, so `"/api/"` mounts like `"/api"` and `"/"` at the root.
pub fn normalize_url_prefix(prefix: &str) -> String {
    prefix.trim_end_matches('/').to_string()
}

/// Empty, or `/`-separated segments starting with `/`. Trailing `/` is ignored.
pub fn validate_url_prefix(prefix: &str) -> Result<(), ConfigError> {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(());
    }
    let valid = trimmed
        .strip_prefix('/')
        .map(|rest| rest.split('/').all(|seg| segment_pattern().is_match(seg)))
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrlPrefix(prefix.to_string()))
    }
}
