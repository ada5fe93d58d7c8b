//! Route matching logic.
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Plain string prefix, not segment-aware: `/api` matches `/apikey`
//! - No regex to guarantee O(n) matching

/// Matches and strips a request path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMatcher {
    prefix: String,
}

impl PrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns true if `path` starts with this prefix.
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Remove the prefix from `path`, guaranteeing a leading `/`.
    ///
    /// Returns `None` when the prefix does not match.
    pub fn strip(&self, path: &str) -> Option<String> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.starts_with('/') {
            Some(rest.to_string())
        } else {
            Some(format!("/{rest}"))
        }
    }
}
