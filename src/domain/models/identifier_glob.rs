//! Glob filters over entity identifiers.
//!
//! `*` matches any run of characters (including none), `?` matches exactly
//! one character; everything else is literal.

use regex::Regex;

use crate::domain::errors::{DomainError, DomainResult};

/// A compiled identifier glob.
#[derive(Debug, Clone)]
pub struct IdentifierGlob {
    pattern: String,
    regex: Regex,
}

impl IdentifierGlob {
    /// Compile `pattern`. Fails with [`DomainError::InvalidPattern`] when the
    /// resulting expression cannot be built.
    pub fn new(pattern: &str) -> DomainResult<Self> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr)
            .map_err(|e| DomainError::InvalidPattern(format!("{pattern:?}: {e}")))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// The glob as written.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the whole of `id` matches.
    pub fn matches(&self, id: &str) -> bool {
        self.regex.is_match(id)
    }

    /// Keep only the ids matching this glob, preserving order.
    pub fn filter(&self, ids: Vec<String>) -> Vec<String> {
        ids.into_iter().filter(|id| self.matches(id)).collect()
    }
}
