//! Ordered, case-insensitive client-name blocklist.

use regex::{Regex, RegexBuilder};

/// Compiled blocklist patterns in configuration order.
#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    patterns: Vec<Regex>,
}

/// A pattern that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPattern {
    pub pattern: String,
    pub error: String,
}

impl Blocklist {
    /// Compile `patterns`, keeping the valid ones in order.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> (Self, Vec<RejectedPattern>) {
        let mut compiled = Vec::with_capacity(patterns.len());
        let mut rejected = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => compiled.push(regex),
                Err(e) => rejected.push(RejectedPattern {
                    pattern: pattern.to_string(),
                    error: e.to_string(),
                }),
            }
        }

        (Self { patterns: compiled }, rejected)
    }

    /// First pattern matching `client_name`.
    pub fn first_match(&self, client_name: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|regex| regex.is_match(client_name))
            .map(Regex::as_str)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
