//! Safety policy for model-drafted SQL.
//!
//! Policy, in order:
//!
//! 1. the statement must start with `SELECT`
//! 2. it must carry an identifier filter (`WHERE … id = <digits>`)
//! 3. trailing `;` and every `--` comment are stripped; a `;` that survives
//!    is statement chaining, and the filter must still be present once
//!    comments are gone
//! 4. whole-word `password` references are rewritten to [`SAFE_ALIAS`]
//!
//! A rejection is terminal for that candidate. [`sanitize`] (steps 3 and 4)
//! is idempotent.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{RejectReason, SanitizationVerdict};

/// Replacement for any reference to the credential column.
pub const SAFE_ALIAS: &str = "redacted";

fn select_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^select\b").expect("static regex"))
}

fn id_filter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\bwhere\b.*\b(?:member)?id\s*=\s*\d+").expect("static regex")
    })
}

fn password_ref() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bpassword\b").expect("static regex"))
}

/// Strip comments and trailing semicolons, and mask credential references.
pub fn sanitize(sql: &str) -> String {
    let without_comments = sql
        .lines()
        .map(|line| match line.find("--") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    let trimmed = without_comments
        .trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace());

    password_ref()
        .replace_all(trimmed, SAFE_ALIAS)
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlValidator;

impl SqlValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, sql: &str) -> SanitizationVerdict {
        let sql = sql.trim();
        if sql.is_empty() {
            return SanitizationVerdict::Rejected(RejectReason::Empty);
        }
        if !select_start().is_match(sql) {
            return SanitizationVerdict::Rejected(RejectReason::NotSelect);
        }
        if !id_filter().is_match(sql) {
            return SanitizationVerdict::Rejected(RejectReason::MissingIdFilter);
        }

        let clean = sanitize(sql);
        if clean.contains(';') {
            return SanitizationVerdict::Rejected(RejectReason::StatementChaining);
        }
        if !select_start().is_match(&clean) {
            return SanitizationVerdict::Rejected(RejectReason::NotSelect);
        }
        if !id_filter().is_match(&clean) {
            return SanitizationVerdict::Rejected(RejectReason::MissingIdFilter);
        }

        SanitizationVerdict::Accepted(clean)
    }
}
