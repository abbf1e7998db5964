//! Core data types that flow through the chat pipeline.
//!
//! Records are read-only from the pipeline's point of view; every other
//! value here is created by one stage and consumed by the next.

use serde::{Deserialize, Serialize};

/// A member record joined with its optional detail row.
///
/// The credential column is never read into this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub detail: Option<MemberDetail>,
}

impl Member {
    /// First and last name joined by a space, skipping missing parts.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberDetail {
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub address2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub zipcode: Option<i64>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub profile_status: Option<String>,
}

/// Whether a query needs a member lookup or a free-form answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    DatabaseQuery,
    GeneralChat,
}

/// The single parameter pulled out of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedEntity {
    Id(i64),
    Name(String),
    None,
}

/// Model-drafted SQL before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSql {
    /// Exactly what the model returned.
    pub raw: String,
    /// Code fences and reasoning blocks removed.
    pub sanitized: String,
}

/// Why the validator refused a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Empty,
    NotSelect,
    MissingIdFilter,
    StatementChaining,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::Empty => "empty",
            RejectReason::NotSelect => "not_select",
            RejectReason::MissingIdFilter => "missing_id_filter",
            RejectReason::StatementChaining => "statement_chaining",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Terminal outcome of SQL validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizationVerdict {
    Accepted(String),
    Rejected(RejectReason),
}

/// States of the chat state machine, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Stage {
    Start = 0,
    IntentKnown = 1,
    EntityKnown = 2,
    SqlValidated = 3,
    RecordResolved = 4,
    Formatted = 5,
    GeneralAnswered = 6,
    Done = 7,
}

impl Stage {
    pub fn from_u8(value: u8) -> Stage {
        match value {
            1 => Stage::IntentKnown,
            2 => Stage::EntityKnown,
            3 => Stage::SqlValidated,
            4 => Stage::RecordResolved,
            5 => Stage::Formatted,
            6 => Stage::GeneralAnswered,
            7 => Stage::Done,
            _ => Stage::Start,
        }
    }
}

/// The single observable result of one chat request.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub text: String,
    /// Last state reached before `Done`.
    pub stage_reached: Stage,
    /// True when at least one fallback was substituted.
    pub degraded: bool,
    /// Audit SQL: the validated candidate or the safe template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_skips_missing_parts() {
        let mut m = Member {
            member_id: 1,
            first_name: Some("Ada".into()),
            last_name: None,
            email: None,
            detail: None,
        };
        assert_eq!(m.full_name().as_deref(), Some("Ada"));
        m.last_name = Some("Lovelace".into());
        assert_eq!(m.full_name().as_deref(), Some("Ada Lovelace"));
        m.first_name = None;
        m.last_name = Some("  ".into());
        assert_eq!(m.full_name(), None);
    }

    #[test]
    fn test_stage_roundtrips_through_u8() {
        for stage in [
            Stage::Start,
            Stage::IntentKnown,
            Stage::EntityKnown,
            Stage::SqlValidated,
            Stage::RecordResolved,
            Stage::Formatted,
            Stage::GeneralAnswered,
            Stage::Done,
        ] {
            assert_eq!(Stage::from_u8(stage as u8), stage);
        }
    }
}
