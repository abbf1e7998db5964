//! Rendering of resolved members and general-chat completions.
//!
//! The template path picks fields by keyword and always leads with
//! `Member ID: <id>`. The model path hands the model only the fields the
//! template would have shown, as JSON, and falls back to the template on
//! any failure.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::error::PipelineError;
use crate::inference::{visible_text, GenerateOptions, Generation, InferenceClient};
use crate::models::Member;

/// Member fields a query can ask for, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Email,
    Phone,
    Address,
    Occupation,
    UserName,
    ProfileStatus,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Name,
        Field::Email,
        Field::Phone,
        Field::Address,
        Field::Occupation,
        Field::UserName,
        Field::ProfileStatus,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::Email => "Email",
            Field::Phone => "Phone",
            Field::Address => "Address",
            Field::Occupation => "Occupation",
            Field::UserName => "User name",
            Field::ProfileStatus => "Profile status",
        }
    }

    fn keywords(&self) -> &'static Regex {
        static RES: OnceLock<Vec<Regex>> = OnceLock::new();
        let res = RES.get_or_init(|| {
            [
                r"(?i)\b(names?|full)\b",
                r"(?i)\b(e-?mails?|mail)\b",
                r"(?i)\bphones?\b",
                r"(?i)\baddress(es)?\b",
                r"(?i)\b(occupations?|jobs?)\b",
                r"(?i)\b(usernames?|user\s+names?)\b",
                r"(?i)\bstatus\b",
            ]
            .iter()
            .map(|p| Regex::new(p).expect("static regex"))
            .collect()
        });
        &res[*self as usize]
    }

    /// Rendered value, or `None` when the record has nothing for this field.
    fn value(&self, member: &Member) -> Option<String> {
        let detail = member.detail.as_ref();
        let text = |v: Option<&String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        match self {
            Field::Name => member.full_name(),
            Field::Email => text(member.email.as_ref()),
            Field::Phone => text(detail.and_then(|d| d.phone_number.as_ref())),
            Field::Address => detail.and_then(|d| {
                let mut lines: Vec<String> = [d.address1.as_ref(), d.address2.as_ref()]
                    .into_iter()
                    .filter_map(text)
                    .collect();

                let place: Vec<String> = [d.city.as_ref(), d.country.as_ref()]
                    .into_iter()
                    .filter_map(text)
                    .collect();
                let mut locality = place.join(", ");
                if let Some(zip) = d.zipcode {
                    if !locality.is_empty() {
                        locality.push(' ');
                    }
                    locality.push_str(&zip.to_string());
                }
                if !locality.is_empty() {
                    lines.push(locality);
                }

                if lines.is_empty() {
                    None
                } else {
                    Some(lines.join("\n"))
                }
            }),
            Field::Occupation => text(detail.and_then(|d| d.occupation.as_ref())),
            Field::UserName => text(detail.and_then(|d| d.user_name.as_ref())),
            Field::ProfileStatus => text(detail.and_then(|d| d.profile_status.as_ref())),
        }
    }
}

fn everything() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(details?|profiles?|everything)\b").expect("static regex"))
}

/// Fields a query asks for. No keyword at all means name and email.
pub fn select_fields(query: &str) -> Vec<Field> {
    if everything().is_match(query) {
        return Field::ALL.to_vec();
    }
    let selected: Vec<Field> = Field::ALL
        .into_iter()
        .filter(|f| f.keywords().is_match(query))
        .collect();
    if selected.is_empty() {
        vec![Field::Name, Field::Email]
    } else {
        selected
    }
}

/// Selected fields that are present on the record, as label/value pairs.
pub fn field_map(member: &Member, query: &str) -> Vec<(&'static str, String)> {
    select_fields(query)
        .into_iter()
        .filter_map(|f| f.value(member).map(|v| (f.label(), v)))
        .collect()
}

/// Template rendering of a member.
pub fn render_template(member: &Member, query: &str) -> String {
    let mut out = format!("Member ID: {}", member.member_id);
    for (label, value) in field_map(member, query) {
        if value.contains('\n') {
            out.push_str(&format!("\n{}:", label));
            for line in value.lines() {
                out.push_str(&format!("\n  {}", line));
            }
        } else {
            out.push_str(&format!("\n{}: {}", label, value));
        }
    }
    out
}

/// Text of a general-chat completion, or `None` when nothing is left once
/// reasoning blocks are removed.
pub fn general(generation: &Generation) -> Option<String> {
    let text = visible_text(&generation.response);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub struct ResponseFormatter {
    client: Arc<dyn InferenceClient>,
    timeout: Duration,
    use_model: bool,
}

impl ResponseFormatter {
    pub fn new(client: Arc<dyn InferenceClient>, timeout: Duration, use_model: bool) -> Self {
        Self {
            client,
            timeout,
            use_model,
        }
    }

    pub fn format(&self, member: &Member, query: &str) -> String {
        render_template(member, query)
    }

    /// Let the model phrase the selected fields.
    pub async fn format_with_model(
        &self,
        member: &Member,
        query: &str,
    ) -> Result<String, PipelineError> {
        let fields: Map<String, Value> = field_map(member, query)
            .into_iter()
            .map(|(label, value)| (label.to_string(), Value::String(value)))
            .collect();
        let json = serde_json::to_string(&fields)
            .map_err(|e| PipelineError::Unknown(e.to_string()))?;

        let prompt = format!(
            r#"Answer the question using only these member fields:
{}

Do not invent any other information. Answer in one or two sentences.
Question: {}
Answer:"#,
            json, query
        );
        let options = GenerateOptions::deterministic();
        let generation = tokio::time::timeout(self.timeout, self.client.generate(&prompt, &options))
            .await
            .map_err(|_| PipelineError::ModelTimeout("formatting"))??;

        let text = visible_text(&generation.response);
        if text.is_empty() {
            return Err(PipelineError::Unknown("empty formatting reply".into()));
        }
        Ok(format!("Member ID: {}\n{}", member.member_id, text))
    }

    /// Final text for a member, and whether the template had to stand in
    /// for a failed model rendering.
    pub async fn render(&self, member: &Member, query: &str) -> (String, bool) {
        if !self.use_model {
            return (self.format(member, query), false);
        }
        match self.format_with_model(member, query).await {
            Ok(text) => (text, false),
            Err(e) => {
                tracing::warn!(error = %e, "model formatting failed, using template");
                (self.format(member, query), true)
            }
        }
    }
}
