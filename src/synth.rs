//! SQL drafting.
//!
//! The model drafts the SELECT list and the join; it never writes the
//! filter. [`with_id_filter`] discards any filter the model produced anyway
//! and appends one bound to the already-extracted numeric id. The resulting
//! text is an audit artifact only: lookups always go through the store's
//! parameterized queries.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::error::PipelineError;
use crate::inference::{visible_text, GenerateOptions, InferenceClient};
use crate::models::{CandidateSql, ExtractedEntity};
use crate::schema::Schema;
use crate::validate::sanitize;

fn trailing_clause() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(where|group\s+by|order\s+by|limit)\b").expect("static regex")
    })
}

/// Remove reasoning blocks, markdown fences and a leading `SQL:` label.
pub fn strip_code_fences(raw: &str) -> String {
    let text = visible_text(raw);

    let body = match text.find("```") {
        Some(start) => {
            let after_open = &text[start + 3..];
            // Skip the info string (e.g. "sql") on the opening fence line.
            let content = after_open
                .split_once('\n')
                .map(|(_, rest)| rest)
                .unwrap_or("");
            match content.find("```") {
                Some(end) => &content[..end],
                None => content,
            }
        }
        None => text.as_str(),
    };

    let body = body.trim();
    let body = match body.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sql:") => &body[4..],
        _ => body,
    };
    body.trim().to_string()
}

/// Replace whatever filter and trailing clauses the model wrote with
/// `WHERE member.memberid = <id>` on its own line. Comments are stripped
/// first so a clause keyword inside one cannot cut the statement short.
pub fn with_id_filter(sql: &str, id: i64) -> String {
    let sql = sanitize(sql);
    let base = match trailing_clause().find(&sql) {
        Some(m) => &sql[..m.start()],
        None => sql.as_str(),
    };
    let base = base.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    format!("{}\nWHERE member.memberid = {}", base, id)
}

/// The pre-reviewed statement used whenever a drafted one is rejected.
pub fn safe_template(id: i64) -> String {
    format!(
        "SELECT member.memberid, member.firstname, member.lastname, member.email, \
         member_detail.occupation, member_detail.phon_number \
         FROM member LEFT JOIN member_detail ON member.memberid = member_detail.memberid\n\
         WHERE member.memberid = {}",
        id
    )
}

pub struct SqlSynthesizer {
    client: Arc<dyn InferenceClient>,
    schema: Schema,
    timeout: Duration,
}

impl SqlSynthesizer {
    pub fn new(client: Arc<dyn InferenceClient>, schema: Schema, timeout: Duration) -> Self {
        Self {
            client,
            schema,
            timeout,
        }
    }

    fn prompt(&self, query: &str, entity: &ExtractedEntity) -> String {
        let subject = match entity {
            ExtractedEntity::Id(id) => format!("member {}", id),
            ExtractedEntity::Name(name) => format!("the member named {}", name),
            ExtractedEntity::None => "the member".to_string(),
        };
        format!(
            r#"{schema}
Write ONE SQL statement that returns the fields the question asks about for {subject}.
Rules:
- SELECT only
- JOIN member and member_detail ON member.memberid = member_detail.memberid
- Do NOT write a WHERE clause; the filter is added separately
- Return only the requested fields
- Output only SQL, no explanation

Question: {query}
SQL:"#,
            schema = self.schema.description(),
            subject = subject,
            query = query
        )
    }

    /// Ask the model for a draft. Never executes anything.
    pub async fn synthesize(
        &self,
        query: &str,
        entity: &ExtractedEntity,
    ) -> Result<CandidateSql, PipelineError> {
        let prompt = self.prompt(query, entity);
        let options = GenerateOptions::deterministic();
        let generation = tokio::time::timeout(self.timeout, self.client.generate(&prompt, &options))
            .await
            .map_err(|_| PipelineError::ModelTimeout("sql synthesis"))??;

        let sanitized = strip_code_fences(&generation.response);
        tracing::trace!(raw = %generation.response, "drafted SQL");
        Ok(CandidateSql {
            raw: generation.response,
            sanitized,
        })
    }
}
