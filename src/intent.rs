//! Intent classification.
//!
//! Decides whether a query is about a stored member ([`Intent::DatabaseQuery`])
//! or is free-form chat ([`Intent::GeneralChat`]). `GeneralChat` is the safe
//! default: it is returned for ambiguous model output, model errors and
//! timeouts alike.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::error::PipelineError;
use crate::inference::{visible_text, GenerateOptions, InferenceClient};
use crate::models::Intent;
use crate::schema::Schema;

const DATABASE_LABEL: &str = "DATABASE_QUERY";
const CHAT_LABEL: &str = "GENERAL_CHAT";

fn member_vocabulary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(members?|users?|customers?|accounts?|records?|profiles?|ids?|phones?|e-?mails?|address(es)?|occupations?|jobs?|names?|details?|database|status|contact)\b",
        )
        .expect("static regex")
    })
}

/// Whether a query could plausibly be a member lookup.
///
/// Queries with no digit and no member vocabulary never reach the model.
pub fn could_be_lookup(query: &str) -> bool {
    query.chars().any(|c| c.is_ascii_digit()) || member_vocabulary().is_match(query)
}

/// Map a raw model reply onto an [`Intent`].
///
/// Exactly one recognised label must appear; anything else is chat.
pub fn parse_label(raw: &str) -> Intent {
    let normalized = visible_text(raw)
        .to_uppercase()
        .replace([' ', '-'], "_");
    let database = normalized.contains(DATABASE_LABEL);
    let chat = normalized.contains(CHAT_LABEL);
    match (database, chat) {
        (true, false) => Intent::DatabaseQuery,
        _ => Intent::GeneralChat,
    }
}

pub struct IntentClassifier {
    client: Arc<dyn InferenceClient>,
    schema: Schema,
    timeout: Duration,
    max_tokens: u32,
}

impl IntentClassifier {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        schema: Schema,
        timeout: Duration,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            schema,
            timeout,
            max_tokens,
        }
    }

    fn prompt(&self, query: &str) -> String {
        format!(
            r#"{schema}
You route questions for a member database assistant.
Reply with exactly one label and nothing else:
{db} - the question asks for stored information about a specific member
{chat} - anything else

Examples:
"What's member 123's phone?" -> {db}
"Explain quantum physics" -> {chat}
"Show details for user 456" -> {db}
"What is the email address of Jane Smith?" -> {db}
"Write a haiku about autumn" -> {chat}

Question: {query}
Label:"#,
            schema = self.schema.description(),
            db = DATABASE_LABEL,
            chat = CHAT_LABEL,
            query = query
        )
    }

    /// Classify with the model, surfacing timeouts and model errors.
    pub async fn try_classify(&self, query: &str) -> Result<Intent, PipelineError> {
        if !could_be_lookup(query) {
            tracing::debug!("no member vocabulary, skipping classification call");
            return Ok(Intent::GeneralChat);
        }

        let options = GenerateOptions::deterministic().max_tokens(self.max_tokens);
        let prompt = self.prompt(query);
        let generation = tokio::time::timeout(self.timeout, self.client.generate(&prompt, &options))
            .await
            .map_err(|_| PipelineError::ModelTimeout("classification"))??;

        tracing::trace!(raw = %generation.response, "classification reply");
        Ok(parse_label(&generation.response))
    }

    /// Classify, resolving every failure to [`Intent::GeneralChat`].
    pub async fn classify(&self, query: &str) -> Intent {
        match self.try_classify(query).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(error = %e, "classification failed, defaulting to general chat");
                Intent::GeneralChat
            }
        }
    }
}
