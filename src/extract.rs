//! Entity extraction: a member id or a member name from free text.
//!
//! Ids come from a deterministic pattern first; the model is only asked
//! when the pattern finds nothing. Whatever the model returns is treated as
//! untrusted text and reduced to digits (ids) or a short name before use.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::error::PipelineError;
use crate::inference::{visible_text, GenerateOptions, InferenceClient};
use crate::models::ExtractedEntity;

const UNKNOWN_NAME: &str = "UNKNOWN";
const MAX_NAME_WORDS: usize = 4;

fn id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:member|user|customer|account|record|id)(?:\s*(?:id|number|no\.?))?\s*(?:[:#=]|is)?\s*#?\s*(\d{1,18})\b",
        )
        .expect("static regex")
    })
}

/// Id from phrases like "member 123", "id: 123" or "user #456".
pub fn id_from_pattern(query: &str) -> Option<i64> {
    id_pattern()
        .captures_iter(query)
        .filter_map(|c| c.get(1)?.as_str().parse::<i64>().ok())
        .find(|id| *id > 0)
}

/// Reduce a model reply to an id: every non-digit is dropped, and anything
/// empty or unparsable becomes `0` ("no identifier").
pub fn digits_to_id(raw: &str) -> i64 {
    let digits: String = visible_text(raw)
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<i64>().unwrap_or(0)
}

/// Reduce a model reply to a bare name, or `""` when there is none.
pub fn parse_name(raw: &str) -> String {
    let text = visible_text(raw);
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let line = match line.split_once(':') {
        Some((label, rest)) if label.trim().eq_ignore_ascii_case("name") => rest,
        _ => line,
    };
    let name = line
        .trim_matches(|c: char| !c.is_alphanumeric())
        .trim()
        .to_string();

    if name.eq_ignore_ascii_case(UNKNOWN_NAME)
        || name.chars().any(|c| c.is_ascii_digit())
        || name.split_whitespace().count() > MAX_NAME_WORDS
    {
        return String::new();
    }
    name
}

pub struct EntityExtractor {
    client: Arc<dyn InferenceClient>,
    timeout: Duration,
}

impl EntityExtractor {
    pub fn new(client: Arc<dyn InferenceClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn ask(&self, stage: &'static str, prompt: String) -> Result<String, PipelineError> {
        let options = GenerateOptions::deterministic();
        let generation = tokio::time::timeout(self.timeout, self.client.generate(&prompt, &options))
            .await
            .map_err(|_| PipelineError::ModelTimeout(stage))??;
        tracing::trace!(stage, raw = %generation.response, "extraction reply");
        Ok(generation.response)
    }

    /// Member id, or `0` when the query names none.
    pub async fn try_extract_id(&self, query: &str) -> Result<i64, PipelineError> {
        if let Some(id) = id_from_pattern(query) {
            tracing::debug!(id, "member id matched by pattern");
            return Ok(id);
        }

        let prompt = format!(
            r#"Extract the numeric member ID from the question.
Return ONLY the number. Return 0 if none found.

Examples:
"What's member 123's phone?" -> 123
"Explain quantum physics" -> 0
"Show details for user 456" -> 456

Question: {}
ID:"#,
            query
        );
        let raw = self.ask("id extraction", prompt).await?;
        Ok(digits_to_id(&raw))
    }

    /// Member name, or `""` when the query names none.
    pub async fn try_extract_name(&self, query: &str) -> Result<String, PipelineError> {
        let prompt = format!(
            r#"Extract the person's name from the question.
Return ONLY the name. Return {} if no name is present.

Examples:
"What is Jane Smith's email?" -> Jane Smith
"Where does Hopper live?" -> Hopper
"Explain quantum physics" -> {}

Question: {}
Name:"#,
            UNKNOWN_NAME, UNKNOWN_NAME, query
        );
        let raw = self.ask("name extraction", prompt).await?;
        Ok(parse_name(&raw))
    }

    pub async fn extract_id(&self, query: &str) -> i64 {
        self.try_extract_id(query).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "id extraction failed");
            0
        })
    }

    pub async fn extract_name(&self, query: &str) -> String {
        self.try_extract_name(query).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "name extraction failed");
            String::new()
        })
    }

    /// Id first; a non-zero id skips name extraction entirely.
    pub async fn extract(&self, query: &str) -> ExtractedEntity {
        let id = self.extract_id(query).await;
        if id > 0 {
            return ExtractedEntity::Id(id);
        }
        let name = self.extract_name(query).await;
        if name.is_empty() {
            ExtractedEntity::None
        } else {
            ExtractedEntity::Name(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::stub::StubClient;

    #[test]
    fn test_id_from_pattern() {
        assert_eq!(id_from_pattern("Show details for member 456"), Some(456));
        assert_eq!(id_from_pattern("What's member 123's phone?"), Some(123));
        assert_eq!(id_from_pattern("id: 123"), Some(123));
        assert_eq!(id_from_pattern("ID=77"), Some(77));
        assert_eq!(id_from_pattern("user #456 please"), Some(456));
        assert_eq!(id_from_pattern("member id 7"), Some(7));
        assert_eq!(id_from_pattern("member number 12"), Some(12));
        assert_eq!(id_from_pattern("member id is 9"), Some(9));
        assert_eq!(id_from_pattern("I have 3 cats"), None);
        assert_eq!(id_from_pattern("member 0"), None);
        assert_eq!(id_from_pattern("member 99999999999999999999"), None);
    }

    #[test]
    fn test_digits_to_id() {
        assert_eq!(digits_to_id("123"), 123);
        assert_eq!(digits_to_id("The ID is 42."), 42);
        assert_eq!(digits_to_id("<think>maybe 7</think>0"), 0);
        assert_eq!(digits_to_id("none"), 0);
        assert_eq!(digits_to_id(""), 0);
        assert_eq!(digits_to_id("99999999999999999999999"), 0);
    }

    #[test]
    fn test_parse_name() {
        assert_eq!(parse_name("Jane Smith"), "Jane Smith");
        assert_eq!(parse_name("\"Hopper\"."), "Hopper");
        assert_eq!(parse_name("Name: Ada Lovelace\nextra"), "Ada Lovelace");
        assert_eq!(parse_name("UNKNOWN"), "");
        assert_eq!(parse_name("unknown."), "");
        assert_eq!(parse_name("<think>hmm</think>"), "");
        assert_eq!(parse_name("member 123"), "");
        assert_eq!(
            parse_name("The question does not contain any name at all"),
            ""
        );
    }

    #[tokio::test]
    async fn test_pattern_match_skips_model() {
        let client = Arc::new(StubClient::replying("999"));
        let extractor = EntityExtractor::new(client.clone(), Duration::from_secs(1));
        assert_eq!(
            extractor.extract("Show details for member 456").await,
            ExtractedEntity::Id(456)
        );
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_model_fallback_for_id() {
        let client = Arc::new(StubClient::replying("It is 314."));
        let extractor = EntityExtractor::new(client.clone(), Duration::from_secs(1));
        assert_eq!(extractor.extract_id("phone for three-one-four").await, 314);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_name_path_when_no_id() {
        let client = Arc::new(StubClient::new(|prompt| {
            if prompt.contains("numeric member ID") {
                Ok("0".into())
            } else {
                Ok("Lovelace".into())
            }
        }));
        let extractor = EntityExtractor::new(client.clone(), Duration::from_secs(1));
        assert_eq!(
            extractor.extract("What is Lovelace's email?").await,
            ExtractedEntity::Name("Lovelace".into())
        );
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_everywhere_is_none() {
        let client = Arc::new(StubClient::new(|prompt| {
            if prompt.contains("numeric member ID") {
                Ok("0".into())
            } else {
                Ok("UNKNOWN".into())
            }
        }));
        let extractor = EntityExtractor::new(client, Duration::from_secs(1));
        assert_eq!(
            extractor.extract("whose email is this?").await,
            ExtractedEntity::None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_resolve_to_empty() {
        let client = Arc::new(StubClient::replying("5").delayed(Duration::from_secs(60)));
        let extractor = EntityExtractor::new(client, Duration::from_millis(20));
        assert_eq!(extractor.extract_id("whose email?").await, 0);
        assert_eq!(extractor.extract_name("whose email?").await, "");
    }
}
