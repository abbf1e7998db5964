//! TOML configuration.
//!
//! Every timeout, model option and user-facing fallback string used by the
//! pipeline lives here so deployments can tune them without a rebuild.
//!
//! ```toml
//! [db]
//! path = "./data/members.sqlite"
//!
//! [inference]
//! url = "http://localhost:11434"
//! model = "deepseek-r1:1.5b"
//!
//! [pipeline]
//! overall_timeout_ms = 30000
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// JSON fixture loaded by the `memory` backend.
    #[serde(default)]
    pub fixture: Option<PathBuf>,
    /// Upper bound on concurrent calls into a blocking store.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            fixture: None,
            worker_threads: default_worker_threads(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_worker_threads() -> usize {
    4
}
fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f32,
    #[serde(default = "default_classify_max_tokens")]
    pub classify_max_tokens: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            chat_temperature: default_chat_temperature(),
            classify_max_tokens: default_classify_max_tokens(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "deepseek-r1:1.5b".to_string()
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_chat_temperature() -> f32 {
    0.7
}
fn default_classify_max_tokens() -> u32 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_classify_timeout_ms")]
    pub classify_timeout_ms: u64,
    #[serde(default = "default_extract_timeout_ms")]
    pub extract_timeout_ms: u64,
    #[serde(default = "default_sql_timeout_ms")]
    pub sql_timeout_ms: u64,
    #[serde(default = "default_format_timeout_ms")]
    pub format_timeout_ms: u64,
    #[serde(default = "default_database_timeout_ms")]
    pub database_timeout_ms: u64,
    #[serde(default = "default_general_timeout_ms")]
    pub general_timeout_ms: u64,
    #[serde(default = "default_overall_timeout_ms")]
    pub overall_timeout_ms: u64,
    /// Draft and validate SQL for the audit trail on the database path.
    #[serde(default = "default_explain_sql")]
    pub explain_sql: bool,
    #[serde(default = "default_format_mode")]
    pub format_mode: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classify_timeout_ms: default_classify_timeout_ms(),
            extract_timeout_ms: default_extract_timeout_ms(),
            sql_timeout_ms: default_sql_timeout_ms(),
            format_timeout_ms: default_format_timeout_ms(),
            database_timeout_ms: default_database_timeout_ms(),
            general_timeout_ms: default_general_timeout_ms(),
            overall_timeout_ms: default_overall_timeout_ms(),
            explain_sql: default_explain_sql(),
            format_mode: default_format_mode(),
        }
    }
}

impl PipelineConfig {
    pub fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout_ms)
    }
    pub fn extract_timeout(&self) -> Duration {
        Duration::from_millis(self.extract_timeout_ms)
    }
    pub fn sql_timeout(&self) -> Duration {
        Duration::from_millis(self.sql_timeout_ms)
    }
    pub fn format_timeout(&self) -> Duration {
        Duration::from_millis(self.format_timeout_ms)
    }
    pub fn database_timeout(&self) -> Duration {
        Duration::from_millis(self.database_timeout_ms)
    }
    pub fn general_timeout(&self) -> Duration {
        Duration::from_millis(self.general_timeout_ms)
    }
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }
    pub fn model_formatting(&self) -> bool {
        self.format_mode == "model"
    }
}

fn default_classify_timeout_ms() -> u64 {
    10_000
}
fn default_extract_timeout_ms() -> u64 {
    10_000
}
fn default_sql_timeout_ms() -> u64 {
    10_000
}
fn default_format_timeout_ms() -> u64 {
    10_000
}
fn default_database_timeout_ms() -> u64 {
    20_000
}
fn default_general_timeout_ms() -> u64 {
    25_000
}
fn default_overall_timeout_ms() -> u64 {
    30_000
}
fn default_explain_sql() -> bool {
    true
}
fn default_format_mode() -> String {
    "template".to_string()
}

/// User-facing strings substituted when a stage fails or times out.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MessagesConfig {
    pub empty_input: String,
    pub timeout: String,
    pub database_timeout: String,
    pub general_timeout: String,
    pub empty_completion: String,
    pub not_found: String,
    pub ambiguous: String,
    pub unsafe_sql: String,
    pub no_identifier: String,
    pub error: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            empty_input: "Please enter a question.".to_string(),
            timeout: "Request timed out. Please try again later.".to_string(),
            database_timeout: "Database operation timed out".to_string(),
            general_timeout: "Response took too long".to_string(),
            empty_completion: "I couldn't generate a response".to_string(),
            not_found: "Member not found".to_string(),
            ambiguous: "More than one member matches that name. Please ask using the member ID."
                .to_string(),
            unsafe_sql: "Sorry, that request could not be safely processed.".to_string(),
            no_identifier:
                "I couldn't tell which member you mean. Please include a member ID or name."
                    .to_string(),
            error: "Sorry, something went wrong while processing your request.".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Config {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        for (name, value) in [
            ("pipeline.classify_timeout_ms", p.classify_timeout_ms),
            ("pipeline.extract_timeout_ms", p.extract_timeout_ms),
            ("pipeline.sql_timeout_ms", p.sql_timeout_ms),
            ("pipeline.format_timeout_ms", p.format_timeout_ms),
            ("pipeline.database_timeout_ms", p.database_timeout_ms),
            ("pipeline.general_timeout_ms", p.general_timeout_ms),
            ("pipeline.overall_timeout_ms", p.overall_timeout_ms),
        ] {
            if value == 0 {
                anyhow::bail!("{} must be > 0", name);
            }
        }

        match p.format_mode.as_str() {
            "template" | "model" => {}
            other => anyhow::bail!(
                "Unknown pipeline.format_mode: '{}'. Must be template or model.",
                other
            ),
        }

        if !(1..=5).contains(&self.inference.max_attempts) {
            anyhow::bail!("inference.max_attempts must be in [1, 5]");
        }
        if self.inference.request_timeout_secs == 0 {
            anyhow::bail!("inference.request_timeout_secs must be > 0");
        }
        if self.inference.model.trim().is_empty() {
            anyhow::bail!("inference.model must not be empty");
        }

        if self.store.worker_threads == 0 {
            anyhow::bail!("store.worker_threads must be > 0");
        }
        if self.store.max_connections == 0 {
            anyhow::bail!("store.max_connections must be > 0");
        }
        match self.store.backend.as_str() {
            "sqlite" => {}
            "memory" => {
                if self.store.fixture.is_none() {
                    anyhow::bail!("store.fixture must be set when backend is 'memory'");
                }
            }
            other => anyhow::bail!(
                "Unknown store backend: '{}'. Must be sqlite or memory.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/members.sqlite"

[server]
bind = "127.0.0.1:8080"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(cfg.inference.model, "deepseek-r1:1.5b");
        assert_eq!(cfg.inference.max_attempts, 2);
        assert_eq!(cfg.pipeline.overall_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.pipeline.classify_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.store.backend, "sqlite");
        assert_eq!(cfg.messages.not_found, "Member not found");
        assert!(!cfg.pipeline.model_formatting());
    }

    #[test]
    fn test_partial_messages_keep_other_defaults() {
        let content = format!("{}\n[messages]\ntimeout = \"slow down\"\n", MINIMAL);
        let cfg = Config::from_toml(&content).unwrap();
        assert_eq!(cfg.messages.timeout, "slow down");
        assert_eq!(cfg.messages.general_timeout, "Response took too long");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let content = format!("{}\n[pipeline]\noverall_timeout_ms = 0\n", MINIMAL);
        let err = Config::from_toml(&content).unwrap_err();
        assert!(err.to_string().contains("overall_timeout_ms"));
    }

    #[test]
    fn test_memory_backend_requires_fixture() {
        let content = format!("{}\n[store]\nbackend = \"memory\"\n", MINIMAL);
        assert!(Config::from_toml(&content).is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let cfg = Config::from_toml(include_str!("../config/mchat.example.toml")).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:8080");
        assert_eq!(cfg.pipeline.database_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_unknown_format_mode_rejected() {
        let content = format!("{}\n[pipeline]\nformat_mode = \"poetry\"\n", MINIMAL);
        assert!(Config::from_toml(&content).is_err());
    }
}
