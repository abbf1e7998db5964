//! The chat state machine.
//!
//! ```text
//! Start → IntentKnown ─┬─ EntityKnown → SqlValidated → RecordResolved → Formatted ─┬─ Done
//!                      └─ GeneralAnswered ───────────────────────────────────────────┘
//! ```
//!
//! Every arrow has a deadline and a literal fallback, and the whole request
//! runs under an overall deadline. [`ChatOrchestrator::process`] never
//! fails: each stage failure becomes either a degraded continuation or a
//! fixed user-facing message, and exactly one [`PipelineResult`] comes back.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use crate::config::{Config, MessagesConfig, PipelineConfig};
use crate::error::PipelineError;
use crate::executor::QueryExecutor;
use crate::extract::EntityExtractor;
use crate::format::{self, ResponseFormatter};
use crate::inference::{self, GenerateOptions, InferenceClient};
use crate::intent::IntentClassifier;
use crate::models::{ExtractedEntity, Intent, PipelineResult, SanitizationVerdict, Stage};
use crate::schema::Schema;
use crate::store::{self, RecordStore};
use crate::synth::{safe_template, with_id_filter, SqlSynthesizer};
use crate::validate::SqlValidator;

/// Progress of one request, readable after its future has been dropped.
#[derive(Default)]
struct Trace {
    stage: AtomicU8,
    degraded: AtomicBool,
    sql: Mutex<Option<String>>,
}

impl Trace {
    fn reach(&self, stage: Stage) {
        self.stage.fetch_max(stage as u8, Ordering::SeqCst);
        tracing::debug!(stage = ?stage, "stage reached");
    }

    fn degrade(&self) {
        self.degraded.store(true, Ordering::SeqCst);
    }

    fn record_sql(&self, sql: String) {
        let mut slot = self.sql.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(sql);
    }

    fn finish(&self, text: String) -> PipelineResult {
        PipelineResult {
            text,
            stage_reached: Stage::from_u8(self.stage.load(Ordering::SeqCst)),
            degraded: self.degraded.load(Ordering::SeqCst),
            sql: self
                .sql
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}

pub struct ChatOrchestrator {
    classifier: IntentClassifier,
    extractor: EntityExtractor,
    synthesizer: SqlSynthesizer,
    validator: SqlValidator,
    executor: QueryExecutor,
    formatter: ResponseFormatter,
    client: Arc<dyn InferenceClient>,
    pipeline: PipelineConfig,
    messages: MessagesConfig,
    chat_temperature: f32,
}

impl ChatOrchestrator {
    pub fn new(
        config: &Config,
        client: Arc<dyn InferenceClient>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let schema = Schema::members();
        let pipeline = config.pipeline.clone();

        Self {
            classifier: IntentClassifier::new(
                client.clone(),
                schema.clone(),
                pipeline.classify_timeout(),
                config.inference.classify_max_tokens,
            ),
            extractor: EntityExtractor::new(client.clone(), pipeline.extract_timeout()),
            synthesizer: SqlSynthesizer::new(client.clone(), schema, pipeline.sql_timeout()),
            validator: SqlValidator::new(),
            executor: QueryExecutor::new(store),
            formatter: ResponseFormatter::new(
                client.clone(),
                pipeline.format_timeout(),
                pipeline.model_formatting(),
            ),
            client,
            messages: config.messages.clone(),
            chat_temperature: config.inference.chat_temperature,
            pipeline,
        }
    }

    /// Build the configured inference client and record store.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = inference::create_client(&config.inference)?;
        let store = store::open(config).await?;
        Ok(Self::new(config, client, store))
    }

    pub fn messages(&self) -> &MessagesConfig {
        &self.messages
    }

    /// Answer one query.
    pub async fn process(&self, query: &str) -> PipelineResult {
        let query = query.trim();
        if query.is_empty() {
            return PipelineResult {
                text: self.messages.empty_input.clone(),
                stage_reached: Stage::Start,
                degraded: false,
                sql: None,
            };
        }

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("chat", %request_id);
        async {
            tracing::debug!(query, "chat request");
            let started = Instant::now();
            let trace = Trace::default();

            let text = match tokio::time::timeout(
                self.pipeline.overall_timeout(),
                self.run(query, &trace),
            )
            .await
            {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = self.pipeline.overall_timeout_ms,
                        "request deadline exceeded"
                    );
                    trace.degrade();
                    self.messages.timeout.clone()
                }
            };

            let result = trace.finish(text);
            tracing::info!(
                stage = ?result.stage_reached,
                degraded = result.degraded,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "chat complete"
            );
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, query: &str, trace: &Trace) -> String {
        let intent = match self.classifier.try_classify(query).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(error = %e, "classification failed, defaulting to general chat");
                trace.degrade();
                Intent::GeneralChat
            }
        };
        trace.reach(Stage::IntentKnown);

        match intent {
            Intent::DatabaseQuery => self.database_path(query, trace).await,
            Intent::GeneralChat => self.general_path(query, trace).await,
        }
    }

    async fn general_path(&self, query: &str, trace: &Trace) -> String {
        let options = GenerateOptions::with_temperature(self.chat_temperature);
        let outcome =
            tokio::time::timeout(self.pipeline.general_timeout(), self.client.generate(query, &options))
                .await;

        match outcome {
            Ok(Ok(generation)) => match format::general(&generation) {
                Some(text) => {
                    trace.reach(Stage::GeneralAnswered);
                    text
                }
                None => {
                    tracing::warn!("empty completion");
                    trace.degrade();
                    self.messages.empty_completion.clone()
                }
            },
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "general chat failed");
                trace.degrade();
                self.messages.error.clone()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.pipeline.general_timeout_ms,
                    "general chat timed out"
                );
                trace.degrade();
                self.messages.general_timeout.clone()
            }
        }
    }

    async fn database_path(&self, query: &str, trace: &Trace) -> String {
        let outcome =
            tokio::time::timeout(self.pipeline.database_timeout(), self.lookup(query, trace)).await;

        match outcome {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                match &e {
                    PipelineError::NotFound(_)
                    | PipelineError::AmbiguousMatch { .. }
                    | PipelineError::NoIdentifier => {
                        tracing::info!(error = %e, "member lookup ended without a record");
                    }
                    _ => {
                        tracing::warn!(error = %e, "member lookup failed");
                        trace.degrade();
                    }
                }
                e.user_message(&self.messages)
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.pipeline.database_timeout_ms,
                    "database path timed out"
                );
                trace.degrade();
                self.messages.database_timeout.clone()
            }
        }
    }

    async fn lookup(&self, query: &str, trace: &Trace) -> Result<String, PipelineError> {
        let entity = self.resolve_entity(query, trace).await;

        let member = match &entity {
            ExtractedEntity::Id(id) => {
                trace.reach(Stage::EntityKnown);
                self.audit_sql(query, &entity, *id, trace).await;
                self.executor.execute(*id).await?
            }
            ExtractedEntity::Name(name) => {
                trace.reach(Stage::EntityKnown);
                let member = self.executor.execute_by_name(name).await?;
                self.audit_sql(query, &entity, member.member_id, trace).await;
                member
            }
            ExtractedEntity::None => return Err(self.audit_unbound_sql(query, trace).await),
        };
        trace.reach(Stage::RecordResolved);

        let (text, degraded) = self.formatter.render(&member, query).await;
        if degraded {
            trace.degrade();
        }
        trace.reach(Stage::Formatted);
        Ok(text)
    }

    async fn resolve_entity(&self, query: &str, trace: &Trace) -> ExtractedEntity {
        let id = match self.extractor.try_extract_id(query).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "id extraction failed");
                trace.degrade();
                0
            }
        };
        if id > 0 {
            return ExtractedEntity::Id(id);
        }

        match self.extractor.try_extract_name(query).await {
            Ok(name) if !name.is_empty() => ExtractedEntity::Name(name),
            Ok(_) => ExtractedEntity::None,
            Err(e) => {
                tracing::warn!(error = %e, "name extraction failed");
                trace.degrade();
                ExtractedEntity::None
            }
        }
    }

    /// Draft, bind and validate the audit SQL for `id`. Never executed.
    async fn audit_sql(&self, query: &str, entity: &ExtractedEntity, id: i64, trace: &Trace) {
        if !self.pipeline.explain_sql {
            return;
        }

        let sql = match self.synthesizer.synthesize(query, entity).await {
            Ok(candidate) => {
                let bound = with_id_filter(&candidate.sanitized, id);
                match self.validator.validate(&bound) {
                    SanitizationVerdict::Accepted(sql) => sql,
                    SanitizationVerdict::Rejected(reason) => {
                        tracing::warn!(%reason, "drafted SQL rejected, using safe template");
                        trace.degrade();
                        safe_template(id)
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SQL drafting failed, using safe template");
                trace.degrade();
                safe_template(id)
            }
        };

        tracing::debug!(%sql, "audit SQL");
        trace.record_sql(sql);
        trace.reach(Stage::SqlValidated);
    }

    /// Validate a draft for a query with no identifier. There is nothing to
    /// bind a safe template to, so a rejected draft ends the request.
    async fn audit_unbound_sql(&self, query: &str, trace: &Trace) -> PipelineError {
        if !self.pipeline.explain_sql {
            return PipelineError::NoIdentifier;
        }

        match self.synthesizer.synthesize(query, &ExtractedEntity::None).await {
            Ok(candidate) => match self.validator.validate(&candidate.sanitized) {
                SanitizationVerdict::Rejected(reason) => PipelineError::ValidationRejected(reason),
                SanitizationVerdict::Accepted(_) => PipelineError::NoIdentifier,
            },
            Err(e) => {
                tracing::warn!(error = %e, "SQL drafting failed");
                trace.degrade();
                PipelineError::NoIdentifier
            }
        }
    }
}
