//! Error taxonomy for the chat pipeline.
//!
//! Stage-local failures are typed here so the orchestrator can match on
//! them. None of these messages is ever shown to an end user; see
//! [`PipelineError::user_message`].

use thiserror::Error;

use crate::config::MessagesConfig;
use crate::models::RejectReason;

/// Failure talking to the inference service.
#[derive(Error, Debug, Clone)]
pub enum ModelError {
    #[error("inference connection error (is the model server running at {url}?): {message}")]
    Connection { url: String, message: String },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("inference API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("inference request timed out")]
    Timeout,

    #[error("invalid inference response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Connection { .. } | ModelError::Timeout => true,
            ModelError::Status { status, .. } => *status == 429 || *status >= 500,
            ModelError::ModelNotFound(_) | ModelError::InvalidResponse(_) => false,
        }
    }
}

/// Failure resolving a member through the record store.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("member not found: {0}")]
    NotFound(String),

    #[error("{count} members match '{name}'")]
    AmbiguousMatch { name: String, count: usize },

    #[error("record store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0} timed out")]
    ModelTimeout(&'static str),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("generated SQL rejected: {0}")]
    ValidationRejected(RejectReason),

    #[error("member not found: {0}")]
    NotFound(String),

    #[error("{count} members match '{name}'")]
    AmbiguousMatch { name: String, count: usize },

    #[error("no member identifier in query")]
    NoIdentifier,

    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl From<LookupError> for PipelineError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NotFound(key) => PipelineError::NotFound(key),
            LookupError::AmbiguousMatch { name, count } => {
                PipelineError::AmbiguousMatch { name, count }
            }
            LookupError::Store(e) => PipelineError::Unknown(e.to_string()),
        }
    }
}

impl PipelineError {
    /// Map to the fixed, user-safe message configured for this failure.
    pub fn user_message(&self, messages: &MessagesConfig) -> String {
        match self {
            PipelineError::ModelTimeout(_) => messages.database_timeout.clone(),
            PipelineError::ValidationRejected(_) => messages.unsafe_sql.clone(),
            PipelineError::NotFound(_) => messages.not_found.clone(),
            PipelineError::AmbiguousMatch { .. } => messages.ambiguous.clone(),
            PipelineError::NoIdentifier => messages.no_identifier.clone(),
            PipelineError::Model(_) | PipelineError::Unknown(_) => messages.error.clone(),
        }
    }
}
