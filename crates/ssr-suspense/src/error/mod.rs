use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::config::ConfigError;

#[derive(ThisError, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SsrError {
    #[error("Resource {id} failed to load: {message}")]
    Producer { id: String, message: String },

    #[error("Render stalled with pending boundaries {pending:?}{}", describe_cause(.cause.as_deref()))]
    Stalled { pending: Vec<String>, cause: Option<Box<SsrError>> },

    #[error("Render did not complete within {timeout_ms}ms, pending boundaries {pending:?}")]
    Timeout { timeout_ms: u64, pending: Vec<String> },

    #[error("No fragment was rendered for placeholder {0}")]
    UnresolvedFragment(String),

    #[error("Fragment substitution exceeded {0} passes")]
    SubstitutionLimit(usize),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

fn describe_cause(cause: Option<&SsrError>) -> String {
    cause.map(|cause| format!(" ({cause})")).unwrap_or_default()
}

impl SsrError {
    pub fn producer(id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Producer { id: id.into(), message: message.to_string() }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Producer { .. } => "PRODUCER_FAILED",
            Self::Stalled { .. } => "RENDER_STALLED",
            Self::Timeout { .. } => "TIMEOUT_ERROR",
            Self::UnresolvedFragment(_) => "UNRESOLVED_FRAGMENT",
            Self::SubstitutionLimit(_) => "SUBSTITUTION_LIMIT",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Deserialization(_) => "DESERIALIZATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Boundaries still waiting when the render gave up, if any.
    pub fn pending_boundaries(&self) -> &[String] {
        match self {
            Self::Stalled { pending, .. } | Self::Timeout { pending, .. } => pending,
            _ => &[],
        }
    }
}

impl From<ConfigError> for SsrError {
    fn from(error: ConfigError) -> Self {
        Self::Configuration(error.to_string())
    }
}
