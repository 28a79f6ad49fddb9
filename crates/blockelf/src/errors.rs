use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single capability invocation.
///
/// Every variant carries the capability name and, once it got that far, the parameters that
/// were attempted, so the failure can be written into the transcript as data.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityError {
    #[error("Capability not found: {name}")]
    NotFound { name: String },

    #[error("Invalid parameters for {name}: {reason}")]
    InvalidParameters {
        name: String,
        params: Value,
        reason: String,
    },

    #[error("Capability {name} failed: {reason}")]
    Execution {
        name: String,
        params: Value,
        reason: String,
    },

    #[error("Capability {name} timed out after {millis}ms")]
    TimedOut {
        name: String,
        params: Value,
        millis: u64,
    },
}

impl CapabilityError {
    pub fn execution(name: impl Into<String>, params: Value, reason: impl ToString) -> Self {
        CapabilityError::Execution {
            name: name.into(),
            params,
            reason: reason.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CapabilityError::NotFound { name }
            | CapabilityError::InvalidParameters { name, .. }
            | CapabilityError::Execution { name, .. }
            | CapabilityError::TimedOut { name, .. } => name,
        }
    }
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Failure while producing a step from the generation provider.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Provider request failed: {0}")]
    Provider(String),

    #[error("Step does not match the schema: {0}")]
    Schema(String),

    #[error("Provider stream ended without a complete step")]
    Incomplete,

    #[error("Generation cancelled")]
    Cancelled,
}

pub type GenerationResult<T> = Result<T, GenerationError>;

/// Reasons a run ends without a final answer.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run stopped after {0} steps without a final answer")]
    StepBudgetExhausted(usize),

    #[error("Run exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type RunResult<T> = Result<T, RunError>;
