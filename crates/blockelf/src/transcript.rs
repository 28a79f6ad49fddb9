use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::CapabilityError;
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::step::Step;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

/// What one capability invocation produced, in the shape it is echoed back to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOutcome {
    pub capability: String,
    pub params: Value,
    #[serde(flatten)]
    pub result: OutcomeResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeResult {
    Result(Value),
    Error(String),
}

impl CapabilityOutcome {
    pub fn new(capability: &str, params: Value, result: Result<Value, CapabilityError>) -> Self {
        Self {
            capability: capability.to_string(),
            params,
            result: match result {
                Ok(value) => OutcomeResult::Result(value),
                Err(e) => OutcomeResult::Error(e.to_string()),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.result, OutcomeResult::Error(_))
    }
}

/// The context fed to the provider on every iteration.
///
/// The system entry sits at position 0, followed by the caller's history; after that only
/// steps and capability outcomes are appended. There is no way to remove or rewrite an entry.
#[derive(Debug, Clone)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>, history: &[Message]) -> Self {
        let mut entries = Vec::with_capacity(history.len() + 1);
        entries.push(TranscriptEntry {
            role: Role::System,
            content: system_prompt.into(),
        });
        // The system prompt is ours; caller supplied system messages are kept as user context
        entries.extend(history.iter().map(|message| TranscriptEntry {
            role: match message.role {
                Role::System => Role::User,
                role => role,
            },
            content: message.content.clone(),
        }));
        Self { entries }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn push_step(&mut self, step: &Step) {
        self.push_assistant(serde_json::to_value(step));
    }

    pub fn push_outcome(&mut self, outcome: &CapabilityOutcome) {
        self.push_assistant(serde_json::to_value(outcome));
    }

    fn push_assistant(&mut self, value: serde_json::Result<Value>) {
        let value = value.unwrap_or_else(|e| json!({"error": e.to_string()}));
        self.entries.push(TranscriptEntry {
            role: Role::Assistant,
            content: value.to_string(),
        });
    }
}
