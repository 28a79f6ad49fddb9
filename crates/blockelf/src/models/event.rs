use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Start,
    End,
}

/// Progress of a run as seen by the consumer.
///
/// Text fragments belong to the final answer and are concatenated in arrival order. Status
/// events bracket every non-final step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Text {
        fragment: String,
    },
    Status {
        phase: Phase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sublabel: Option<String>,
    },
}

impl Event {
    pub fn text<S: Into<String>>(fragment: S) -> Self {
        Event::Text {
            fragment: fragment.into(),
        }
    }

    pub fn start<S: Into<String>>(label: S, sublabel: Option<String>) -> Self {
        Event::Status {
            phase: Phase::Start,
            label: Some(label.into()),
            sublabel,
        }
    }

    pub fn end() -> Self {
        Event::Status {
            phase: Phase::End,
            label: None,
            sublabel: None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Event::Text { fragment } => Some(fragment),
            Event::Status { .. } => None,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            Event::Status { phase, .. } => Some(*phase),
            Event::Text { .. } => None,
        }
    }
}
