//! The structured decision produced by the provider on every iteration of a run.
//!
//! On the wire a step is a single object tagged by `TYPE` with exactly one payload, keyed by
//! the tag itself:
//!
//! ```json
//! {"TYPE": "EXECUTE", "EXECUTE": {"capability": "getPrice", "params": {"asset": "ETH"}, "rationale": "..."}}
//! ```
//!
//! Internally it is the [`Step`] enum, so the orchestrator can match on it exhaustively.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::capability::empty_params;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    HighLevelPlanning,
    LowLevelPlanning,
    Execute,
    BatchExecute,
    FinalAnswer,
}

impl StepType {
    pub const ALL: [StepType; 5] = [
        StepType::HighLevelPlanning,
        StepType::LowLevelPlanning,
        StepType::Execute,
        StepType::BatchExecute,
        StepType::FinalAnswer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::HighLevelPlanning => "HIGH_LEVEL_PLANNING",
            StepType::LowLevelPlanning => "LOW_LEVEL_PLANNING",
            StepType::Execute => "EXECUTE",
            StepType::BatchExecute => "BATCH_EXECUTE",
            StepType::FinalAnswer => "FINAL_ANSWER",
        }
    }

    /// Read the tag of a possibly incomplete step object
    pub fn peek(value: &Value) -> Option<StepType> {
        let tag = value.get("TYPE")?.as_str()?;
        StepType::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assessment of the overall situation and the strategy to answer the question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighLevelPlan {
    pub label: String,
    pub situation: String,
    pub plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratchpad: Option<String>,
}

/// Reflection on the data gathered so far and the reasoning for the next action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowLevelPlan {
    pub label: String,
    pub reflection: String,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratchpad: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execute {
    pub capability: String,
    #[serde(default = "empty_params")]
    pub params: Value,
    #[serde(default)]
    pub rationale: String,
}

/// A set of independent invocations; no item may depend on the output of another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchExecute {
    pub calls: Vec<Execute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RawStep", try_from = "RawStep")]
pub enum Step {
    HighLevelPlanning(HighLevelPlan),
    LowLevelPlanning(LowLevelPlan),
    Execute(Execute),
    BatchExecute(BatchExecute),
    FinalAnswer(FinalAnswer),
}

impl Step {
    pub fn step_type(&self) -> StepType {
        match self {
            Step::HighLevelPlanning(_) => StepType::HighLevelPlanning,
            Step::LowLevelPlanning(_) => StepType::LowLevelPlanning,
            Step::Execute(_) => StepType::Execute,
            Step::BatchExecute(_) => StepType::BatchExecute,
            Step::FinalAnswer(_) => StepType::FinalAnswer,
        }
    }

    pub fn final_answer<S: Into<String>>(answer: S) -> Self {
        Step::FinalAnswer(FinalAnswer {
            answer: answer.into(),
        })
    }

    pub fn execute<S: Into<String>>(capability: S, params: Value, rationale: &str) -> Self {
        Step::Execute(Execute {
            capability: capability.into(),
            params,
            rationale: rationale.to_string(),
        })
    }

    /// Parse a complete step from provider output
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The JSON schema advertised to providers that support structured output
    pub fn json_schema() -> Value {
        let text = json!({"type": "string"});
        let scratchpad = json!({
            "type": "string",
            "description": "Notes to carry forward to the next step"
        });
        let call = json!({
            "type": "object",
            "properties": {
                "capability": {"type": "string", "description": "Name of the capability to invoke"},
                "params": {"type": "object", "description": "Parameters matching the capability schema"},
                "rationale": text
            },
            "required": ["capability", "params", "rationale"]
        });

        json!({
            "type": "object",
            "properties": {
                "TYPE": {
                    "type": "string",
                    "enum": StepType::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>()
                },
                "HIGH_LEVEL_PLANNING": {
                    "type": "object",
                    "properties": {
                        "label": text,
                        "situation": text,
                        "plan": text,
                        "scratchpad": scratchpad
                    },
                    "required": ["label", "situation", "plan"]
                },
                "LOW_LEVEL_PLANNING": {
                    "type": "object",
                    "properties": {
                        "label": text,
                        "reflection": text,
                        "reasoning": text,
                        "scratchpad": scratchpad
                    },
                    "required": ["label", "reflection", "reasoning"]
                },
                "EXECUTE": call,
                "BATCH_EXECUTE": {
                    "type": "object",
                    "properties": {
                        "calls": {"type": "array", "items": call, "minItems": 1}
                    },
                    "required": ["calls"]
                },
                "FINAL_ANSWER": {
                    "type": "object",
                    "properties": {
                        "answer": {"type": "string", "description": "The complete markdown answer"}
                    },
                    "required": ["answer"]
                }
            },
            "required": ["TYPE"]
        })
    }
}

/// Wire representation: one optional slot per tag, of which exactly one must be filled.
#[derive(Debug, Serialize, Deserialize)]
struct RawStep {
    #[serde(rename = "TYPE")]
    step_type: StepType,
    #[serde(
        rename = "HIGH_LEVEL_PLANNING",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    high_level_planning: Option<HighLevelPlan>,
    #[serde(
        rename = "LOW_LEVEL_PLANNING",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    low_level_planning: Option<LowLevelPlan>,
    #[serde(rename = "EXECUTE", default, skip_serializing_if = "Option::is_none")]
    execute: Option<Execute>,
    #[serde(rename = "BATCH_EXECUTE", default, skip_serializing_if = "Option::is_none")]
    batch_execute: Option<BatchExecute>,
    #[serde(rename = "FINAL_ANSWER", default, skip_serializing_if = "Option::is_none")]
    final_answer: Option<FinalAnswer>,
}

impl RawStep {
    fn empty(step_type: StepType) -> Self {
        RawStep {
            step_type,
            high_level_planning: None,
            low_level_planning: None,
            execute: None,
            batch_execute: None,
            final_answer: None,
        }
    }

    fn populated(&self) -> Vec<StepType> {
        let slots = [
            (StepType::HighLevelPlanning, self.high_level_planning.is_some()),
            (StepType::LowLevelPlanning, self.low_level_planning.is_some()),
            (StepType::Execute, self.execute.is_some()),
            (StepType::BatchExecute, self.batch_execute.is_some()),
            (StepType::FinalAnswer, self.final_answer.is_some()),
        ];
        slots
            .into_iter()
            .filter_map(|(t, present)| present.then_some(t))
            .collect()
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        let mut raw = RawStep::empty(step.step_type());
        match step {
            Step::HighLevelPlanning(p) => raw.high_level_planning = Some(p),
            Step::LowLevelPlanning(p) => raw.low_level_planning = Some(p),
            Step::Execute(p) => raw.execute = Some(p),
            Step::BatchExecute(p) => raw.batch_execute = Some(p),
            Step::FinalAnswer(p) => raw.final_answer = Some(p),
        }
        raw
    }
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let extra: Vec<_> = raw
            .populated()
            .into_iter()
            .filter(|t| *t != raw.step_type)
            .map(|t| t.as_str())
            .collect();
        if !extra.is_empty() {
            return Err(format!(
                "step of TYPE {} also carries {}",
                raw.step_type,
                extra.join(", ")
            ));
        }

        let missing = || format!("step of TYPE {} has no {} payload", raw.step_type, raw.step_type);
        let step = match raw.step_type {
            StepType::HighLevelPlanning => {
                Step::HighLevelPlanning(raw.high_level_planning.ok_or_else(missing)?)
            }
            StepType::LowLevelPlanning => {
                Step::LowLevelPlanning(raw.low_level_planning.ok_or_else(missing)?)
            }
            StepType::Execute => Step::Execute(raw.execute.ok_or_else(missing)?),
            StepType::BatchExecute => {
                let batch = raw.batch_execute.ok_or_else(missing)?;
                if batch.calls.is_empty() {
                    return Err("BATCH_EXECUTE step has no calls".to_string());
                }
                Step::BatchExecute(batch)
            }
            StepType::FinalAnswer => Step::FinalAnswer(raw.final_answer.ok_or_else(missing)?),
        };
        Ok(step)
    }
}
