//! The run loop that turns one user utterance into a sequence of steps.
//!
//! Each run owns its transcript and a cancellation token. The loop asks the generator for the
//! next step, interprets it, appends the step and any capability outcomes to the transcript,
//! and repeats until a `FINAL_ANSWER` arrives or the run aborts. Progress reaches the consumer
//! through an [`EventStream`]; answer text is relayed while the final step is still being
//! generated.
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::capabilities::CapabilityRegistry;
use crate::errors::{
    CapabilityError, CapabilityResult, GenerationError, RunError, RunResult,
};
use crate::events::{self, EventSink, EventStream};
use crate::models::message::Message;
use crate::models::step::{BatchExecute, Execute, Step, StepType};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::{GenerationRequest, StepFragment, StepGenerator};
use crate::transcript::{CapabilityOutcome, Transcript};

/// What happens when the capability of a single `EXECUTE` step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecuteFailurePolicy {
    /// End the run without an answer
    #[default]
    Abort,
    /// Append the error to the transcript and keep going, as for batch items
    Record,
}

/// Limits applied to every run
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub max_steps: Option<usize>,
    pub max_duration: Option<Duration>,
    pub capability_timeout: Option<Duration>,
    pub execute_failure: ExecuteFailurePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: Some(24),
            max_duration: Some(Duration::from_secs(180)),
            capability_timeout: Some(Duration::from_secs(30)),
            execute_failure: ExecuteFailurePolicy::Abort,
        }
    }
}

impl OrchestratorConfig {
    /// No step, deadline or capability limits
    pub fn unbounded() -> Self {
        Self {
            max_steps: None,
            max_duration: None,
            capability_timeout: None,
            execute_failure: ExecuteFailurePolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Planning,
    Executing,
    BatchExecuting,
    Done,
}

impl RunState {
    fn after(step: &Step) -> Self {
        match step.step_type() {
            StepType::HighLevelPlanning | StepType::LowLevelPlanning => RunState::Planning,
            StepType::Execute => RunState::Executing,
            StepType::BatchExecute => RunState::BatchExecuting,
            StepType::FinalAnswer => RunState::Done,
        }
    }

    fn transition(self, next: RunState) -> RunState {
        if self != next {
            tracing::debug!(from = ?self, to = ?next, "state changed");
        }
        next
    }
}

#[derive(Debug, Clone)]
struct RunSettings {
    model: String,
    temperature: Option<f32>,
}

/// The result of a run that reached its final answer
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub answer: String,
    /// Number of steps generated, the final one included
    pub steps: usize,
    pub transcript: Transcript,
}

/// A started run.
///
/// Dropping `events` cancels the run. `outcome` resolves once the run reached its final state,
/// at which point `events` has been closed.
#[derive(Debug)]
pub struct Run {
    pub id: Uuid,
    pub history: Vec<Message>,
    pub events: EventStream,
    pub outcome: JoinHandle<RunResult<RunSummary>>,
    pub token: CancellationToken,
}

#[derive(Serialize)]
struct PromptContext {
    capabilities: Vec<crate::models::capability::CapabilityInfo>,
    current_date: String,
}

/// Orchestrator drives structured generation against a fixed set of capabilities
#[derive(Clone)]
pub struct Orchestrator {
    generator: Arc<dyn StepGenerator>,
    registry: Arc<CapabilityRegistry>,
    config: OrchestratorConfig,
    system_prompt: Arc<str>,
}

impl Orchestrator {
    /// Create an orchestrator, rendering the default system prompt for the registry
    pub fn new(
        generator: Arc<dyn StepGenerator>,
        registry: impl Into<Arc<CapabilityRegistry>>,
        config: OrchestratorConfig,
    ) -> RunResult<Self> {
        let registry = registry.into();
        let context = PromptContext {
            capabilities: registry.catalog(),
            current_date: chrono::Utc::now().format("%Y-%m-%d").to_string(),
        };
        let system_prompt = load_prompt_file("system.md", &context)
            .map_err(|e| RunError::Internal(e.to_string()))?;

        Ok(Self {
            generator,
            registry,
            config,
            system_prompt: system_prompt.into(),
        })
    }

    /// Replace the rendered system prompt
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into().into();
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Start a run for the conversation so far. Must be called within a tokio runtime.
    pub fn invoke(
        &self,
        history: Vec<Message>,
        model: impl Into<String>,
        temperature: Option<f32>,
    ) -> Run {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        let (sink, events) = events::channel(token.clone());
        let settings = RunSettings {
            model: model.into(),
            temperature,
        };

        let span = tracing::info_span!("run", run_id = %id, model = %settings.model);
        let this = self.clone();
        let run_history = history.clone();
        let run_token = token.clone();
        let outcome = tokio::spawn(
            async move { this.run(settings, run_history, sink, run_token).await }
                .instrument(span),
        );

        Run {
            id,
            history,
            events,
            outcome,
            token,
        }
    }

    async fn run(
        self,
        settings: RunSettings,
        history: Vec<Message>,
        sink: EventSink,
        token: CancellationToken,
    ) -> RunResult<RunSummary> {
        // Every exit path cancels the run
        let _guard = token.clone().drop_guard();

        let drive = self.drive(&settings, &history, &sink, &token);
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(RunError::Cancelled),
            outcome = with_deadline(self.config.max_duration, drive) => outcome,
        };

        match &outcome {
            Ok(summary) => tracing::info!(steps = summary.steps, "run finished"),
            Err(RunError::Cancelled) => tracing::info!("run cancelled"),
            Err(e) => tracing::error!(error = %e, "run aborted"),
        }
        sink.close();
        outcome
    }

    async fn drive(
        &self,
        settings: &RunSettings,
        history: &[Message],
        sink: &EventSink,
        token: &CancellationToken,
    ) -> RunResult<RunSummary> {
        let mut transcript = Transcript::new(&*self.system_prompt, history);
        let mut state = RunState::Planning;
        let mut steps = 0;

        loop {
            if let Some(max_steps) = self.config.max_steps {
                if steps >= max_steps {
                    return Err(RunError::StepBudgetExhausted(max_steps));
                }
            }

            let step = self.next_step(&transcript, settings, sink, token).await?;
            steps += 1;
            tracing::debug!(step = %step.step_type(), "step generated");
            state = state.transition(RunState::after(&step));

            match &step {
                Step::HighLevelPlanning(plan) => {
                    plan_step(&mut transcript, &step, &plan.label, &plan.situation, sink)
                }
                Step::LowLevelPlanning(plan) => {
                    plan_step(&mut transcript, &step, &plan.label, &plan.reflection, sink)
                }
                Step::Execute(execute) => {
                    self.execute(&mut transcript, &step, execute, sink).await?;
                    state = state.transition(RunState::Planning);
                }
                Step::BatchExecute(batch) => {
                    self.batch_execute(&mut transcript, &step, batch, sink).await;
                    state = state.transition(RunState::Planning);
                }
                Step::FinalAnswer(final_answer) => {
                    transcript.push_step(&step);
                    return Ok(RunSummary {
                        answer: final_answer.answer.clone(),
                        steps,
                        transcript,
                    });
                }
            }
        }
    }

    /// Generate the next step, relaying answer text while a final answer streams in
    async fn next_step(
        &self,
        transcript: &Transcript,
        settings: &RunSettings,
        sink: &EventSink,
        token: &CancellationToken,
    ) -> RunResult<Step> {
        let request = GenerationRequest {
            transcript,
            model: &settings.model,
            temperature: settings.temperature,
        };
        let mut fragments = self.generator.generate(request, token.clone());
        let mut relay = AnswerRelay::new(sink);

        while let Some(fragment) = fragments.next().await {
            match fragment? {
                StepFragment::Partial(value) => relay.observe(&value),
                StepFragment::Complete(step) => {
                    if let Step::FinalAnswer(final_answer) = &step {
                        relay.finish(&final_answer.answer);
                    }
                    return Ok(step);
                }
            }
        }
        Err(GenerationError::Incomplete.into())
    }

    async fn execute(
        &self,
        transcript: &mut Transcript,
        step: &Step,
        execute: &Execute,
        sink: &EventSink,
    ) -> RunResult<()> {
        let rationale = Some(execute.rationale.clone()).filter(|r| !r.is_empty());
        sink.start(format!("Using {}", humanize(&execute.capability)), rationale);
        transcript.push_step(step);

        let result = self
            .invoke_capability(&execute.capability, execute.params.clone())
            .await;
        if let Err(e) = &result {
            if self.config.execute_failure == ExecuteFailurePolicy::Abort {
                return Err(e.clone().into());
            }
            tracing::warn!(capability = %execute.capability, error = %e, "capability failed");
        }

        let outcome = CapabilityOutcome::new(&execute.capability, execute.params.clone(), result);
        transcript.push_outcome(&outcome);
        sink.end();
        Ok(())
    }

    async fn batch_execute(
        &self,
        transcript: &mut Transcript,
        step: &Step,
        batch: &BatchExecute,
        sink: &EventSink,
    ) {
        let names: Vec<String> = batch.calls.iter().map(|c| humanize(&c.capability)).collect();
        sink.start(batch_label(batch.calls.len()), Some(names.join(", ")));
        transcript.push_step(step);

        let mut pending: FuturesUnordered<_> = batch
            .calls
            .iter()
            .map(|call| async move {
                let result = self
                    .invoke_capability(&call.capability, call.params.clone())
                    .await;
                CapabilityOutcome::new(&call.capability, call.params.clone(), result)
            })
            .collect();

        while let Some(outcome) = pending.next().await {
            if outcome.is_error() {
                tracing::warn!(capability = %outcome.capability, "batch item failed");
            }
            transcript.push_outcome(&outcome);
        }
        sink.end();
    }

    async fn invoke_capability(&self, name: &str, params: Value) -> CapabilityResult<Value> {
        let call = self.registry.invoke(name, params.clone());
        match self.config.capability_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                Err(CapabilityError::TimedOut {
                    name: name.to_string(),
                    params,
                    millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })
            }),
            None => call.await,
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn plan_step(transcript: &mut Transcript, step: &Step, label: &str, detail: &str, sink: &EventSink) {
    let detail = Some(detail.to_string()).filter(|d| !d.is_empty());
    sink.start(label, detail);
    transcript.push_step(step);
    sink.end();
}

async fn with_deadline<T, F>(limit: Option<Duration>, work: F) -> RunResult<T>
where
    F: Future<Output = RunResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .unwrap_or(Err(RunError::DeadlineExceeded(limit))),
        None => work.await,
    }
}

/// Forwards the growth of a streaming final answer as text events
struct AnswerRelay<'s> {
    sink: &'s EventSink,
    sent: String,
    emitted: bool,
}

impl<'s> AnswerRelay<'s> {
    fn new(sink: &'s EventSink) -> Self {
        Self {
            sink,
            sent: String::new(),
            emitted: false,
        }
    }

    fn observe(&mut self, partial: &Value) {
        if StepType::peek(partial) != Some(StepType::FinalAnswer) {
            return;
        }
        if let Some(answer) = partial["FINAL_ANSWER"]["answer"].as_str() {
            self.forward(answer);
        }
    }

    fn forward(&mut self, answer: &str) {
        // Text already sent cannot be retracted, so only extensions are forwarded
        let Some(delta) = answer.strip_prefix(self.sent.as_str()) else {
            return;
        };
        if delta.is_empty() {
            return;
        }
        self.sink.text(delta);
        self.sent.push_str(delta);
        self.emitted = true;
    }

    /// The consumer must see at least one text event for a final answer, even an empty one
    fn finish(&mut self, answer: &str) {
        self.forward(answer);
        if !self.emitted {
            self.sink.text(answer);
            self.emitted = true;
        }
    }
}

/// `getLatestBlock` becomes `get latest block`
fn humanize(name: &str) -> String {
    let mut words = String::with_capacity(name.len() + 4);
    let mut previous: Option<char> = None;
    for c in name.chars() {
        if c == '_' || c == '-' {
            if !words.is_empty() && !words.ends_with(' ') {
                words.push(' ');
            }
        } else if c.is_ascii_uppercase() {
            if previous.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit()) {
                words.push(' ');
            }
            words.push(c.to_ascii_lowercase());
        } else {
            words.push(c);
        }
        previous = Some(c);
    }
    words.trim().to_string()
}

fn batch_label(count: usize) -> String {
    match count {
        1 => "Running 1 query".to_string(),
        n => format!("Running {} queries", n),
    }
}
