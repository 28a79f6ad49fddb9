use futures::stream::BoxStream;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::GenerationResult;
use crate::models::step::Step;
use crate::transcript::Transcript;

/// Everything one generation call needs
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub transcript: &'a Transcript,
    pub model: &'a str,
    pub temperature: Option<f32>,
}

/// A piece of a step as it is being generated
#[derive(Debug, Clone, PartialEq)]
pub enum StepFragment {
    /// The step object parsed so far, with unterminated strings and containers closed
    Partial(Value),
    /// The finalized step; always the last fragment of a generation
    Complete(Step),
}

pub type FragmentStream<'a> = BoxStream<'a, GenerationResult<StepFragment>>;

/// Base trait for structured generation providers (OpenAI compatible endpoints, Ollama, etc)
pub trait StepGenerator: Send + Sync {
    /// Produce the next step for the transcript.
    ///
    /// Implementations must stop reading from the network and stop yielding fragments soon
    /// after `cancel` fires, finishing with [`crate::errors::GenerationError::Cancelled`].
    fn generate<'a>(
        &'a self,
        request: GenerationRequest<'a>,
        cancel: CancellationToken,
    ) -> FragmentStream<'a>;
}
