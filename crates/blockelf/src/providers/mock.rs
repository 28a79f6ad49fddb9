use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::errors::GenerationError;
use crate::models::step::Step;
use crate::providers::base::{FragmentStream, GenerationRequest, StepFragment, StepGenerator};
use crate::transcript::Transcript;

/// What the mock produces for one generation call
#[derive(Debug, Clone)]
pub enum MockReply {
    Step(Step),
    /// Fail with a provider error
    Error(String),
    /// Never produce anything; only cancellation ends the generation
    Hang,
}

impl From<Step> for MockReply {
    fn from(step: Step) -> Self {
        MockReply::Step(step)
    }
}

/// A mock generator that returns pre-configured steps for testing
///
/// Final answers are streamed as growing word prefixes, the way a real provider streams them.
/// Once the queue is exhausted every further call fails with `GenerationError::Incomplete`,
/// unless the mock was built with [`MockGenerator::repeating`].
#[derive(Debug, Clone)]
pub struct MockGenerator {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    repeat: Option<MockReply>,
    seen: Arc<Mutex<Vec<Transcript>>>,
}

impl MockGenerator {
    /// Create a new mock generator with a sequence of replies
    pub fn new<R: Into<MockReply>>(replies: Vec<R>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().map(Into::into).collect())),
            repeat: None,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A generator that answers every call with the same reply
    pub fn repeating(reply: impl Into<MockReply>) -> Self {
        Self {
            repeat: Some(reply.into()),
            ..Self::new(Vec::<MockReply>::new())
        }
    }

    /// The transcripts this generator was called with, in call order
    pub fn transcripts(&self) -> Vec<Transcript> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or_default()
    }

    fn next_reply(&self, transcript: &Transcript) -> Option<MockReply> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(transcript.clone());
        }
        let queued = self
            .replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front());
        queued.or_else(|| self.repeat.clone())
    }
}

fn answer_prefixes(answer: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let mut end = 0;
    for word in answer.split_inclusive(' ') {
        end += word.len();
        prefixes.push(answer[..end].to_string());
    }
    prefixes
}

impl StepGenerator for MockGenerator {
    fn generate<'a>(
        &'a self,
        request: GenerationRequest<'a>,
        cancel: CancellationToken,
    ) -> FragmentStream<'a> {
        let reply = self.next_reply(request.transcript);

        Box::pin(async_stream::try_stream! {
            match reply {
                None => Err::<(), _>(GenerationError::Incomplete)?,
                Some(MockReply::Error(message)) => Err::<(), _>(GenerationError::Provider(message))?,
                Some(MockReply::Hang) => {
                    cancel.cancelled().await;
                    Err::<(), _>(GenerationError::Cancelled)?;
                }
                Some(MockReply::Step(step)) => {
                    if let Step::FinalAnswer(ref final_answer) = step {
                        for prefix in answer_prefixes(&final_answer.answer) {
                            if cancel.is_cancelled() {
                                Err::<(), _>(GenerationError::Cancelled)?;
                            }
                            yield StepFragment::Partial(json!({
                                "TYPE": "FINAL_ANSWER",
                                "FINAL_ANSWER": {"answer": prefix}
                            }));
                            tokio::task::yield_now().await;
                        }
                    }
                    if cancel.is_cancelled() {
                        Err::<(), _>(GenerationError::Cancelled)?;
                    }
                    yield StepFragment::Complete(step);
                }
            }
        })
    }
}
