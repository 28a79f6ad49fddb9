use anyhow::Result;
use futures::StreamExt;

use crate::prompt::{InputType, Prompt};

use blockelf::models::event::{Event, Phase};
use blockelf::models::message::Message;
use blockelf::Orchestrator;

pub const FAILURE_TEXT: &str = "An error occurred while processing the request.";
const INTERRUPTED_TEXT: &str = "Interrupted. The question was discarded.";

pub struct Session<'a> {
    orchestrator: Orchestrator,
    prompt: Box<dyn Prompt + 'a>,
    model: String,
    temperature: f32,
    messages: Vec<Message>,
}

impl<'a> Session<'a> {
    pub fn new(
        orchestrator: Orchestrator,
        prompt: Box<impl Prompt + 'a>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Session {
            orchestrator,
            prompt,
            model: model.into(),
            temperature,
            messages: Vec::new(),
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.prompt.blockelf_ready();

        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Exit => break,
                InputType::AskAgain => continue,
                InputType::Message => match input.content {
                    Some(content) => self.messages.push(Message::user(content)),
                    None => continue,
                },
            }

            self.process_messages().await;
        }
        self.prompt.close();
        Ok(())
    }

    /// Answer a single question without reading input
    pub async fn headless_start(&mut self, question: String) -> Result<()> {
        self.messages.push(Message::user(question));
        self.process_messages().await;
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    async fn process_messages(&mut self) {
        let mut run = self.orchestrator.invoke(
            self.messages.clone(),
            self.model.clone(),
            Some(self.temperature),
        );
        let mut answer: Option<String> = None;

        loop {
            tokio::select! {
                event = run.events.next() => match event {
                    Some(Event::Status { phase: Phase::Start, label, sublabel }) => {
                        self.prompt
                            .show_busy(label.as_deref().unwrap_or_default(), sublabel.as_deref());
                    }
                    Some(Event::Status { phase: Phase::End, .. }) => self.prompt.hide_busy(),
                    Some(Event::Text { fragment }) => {
                        answer.get_or_insert_with(String::new).push_str(&fragment);
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    run.token.cancel();
                    self.prompt.hide_busy();
                    // Forget the interrupted question so the next one starts clean
                    self.messages.pop();
                    self.prompt.render(INTERRUPTED_TEXT);
                    return;
                }
            }
        }
        self.prompt.hide_busy();

        match answer {
            Some(answer) => {
                self.prompt.render(&answer);
                self.messages.push(Message::assistant(answer));
            }
            None => {
                self.prompt.render(FAILURE_TEXT);
                self.messages.pop();
            }
        }

        match run.outcome.await {
            Ok(Ok(summary)) => tracing::debug!(run_id = %run.id, steps = summary.steps, "run finished"),
            Ok(Err(e)) => tracing::debug!(run_id = %run.id, error = %e, "run failed"),
            Err(e) => tracing::warn!(run_id = %run.id, error = %e, "run task panicked"),
        }
    }
}
