//! The ordered channel between a run and its consumer.
//!
//! The orchestrator is the only producer and the interface the only consumer. Enqueueing never
//! blocks the run and never fails; once the run is cancelled it silently drops events. The
//! stream ends when the producer side is dropped, which happens exactly once, when the run
//! reaches its final state. Dropping the consumer side cancels the run.
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::models::event::Event;

/// Create a connected sink and stream bound to the run's cancellation token
pub fn channel(token: CancellationToken) -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = EventSink {
        tx,
        token: token.clone(),
    };
    let stream = EventStream {
        rx: UnboundedReceiverStream::new(rx),
        _guard: token.drop_guard(),
    };
    (sink, stream)
}

/// Producer half, owned by the run loop
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Event>,
    token: CancellationToken,
}

impl EventSink {
    pub fn emit(&self, event: Event) {
        if self.token.is_cancelled() {
            return;
        }
        if self.tx.send(event).is_err() {
            tracing::debug!("event consumer is gone");
        }
    }

    pub fn text<S: Into<String>>(&self, fragment: S) {
        self.emit(Event::text(fragment))
    }

    pub fn start<S: Into<String>>(&self, label: S, sublabel: Option<String>) {
        self.emit(Event::start(label, sublabel))
    }

    pub fn end(&self) {
        self.emit(Event::end())
    }

    /// Close the stream. Equivalent to dropping the sink.
    pub fn close(self) {}
}

/// Consumer half
pub struct EventStream {
    rx: UnboundedReceiverStream<Event>,
    _guard: DropGuard,
}

impl EventStream {
    /// Drain the stream and concatenate the answer fragments. `None` means the run closed
    /// without ever producing answer text, which consumers must treat as a failure.
    pub async fn collect_answer(mut self) -> Option<String> {
        let mut answer: Option<String> = None;
        while let Some(event) = self.next().await {
            if let Event::Text { fragment } = event {
                answer.get_or_insert_with(String::new).push_str(&fragment);
            }
        }
        answer
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}
