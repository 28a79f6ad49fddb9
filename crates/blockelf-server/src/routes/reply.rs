use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use blockelf::{events::EventStream, models::event::Event, models::message::Message};
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};

#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Vec<Message>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
}

/// Server-sent events, one `data:` line of JSON per run event.
///
/// The body owns the run's event stream, so a client that disconnects drops it and
/// cancels the run.
pub struct SseResponse {
    events: EventStream,
}

impl SseResponse {
    fn new(events: EventStream) -> Self {
        Self { events }
    }
}

fn format_event(event: &Event) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("data: {}\n\n", data)
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events)
            .poll_next(cx)
            .map(|opt| opt.map(|event| Ok(Bytes::from(format_event(&event)))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let body = Body::from_stream(self);
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            body,
        )
            .into_response()
    }
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<SseResponse, StatusCode> {
    if request.messages.iter().all(Message::is_empty) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let (model, temperature) = state.resolve(request.model, request.temperature);
    let run = state
        .orchestrator
        .invoke(request.messages, model, Some(temperature));
    tracing::info!(run_id = %run.id, "reply started");

    Ok(SseResponse::new(run.events))
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    prompt: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AskResponse {
    response: String,
}

// simple ask for an answer, non streaming
async fn ask_handler(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, StatusCode> {
    if request.prompt.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let (model, temperature) = state.resolve(request.model, request.temperature);
    let run = state.orchestrator.invoke(
        vec![Message::user(request.prompt)],
        model,
        Some(temperature),
    );
    let run_id = run.id;

    match run.events.collect_answer().await {
        Some(answer) => Ok(Json(AskResponse {
            response: answer.trim().to_string(),
        })),
        None => {
            tracing::error!(run_id = %run_id, "run ended without an answer");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/reply", post(handler))
        .route("/ask", post(ask_handler))
        .with_state(state)
}
