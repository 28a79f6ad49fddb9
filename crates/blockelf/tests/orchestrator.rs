use anyhow::Result;
use blockelf::{
    capabilities::{time, CapabilityRegistry, FnCapability},
    models::event::{Event, Phase},
    models::message::Message,
    providers::{
        configs::{OpenAiProviderConfig, ProviderConfig},
        factory::get_generator,
        utils::ResponseFormat,
    },
    Orchestrator, OrchestratorConfig, RunError,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Stream `step` as a chat completion split into chunks of `chunk_size` characters
fn streamed_step(step: &str, chunk_size: usize) -> String {
    let chars: Vec<char> = step.chars().collect();
    let mut body = String::new();
    for chunk in chars.chunks(chunk_size) {
        let content: String = chunk.iter().collect();
        let data = json!({"choices": [{"index": 0, "delta": {"content": content}}]});
        body.push_str(&format!("data: {}\n\n", data));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

async fn mount_step(server: &MockServer, step: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(streamed_step(step, 7).into_bytes(), "text/event-stream"),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
}

fn registry() -> Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    registry.register(FnCapability::new(
        "getPrice",
        "Current USD price of an asset",
        json!({
            "type": "object",
            "properties": {"asset": {"type": "string"}},
            "required": ["asset"]
        }),
        |params| async move { Ok(json!({"price": 3000, "asset": params["asset"]})) },
    ))?;
    time::register(&mut registry)?;
    Ok(registry)
}

fn orchestrator(server: &MockServer) -> Result<Orchestrator> {
    let generator = get_generator(ProviderConfig::OpenAi(OpenAiProviderConfig {
        host: server.uri(),
        api_key: "test_api_key".to_string(),
        response_format: ResponseFormat::JsonSchema,
    }))?;
    Ok(Orchestrator::new(
        generator,
        registry()?,
        OrchestratorConfig::default(),
    )?)
}

#[tokio::test]
async fn test_price_question_over_http() -> Result<()> {
    let server = MockServer::start().await;
    mount_step(
        &server,
        r#"{"TYPE":"HIGH_LEVEL_PLANNING","HIGH_LEVEL_PLANNING":{"label":"Planning","situation":"The user wants the ETH price","plan":"Call getPrice"}}"#,
    )
    .await;
    mount_step(
        &server,
        r#"{"TYPE":"EXECUTE","EXECUTE":{"capability":"getPrice","params":{"asset":"ETH"},"rationale":"price"}}"#,
    )
    .await;
    mount_step(
        &server,
        r#"{"TYPE":"FINAL_ANSWER","FINAL_ANSWER":{"answer":"ETH currently trades at **3000 USD**."}}"#,
    )
    .await;

    let run = orchestrator(&server)?.invoke(
        vec![Message::user("What is the price of ETH?")],
        "google/gemini-flash-1.5",
        Some(0.23),
    );
    let events: Vec<Event> = futures::StreamExt::collect(run.events).await;
    let summary = run.outcome.await??;

    let phases: Vec<Option<Phase>> = events.iter().take(4).map(Event::phase).collect();
    assert_eq!(
        phases,
        vec![Some(Phase::Start), Some(Phase::End), Some(Phase::Start), Some(Phase::End)]
    );
    assert_eq!(
        events[2],
        Event::start("Using get price", Some("price".to_string()))
    );

    let answer: String = events.iter().filter_map(Event::as_text).collect();
    assert_eq!(answer, "ETH currently trades at **3000 USD**.");
    assert!(events.iter().filter_map(Event::as_text).count() > 1);
    assert_eq!(summary.steps, 3);

    // One request per step, each with a longer transcript than the last
    let requests = server.received_requests().await.unwrap_or_default();
    let lengths: Vec<usize> = requests
        .iter()
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["messages"].as_array().map(Vec::len).unwrap_or_default()
        })
        .collect();
    assert_eq!(lengths, vec![2, 3, 5]);
    Ok(())
}

#[tokio::test]
async fn test_invalid_step_ends_run_without_text() -> Result<()> {
    let server = MockServer::start().await;
    mount_step(
        &server,
        r#"{"TYPE":"EXECUTE","FINAL_ANSWER":{"answer":"mixed payloads"}}"#,
    )
    .await;

    let run = orchestrator(&server)?.invoke(vec![Message::user("hi")], "gpt-3.5-turbo", None);
    assert_eq!(run.events.collect_answer().await, None);
    assert!(matches!(run.outcome.await?, Err(RunError::Generation(_))));
    Ok(())
}

#[tokio::test]
async fn test_utility_capabilities_in_batch() -> Result<()> {
    let server = MockServer::start().await;
    mount_step(
        &server,
        r#"{"TYPE":"BATCH_EXECUTE","BATCH_EXECUTE":{"calls":[
            {"capability":"timestampToReadable","params":{"timestamp":"1620000000"},"rationale":"block time"},
            {"capability":"readableDateToTimestamp","params":{"date":"2023-10-01"},"rationale":"cutoff"},
            {"capability":"getBalance","params":{},"rationale":"unknown"}
        ]}}"#,
    )
    .await;
    mount_step(
        &server,
        r#"{"TYPE":"FINAL_ANSWER","FINAL_ANSWER":{"answer":"done"}}"#,
    )
    .await;

    let run = orchestrator(&server)?.invoke(vec![Message::user("when?")], "gpt-3.5-turbo", None);
    let events: Vec<Event> = futures::StreamExt::collect(run.events).await;
    let summary = run.outcome.await??;

    assert_eq!(
        events[0],
        Event::start(
            "Running 3 queries",
            Some("timestamp to readable, readable date to timestamp, get balance".to_string())
        )
    );
    let outcomes: Vec<serde_json::Value> = summary.transcript.entries()[3..6]
        .iter()
        .map(|e| serde_json::from_str(&e.content))
        .collect::<Result<_, _>>()?;
    let readable = outcomes
        .iter()
        .find(|o| o["capability"] == "timestampToReadable")
        .map(|o| o["result"].clone());
    assert_eq!(readable, Some(json!("Mon, 3 May 2021 00:00:00 +0000")));
    let missing = outcomes
        .iter()
        .find(|o| o["capability"] == "getBalance")
        .map(|o| o["error"].clone());
    assert_eq!(missing, Some(json!("Capability not found: getBalance")));
    Ok(())
}

#[tokio::test]
async fn test_disconnect_stops_provider_stream() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(
                    streamed_step(r#"{"TYPE":"FINAL_ANSWER","FINAL_ANSWER":{"answer":"late"}}"#, 7)
                        .into_bytes(),
                    "text/event-stream",
                )
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let run = orchestrator(&server)?.invoke(vec![Message::user("hi")], "gpt-3.5-turbo", None);
    let token = run.token.clone();
    drop(run.events);

    let outcome = tokio::time::timeout(Duration::from_secs(2), run.outcome).await??;
    assert!(matches!(outcome, Err(RunError::Cancelled)));
    assert!(token.is_cancelled());
    Ok(())
}
