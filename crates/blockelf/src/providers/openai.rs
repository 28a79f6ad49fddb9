use anyhow::Result;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{retry::Never, Event as SseEvent, EventSource};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::base::{FragmentStream, GenerationRequest, StepFragment, StepGenerator};
use super::configs::{OllamaProviderConfig, OpenAiProviderConfig};
use super::utils::{
    openai_chunk_delta, parse_partial_json, parse_step, response_format_spec,
    transcript_to_openai_spec, ResponseFormat,
};
use crate::errors::{GenerationError, GenerationResult};

/// Streams steps from any OpenAI compatible chat completions endpoint
pub struct OpenAiGenerator {
    client: Client,
    host: String,
    api_key: Option<String>,
    response_format: ResponseFormat,
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        Self::build(config.host, Some(config.api_key), config.response_format)
    }

    pub fn ollama(config: OllamaProviderConfig) -> Result<Self> {
        Self::build(config.host, None, ResponseFormat::JsonObject)
    }

    fn build(host: String, api_key: Option<String>, response_format: ResponseFormat) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self {
            client,
            host,
            api_key,
            response_format,
        })
    }

    fn payload(&self, request: &GenerationRequest<'_>) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": transcript_to_openai_spec(request.transcript),
            "stream": true,
            "response_format": response_format_spec(self.response_format),
        });

        if let (Some(temp), Some(object)) = (request.temperature, payload.as_object_mut()) {
            object.insert("temperature".to_string(), json!(temp));
        }
        payload
    }

    fn open(&self, payload: &Value) -> GenerationResult<EventSource> {
        let url = format!("{}/v1/chat/completions", self.host.trim_end_matches('/'));

        let mut builder = self.client.post(&url).json(payload);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let mut source = EventSource::new(builder)
            .map_err(|e| GenerationError::Provider(format!("Cannot open stream: {}", e)))?;
        // A failed generation ends the run; a new attempt is a new run
        source.set_retry_policy(Box::new(Never));
        Ok(source)
    }
}

impl StepGenerator for OpenAiGenerator {
    fn generate<'a>(
        &'a self,
        request: GenerationRequest<'a>,
        cancel: CancellationToken,
    ) -> FragmentStream<'a> {
        Box::pin(async_stream::try_stream! {
            let payload = self.payload(&request);
            let mut source = self.open(&payload)?;
            let mut buffer = String::new();

            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    event = source.next() => Some(event),
                };

                let event = match event {
                    Some(event) => event,
                    None => {
                        source.close();
                        Err::<(), _>(GenerationError::Cancelled)?;
                        break;
                    }
                };

                match event {
                    None | Some(Err(reqwest_eventsource::Error::StreamEnded)) => break,
                    Some(Ok(SseEvent::Open)) => continue,
                    Some(Ok(SseEvent::Message(message))) => {
                        let data = message.data.trim();
                        if data == "[DONE]" {
                            break;
                        }
                        if data.is_empty() {
                            continue;
                        }
                        if let Some(delta) = openai_chunk_delta(data)? {
                            if delta.is_empty() {
                                continue;
                            }
                            buffer.push_str(&delta);
                            if let Some(partial) = parse_partial_json(&buffer) {
                                yield StepFragment::Partial(partial);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        source.close();
                        Err::<(), _>(GenerationError::Provider(e.to_string()))?;
                    }
                }
            }

            source.close();
            tracing::debug!(chars = buffer.len(), "step generation finished");
            yield StepFragment::Complete(parse_step(&buffer)?);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use crate::models::step::Step;
    use crate::transcript::Transcript;
    use futures::TryStreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse_body(content_chunks: &[&str]) -> String {
        let mut body = String::new();
        for chunk in content_chunks {
            let data = json!({
                "id": "chatcmpl-123",
                "object": "chat.completion.chunk",
                "choices": [{"index": 0, "delta": {"content": chunk}}]
            });
            body.push_str(&format!("data: {}\n\n", data));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    async fn _setup_mock_server(body: String) -> (MockServer, OpenAiGenerator) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test_api_key"))
            .and(body_partial_json(json!({"model": "gpt-3.5-turbo", "stream": true})))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/event-stream"),
            )
            .mount(&mock_server)
            .await;

        let config = OpenAiProviderConfig {
            host: mock_server.uri(),
            api_key: "test_api_key".to_string(),
            response_format: ResponseFormat::JsonSchema,
        };

        let generator = OpenAiGenerator::new(config).unwrap();
        (mock_server, generator)
    }

    fn transcript() -> Transcript {
        Transcript::new("You are an on-chain analyst.", &[Message::user("ETH price?")])
    }

    #[tokio::test]
    async fn test_generate_streams_partials_then_step() -> Result<()> {
        let body = sse_body(&[
            r#"{"TYPE":"FINAL_ANSWER","#,
            r#""FINAL_ANSWER":{"answer":"ETH is "#,
            r#"3000 USD"}}"#,
        ]);
        let (_server, generator) = _setup_mock_server(body).await;
        let transcript = transcript();
        let request = GenerationRequest {
            transcript: &transcript,
            model: "gpt-3.5-turbo",
            temperature: Some(0.23),
        };

        let fragments: Vec<StepFragment> = generator
            .generate(request, CancellationToken::new())
            .try_collect()
            .await?;

        assert_eq!(
            fragments.last(),
            Some(&StepFragment::Complete(Step::final_answer("ETH is 3000 USD")))
        );
        let answers: Vec<_> = fragments
            .iter()
            .filter_map(|f| match f {
                StepFragment::Partial(value) => value["FINAL_ANSWER"]["answer"].as_str(),
                StepFragment::Complete(_) => None,
            })
            .collect();
        assert_eq!(answers, vec!["ETH is ", "ETH is 3000 USD"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_rejects_nonconforming_step() -> Result<()> {
        let body = sse_body(&[r#"{"TYPE":"EXECUTE","FINAL_ANSWER":{"answer":"x"}}"#]);
        let (_server, generator) = _setup_mock_server(body).await;
        let transcript = transcript();
        let request = GenerationRequest {
            transcript: &transcript,
            model: "gpt-3.5-turbo",
            temperature: None,
        };

        let result: GenerationResult<Vec<StepFragment>> = generator
            .generate(request, CancellationToken::new())
            .try_collect()
            .await;
        assert!(matches!(result, Err(GenerationError::Schema(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_surfaces_http_errors() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;
        let generator = OpenAiGenerator::new(OpenAiProviderConfig {
            host: mock_server.uri(),
            api_key: "test_api_key".to_string(),
            response_format: ResponseFormat::JsonSchema,
        })?;
        let transcript = transcript();
        let request = GenerationRequest {
            transcript: &transcript,
            model: "gpt-3.5-turbo",
            temperature: None,
        };

        let result: GenerationResult<Vec<StepFragment>> = generator
            .generate(request, CancellationToken::new())
            .try_collect()
            .await;
        assert!(matches!(result, Err(GenerationError::Provider(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_stops_when_cancelled() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(sse_body(&["{}"]).into_bytes(), "text/event-stream")
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&mock_server)
            .await;
        let generator = OpenAiGenerator::ollama(OllamaProviderConfig {
            host: mock_server.uri(),
        })?;
        let transcript = transcript();
        let request = GenerationRequest {
            transcript: &transcript,
            model: "llama3.1",
            temperature: None,
        };

        let cancel = CancellationToken::new();
        let mut stream = generator.generate(request, cancel.clone());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let first = tokio::time::timeout(Duration::from_secs(5), stream.next()).await?;
        assert!(matches!(first, Some(Err(GenerationError::Cancelled))));
        Ok(())
    }
}
