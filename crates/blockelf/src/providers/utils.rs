use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{GenerationError, GenerationResult};
use crate::models::step::Step;
use crate::transcript::Transcript;

/// How the provider is asked to constrain its output
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Send the step schema; for endpoints that support strict structured output
    JsonSchema,
    /// Only ask for a JSON object and rely on the prompt for the shape
    JsonObject,
}

/// Convert the transcript to the chat completions message specification
pub fn transcript_to_openai_spec(transcript: &Transcript) -> Vec<Value> {
    transcript
        .entries()
        .iter()
        .map(|entry| {
            json!({
                "role": entry.role,
                "content": entry.content,
            })
        })
        .collect()
}

pub fn response_format_spec(format: ResponseFormat) -> Value {
    match format {
        ResponseFormat::JsonSchema => json!({
            "type": "json_schema",
            "json_schema": {
                "name": "step",
                "schema": Step::json_schema(),
            }
        }),
        ResponseFormat::JsonObject => json!({"type": "json_object"}),
    }
}

/// Pull the content delta out of one streamed chat completion chunk
pub fn openai_chunk_delta(data: &str) -> GenerationResult<Option<String>> {
    let chunk: Value = serde_json::from_str(data)
        .map_err(|e| GenerationError::Provider(format!("Malformed stream chunk: {}", e)))?;

    if let Some(error) = chunk.get("error") {
        return Err(GenerationError::Provider(format!("Provider error: {}", error)));
    }

    Ok(chunk["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_string))
}

/// Some models wrap their JSON in a markdown fence even when asked not to
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest)
}

/// Parse the complete provider output into a step
pub fn parse_step(text: &str) -> GenerationResult<Step> {
    let body = strip_code_fence(text).trim();
    if body.is_empty() {
        return Err(GenerationError::Incomplete);
    }
    Step::from_json(body).map_err(|e| GenerationError::Schema(e.to_string()))
}

/// Parse a possibly truncated JSON document
pub fn parse_partial_json(text: &str) -> Option<Value> {
    let body = strip_code_fence(text);
    if let Ok(value) = serde_json::from_str(body) {
        return Some(value);
    }
    serde_json::from_str(&complete_partial_json(body)?).ok()
}

/// Close a truncated JSON document: terminate the open string, drop an incomplete escape,
/// remove a dangling comma, give a dangling key a null value, and close open containers.
///
/// Returns `None` when the brackets are unbalanced. Cuts inside a literal or a key still
/// produce text that fails to parse, so callers must treat the result as a best effort.
pub fn complete_partial_json(text: &str) -> Option<String> {
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escape_at: Option<usize> = None;
    let mut unicode_left = 0;

    for (i, c) in text.char_indices() {
        if in_string {
            if escape_at.is_some() {
                if unicode_left > 0 {
                    unicode_left -= 1;
                    if unicode_left == 0 {
                        escape_at = None;
                    }
                } else if c == 'u' {
                    unicode_left = 4;
                } else {
                    escape_at = None;
                }
                continue;
            }
            match c {
                '\\' => escape_at = Some(i),
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                if closers.pop() != Some(c) {
                    return None;
                }
            }
            _ => {}
        }
    }

    let mut completed = if in_string {
        let mut open = text[..escape_at.unwrap_or(text.len())].to_string();
        open.push('"');
        open
    } else {
        text.trim_end().to_string()
    };

    if completed.ends_with(',') {
        completed.pop();
    }
    if completed.ends_with(':') {
        completed.push_str("null");
    }
    completed.extend(closers.iter().rev());
    Some(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;

    #[test]
    fn test_complete_open_string_and_objects() {
        let partial = r#"{"TYPE":"FINAL_ANSWER","FINAL_ANSWER":{"answer":"ETH is tr"#;
        assert_eq!(
            parse_partial_json(partial),
            Some(json!({"TYPE": "FINAL_ANSWER", "FINAL_ANSWER": {"answer": "ETH is tr"}}))
        );
    }

    #[test]
    fn test_complete_drops_incomplete_escapes() {
        assert_eq!(
            parse_partial_json(r#"{"answer":"line\"#),
            Some(json!({"answer": "line"}))
        );
        assert_eq!(
            parse_partial_json(r#"{"answer":"price \u00"#),
            Some(json!({"answer": "price "}))
        );
        assert_eq!(
            parse_partial_json(r#"{"answer":"a\nb"#),
            Some(json!({"answer": "a\nb"}))
        );
    }

    #[test]
    fn test_complete_dangling_comma_and_key() {
        assert_eq!(
            parse_partial_json(r#"{"TYPE":"EXECUTE", "#),
            Some(json!({"TYPE": "EXECUTE"}))
        );
        assert_eq!(
            parse_partial_json(r#"{"TYPE": "#),
            Some(json!({"TYPE": null}))
        );
        assert_eq!(parse_partial_json(r#"[1, 2,"#), Some(json!([1, 2])));
    }

    #[test]
    fn test_uncompletable_prefixes() {
        assert_eq!(parse_partial_json(r#"{"TYPE":"FINAL_ANSWER","FINAL_"#), None);
        assert_eq!(parse_partial_json(r#"{"done": tr"#), None);
        assert_eq!(complete_partial_json(r#"{"a": [}"#), None);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "\n{\"a\":1}\n");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(
            parse_partial_json("```json\n{\"answer\": \"ET"),
            Some(json!({"answer": "ET"}))
        );
    }

    #[test]
    fn test_parse_step() {
        let step = parse_step(r#"{"TYPE":"FINAL_ANSWER","FINAL_ANSWER":{"answer":"done"}}"#).unwrap();
        assert_eq!(step, Step::final_answer("done"));

        assert!(matches!(parse_step("  "), Err(GenerationError::Incomplete)));
        assert!(matches!(
            parse_step(r#"{"TYPE":"EXECUTE"}"#),
            Err(GenerationError::Schema(_))
        ));
    }

    #[test]
    fn test_openai_chunk_delta() {
        let chunk = r#"{"id":"1","choices":[{"index":0,"delta":{"content":"{\"TY"}}]}"#;
        assert_eq!(openai_chunk_delta(chunk).unwrap().as_deref(), Some("{\"TY"));

        let role_only = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(openai_chunk_delta(role_only).unwrap(), None);

        let error = r#"{"error":{"message":"rate limited"}}"#;
        assert!(matches!(
            openai_chunk_delta(error),
            Err(GenerationError::Provider(_))
        ));
    }

    #[test]
    fn test_transcript_to_openai_spec() {
        let transcript = Transcript::new("system prompt", &[Message::user("hi")]);
        let spec = transcript_to_openai_spec(&transcript);
        assert_eq!(
            spec,
            vec![
                json!({"role": "system", "content": "system prompt"}),
                json!({"role": "user", "content": "hi"}),
            ]
        );
    }

    #[test]
    fn test_response_format_spec() {
        let spec = response_format_spec(ResponseFormat::JsonSchema);
        assert_eq!(spec["type"], "json_schema");
        assert_eq!(spec["json_schema"]["schema"], Step::json_schema());
        assert_eq!(
            response_format_spec(ResponseFormat::JsonObject),
            json!({"type": "json_object"})
        );
    }
}
