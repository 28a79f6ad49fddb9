use serde::{Deserialize, Serialize};

use super::utils::ResponseFormat;

pub const OPENAI_DEFAULT_HOST: &str = "https://openrouter.ai/api";
pub const OLLAMA_DEFAULT_HOST: &str = "http://localhost:11434";

// Unified enum to wrap different provider configurations
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    Ollama(OllamaProviderConfig),
}

// Define specific config structs for each provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    #[serde(default = "default_response_format")]
    pub response_format: ResponseFormat,
}

impl OpenAiProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            host: OPENAI_DEFAULT_HOST.to_string(),
            api_key: api_key.into(),
            response_format: default_response_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaProviderConfig {
    pub host: String,
}

impl Default for OllamaProviderConfig {
    fn default() -> Self {
        Self {
            host: OLLAMA_DEFAULT_HOST.to_string(),
        }
    }
}

fn default_response_format() -> ResponseFormat {
    ResponseFormat::JsonSchema
}
