use super::{base::StepGenerator, configs::ProviderConfig, openai::OpenAiGenerator};
use anyhow::Result;
use std::sync::Arc;

pub fn get_generator(config: ProviderConfig) -> Result<Arc<dyn StepGenerator>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => {
            Ok(Arc::new(OpenAiGenerator::new(openai_config)?))
        }
        ProviderConfig::Ollama(ollama_config) => {
            Ok(Arc::new(OpenAiGenerator::ollama(ollama_config)?))
        }
    }
}
