use crate::error::{to_env_var, ConfigError};
use blockelf::models::catalog::{DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use blockelf::orchestrator::{ExecuteFailurePolicy, OrchestratorConfig};
use blockelf::providers::configs::{
    OllamaProviderConfig, OpenAiProviderConfig, ProviderConfig, OLLAMA_DEFAULT_HOST,
    OPENAI_DEFAULT_HOST,
};
use blockelf::providers::utils::ResponseFormat;
use config::{Config, Environment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                env_var: to_env_var("server.host"),
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_response_format")]
        response_format: ResponseFormat,
    },
    Ollama {
        #[serde(default = "default_ollama_host")]
        host: String,
    },
}

impl ProviderSettings {
    // Convert to the blockelf ProviderConfig
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                response_format,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                response_format,
            }),
            ProviderSettings::Ollama { host } => {
                ProviderConfig::Ollama(OllamaProviderConfig { host })
            }
        }
    }
}

/// Run limits. A value of 0 disables the corresponding limit.
#[derive(Debug, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
    #[serde(default = "default_capability_timeout_secs")]
    pub capability_timeout_secs: u64,
    #[serde(default)]
    pub execute_failure: ExecuteFailurePolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_duration_secs: default_max_duration_secs(),
            capability_timeout_secs: default_capability_timeout_secs(),
            execute_failure: ExecuteFailurePolicy::default(),
        }
    }
}

impl OrchestratorSettings {
    pub fn into_config(self) -> OrchestratorConfig {
        let seconds = |secs: u64| Some(Duration::from_secs(secs)).filter(|d| !d.is_zero());
        OrchestratorConfig {
            max_steps: Some(self.max_steps).filter(|&n| n > 0),
            max_duration: seconds(self.max_duration_secs),
            capability_timeout: seconds(self.capability_timeout_secs),
            execute_failure: self.execute_failure,
        }
    }
}

/// Used when a request does not pick a model or temperature
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for DefaultsSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub defaults: DefaultsSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("BLOCKELF")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        // Try to deserialize the configuration
        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Handle missing field errors specially
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                if let Some(field) = missing_field(&err.to_string()) {
                    let env_var = to_env_var(&field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

/// Extract the dotted path from "missing field `type`" or "missing field `type` for key `provider`"
fn missing_field(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let (field, rest) = rest.split_once('`')?;
    let parent = rest
        .split_once("for key `")
        .and_then(|(_, key)| key.split_once('`'))
        .map(|(key, _)| key)
        .filter(|key| !key.is_empty());

    Some(match parent {
        Some(parent) => format!("{}.{}", parent, field),
        None => field.to_string(),
    })
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_openai_host() -> String {
    OPENAI_DEFAULT_HOST.to_string()
}

fn default_ollama_host() -> String {
    OLLAMA_DEFAULT_HOST.to_string()
}

fn default_response_format() -> ResponseFormat {
    ResponseFormat::JsonSchema
}

fn default_max_steps() -> usize {
    24
}

fn default_max_duration_secs() -> u64 {
    180
}

fn default_capability_timeout_secs() -> u64 {
    30
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("BLOCKELF_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();

        // Set required provider settings for test
        env::set_var("BLOCKELF_PROVIDER__TYPE", "openai");
        env::set_var("BLOCKELF_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.defaults.model, "google/gemini-flash-1.5");
        assert_eq!(settings.defaults.temperature, 0.23);

        if let ProviderSettings::OpenAi {
            host,
            api_key,
            response_format,
        } = settings.provider
        {
            assert_eq!(host, "https://openrouter.ai/api");
            assert_eq!(api_key, "test-key");
            assert_eq!(response_format, ResponseFormat::JsonSchema);
        } else {
            panic!("Expected OpenAI provider");
        }

        let config = settings.orchestrator.into_config();
        assert_eq!(config, OrchestratorConfig::default());

        // Clean up
        env::remove_var("BLOCKELF_PROVIDER__TYPE");
        env::remove_var("BLOCKELF_PROVIDER__API_KEY");
    }

    #[test]
    #[serial]
    fn test_ollama_settings() {
        clean_env();
        env::set_var("BLOCKELF_PROVIDER__TYPE", "ollama");
        env::set_var("BLOCKELF_PROVIDER__HOST", "http://custom.ollama.host");
        env::set_var("BLOCKELF_DEFAULTS__MODEL", "llama3.1");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.defaults.model, "llama3.1");
        if let ProviderSettings::Ollama { host } = settings.provider {
            assert_eq!(host, "http://custom.ollama.host");
        } else {
            panic!("Expected Ollama provider");
        }

        // Clean up
        env::remove_var("BLOCKELF_PROVIDER__TYPE");
        env::remove_var("BLOCKELF_PROVIDER__HOST");
        env::remove_var("BLOCKELF_DEFAULTS__MODEL");
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("BLOCKELF_SERVER__PORT", "8080");
        env::set_var("BLOCKELF_PROVIDER__TYPE", "openai");
        env::set_var("BLOCKELF_PROVIDER__API_KEY", "test-key");
        env::set_var("BLOCKELF_PROVIDER__HOST", "https://api.openai.com");
        env::set_var("BLOCKELF_ORCHESTRATOR__MAX_STEPS", "0");
        env::set_var("BLOCKELF_ORCHESTRATOR__CAPABILITY_TIMEOUT_SECS", "5");
        env::set_var("BLOCKELF_ORCHESTRATOR__EXECUTE_FAILURE", "record");
        env::set_var("BLOCKELF_DEFAULTS__TEMPERATURE", "0.85");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.defaults.temperature, 0.85);

        if let ProviderSettings::OpenAi { host, .. } = &settings.provider {
            assert_eq!(host, "https://api.openai.com");
        } else {
            panic!("Expected OpenAI provider");
        }

        let config = settings.orchestrator.into_config();
        assert_eq!(config.max_steps, None);
        assert_eq!(config.max_duration, Some(Duration::from_secs(180)));
        assert_eq!(config.capability_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.execute_failure, ExecuteFailurePolicy::Record);

        // Clean up
        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_provider_type() {
        clean_env();
        env::set_var("BLOCKELF_PROVIDER__API_KEY", "test-key");

        let err = Settings::new().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnvVar { ref env_var } if env_var == "BLOCKELF_PROVIDER__TYPE"
        ));

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_api_key() {
        clean_env();
        env::set_var("BLOCKELF_PROVIDER__TYPE", "openai");

        let err = Settings::new().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnvVar { ref env_var } if env_var == "BLOCKELF_PROVIDER__API_KEY"
        ));

        clean_env();
    }

    #[test]
    fn test_missing_field() {
        assert_eq!(missing_field("missing field `type`").as_deref(), Some("type"));
        assert_eq!(
            missing_field("missing field `api_key` for key `provider`").as_deref(),
            Some("provider.api_key")
        );
        assert_eq!(missing_field("invalid type: string"), None);
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");

        let invalid = ServerSettings {
            host: "not a host".to_string(),
            port: 3000,
        };
        assert!(invalid.socket_addr().is_err());
    }
}
