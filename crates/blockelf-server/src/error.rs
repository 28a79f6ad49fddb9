use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Invalid value for {env_var}: {reason}")]
    InvalidValue { env_var: String, reason: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a dotted configuration key to the environment variable that sets it
pub fn to_env_var(field_path: &str) -> String {
    // Handle nested fields by converting dots to double underscores
    // If the field is in the provider object, we need to prefix it appropriately
    let normalized_path = if field_path == "type" || field_path == "provider" {
        "provider.type".to_string()
    } else if field_path.starts_with("provider.") {
        field_path.to_string()
    } else if ["host", "api_key"].contains(&field_path) {
        format!("provider.{}", field_path)
    } else {
        field_path.to_string()
    };

    format!(
        "BLOCKELF_{}",
        normalized_path.replace('.', "__").to_uppercase()
    )
}
