use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use blockelf::capabilities::{time, CapabilityRegistry};
use blockelf::models::catalog::{find_preset, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use blockelf::providers::configs::{
    OllamaProviderConfig, OpenAiProviderConfig, ProviderConfig, OLLAMA_DEFAULT_HOST,
};
use blockelf::providers::factory::get_generator;
use blockelf::{Orchestrator, OrchestratorConfig};

mod prompt;
mod session;

use prompt::cliclack::CliclackPrompt;
use session::Session;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Provider option (open-ai or ollama)
    #[arg(short, long, value_enum, default_value = "open-ai", global = true)]
    provider: ProviderVariant,

    /// API key for the OpenAI compatible provider
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Provider host, defaults to OpenRouter or a local Ollama
    #[arg(long, env = "BLOCKELF_HOST", global = true)]
    host: Option<String>,

    /// Model to use
    #[arg(short, long, default_value = DEFAULT_MODEL, global = true)]
    model: String,

    /// Sampling temperature as a number or a preset (precise, neutral, creative)
    #[arg(short, long, value_parser = parse_temperature, global = true)]
    temperature: Option<f32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a single question and print the answer
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Start an interactive chat session
    Chat,
}

#[derive(clap::ValueEnum, Clone, Debug, PartialEq)]
enum ProviderVariant {
    OpenAi,
    Ollama,
}

fn parse_temperature(value: &str) -> Result<f32, String> {
    if let Some(preset) = find_preset(value) {
        return Ok(preset.temperature);
    }
    let temperature: f32 = value
        .parse()
        .map_err(|_| format!("`{}` is neither a number nor a temperature preset", value))?;
    if (0.0..=2.0).contains(&temperature) {
        Ok(temperature)
    } else {
        Err("temperature must be between 0 and 2".to_string())
    }
}

fn provider_config(cli: &Cli) -> Result<ProviderConfig> {
    match cli.provider {
        ProviderVariant::OpenAi => {
            let api_key = cli.api_key.clone().context(
                "API key must be provided via --api-key or OPENROUTER_API_KEY environment variable",
            )?;
            let mut config = OpenAiProviderConfig::new(api_key);
            if let Some(host) = &cli.host {
                config.host = host.clone();
            }
            Ok(ProviderConfig::OpenAi(config))
        }
        ProviderVariant::Ollama => Ok(ProviderConfig::Ollama(OllamaProviderConfig {
            host: cli
                .host
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_HOST.to_string()),
        })),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let generator = get_generator(provider_config(&cli)?)?;
    let mut registry = CapabilityRegistry::new();
    time::register(&mut registry)?;
    let orchestrator = Orchestrator::new(generator, registry, OrchestratorConfig::default())?;

    let temperature = cli.temperature.unwrap_or(DEFAULT_TEMPERATURE);
    let mut session = Session::new(
        orchestrator,
        Box::new(CliclackPrompt::new()),
        cli.model.clone(),
        temperature,
    );

    match cli.command {
        Command::Ask { question } => session.headless_start(question.join(" ")).await,
        Command::Chat => session.start().await,
    }
}
