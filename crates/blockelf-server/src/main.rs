mod configuration;
mod error;
mod routes;
mod state;

use blockelf::capabilities::{time, CapabilityRegistry};
use blockelf::providers::factory;
use blockelf::Orchestrator;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let settings = configuration::Settings::new()?;
    let addr = settings.server.socket_addr()?;

    // The data-source integrations register here alongside the date utilities
    let mut registry = CapabilityRegistry::new();
    time::register(&mut registry)?;

    let generator = factory::get_generator(settings.provider.into_config())?;
    let orchestrator = Orchestrator::new(generator, registry, settings.orchestrator.into_config())?;
    info!(capabilities = orchestrator.registry().len(), "orchestrator ready");

    let state = state::AppState::new(orchestrator, settings.defaults);

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
