use crate::state::AppState;
use axum::{extract::State, response::Json, routing::get, Router};
use blockelf::models::catalog::{ModelInfo, TemperaturePreset, AVAILABLE_MODELS, TEMPERATURE_PRESETS};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Defaults {
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    models: &'static [ModelInfo],
    temperatures: &'static [TemperaturePreset],
    defaults: Defaults,
}

#[derive(Debug, Serialize)]
pub struct CapabilitySummary {
    name: String,
    description: String,
}

pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: AVAILABLE_MODELS,
        temperatures: TEMPERATURE_PRESETS,
        defaults: Defaults {
            model: state.defaults.model.clone(),
            temperature: state.defaults.temperature,
        },
    })
}

pub async fn list_capabilities(State(state): State<AppState>) -> Json<Vec<CapabilitySummary>> {
    let capabilities = state
        .orchestrator
        .registry()
        .catalog()
        .into_iter()
        .map(|info| CapabilitySummary {
            name: info.name,
            description: info.description,
        })
        .collect();
    Json(capabilities)
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/models", get(list_models))
        .route("/capabilities", get(list_capabilities))
        .with_state(state)
}
