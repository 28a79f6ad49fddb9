use blockelf::Orchestrator;

use crate::configuration::DefaultsSettings;

/// Shared application state
#[derive(Clone, Debug)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub defaults: DefaultsSettings,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, defaults: DefaultsSettings) -> Self {
        Self {
            orchestrator,
            defaults,
        }
    }

    /// The model and temperature for a request, falling back to the configured defaults
    pub fn resolve(&self, model: Option<String>, temperature: Option<f32>) -> (String, f32) {
        (
            model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.defaults.model.clone()),
            temperature.unwrap_or(self.defaults.temperature),
        )
    }
}
