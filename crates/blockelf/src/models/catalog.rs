use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const AVAILABLE_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "google/gemini-flash-1.5",
        name: "Gemini Flash 1.5",
        description: "Very fast model with low latency, but lower accuracy.",
    },
    ModelInfo {
        id: "gpt-3.5-turbo",
        name: "GPT-3.5 Turbo",
        description: "The most powerful model with the best accuracy.",
    },
];

pub const DEFAULT_MODEL: &str = "google/gemini-flash-1.5";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperaturePreset {
    pub temperature: f32,
    pub label: &'static str,
    pub description: &'static str,
}

pub const TEMPERATURE_PRESETS: &[TemperaturePreset] = &[
    TemperaturePreset {
        temperature: 0.23,
        label: "Precise",
        description: "Consistent, precise, and factual. Suitable for normal use.",
    },
    TemperaturePreset {
        temperature: 0.6,
        label: "Neutral",
        description: "Neutral and balanced. Offering appropriateness while staying in-topic.",
    },
    TemperaturePreset {
        temperature: 0.85,
        label: "Creative",
        description: "Creative, imaginative, and innovative. Suitable for creative writing.",
    },
];

pub const DEFAULT_TEMPERATURE: f32 = 0.23;

/// Look up a known model. Unknown ids are still valid for the provider.
pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    AVAILABLE_MODELS.iter().find(|model| model.id == id)
}

/// Look up a temperature preset by its label, ignoring case
pub fn find_preset(label: &str) -> Option<&'static TemperaturePreset> {
    TEMPERATURE_PRESETS
        .iter()
        .find(|preset| preset.label.eq_ignore_ascii_case(label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_in_catalog() {
        assert_eq!(find_model(DEFAULT_MODEL).map(|m| m.name), Some("Gemini Flash 1.5"));
        assert!(TEMPERATURE_PRESETS
            .iter()
            .any(|p| p.temperature == DEFAULT_TEMPERATURE));
    }

    #[test]
    fn test_find_preset_ignores_case() {
        assert_eq!(find_preset("creative").map(|p| p.temperature), Some(0.85));
        assert!(find_preset("wild").is_none());
    }
}
