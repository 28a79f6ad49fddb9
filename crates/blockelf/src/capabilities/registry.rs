use anyhow::{anyhow, Result};
use jsonschema::JSONSchema;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::capability::Capability;
use crate::errors::{CapabilityError, CapabilityResult};
use crate::models::capability::CapabilityInfo;

lazy_static! {
    static ref CAPABILITY_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]{0,63}$").unwrap();
}

struct Entry {
    capability: Arc<dyn Capability>,
    validator: JSONSchema,
}

/// The flat catalog of capabilities available to a run.
///
/// Assembled once up front and only read afterwards; lookups by name are stable for the
/// lifetime of the registry.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability, rejecting duplicate names and schemas that do not compile
    pub fn register(&mut self, capability: impl Capability + 'static) -> Result<()> {
        self.register_arc(Arc::new(capability))
    }

    pub fn register_arc(&mut self, capability: Arc<dyn Capability>) -> Result<()> {
        let name = capability.name().to_string();
        if !CAPABILITY_NAME.is_match(&name) {
            return Err(anyhow!("Invalid capability name: {:?}", name));
        }
        if self.index.contains_key(&name) {
            return Err(anyhow!("Duplicate capability name: {}", name));
        }

        let validator = JSONSchema::compile(capability.parameters())
            .map_err(|e| anyhow!("Invalid parameter schema for {}: {}", name, e))?;

        self.index.insert(name, self.entries.len());
        self.entries.push(Entry {
            capability,
            validator,
        });
        Ok(())
    }

    /// Builder-style variant of [`CapabilityRegistry::register`]
    pub fn with(mut self, capability: impl Capability + 'static) -> Result<Self> {
        self.register(capability)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.entry(name).map(|entry| entry.capability.clone())
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptors of every capability in registration order
    pub fn catalog(&self) -> Vec<CapabilityInfo> {
        self.entries
            .iter()
            .map(|entry| entry.capability.info())
            .collect()
    }

    /// Coerce and validate the parameters, then invoke the named capability
    pub async fn invoke(&self, name: &str, params: Value) -> CapabilityResult<Value> {
        let entry = self.entry(name).ok_or_else(|| CapabilityError::NotFound {
            name: name.to_string(),
        })?;

        let attempted = params.clone();
        let params = coerce_params(entry.capability.parameters(), params).map_err(|reason| {
            CapabilityError::InvalidParameters {
                name: name.to_string(),
                params: attempted,
                reason,
            }
        })?;

        let violations: Vec<String> = match entry.validator.validate(&params) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.map(|e| e.to_string()).collect(),
        };
        if !violations.is_empty() {
            return Err(CapabilityError::InvalidParameters {
                name: name.to_string(),
                params,
                reason: violations.join("; "),
            });
        }

        tracing::debug!(capability = name, %params, "invoking capability");
        entry
            .capability
            .call(params.clone())
            .await
            .map_err(|e| CapabilityError::execution(name, params, e))
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.index.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Fill schema defaults and coerce scalar strings the provider tends to emit for numbers and
/// booleans. Only top-level properties are touched; parameter bags are flat.
fn coerce_params(schema: &Value, params: Value) -> Result<Value, String> {
    let mut params = match params {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => return Err(format!("expected an object of parameters, got {}", other)),
    };

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(Value::Object(params));
    };

    for (key, property) in properties {
        match params.get_mut(key) {
            None => {
                if let Some(default) = property.get("default") {
                    params.insert(key.clone(), default.clone());
                }
            }
            Some(value) => {
                if let Some(coerced) = coerce_scalar(property, value) {
                    *value = coerced;
                }
            }
        }
    }

    Ok(Value::Object(params))
}

fn coerce_scalar(property: &Value, value: &Value) -> Option<Value> {
    let text = value.as_str()?.trim();
    match property.get("type").and_then(Value::as_str)? {
        "integer" => text.parse::<i64>().ok().map(Value::from),
        "number" => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        "boolean" => match text {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}
