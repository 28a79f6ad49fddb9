use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Describes a capability to the generation provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilityInfo {
    /// The unique name of the capability
    pub name: String,
    /// A description of what the capability returns
    pub description: String,
    /// JSON schema of the parameters the capability accepts
    pub parameters: Value,
}

impl CapabilityInfo {
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        CapabilityInfo {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

pub(crate) fn empty_params() -> Value {
    Value::Object(Default::default())
}
