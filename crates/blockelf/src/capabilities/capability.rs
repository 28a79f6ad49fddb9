use anyhow::Result as AnyhowResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;

use crate::models::capability::CapabilityInfo;

/// A named, read-only, schema-described operation the orchestrator may invoke
#[async_trait]
pub trait Capability: Send + Sync {
    /// Get the unique name of the capability
    fn name(&self) -> &str;

    /// Get the description shown to the provider
    fn description(&self) -> &str;

    /// Get the JSON schema of the accepted parameters
    fn parameters(&self) -> &Value;

    /// Invoke the capability. Parameters have already been coerced and validated against
    /// [`Capability::parameters`] by the registry, and the result must be JSON serializable.
    async fn call(&self, params: Value) -> AnyhowResult<Value>;

    fn info(&self) -> CapabilityInfo {
        CapabilityInfo::new(self.name(), self.description(), self.parameters().clone())
    }
}

type Handler = Box<dyn Fn(Value) -> BoxFuture<'static, AnyhowResult<Value>> + Send + Sync>;

/// A capability backed by an async closure
pub struct FnCapability {
    info: CapabilityInfo,
    handler: Handler,
}

impl FnCapability {
    pub fn new<N, D, F, Fut>(name: N, description: D, parameters: Value, handler: F) -> Self
    where
        N: Into<String>,
        D: Into<String>,
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AnyhowResult<Value>> + Send + 'static,
    {
        Self {
            info: CapabilityInfo::new(name, description, parameters),
            handler: Box::new(move |params| Box::pin(handler(params))),
        }
    }
}

#[async_trait]
impl Capability for FnCapability {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        &self.info.description
    }

    fn parameters(&self) -> &Value {
        &self.info.parameters
    }

    async fn call(&self, params: Value) -> AnyhowResult<Value> {
        (self.handler)(params).await
    }
}

impl std::fmt::Debug for FnCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCapability")
            .field("name", &self.info.name)
            .finish_non_exhaustive()
    }
}
