pub mod capabilities;
pub mod errors;
pub mod events;
pub mod models;
pub mod orchestrator;
pub mod prompt_template;
pub mod providers;
pub mod transcript;

pub use capabilities::{Capability, CapabilityRegistry, FnCapability};
pub use errors::{CapabilityError, GenerationError, RunError};
pub use events::EventStream;
pub use models::event::{Event, Phase};
pub use models::message::Message;
pub use models::step::Step;
pub use orchestrator::{ExecuteFailurePolicy, Orchestrator, OrchestratorConfig, Run, RunSummary};
