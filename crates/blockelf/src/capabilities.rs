mod capability;
mod registry;
pub mod time;

pub use capability::{Capability, FnCapability};
pub use registry::CapabilityRegistry;
