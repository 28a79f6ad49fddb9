//! These models represent the objects passed around by the orchestrator
//!
//! There are a few related formats we need to interact with:
//! - conversation messages, sent from the interface to the orchestrator
//! - steps, the structured decisions produced by the generation provider each iteration
//! - events, sent from the orchestrator back to the interface while a run progresses
//! - capability descriptors, rendered into the system prompt for the provider
//!
//! We always immediately convert external data into these internal structs. The step wire
//! format is the only one with a schema the provider has to honor, see [`step`].
pub mod capability;
pub mod catalog;
pub mod event;
pub mod message;
pub mod role;
pub mod step;
