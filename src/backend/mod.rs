//! Processing-node capability.
//!
//! The media library that actually decodes, composites, encodes and ships
//! frames sits behind [`MediaBackend`]. The orchestrator only creates, wires,
//! starts and stops nodes through it and listens to the events it reports.
//!
//! # Components
//!
//! - [`MediaBackend`] - the capability contract
//! - [`SimulatedBackend`] - in-process implementation for tests and dry runs
//! - `MockMediaBackend` - mockall double, test builds only

pub mod capability;
pub mod simulated;

pub use capability::{CapabilityError, MediaBackend, NodeSpec, Properties, PropertyValue};
pub use simulated::{BackendCall, SimulatedBackend};

#[cfg(test)]
pub use capability::MockMediaBackend;
