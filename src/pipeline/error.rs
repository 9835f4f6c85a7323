//! Pipeline-specific error types.

use crate::backend::CapabilityError;
use crate::pipeline::node_type::NodeKind;
use thiserror::Error;

/// Errors that abort graph construction before anything runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Missing capability: {kind} (factory '{factory}') is not available")]
    MissingCapability { kind: NodeKind, factory: String },

    #[error("Failed to assemble '{node}': {source}")]
    Capability {
        node: String,
        #[source]
        source: CapabilityError,
    },

    #[error("Topology has no output URI")]
    MissingOutput,
}

/// Errors that can occur within the orchestrator.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Pipeline already started")]
    AlreadyStarted,

    #[error("Pipeline not started")]
    NotStarted,
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
