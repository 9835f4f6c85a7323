//! Pipeline orchestration.
//!
//! A declarative [`Topology`] is turned into a processing [`Graph`] of opaque
//! nodes hosted by a [`MediaBackend`](crate::backend::MediaBackend). Every
//! live source becomes a branch feeding one input of a selector; a synthetic
//! test-pattern branch is always present as the fallback. The selector's
//! output optionally passes through an overlay compositor before encode, mux
//! and transport-out.
//!
//! # Architecture
//!
//! ```text
//! Topology ──► [GraphBuilder] ──► Graph
//!                                   │
//!        ┌──────────────────────────┼─────────────────────────┐
//!        ▼                          ▼                         ▼
//! [SelectorController]         [PadBinder]             [FaultClassifier]
//!   ▲         ▲                     ▲                         │
//! [SwitchTimer] manual         OutputReady                 verdicts
//!                                   │                         ▼
//!                       node events ┴──► [Orchestrator] ◄── [RecoveryScheduler]
//! ```
//!
//! # Design
//!
//! - **Ids are indices**: `NodeId` and `BranchId` index straight into the
//!   graph's vectors; pending late bindings live in an arena keyed by branch.
//! - **Single writer**: only the [`SelectorController`] changes the active
//!   branch, and only from the control loop thread.
//! - **Ordered rules**: fault triage is a table evaluated top to bottom.
//! - **Dedicated thread**: the loop blocks in `select!` on events, ticks and
//!   operator commands; the data plane never waits on it.

pub mod binder;
pub mod bridge;
pub mod builder;
pub mod classifier;
pub mod error;
pub mod event;
pub mod graph;
pub mod id;
pub mod node_type;
pub mod orchestrator;
pub mod recovery;
pub mod registry;
pub mod selector;
pub mod timer;
pub mod topology;

pub use binder::{BindOutcome, PadBinder};
pub use bridge::{BranchStatus, ControlCommand, ControlHandle, StatusSnapshot};
pub use builder::GraphBuilder;
pub use classifier::{Affected, ClassificationRule, FaultClassifier, FaultScope, FaultVerdict};
pub use error::{BuildError, PipelineError, PipelineResult};
pub use event::{FaultEvent, MediaKind, NodeEvent, NodeState, Severity};
pub use graph::{Branch, BranchKind, BranchState, Graph, NodeRole};
pub use id::{BranchId, NodeId, PadId};
pub use node_type::NodeKind;
pub use orchestrator::{Orchestrator, RunOutcome};
pub use recovery::{OutputConnectionState, RecoveryScheduler, SweepReport};
pub use registry::NodeRegistry;
pub use selector::{ActiveSelection, SelectorController, SwitchOutcome, SwitchReason};
pub use timer::SwitchTimer;
pub use topology::{OutputDescriptor, OverlayDescriptor, SourceDescriptor, Topology};
