//! Events reported by the processing-node capability.
//!
//! The capability publishes a single unordered stream of [`NodeEvent`]s. The
//! control loop consumes each one exactly once, in arrival order.

use crate::pipeline::id::{NodeId, PadId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state a processing node reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl NodeState {
    pub fn is_playing(self) -> bool {
        self == NodeState::Playing
    }
}

/// The media carried by a node output discovered at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Audio,
    Other,
}

impl MediaKind {
    /// Classify a caps/structure name such as `video/x-h264`.
    pub fn from_caps_name(name: &str) -> Self {
        if name.starts_with("video/") {
            MediaKind::Video
        } else if name.starts_with("audio/") {
            MediaKind::Audio
        } else {
            MediaKind::Other
        }
    }
}

/// Severity tag attached to every fault event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// A diagnostic notification raised by a processing node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultEvent {
    /// Node that raised the fault.
    pub source: NodeId,
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Free-form debug text from the capability, if any.
    pub debug: Option<String>,
}

impl FaultEvent {
    pub fn new(source: NodeId, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            source,
            severity,
            message: message.into(),
            debug: None,
        }
    }

    pub fn error(source: NodeId, message: impl Into<String>) -> Self {
        Self::new(source, Severity::Error, message)
    }

    pub fn warning(source: NodeId, message: impl Into<String>) -> Self {
        Self::new(source, Severity::Warning, message)
    }

    pub fn with_debug(mut self, debug: impl Into<String>) -> Self {
        self.debug = Some(debug.into());
        self
    }
}

/// Everything the capability can tell the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A node raised a diagnostic.
    Fault(FaultEvent),

    /// A node finished a lifecycle transition.
    StateChanged { node: NodeId, state: NodeState },

    /// A demultiplexing node discovered an output after inspecting live data.
    OutputReady {
        node: NodeId,
        pad: PadId,
        media: MediaKind,
    },

    /// A node has no more data to produce.
    EndOfStream { node: NodeId },
}

impl NodeEvent {
    /// Node the event originated from.
    pub fn node(&self) -> NodeId {
        match self {
            NodeEvent::Fault(fault) => fault.source,
            NodeEvent::StateChanged { node, .. }
            | NodeEvent::OutputReady { node, .. }
            | NodeEvent::EndOfStream { node } => *node,
        }
    }
}
