//! MediaBackend trait for the processing-node capability
//!
//! The orchestrator never touches media payloads. Everything it needs from
//! the media library goes through this trait: instantiating nodes, wiring
//! them, flipping the selector and starting/stopping nodes. Implementations
//! must be `Send` so the graph can be driven from a dedicated thread.
//!
//! All commands are fire-and-forget relative to the control loop; their
//! completion is observed later on the event stream returned by
//! [`MediaBackend::subscribe`].

use crate::pipeline::event::NodeEvent;
use crate::pipeline::id::{NodeId, PadId};
use crate::pipeline::node_type::NodeKind;
use crossbeam_channel::Receiver;
use thiserror::Error;

/// Errors reported by the capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("no factory named '{0}' is available")]
    UnknownFactory(String),

    #[error("failed to create node '{name}' from '{factory}': {message}")]
    Create {
        name: String,
        factory: String,
        message: String,
    },

    #[error("{0} does not exist")]
    UnknownNode(NodeId),

    #[error("{0:?} does not exist")]
    UnknownPad(PadId),

    #[error("failed to link {from} to {to}: {message}")]
    Link {
        from: String,
        to: String,
        message: String,
    },

    #[error("failed to request pad '{template}' on {node}")]
    PadRequest { node: NodeId, template: String },

    #[error("state change failed for {node}: {message}")]
    StateChange { node: NodeId, message: String },

    #[error("event stream already taken")]
    AlreadySubscribed,
}

/// Property value handed to a node at creation time.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    String(String),
    /// Format description, e.g. `video/x-raw,width=1920,height=1080`.
    Caps(String),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) | PropertyValue::Caps(v) => Some(v),
            _ => None,
        }
    }
}

/// Named property list.
pub type Properties = Vec<(String, PropertyValue)>;

/// Everything the capability needs to instantiate one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub kind: NodeKind,
    /// Unique node name within the graph (used in logs and fault text).
    pub name: String,
    /// Factory the node is created from.
    pub factory: String,
    pub properties: Properties,
}

impl NodeSpec {
    pub fn new(kind: NodeKind, name: impl Into<String>, factory: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            factory: factory.into(),
            properties: Vec::new(),
        }
    }

    /// Add a property.
    pub fn with(mut self, key: &str, value: PropertyValue) -> Self {
        self.properties.push((key.to_string(), value));
        self
    }

    /// Look up a property by name.
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// Unified interface to the external media-processing library
///
/// # Example
///
/// ```ignore
/// fn flip(backend: &mut dyn MediaBackend, selector: NodeId, pad: PadId) {
///     if let Err(e) = backend.set_active_pad(selector, pad) {
///         tracing::warn!("selector refused pad: {}", e);
///     }
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait MediaBackend: Send {
    /// Check whether a factory can be instantiated.
    fn has_factory(&self, factory: &str) -> bool;

    /// Instantiate a node under the id chosen by the graph.
    fn create(&mut self, id: NodeId, spec: &NodeSpec) -> Result<(), CapabilityError>;

    /// Destroy a node. Unknown ids are ignored.
    fn release(&mut self, id: NodeId);

    /// Link the static output of `from` to the static input of `to`.
    fn link(&mut self, from: NodeId, to: NodeId) -> Result<(), CapabilityError>;

    /// Request a new input pad on `node` from the named template.
    fn request_pad(
        &mut self,
        node: NodeId,
        template: &str,
        properties: &[(String, PropertyValue)],
    ) -> Result<PadId, CapabilityError>;

    /// Link the static output of `from` into a previously requested pad.
    fn link_to_pad(&mut self, from: NodeId, pad: PadId) -> Result<(), CapabilityError>;

    /// Link a dynamically discovered output pad to the static input of `to`.
    fn link_pad(&mut self, pad: PadId, to: NodeId) -> Result<(), CapabilityError>;

    /// Make `pad` the active input of a selector node.
    fn set_active_pad(&mut self, selector: NodeId, pad: PadId) -> Result<(), CapabilityError>;

    /// Ask a node to go to the playing state.
    fn start(&mut self, node: NodeId) -> Result<(), CapabilityError>;

    /// Ask a node to go to the null state.
    fn stop(&mut self, node: NodeId) -> Result<(), CapabilityError>;

    /// Take the lifecycle/fault event stream. Can only be taken once.
    fn subscribe(&mut self) -> Result<Receiver<NodeEvent>, CapabilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_spec_properties() {
        let spec = NodeSpec::new(NodeKind::TransportIn, "transport-in-0", "srtsrc")
            .with("uri", PropertyValue::String("srt://host:6000".into()))
            .with("latency", PropertyValue::Int(200));

        assert_eq!(
            spec.property("uri").and_then(|v| v.as_str()),
            Some("srt://host:6000")
        );
        assert_eq!(spec.property("latency").and_then(|v| v.as_int()), Some(200));
        assert!(spec.property("missing").is_none());
    }

    #[test]
    fn test_property_value_accessors() {
        assert_eq!(PropertyValue::Bool(true).as_bool(), Some(true));
        assert_eq!(PropertyValue::UInt(7).as_int(), Some(7));
        assert_eq!(PropertyValue::Caps("video/x-raw".into()).as_str(), Some("video/x-raw"));
        assert_eq!(PropertyValue::Int(1).as_str(), None);
    }

    #[test]
    fn test_error_display() {
        let err = CapabilityError::UnknownFactory("nvh264enc".into());
        assert_eq!(err.to_string(), "no factory named 'nvh264enc' is available");
    }
}
