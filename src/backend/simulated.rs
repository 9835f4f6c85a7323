//! In-process simulated capability.
//!
//! Keeps a table of nodes and reports lifecycle events the way a real media
//! library would: starting a node reports `Playing`, starting a demultiplexer
//! additionally announces an audio and a video output, stopping reports
//! `Null`. Every command is recorded so tests can assert on what the
//! orchestrator asked for, and individual commands can be made to fail.

use super::capability::{CapabilityError, MediaBackend, NodeSpec, PropertyValue};
use crate::pipeline::event::{MediaKind, NodeEvent, NodeState};
use crate::pipeline::id::{NodeId, PadId};
use crate::pipeline::node_type::NodeKind;
use crossbeam_channel::{Receiver, Sender};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One recorded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Create { id: NodeId, name: String, factory: String },
    Release(NodeId),
    Link(NodeId, NodeId),
    RequestPad { node: NodeId, template: String, pad: PadId },
    LinkToPad(NodeId, PadId),
    LinkPad(PadId, NodeId),
    SetActivePad(NodeId, PadId),
    Start(NodeId),
    Stop(NodeId),
}

#[derive(Debug)]
struct SimNode {
    spec: NodeSpec,
    state: NodeState,
    next_pad: u16,
}

impl SimNode {
    fn allocate_pad(&mut self, id: NodeId) -> PadId {
        let pad = PadId::new(id, self.next_pad);
        self.next_pad = self.next_pad.wrapping_add(1);
        pad
    }
}

/// Simulated media library.
pub struct SimulatedBackend {
    factories: BTreeSet<String>,
    nodes: BTreeMap<NodeId, SimNode>,
    calls: Vec<BackendCall>,
    active_pads: HashMap<NodeId, PadId>,
    auto_play: bool,
    failing_creates: HashMap<String, String>,
    failing_starts: HashMap<NodeId, String>,
    failing_switch: Option<String>,
    tx: Sender<NodeEvent>,
    rx: Option<Receiver<NodeEvent>>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    /// A backend offering the default factory of every node kind.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            factories: NodeKind::all()
                .iter()
                .map(|k| k.default_factory().to_string())
                .collect(),
            nodes: BTreeMap::new(),
            calls: Vec::new(),
            active_pads: HashMap::new(),
            auto_play: true,
            failing_creates: HashMap::new(),
            failing_starts: HashMap::new(),
            failing_switch: None,
            tx,
            rx: Some(rx),
        }
    }

    pub fn with_factory(mut self, factory: impl Into<String>) -> Self {
        self.factories.insert(factory.into());
        self
    }

    pub fn without_factory(mut self, factory: &str) -> Self {
        self.factories.remove(factory);
        self
    }

    /// When disabled, `start` only records the call and reports nothing.
    pub fn with_auto_play(mut self, auto_play: bool) -> Self {
        self.auto_play = auto_play;
        self
    }

    /// Make `create` fail for the node with this name.
    pub fn fail_create(&mut self, name: &str, message: &str) {
        self.failing_creates
            .insert(name.to_string(), message.to_string());
    }

    /// Make `start` fail for this node.
    pub fn fail_start(&mut self, node: NodeId, message: &str) {
        self.failing_starts.insert(node, message.to_string());
    }

    pub fn clear_start_failure(&mut self, node: NodeId) {
        self.failing_starts.remove(&node);
    }

    /// Make every `set_active_pad` fail (`None` clears it).
    pub fn fail_switch(&mut self, message: Option<&str>) {
        self.failing_switch = message.map(str::to_string);
    }

    /// Report an arbitrary event, as if a node had raised it.
    pub fn emit(&self, event: NodeEvent) {
        // The receiver may already be gone after the loop exits
        let _ = self.tx.send(event);
    }

    /// Sender for reporting events from another thread.
    pub fn event_sender(&self) -> Sender<NodeEvent> {
        self.tx.clone()
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, n)| n.spec.name == name)
            .map(|(id, _)| *id)
    }

    pub fn node_spec(&self, id: NodeId) -> Option<&NodeSpec> {
        self.nodes.get(&id).map(|n| &n.spec)
    }

    pub fn property(&self, id: NodeId, key: &str) -> Option<&PropertyValue> {
        self.node_spec(id).and_then(|s| s.property(key))
    }

    pub fn node_state(&self, id: NodeId) -> Option<NodeState> {
        self.nodes.get(&id).map(|n| n.state)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn active_pad(&self, selector: NodeId) -> Option<PadId> {
        self.active_pads.get(&selector).copied()
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut SimNode, CapabilityError> {
        self.nodes
            .get_mut(&id)
            .ok_or(CapabilityError::UnknownNode(id))
    }

    fn name(&self, id: NodeId) -> String {
        self.nodes
            .get(&id)
            .map(|n| n.spec.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn check_node(&self, id: NodeId) -> Result<(), CapabilityError> {
        if self.nodes.contains_key(&id) {
            Ok(())
        } else {
            Err(CapabilityError::UnknownNode(id))
        }
    }

    fn check_pad(&self, pad: PadId) -> Result<(), CapabilityError> {
        match self.nodes.get(&pad.node()) {
            Some(node) if pad.pad_index() < node.next_pad => Ok(()),
            _ => Err(CapabilityError::UnknownPad(pad)),
        }
    }
}

impl MediaBackend for SimulatedBackend {
    fn has_factory(&self, factory: &str) -> bool {
        self.factories.contains(factory)
    }

    fn create(&mut self, id: NodeId, spec: &NodeSpec) -> Result<(), CapabilityError> {
        if !self.factories.contains(&spec.factory) {
            return Err(CapabilityError::UnknownFactory(spec.factory.clone()));
        }
        if let Some(message) = self.failing_creates.get(&spec.name) {
            return Err(CapabilityError::Create {
                name: spec.name.clone(),
                factory: spec.factory.clone(),
                message: message.clone(),
            });
        }
        if self.nodes.contains_key(&id) {
            return Err(CapabilityError::Create {
                name: spec.name.clone(),
                factory: spec.factory.clone(),
                message: format!("{id} is already in use"),
            });
        }

        self.calls.push(BackendCall::Create {
            id,
            name: spec.name.clone(),
            factory: spec.factory.clone(),
        });
        self.nodes.insert(
            id,
            SimNode {
                spec: spec.clone(),
                state: NodeState::Null,
                next_pad: 0,
            },
        );
        Ok(())
    }

    fn release(&mut self, id: NodeId) {
        if self.nodes.remove(&id).is_some() {
            self.calls.push(BackendCall::Release(id));
        }
    }

    fn link(&mut self, from: NodeId, to: NodeId) -> Result<(), CapabilityError> {
        if self.check_node(from).is_err() || self.check_node(to).is_err() {
            return Err(CapabilityError::Link {
                from: self.name(from),
                to: self.name(to),
                message: "no such node".into(),
            });
        }
        self.calls.push(BackendCall::Link(from, to));
        Ok(())
    }

    fn request_pad(
        &mut self,
        node: NodeId,
        template: &str,
        _properties: &[(String, PropertyValue)],
    ) -> Result<PadId, CapabilityError> {
        let pad = self
            .node_mut(node)
            .map_err(|_| CapabilityError::PadRequest {
                node,
                template: template.to_string(),
            })?
            .allocate_pad(node);
        self.calls.push(BackendCall::RequestPad {
            node,
            template: template.to_string(),
            pad,
        });
        Ok(pad)
    }

    fn link_to_pad(&mut self, from: NodeId, pad: PadId) -> Result<(), CapabilityError> {
        self.check_node(from)?;
        self.check_pad(pad)?;
        self.calls.push(BackendCall::LinkToPad(from, pad));
        Ok(())
    }

    fn link_pad(&mut self, pad: PadId, to: NodeId) -> Result<(), CapabilityError> {
        self.check_pad(pad)?;
        self.check_node(to)?;
        self.calls.push(BackendCall::LinkPad(pad, to));
        Ok(())
    }

    fn set_active_pad(&mut self, selector: NodeId, pad: PadId) -> Result<(), CapabilityError> {
        self.check_node(selector)?;
        if pad.node() != selector {
            return Err(CapabilityError::UnknownPad(pad));
        }
        self.check_pad(pad)?;
        if let Some(message) = &self.failing_switch {
            return Err(CapabilityError::StateChange {
                node: selector,
                message: message.clone(),
            });
        }
        self.calls.push(BackendCall::SetActivePad(selector, pad));
        self.active_pads.insert(selector, pad);
        Ok(())
    }

    fn start(&mut self, id: NodeId) -> Result<(), CapabilityError> {
        self.check_node(id)?;
        if let Some(message) = self.failing_starts.get(&id) {
            return Err(CapabilityError::StateChange {
                node: id,
                message: message.clone(),
            });
        }
        self.calls.push(BackendCall::Start(id));
        if !self.auto_play {
            return Ok(());
        }

        let node = self.node_mut(id)?;
        node.state = NodeState::Playing;
        let outputs = if node.spec.kind.has_dynamic_outputs() {
            vec![
                (node.allocate_pad(id), MediaKind::Audio),
                (node.allocate_pad(id), MediaKind::Video),
            ]
        } else {
            Vec::new()
        };

        self.emit(NodeEvent::StateChanged {
            node: id,
            state: NodeState::Playing,
        });
        for (pad, media) in outputs {
            self.emit(NodeEvent::OutputReady {
                node: id,
                pad,
                media,
            });
        }
        Ok(())
    }

    fn stop(&mut self, id: NodeId) -> Result<(), CapabilityError> {
        let node = self.node_mut(id)?;
        node.state = NodeState::Null;
        // Discovered outputs go away with the data; a restart announces them afresh
        if node.spec.kind.has_dynamic_outputs() {
            node.next_pad = 0;
        }
        self.calls.push(BackendCall::Stop(id));
        self.emit(NodeEvent::StateChanged {
            node: id,
            state: NodeState::Null,
        });
        Ok(())
    }

    fn subscribe(&mut self) -> Result<Receiver<NodeEvent>, CapabilityError> {
        self.rx.take().ok_or(CapabilityError::AlreadySubscribed)
    }
}
