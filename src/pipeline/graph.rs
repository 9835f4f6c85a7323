//! The processing graph owned by the orchestrator.
//!
//! ```text
//! [test pattern] ─────────────────────────┐
//! [transport-in 0] ─► [demux 0] ⇢ ... ────┤
//! [transport-in 1] ─► [demux 1] ⇢ ... ────┼─► [selector] ─► (compositor ◄─ overlay) ─► [encode] ─► [mux] ─► [transport-out]
//! ...                                     │                                                       ▲
//!                                         ┘                          [silent audio] ──────────────┘
//! ```
//!
//! Node and branch ids index directly into the graph's vectors. The graph
//! records the last lifecycle state each node reported so branch state can be
//! derived from its chain.

use crate::pipeline::event::{MediaKind, NodeState};
use crate::pipeline::id::{BranchId, NodeId, PadId};
use crate::pipeline::node_type::NodeKind;
use crate::pipeline::topology::OverlayDescriptor;
use serde::{Deserialize, Serialize};

/// What a branch carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchKind {
    LiveSource,
    SyntheticFallback,
}

/// Lifecycle of a branch as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchState {
    /// Built but never started.
    Unbound,
    /// Start requested, not yet delivering data.
    Starting,
    /// Every node is playing and all late-bound links are made.
    Playing,
    /// Was playing, then a node dropped out or hit end of stream.
    Stalled,
    /// A restart attempt failed.
    Failed,
}

impl BranchState {
    pub fn is_playing(self) -> bool {
        self == BranchState::Playing
    }
}

/// Which part of the graph a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Branch(BranchId),
    Overlay,
    Selector,
    Output,
    Audio,
}

/// A connection that can only be made once a node reports its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredLink {
    /// Node whose outputs appear at runtime.
    pub demux: NodeId,
    /// Node the matching output is linked into.
    pub downstream: NodeId,
    pub expected: MediaKind,
}

/// One candidate input path from raw source to the selector.
#[derive(Debug, Clone)]
pub struct Branch {
    pub id: BranchId,
    pub kind: BranchKind,
    pub uri: Option<String>,
    /// Nodes from source to the node feeding the join pad.
    pub node_chain: Vec<NodeId>,
    /// Selector input this branch feeds. Never reassigned.
    pub join_pad: PadId,
    pub deferred: Option<DeferredLink>,
    pub(crate) state: BranchState,
}

impl Branch {
    pub fn state(&self) -> BranchState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.kind == BranchKind::LiveSource
    }
}

/// Overlay source plus the composition stage.
#[derive(Debug, Clone)]
pub struct OverlayBranch {
    pub descriptor: OverlayDescriptor,
    pub node_chain: Vec<NodeId>,
    pub compositor: NodeId,
}

/// Encode → mux → transport-out.
#[derive(Debug, Clone)]
pub struct OutputChain {
    pub node_chain: Vec<NodeId>,
    pub mux: NodeId,
    pub transport: NodeId,
}

/// A node as recorded by the graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub role: NodeRole,
    /// Last lifecycle state the node reported.
    pub state: Option<NodeState>,
}

/// The assembled graph.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) nodes: Vec<GraphNode>,
    pub(crate) branches: Vec<Branch>,
    pub(crate) fallback: BranchId,
    pub(crate) selector: NodeId,
    pub(crate) overlay: Option<OverlayBranch>,
    pub(crate) output: OutputChain,
    pub(crate) audio: Vec<NodeId>,
}

impl Graph {
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.index())
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.name == name).map(|n| n.id)
    }

    /// Role of a node, `None` for ids the graph never created.
    pub fn role_of(&self, id: NodeId) -> Option<NodeRole> {
        self.node(id).map(|n| n.role)
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn branch(&self, id: BranchId) -> Option<&Branch> {
        self.branches.get(id.index())
    }

    pub fn branch_state(&self, id: BranchId) -> Option<BranchState> {
        self.branch(id).map(|b| b.state)
    }

    /// Set a branch's state, returning the previous one.
    pub fn set_branch_state(&mut self, id: BranchId, state: BranchState) -> Option<BranchState> {
        self.branches
            .get_mut(id.index())
            .map(|b| std::mem::replace(&mut b.state, state))
    }

    pub fn live_branches(&self) -> impl Iterator<Item = &Branch> {
        self.branches.iter().filter(|b| b.is_live())
    }

    /// Number of configured live sources.
    pub fn source_count(&self) -> usize {
        self.branches.iter().filter(|b| b.is_live()).count()
    }

    /// The synthetic fallback branch.
    pub fn fallback(&self) -> BranchId {
        self.fallback
    }

    pub fn selector(&self) -> NodeId {
        self.selector
    }

    pub fn overlay(&self) -> Option<&OverlayBranch> {
        self.overlay.as_ref()
    }

    pub fn output(&self) -> &OutputChain {
        &self.output
    }

    pub fn audio_chain(&self) -> &[NodeId] {
        &self.audio
    }

    /// Record a node's reported lifecycle state, returning the previous one.
    pub fn record_node_state(&mut self, id: NodeId, state: NodeState) -> Option<NodeState> {
        self.nodes
            .get_mut(id.index())
            .and_then(|n| n.state.replace(state))
    }

    /// True when every node of the branch last reported `Playing`.
    pub fn chain_playing(&self, id: BranchId) -> bool {
        self.branch(id).is_some_and(|b| {
            b.node_chain.iter().all(|n| {
                self.node(*n)
                    .and_then(|node| node.state)
                    .is_some_and(NodeState::is_playing)
            })
        })
    }

    /// Forget the reported states of a branch's nodes (before a restart).
    pub fn reset_chain_states(&mut self, id: BranchId) {
        let chain = match self.branch(id) {
            Some(b) => b.node_chain.clone(),
            None => return,
        };
        for node in chain {
            if let Some(n) = self.nodes.get_mut(node.index()) {
                n.state = None;
            }
        }
    }

    /// Order in which nodes are started: downstream before upstream.
    pub fn start_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().rev().map(|n| n.id)
    }

    /// Order in which nodes are stopped: upstream before downstream.
    pub fn stop_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }
}
