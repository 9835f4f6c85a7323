//! Helpers for driving an orchestrator on the simulated backend

use feedswitch::backend::SimulatedBackend;
use feedswitch::pipeline::{BranchId, NodeEvent, NodeState, Orchestrator};

/// Handle everything queued and assert the loop would keep running
pub fn settle(orch: &mut Orchestrator<SimulatedBackend>) {
    let flow = orch.process_pending();
    assert!(flow.is_continue(), "control loop stopped: {:?}", flow);
}

/// Start the graph and let every auto-playing node report in
pub fn start_and_settle(orch: &mut Orchestrator<SimulatedBackend>) {
    orch.start().expect("pipeline starts");
    settle(orch);
}

/// Report a node of a live branch dropping out of playing
pub fn stall_branch(orch: &mut Orchestrator<SimulatedBackend>, branch: BranchId) {
    let decoder = orch
        .graph()
        .node_by_name(&format!("decoder-{}", branch.0))
        .expect("decoder exists");
    let flow = orch.handle_event(NodeEvent::StateChanged {
        node: decoder,
        state: NodeState::Paused,
    });
    assert!(flow.is_continue());
}

/// Report the output transport going down or up
pub fn set_output(orch: &mut Orchestrator<SimulatedBackend>, playing: bool) {
    let transport = orch.graph().output().transport;
    let state = if playing {
        NodeState::Playing
    } else {
        NodeState::Paused
    };
    let flow = orch.handle_event(NodeEvent::StateChanged {
        node: transport,
        state,
    });
    assert!(flow.is_continue());
}
