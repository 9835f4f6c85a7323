//! Integration tests for the threaded control loop
//!
//! These tests run `Orchestrator::run` on its own thread and drive it the
//! way an operator and the capability would: through a `ControlHandle` and
//! the backend's event channel.

mod common;

use common::builders::ConfigBuilder;
use common::test_timeout;
use crossbeam_channel::bounded;
use feedswitch::backend::SimulatedBackend;
use feedswitch::pipeline::{
    BranchId, ControlHandle, FaultEvent, FaultScope, NodeEvent, Orchestrator, RunOutcome,
};
use std::thread;

/// Run the loop on a thread; the outcome arrives on the returned channel.
fn spawn_loop(
    orch: Orchestrator<SimulatedBackend>,
) -> (ControlHandle, crossbeam_channel::Receiver<RunOutcome>) {
    let (handle, commands) = ControlHandle::new();
    let (done_tx, done_rx) = bounded(1);
    thread::spawn(move || {
        let _ = done_tx.send(orch.run(commands));
    });
    (handle, done_rx)
}

#[test]
fn test_shutdown_via_handle() {
    let mut orch = ConfigBuilder::new(2).orchestrator();
    orch.start().unwrap();
    let (handle, done) = spawn_loop(orch);

    let status = handle.status().expect("loop answers status");
    assert_eq!(status.branches.len(), 3);
    assert!(status.active.is_some());
    assert!(status.to_json().unwrap().contains("\"branches\""));

    handle.shutdown();
    let outcome = done.recv_timeout(test_timeout()).unwrap();
    assert!(matches!(outcome, RunOutcome::Shutdown));
    assert_eq!(outcome.exit_code(), 0);

    // The loop is gone; further commands are refused
    assert!(!handle.switch_to(BranchId(0)));
}

#[test]
fn test_manual_switch_via_handle() {
    let orch = ConfigBuilder::new(2).orchestrator();
    let (handle, done) = spawn_loop(orch);

    // Events and commands interleave freely; poll until both branches play

    let mut ready = false;
    for _ in 0..50 {
        let status = handle.status().unwrap();
        if status.branch_state(BranchId(0)).is_some_and(|s| s.is_playing())
            && status.branch_state(BranchId(1)).is_some_and(|s| s.is_playing())
        {
            ready = true;
            break;
        }
        thread::sleep(std::time::Duration::from_millis(10));
    }
    assert!(ready);

    assert!(handle.switch_to(BranchId(1)));
    let status = handle.status().unwrap();
    assert_eq!(status.active.map(|a| a.branch), Some(BranchId(1)));

    handle.shutdown();
    assert!(done.recv_timeout(test_timeout()).unwrap().is_clean());
}

#[test]
fn test_fatal_fault_ends_loop() {
    let orch = ConfigBuilder::new(3).orchestrator();
    let events = orch.backend().event_sender();
    let decoder = orch.graph().node_by_name("decoder-2").unwrap();
    let (_handle, done) = spawn_loop(orch);

    events
        .send(NodeEvent::Fault(FaultEvent::error(decoder, "unknown codec")))
        .unwrap();

    match done.recv_timeout(test_timeout()).unwrap() {
        outcome @ RunOutcome::Fatal { .. } => {
            assert_eq!(outcome.exit_code(), 1);
            if let RunOutcome::Fatal { verdict, .. } = outcome {
                assert_eq!(verdict.scope, FaultScope::PipelineFatal);
            }
        }
        other => panic!("expected fatal outcome, got {:?}", other),
    }
}

#[test]
fn test_transient_fault_then_end_of_stream() {
    let orch = ConfigBuilder::new(1).orchestrator();
    let events = orch.backend().event_sender();
    let transport = orch.graph().output().transport;
    let (handle, done) = spawn_loop(orch);

    events
        .send(NodeEvent::Fault(FaultEvent::error(
            transport,
            "Could not write to socket",
        )))
        .unwrap();
    assert!(handle.status().is_some());

    // Dropping every handle leaves the loop running on node events alone
    drop(handle);
    events.send(NodeEvent::EndOfStream { node: transport }).unwrap();

    let outcome = done.recv_timeout(test_timeout()).unwrap();
    assert!(matches!(outcome, RunOutcome::EndOfStream));
    assert_eq!(outcome.exit_code(), 0);
}
