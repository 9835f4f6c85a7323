//! Integration tests for fault classification and build failures

mod common;

use common::builders::ConfigBuilder;
use common::sim_helpers::start_and_settle;
use feedswitch::backend::{MediaBackend, SimulatedBackend};
use feedswitch::config::{ElementFactories, EncoderSettings};
use feedswitch::pipeline::classifier::FaultText;
use feedswitch::pipeline::{
    Affected, BranchId, BranchState, BuildError, ClassificationRule, ControlCommand,
    FaultClassifier, FaultEvent, FaultScope, GraphBuilder, NodeEvent, NodeKind, NodeRegistry,
    NodeRole, Orchestrator, PipelineError, RunOutcome, SwitchReason, Topology,
};
use std::ops::ControlFlow;

#[test]
fn test_output_write_failure_keeps_running() {
    let mut orch = ConfigBuilder::new(2).orchestrator();
    start_and_settle(&mut orch);
    let active = orch.active_branch();

    let transport = orch.graph().node_by_name("transport-out").unwrap();
    let event = FaultEvent::error(transport, "Could not write to socket");

    let verdict = FaultClassifier::new().classify(&event, orch.graph());
    assert_eq!(verdict.scope, FaultScope::Transient);
    assert_eq!(verdict.affected, Some(Affected::Output));

    assert!(orch.handle_event(NodeEvent::Fault(event)).is_continue());
    assert_eq!(orch.active_branch(), active);
}

#[test]
fn test_stream_break_on_source_is_transient() {
    let mut orch = ConfigBuilder::new(2).orchestrator();
    start_and_settle(&mut orch);

    let demux = orch.graph().node_by_name("demux-1").unwrap();
    let event = FaultEvent::error(demux, "Internal data stream error.")
        .with_debug("streaming stopped, reason not-negotiated (-4)");
    assert!(orch.handle_event(NodeEvent::Fault(event)).is_continue());
}

#[test]
fn test_unknown_codec_is_fatal() {
    let mut orch = ConfigBuilder::new(3).orchestrator();
    start_and_settle(&mut orch);

    let decoder = orch.graph().node_by_name("decoder-2").unwrap();
    let event = FaultEvent::error(decoder, "unknown codec");

    match orch.handle_event(NodeEvent::Fault(event)) {
        ControlFlow::Break(outcome @ RunOutcome::Fatal { .. }) => {
            assert_eq!(outcome.exit_code(), 1);
            if let RunOutcome::Fatal { verdict, event } = outcome {
                assert_eq!(verdict.scope, FaultScope::PipelineFatal);
                assert_eq!(event.source, decoder);
            }
        }
        other => panic!("expected a fatal outcome, got {:?}", other),
    }
}

#[test]
fn test_warning_never_fatal() {
    let mut orch = ConfigBuilder::new(1).orchestrator();
    start_and_settle(&mut orch);

    let decoder = orch.graph().node_by_name("decoder-0").unwrap();
    let event = FaultEvent::warning(decoder, "unknown codec");
    assert!(orch.handle_event(NodeEvent::Fault(event)).is_continue());
}

#[test]
fn test_missing_capability_creates_nothing() {
    let mut sim = SimulatedBackend::new().without_factory("nvh264enc");
    let elements = ElementFactories::default();
    let registry = NodeRegistry::discover(&elements, &sim);
    assert_eq!(registry.missing(), vec![NodeKind::Encode]);

    let encoder = EncoderSettings::default();
    let err = GraphBuilder::new(&registry, &encoder)
        .build(&Topology::new(["srt://a:1"], "srt://out:2"), &mut sim)
        .unwrap_err();

    assert_eq!(
        err,
        BuildError::MissingCapability {
            kind: NodeKind::Encode,
            factory: "nvh264enc".into(),
        }
    );
    assert_eq!(sim.node_count(), 0);
    assert!(sim.calls().is_empty());
}

#[test]
fn test_orchestrator_reports_missing_decoder() {
    let config = ConfigBuilder::new(1).decoder("avdec_h264").build();
    let topology = config.topology().unwrap();

    let result = Orchestrator::new(&config, &topology, SimulatedBackend::new());
    match result {
        Err(PipelineError::Build(BuildError::MissingCapability { kind, factory })) => {
            assert_eq!(kind, NodeKind::Decode);
            assert_eq!(factory, "avdec_h264");
        }
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("build should fail"),
    }
}

#[test]
fn test_configured_decoder_used_when_available() {
    let backend = SimulatedBackend::new().with_factory("avdec_h264");
    let orch = ConfigBuilder::new(1).decoder("avdec_h264").orchestrator_on(backend);

    let decoder = orch.graph().node_by_name("decoder-0").unwrap();
    assert_eq!(
        orch.backend().node_spec(decoder).map(|s| s.factory.as_str()),
        Some("avdec_h264")
    );
}

#[test]
fn test_partial_build_rolled_back() {
    let mut sim = SimulatedBackend::new();
    sim.fail_create("mux", "out of memory");
    let registry = NodeRegistry::discover(&ElementFactories::default(), &sim);
    let encoder = EncoderSettings::default();

    let err = GraphBuilder::new(&registry, &encoder)
        .build(&Topology::new(["srt://a:1", "srt://b:2"], "srt://out:3"), &mut sim)
        .unwrap_err();

    assert!(matches!(err, BuildError::Capability { ref node, .. } if node == "mux"));
    assert_eq!(sim.node_count(), 0);
    assert!(sim.has_factory("mpegtsmux"));
}

fn device_lost(_: &FaultEvent, text: &FaultText, role: Option<NodeRole>) -> bool {
    matches!(role, Some(NodeRole::Branch(_))) && text.contains_any(&["device lost"])
}

fn branch_fatal(role: Option<NodeRole>) -> (FaultScope, Option<Affected>) {
    match role {
        Some(NodeRole::Branch(b)) => (FaultScope::BranchFatal, Some(Affected::Branch(b))),
        _ => (FaultScope::PipelineFatal, None),
    }
}

#[test]
fn test_branch_fatal_rule_fails_only_that_branch() {
    let mut orch = ConfigBuilder::new(2).orchestrator();
    start_and_settle(&mut orch);
    let _ = orch.handle_command(ControlCommand::SwitchTo(BranchId(0)));

    orch.classifier_mut().insert_rule(
        0,
        ClassificationRule {
            name: "decoder-device-lost",
            matches: device_lost,
            verdict: branch_fatal,
        },
    );

    let decoder = orch.graph().node_by_name("decoder-0").unwrap();
    let event = FaultEvent::error(decoder, "GPU device lost");
    assert!(orch.handle_event(NodeEvent::Fault(event)).is_continue());

    assert_eq!(orch.graph().branch_state(BranchId(0)), Some(BranchState::Failed));
    assert_eq!(orch.graph().branch_state(BranchId(1)), Some(BranchState::Playing));
    assert_eq!(orch.active_branch(), Some(orch.graph().fallback()));
    assert_eq!(orch.active().unwrap().reason, SwitchReason::Recovery);

    // The same text off a branch still stops the pipeline
    let transport = orch.graph().output().transport;
    let flow = orch.handle_event(NodeEvent::Fault(FaultEvent::error(transport, "device lost")));
    assert!(matches!(flow, ControlFlow::Break(RunOutcome::Fatal { .. })));
}
