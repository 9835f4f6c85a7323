//! The control loop.
//!
//! One thread owns the graph and makes every control decision. It waits on
//! four inputs at once: node events from the capability, the switch ticker,
//! the reconcile ticker and operator commands. Each input is handled to
//! completion before the next is taken, so the active selection, branch
//! states and the output connection state are never mutated concurrently.
//!
//! ```text
//! node events ──┐
//! switch tick ──┼──► select! ──► handle_* ──► SelectorController / PadBinder / RecoveryScheduler
//! reconcile ────┤                    │
//! commands ─────┘                    └──► FaultClassifier ──► continue | RunOutcome::Fatal
//! ```

use crate::backend::MediaBackend;
use crate::config::AppConfig;
use crate::pipeline::binder::{BindOutcome, PadBinder};
use crate::pipeline::bridge::{BranchStatus, ControlCommand, StatusSnapshot};
use crate::pipeline::builder::GraphBuilder;
use crate::pipeline::classifier::{Affected, FaultClassifier, FaultScope, FaultVerdict};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::event::{FaultEvent, NodeEvent, Severity};
use crate::pipeline::graph::{BranchState, Graph, NodeRole};
use crate::pipeline::id::{BranchId, NodeId};
use crate::pipeline::recovery::{OutputConnectionState, RecoveryScheduler, SweepReport};
use crate::pipeline::registry::NodeRegistry;
use crate::pipeline::selector::{ActiveSelection, SelectorController, SwitchOutcome, SwitchReason};
use crate::pipeline::timer::SwitchTimer;
use crate::pipeline::topology::Topology;
use crossbeam_channel::{never, select, tick, Receiver};
use std::collections::VecDeque;
use std::ops::ControlFlow;

/// Why the control loop returned.
#[derive(Debug)]
pub enum RunOutcome {
    /// Shutdown command or signal.
    Shutdown,
    /// The output transport reported end of stream.
    EndOfStream,
    /// A fault was classified as pipeline-fatal.
    Fatal {
        event: FaultEvent,
        verdict: FaultVerdict,
    },
    /// The capability dropped its event stream.
    EventStreamClosed,
    /// `run` had to start the graph and starting failed.
    StartFailed(PipelineError),
}

impl RunOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Shutdown | RunOutcome::EndOfStream => 0,
            RunOutcome::Fatal { .. } | RunOutcome::EventStreamClosed | RunOutcome::StartFailed(_) => 1,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.exit_code() == 0
    }
}

/// Owns the graph and the control state derived from it.
pub struct Orchestrator<B: MediaBackend> {
    backend: B,
    graph: Graph,
    selector: SelectorController,
    binder: PadBinder,
    classifier: FaultClassifier,
    recovery: RecoveryScheduler,
    timer: SwitchTimer,
    events: Receiver<NodeEvent>,
    /// Events raised by the loop itself, handled before new input.
    deferred: VecDeque<NodeEvent>,
    started: bool,
}

impl<B: MediaBackend> Orchestrator<B> {
    /// Build the graph for `topology` on `backend`.
    ///
    /// Fails without leaving any node behind if the capability cannot
    /// create a required node kind.
    pub fn new(config: &AppConfig, topology: &Topology, mut backend: B) -> PipelineResult<Self> {
        let registry = NodeRegistry::discover(&config.elements, &backend);
        let graph = GraphBuilder::new(&registry, &config.encoder).build(topology, &mut backend)?;
        let events = backend.subscribe()?;

        Ok(Self {
            selector: SelectorController::new(&graph),
            binder: PadBinder::new(&graph),
            classifier: FaultClassifier::new(),
            recovery: RecoveryScheduler::new(config.timing.reconcile_interval()),
            timer: SwitchTimer::new(config.timing.switch_interval()),
            backend,
            graph,
            events,
            deferred: VecDeque::new(),
            started: false,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn classifier_mut(&mut self) -> &mut FaultClassifier {
        &mut self.classifier
    }

    pub fn active(&self) -> Option<&ActiveSelection> {
        self.selector.active()
    }

    pub fn active_branch(&self) -> Option<BranchId> {
        self.selector.active_branch()
    }

    pub fn output_state(&self) -> OutputConnectionState {
        self.recovery.state()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            active: self.selector.active().copied(),
            branches: self
                .graph
                .branches()
                .iter()
                .map(|b| BranchStatus {
                    id: b.id,
                    kind: b.kind,
                    uri: b.uri.clone(),
                    state: b.state(),
                })
                .collect(),
            output: self.recovery.state(),
        }
    }

    /// Start every node and make the initial selection.
    pub fn start(&mut self) -> PipelineResult<ActiveSelection> {
        if self.started {
            return Err(PipelineError::AlreadyStarted);
        }

        let ids: Vec<BranchId> = self.graph.branches().iter().map(|b| b.id).collect();
        for id in ids {
            self.graph.set_branch_state(id, BranchState::Starting);
        }

        let order: Vec<NodeId> = self.graph.start_order().collect();
        for node in order {
            if let Err(e) = self.backend.start(node) {
                tracing::error!("Failed to start {}: {}", self.node_name(node), e);
                self.stop_all();
                return Err(e.into());
            }
        }
        self.started = true;
        self.recovery.note_fresh_start();

        let selection = self.selector.initialize(&self.graph, &mut self.backend)?;
        tracing::info!(
            "Pipeline started: {} live sources, {} active",
            self.graph.source_count(),
            selection.branch
        );
        Ok(selection)
    }

    /// Run until shutdown, end of stream or a fatal fault, then stop every node.
    pub fn run(mut self, commands: Receiver<ControlCommand>) -> RunOutcome {
        if !self.started {
            if let Err(e) = self.start() {
                return RunOutcome::StartFailed(e);
            }
        }

        tracing::info!(
            "Control loop started (switch every {:?}, reconcile every {:?})",
            self.timer.interval(),
            self.recovery.reconcile_interval()
        );

        let events = self.events.clone();
        let switch_ticker = tick(self.timer.interval());
        let reconcile_ticker = tick(self.recovery.reconcile_interval());
        let mut commands_open = true;

        let outcome = loop {
            if let Some(event) = self.deferred.pop_front() {
                if let ControlFlow::Break(outcome) = self.handle_event(event) {
                    break outcome;
                }
                continue;
            }

            let command_rx = if commands_open {
                commands.clone()
            } else {
                never()
            };

            let flow = select! {
                recv(events) -> msg => match msg {
                    Ok(event) => self.handle_event(event),
                    Err(_) => {
                        tracing::error!("Node event stream closed");
                        ControlFlow::Break(RunOutcome::EventStreamClosed)
                    }
                },
                recv(switch_ticker) -> _ => {
                    self.on_switch_tick();
                    ControlFlow::Continue(())
                },
                recv(reconcile_ticker) -> _ => {
                    self.on_reconcile_tick();
                    ControlFlow::Continue(())
                },
                recv(command_rx) -> msg => match msg {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(_) => {
                        tracing::debug!("All control handles dropped");
                        commands_open = false;
                        ControlFlow::Continue(())
                    }
                },
            };

            if let ControlFlow::Break(outcome) = flow {
                break outcome;
            }
        };

        self.teardown();
        tracing::info!("Control loop exiting: {:?}", outcome);
        outcome
    }

    /// Handle every event that is already queued, without blocking.
    pub fn process_pending(&mut self) -> ControlFlow<RunOutcome> {
        loop {
            let event = match self.deferred.pop_front() {
                Some(event) => event,
                None => match self.events.try_recv() {
                    Ok(event) => event,
                    Err(_) => return ControlFlow::Continue(()),
                },
            };
            if let ControlFlow::Break(outcome) = self.handle_event(event) {
                return ControlFlow::Break(outcome);
            }
        }
    }

    /// Stop every node. Safe to call more than once.
    pub fn teardown(&mut self) {
        if !self.started {
            return;
        }
        self.stop_all();
        self.started = false;
        tracing::info!("All nodes stopped");
    }

    fn stop_all(&mut self) {
        let order: Vec<NodeId> = self.graph.stop_order().collect();
        for node in order {
            if let Err(e) = self.backend.stop(node) {
                tracing::warn!("Failed to stop {}: {}", self.node_name(node), e);
            }
        }
    }

    pub fn handle_event(&mut self, event: NodeEvent) -> ControlFlow<RunOutcome> {
        match event {
            NodeEvent::Fault(fault) => return self.handle_fault(fault),
            NodeEvent::StateChanged { node, state } => {
                self.graph.record_node_state(node, state);
                match self.graph.role_of(node) {
                    Some(NodeRole::Output) if node == self.graph.output().transport => {
                        self.on_output_state(state.is_playing());
                    }
                    Some(NodeRole::Branch(branch)) => self.update_branch_state(branch),
                    Some(_) => {}
                    None => tracing::debug!("State change from unknown {}", node),
                }
            }
            NodeEvent::OutputReady { node, pad, media } => {
                let outcome = self.binder.on_output_ready(
                    &self.graph,
                    &mut self.backend,
                    node,
                    pad,
                    media,
                );
                if let BindOutcome::Bound { branch, .. } = outcome {
                    self.update_branch_state(branch);
                }
            }
            NodeEvent::EndOfStream { node } => match self.graph.role_of(node) {
                Some(NodeRole::Output) => {
                    tracing::info!("End of stream on {}", self.node_name(node));
                    return ControlFlow::Break(RunOutcome::EndOfStream);
                }
                Some(NodeRole::Branch(branch)) => {
                    tracing::warn!("{}: end of stream on {}", branch, self.node_name(node));
                    if matches!(
                        self.graph.branch_state(branch),
                        Some(BranchState::Playing | BranchState::Starting)
                    ) {
                        self.transition(branch, BranchState::Stalled);
                    }
                }
                Some(_) => tracing::warn!("End of stream on {}", self.node_name(node)),
                None => tracing::debug!("End of stream from unknown {}", node),
            },
        }
        ControlFlow::Continue(())
    }

    fn handle_fault(&mut self, fault: FaultEvent) -> ControlFlow<RunOutcome> {
        let verdict = self.classifier.classify(&fault, &self.graph);
        let node = self.node_name(fault.source);

        match verdict.scope {
            FaultScope::Transient => {
                if fault.severity == Severity::Info {
                    tracing::info!(scope = %verdict.scope, rule = verdict.rule, node = %node, "{}", fault.message);
                } else {
                    tracing::warn!(scope = %verdict.scope, rule = verdict.rule, node = %node, "{}", fault.message);
                }
                ControlFlow::Continue(())
            }
            FaultScope::BranchFatal => {
                tracing::error!(scope = %verdict.scope, rule = verdict.rule, node = %node, "{}", fault.message);
                if let Some(Affected::Branch(branch)) = verdict.affected {
                    self.transition(branch, BranchState::Failed);
                }
                ControlFlow::Continue(())
            }
            FaultScope::PipelineFatal => {
                tracing::error!(
                    scope = %verdict.scope,
                    rule = verdict.rule,
                    node = %node,
                    debug = fault.debug.as_deref().unwrap_or(""),
                    "{}",
                    fault.message
                );
                ControlFlow::Break(RunOutcome::Fatal {
                    event: fault,
                    verdict,
                })
            }
        }
    }

    pub fn handle_command(&mut self, cmd: ControlCommand) -> ControlFlow<RunOutcome> {
        match cmd {
            ControlCommand::SwitchTo(branch) => {
                self.selector
                    .switch_to(&self.graph, &mut self.backend, branch, SwitchReason::Manual);
            }
            ControlCommand::Status(reply) => {
                let _ = reply.send(self.status());
            }
            ControlCommand::Shutdown => {
                tracing::info!("Shutdown requested");
                return ControlFlow::Break(RunOutcome::Shutdown);
            }
        }
        ControlFlow::Continue(())
    }

    /// Rotate to the next live branch.
    pub fn on_switch_tick(&mut self) -> Option<SwitchOutcome> {
        self.timer
            .on_tick(&self.graph, &mut self.selector, &mut self.backend)
    }

    /// Restart non-playing branches if the output is connected.
    pub fn on_reconcile_tick(&mut self) -> Option<SweepReport> {
        let report =
            self.recovery
                .on_reconcile_tick(&mut self.graph, &mut self.binder, &mut self.backend)?;
        self.after_sweep(&report);
        Some(report)
    }

    fn on_output_state(&mut self, connected: bool) {
        if let Some(report) = self.recovery.on_output_state(
            connected,
            &mut self.graph,
            &mut self.binder,
            &mut self.backend,
        ) {
            self.after_sweep(&report);
        }
    }

    fn after_sweep(&mut self, report: &SweepReport) {
        for failure in &report.failures {
            self.deferred.push_back(NodeEvent::Fault(failure.to_fault()));
        }
    }

    /// Re-derive a branch's state from its nodes and pending binding.
    fn update_branch_state(&mut self, branch: BranchId) {
        let Some(current) = self.graph.branch_state(branch) else {
            return;
        };
        let ready = self.graph.chain_playing(branch) && self.binder.is_bound(branch);

        let next = match (current, ready) {
            (BranchState::Playing, false) => BranchState::Stalled,
            (_, true) => BranchState::Playing,
            (state, false) => state,
        };
        if next != current {
            self.transition(branch, next);
        }
    }

    fn transition(&mut self, branch: BranchId, next: BranchState) {
        let Some(prev) = self.graph.set_branch_state(branch, next) else {
            return;
        };
        if prev == next {
            return;
        }
        tracing::info!("{}: {:?} -> {:?}", branch, prev, next);

        if next == BranchState::Playing {
            self.on_branch_ready(branch);
        } else if prev == BranchState::Playing {
            self.on_branch_lost(branch);
        }
    }

    /// A live branch came up while nothing live is on air.
    fn on_branch_ready(&mut self, branch: BranchId) {
        let Some(active) = self.selector.active_branch() else {
            return;
        };
        let on_air_live = self.graph.branch(active).is_some_and(|b| b.is_live())
            && self.graph.branch_state(active) == Some(BranchState::Playing);
        let is_live = self.graph.branch(branch).is_some_and(|b| b.is_live());

        if is_live && !on_air_live {
            self.selector
                .switch_to(&self.graph, &mut self.backend, branch, SwitchReason::Recovery);
        }
    }

    /// The active branch stopped delivering.
    fn on_branch_lost(&mut self, branch: BranchId) {
        if self.selector.active_branch() != Some(branch) {
            return;
        }
        // Fallback first, then any other live branch that is playing
        let fallback = self.graph.fallback();
        let candidates: Vec<BranchId> = std::iter::once(fallback)
            .filter(|f| *f != branch)
            .chain(
                self.graph
                    .live_branches()
                    .filter(|b| b.id != branch && b.state().is_playing())
                    .map(|b| b.id),
            )
            .collect();

        for target in candidates {
            tracing::warn!("{} lost while on air, switching to {}", branch, target);
            let outcome = self.selector.switch_to(
                &self.graph,
                &mut self.backend,
                target,
                SwitchReason::Recovery,
            );
            if outcome.is_committed() {
                return;
            }
        }
        tracing::error!("{} lost while on air and no other branch is playing", branch);
    }

    fn node_name(&self, node: NodeId) -> String {
        self.graph
            .node(node)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| node.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::pipeline::event::NodeState;
    use crate::pipeline::id::PadId;

    fn orchestrator(sources: usize) -> Orchestrator<SimulatedBackend> {
        let uris: Vec<String> = (0..sources).map(|i| format!("srt://cam-{i}:600{i}")).collect();
        let topology = Topology::new(uris, "srt://out:7000");
        Orchestrator::new(&AppConfig::default(), &topology, SimulatedBackend::new()).unwrap()
    }

    #[test]
    fn test_start_selects_fallback_first() {
        let mut orch = orchestrator(2);
        let selection = orch.start().unwrap();
        assert_eq!(selection.branch, orch.graph().fallback());
        assert_eq!(selection.reason, SwitchReason::Initial);
        assert!(matches!(orch.start(), Err(PipelineError::AlreadyStarted)));
    }

    #[test]
    fn test_first_live_branch_takes_over() {
        let mut orch = orchestrator(2);
        orch.start().unwrap();
        assert!(orch.process_pending().is_continue());

        // Whichever live branch came up first took over from the fallback
        let active = orch.active().copied().unwrap();
        assert!(orch.graph().branch(active.branch).unwrap().is_live());
        assert_eq!(active.reason, SwitchReason::Recovery);
        assert_eq!(orch.graph().branch_state(BranchId(0)), Some(BranchState::Playing));
        assert_eq!(orch.graph().branch_state(BranchId(1)), Some(BranchState::Playing));
        assert_eq!(orch.output_state(), OutputConnectionState::Connected);
    }

    #[test]
    fn test_active_stall_falls_back() {
        let mut orch = orchestrator(1);
        orch.start().unwrap();
        let _ = orch.process_pending();
        assert_eq!(orch.active_branch(), Some(BranchId(0)));

        let decoder = orch.graph().node_by_name("decoder-0").unwrap();
        let flow = orch.handle_event(NodeEvent::StateChanged {
            node: decoder,
            state: NodeState::Paused,
        });
        assert!(flow.is_continue());
        assert_eq!(orch.graph().branch_state(BranchId(0)), Some(BranchState::Stalled));
        assert_eq!(orch.active_branch(), Some(orch.graph().fallback()));
    }

    #[test]
    fn test_demux_audio_output_does_not_complete_branch() {
        let mut orch = orchestrator(1);
        let demux = orch.graph().node_by_name("demux-0").unwrap();
        let _ = orch.handle_event(NodeEvent::OutputReady {
            node: demux,
            pad: PadId::new(demux, 0),
            media: crate::pipeline::event::MediaKind::Audio,
        });
        assert_ne!(orch.graph().branch_state(BranchId(0)), Some(BranchState::Playing));
    }

    #[test]
    fn test_output_end_of_stream_is_clean() {
        let mut orch = orchestrator(1);
        let transport = orch.graph().output().transport;
        match orch.handle_event(NodeEvent::EndOfStream { node: transport }) {
            ControlFlow::Break(outcome) => assert_eq!(outcome.exit_code(), 0),
            ControlFlow::Continue(()) => panic!("expected loop to end"),
        }
    }

    #[test]
    fn test_restart_failure_reinjected_as_warning() {
        let mut orch = orchestrator(1);
        orch.start().unwrap();
        let _ = orch.process_pending();

        let queue = orch.graph().node_by_name("queue-0").unwrap();
        let _ = orch.handle_event(NodeEvent::EndOfStream { node: queue });
        orch.backend_mut().fail_start(queue, "device busy");

        let report = orch.on_reconcile_tick().unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(orch.graph().branch_state(BranchId(0)), Some(BranchState::Failed));

        // The re-injected warning is transient and does not end the loop
        assert!(orch.process_pending().is_continue());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunOutcome::Shutdown.exit_code(), 0);
        assert_eq!(RunOutcome::EndOfStream.exit_code(), 0);
        assert_eq!(RunOutcome::EventStreamClosed.exit_code(), 1);
        assert_eq!(RunOutcome::StartFailed(PipelineError::NotStarted).exit_code(), 1);
    }
}
