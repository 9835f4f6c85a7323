//! Recovery scheduler.
//!
//! Tracks whether the output transport is connected and restarts branches
//! that are not delivering data. A restart sweep runs once when the output
//! comes (back) up and then on every reconcile tick while it stays up.

use crate::backend::{CapabilityError, MediaBackend};
use crate::pipeline::binder::PadBinder;
use crate::pipeline::event::FaultEvent;
use crate::pipeline::graph::{BranchState, Graph};
use crate::pipeline::id::{BranchId, NodeId};
use serde::Serialize;
use std::time::Duration;

/// Default period of the reconcile tick.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

/// Whether the output transport is able to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutputConnectionState {
    Disconnected,
    Connected,
}

/// A branch restart that the capability refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartFailure {
    pub branch: BranchId,
    pub node: NodeId,
    pub error: CapabilityError,
}

impl RestartFailure {
    /// Fault event fed back into the control loop for this failure.
    pub fn to_fault(&self) -> FaultEvent {
        FaultEvent::warning(
            self.node,
            format!("restart of {} failed: {}", self.branch, self.error),
        )
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub restarted: Vec<BranchId>,
    pub failures: Vec<RestartFailure>,
}

impl SweepReport {
    pub fn restarted_count(&self) -> usize {
        self.restarted.len()
    }
}

#[derive(Debug)]
pub struct RecoveryScheduler {
    state: OutputConnectionState,
    /// Set once the sweep for the current connected period has run.
    sweep_attempted: bool,
    reconcile_interval: Duration,
}

impl Default for RecoveryScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_RECONCILE_INTERVAL)
    }
}

impl RecoveryScheduler {
    pub fn new(reconcile_interval: Duration) -> Self {
        Self {
            state: OutputConnectionState::Disconnected,
            sweep_attempted: false,
            reconcile_interval,
        }
    }

    pub fn state(&self) -> OutputConnectionState {
        self.state
    }

    pub fn sweep_attempted(&self) -> bool {
        self.sweep_attempted
    }

    pub fn reconcile_interval(&self) -> Duration {
        self.reconcile_interval
    }

    /// Feed an output transport lifecycle change.
    ///
    /// Returns the sweep report when the change is Disconnected → Connected.
    pub fn on_output_state(
        &mut self,
        connected: bool,
        graph: &mut Graph,
        binder: &mut PadBinder,
        backend: &mut dyn MediaBackend,
    ) -> Option<SweepReport> {
        match (self.state, connected) {
            (OutputConnectionState::Disconnected, true) => {
                tracing::info!("Output connected");
                self.state = OutputConnectionState::Connected;
                if self.sweep_attempted {
                    return None;
                }
                self.sweep_attempted = true;
                Some(self.restart_sweep(graph, binder, backend))
            }
            (OutputConnectionState::Connected, false) => {
                tracing::warn!("Output disconnected");
                self.state = OutputConnectionState::Disconnected;
                self.sweep_attempted = false;
                None
            }
            _ => None,
        }
    }

    /// Periodic reconcile; sweeps only while connected.
    pub fn on_reconcile_tick(
        &mut self,
        graph: &mut Graph,
        binder: &mut PadBinder,
        backend: &mut dyn MediaBackend,
    ) -> Option<SweepReport> {
        if self.state != OutputConnectionState::Connected {
            return None;
        }
        Some(self.restart_sweep(graph, binder, backend))
    }

    /// Every node was just started; that start stands in for the sweep of
    /// the first connected period.
    pub fn note_fresh_start(&mut self) {
        self.sweep_attempted = true;
    }

    /// Restart every branch that is not playing.
    pub fn restart_sweep(
        &self,
        graph: &mut Graph,
        binder: &mut PadBinder,
        backend: &mut dyn MediaBackend,
    ) -> SweepReport {
        let targets: Vec<BranchId> = graph
            .branches()
            .iter()
            .filter(|b| !b.state().is_playing())
            .map(|b| b.id)
            .collect();

        let mut report = SweepReport::default();
        for branch in targets {
            match restart_branch(graph, backend, branch) {
                Ok(()) => {
                    binder.rearm(branch);
                    graph.set_branch_state(branch, BranchState::Starting);
                    report.restarted.push(branch);
                }
                Err((node, error)) => {
                    tracing::warn!("Restart of {} failed at {}: {}", branch, node, error);
                    graph.set_branch_state(branch, BranchState::Failed);
                    report.failures.push(RestartFailure {
                        branch,
                        node,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            restarted = report.restarted.len(),
            failed = report.failures.len(),
            "Restart sweep complete"
        );
        report
    }
}

/// Stop the chain upstream-first, then start it downstream-first.
fn restart_branch(
    graph: &mut Graph,
    backend: &mut dyn MediaBackend,
    branch: BranchId,
) -> Result<(), (NodeId, CapabilityError)> {
    let chain = match graph.branch(branch) {
        Some(b) => b.node_chain.clone(),
        None => return Ok(()),
    };

    for node in &chain {
        backend.stop(*node).map_err(|e| (*node, e))?;
    }
    graph.reset_chain_states(branch);
    for node in chain.iter().rev() {
        backend.start(*node).map_err(|e| (*node, e))?;
    }
    Ok(())
}
