//! Selector controller: the single owner of the active branch.
//!
//! Switching only changes which selector input is forwarded; every branch
//! keeps running, so a switch never re-initializes a node and costs one
//! property write on the selector.

use crate::backend::{CapabilityError, MediaBackend};
use crate::pipeline::graph::{BranchState, Graph};
use crate::pipeline::id::{BranchId, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the active branch changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    Initial,
    Timer,
    Recovery,
    Manual,
}

impl fmt::Display for SwitchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwitchReason::Initial => "initial",
            SwitchReason::Timer => "timer",
            SwitchReason::Recovery => "recovery",
            SwitchReason::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// The branch currently forwarded by the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSelection {
    pub branch: BranchId,
    pub since: DateTime<Utc>,
    pub reason: SwitchReason,
}

/// Why a switch request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    UnknownBranch,
    NotPlaying(BranchState),
    CommandFailed(CapabilityError),
}

/// Result of a switch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Committed,
    Rejected(RejectReason),
}

impl SwitchOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, SwitchOutcome::Committed)
    }
}

/// Owns the [`ActiveSelection`] cell.
#[derive(Debug)]
pub struct SelectorController {
    selector: NodeId,
    active: Option<ActiveSelection>,
    /// Last live branch that was active, used for rotation while on fallback.
    last_live: Option<BranchId>,
}

impl SelectorController {
    pub fn new(graph: &Graph) -> Self {
        Self {
            selector: graph.selector(),
            active: None,
            last_live: None,
        }
    }

    pub fn active(&self) -> Option<&ActiveSelection> {
        self.active.as_ref()
    }

    pub fn active_branch(&self) -> Option<BranchId> {
        self.active.map(|a| a.branch)
    }

    pub fn last_live(&self) -> Option<BranchId> {
        self.last_live
    }

    /// Pick the first playing live branch, or the fallback.
    ///
    /// The fallback is always eligible here, even before it reports
    /// playing, so the stream has a selected input from the very start.
    pub fn initialize(
        &mut self,
        graph: &Graph,
        backend: &mut dyn MediaBackend,
    ) -> Result<ActiveSelection, CapabilityError> {
        let target = graph
            .live_branches()
            .find(|b| b.state().is_playing())
            .map(|b| b.id)
            .unwrap_or_else(|| graph.fallback());

        let pad = graph
            .branch(target)
            .map(|b| b.join_pad)
            .ok_or(CapabilityError::UnknownNode(self.selector))?;
        backend.set_active_pad(self.selector, pad)?;

        let selection = ActiveSelection {
            branch: target,
            since: Utc::now(),
            reason: SwitchReason::Initial,
        };
        self.commit(graph, selection);
        tracing::info!(to = %target, reason = %SwitchReason::Initial, "Initial selection");
        Ok(selection)
    }

    /// Make `target` the active branch.
    ///
    /// Only playing branches are eligible. Switching to the branch that is
    /// already active succeeds without touching `since`.
    pub fn switch_to(
        &mut self,
        graph: &Graph,
        backend: &mut dyn MediaBackend,
        target: BranchId,
        reason: SwitchReason,
    ) -> SwitchOutcome {
        let from = self.active_branch();
        let branch = match graph.branch(target) {
            Some(b) => b,
            None => {
                tracing::warn!(to = %target, reason = %reason, "Switch rejected: unknown branch");
                return SwitchOutcome::Rejected(RejectReason::UnknownBranch);
            }
        };

        if branch.state() != BranchState::Playing {
            tracing::info!(
                from = ?from,
                to = %target,
                reason = %reason,
                state = ?branch.state(),
                "Switch rejected: branch not playing"
            );
            return SwitchOutcome::Rejected(RejectReason::NotPlaying(branch.state()));
        }

        if from == Some(target) {
            return SwitchOutcome::Committed;
        }

        if let Err(e) = backend.set_active_pad(self.selector, branch.join_pad) {
            tracing::warn!(to = %target, reason = %reason, "Switch rejected: {}", e);
            return SwitchOutcome::Rejected(RejectReason::CommandFailed(e));
        }

        self.commit(
            graph,
            ActiveSelection {
                branch: target,
                since: Utc::now(),
                reason,
            },
        );
        tracing::info!(from = ?from, to = %target, reason = %reason, "Switched active branch");
        SwitchOutcome::Committed
    }

    fn commit(&mut self, graph: &Graph, selection: ActiveSelection) {
        if graph.branch(selection.branch).is_some_and(|b| b.is_live()) {
            self.last_live = Some(selection.branch);
        }
        self.active = Some(selection);
    }
}
