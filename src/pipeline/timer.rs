//! Switch timer: fixed-interval rotation through the live branches.

use crate::backend::MediaBackend;
use crate::pipeline::graph::Graph;
use crate::pipeline::id::BranchId;
use crate::pipeline::selector::{SelectorController, SwitchOutcome, SwitchReason};
use std::time::Duration;

/// Default rotation interval.
pub const DEFAULT_SWITCH_INTERVAL: Duration = Duration::from_secs(120);

/// Requests a switch to the next live branch on every tick.
///
/// A rejected switch is not retried; the next tick reassesses from the
/// branch that is still active.
#[derive(Debug, Clone)]
pub struct SwitchTimer {
    interval: Duration,
}

impl Default for SwitchTimer {
    fn default() -> Self {
        Self::new(DEFAULT_SWITCH_INTERVAL)
    }
}

impl SwitchTimer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Branch the next tick should rotate to, if there are live sources.
    ///
    /// While the fallback is active the rotation continues from the last
    /// live branch that was selected, or starts at branch 0.
    pub fn next_target(&self, graph: &Graph, selector: &SelectorController) -> Option<BranchId> {
        let count = graph.source_count();
        if count == 0 {
            return None;
        }
        let current = selector
            .active_branch()
            .filter(|b| graph.branch(*b).is_some_and(|br| br.is_live()))
            .or_else(|| selector.last_live());

        let next = match current {
            Some(b) => (b.index() + 1) % count,
            None => 0,
        };
        Some(BranchId(next as u32))
    }

    /// Handle one tick.
    pub fn on_tick(
        &self,
        graph: &Graph,
        selector: &mut SelectorController,
        backend: &mut dyn MediaBackend,
    ) -> Option<SwitchOutcome> {
        let target = self.next_target(graph, selector)?;
        tracing::debug!("Switch timer fired, rotating to {}", target);
        Some(selector.switch_to(graph, backend, target, SwitchReason::Timer))
    }
}
