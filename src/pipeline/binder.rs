//! Dynamic pad binder.
//!
//! A demultiplexer only knows which outputs it has after parsing the first
//! bytes of its container. The builder records each such connection as a
//! [`DeferredLink`] on the branch; the binder keeps one pending binding per
//! branch (an arena indexed by branch id) and completes it when the
//! capability announces a matching output.
//!
//! The binder is scoped to a single branch per call and never touches the
//! selector.

use crate::backend::MediaBackend;
use crate::pipeline::event::MediaKind;
use crate::pipeline::graph::{DeferredLink, Graph, NodeRole};
use crate::pipeline::id::{BranchId, NodeId, PadId};

/// Result of an output announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The output was linked into the branch.
    Bound { branch: BranchId, pad: PadId },
    /// The branch's binding was already made.
    AlreadyBound,
    /// Not an output this binder is waiting for.
    Ignored,
    /// The capability refused the link; the binding stays pending.
    LinkFailed,
}

#[derive(Debug, Clone)]
struct PendingBinding {
    link: DeferredLink,
    bound: Option<PadId>,
}

/// Pending late-bound connections, one slot per branch.
#[derive(Debug, Clone, Default)]
pub struct PadBinder {
    pending: Vec<Option<PendingBinding>>,
}

impl PadBinder {
    pub fn new(graph: &Graph) -> Self {
        Self {
            pending: graph
                .branches()
                .iter()
                .map(|b| {
                    b.deferred.map(|link| PendingBinding { link, bound: None })
                })
                .collect(),
        }
    }

    /// Handle a newly discovered output on `node`.
    ///
    /// The first output of the expected media kind is linked; anything else
    /// is ignored. Repeated announcements after a successful bind are no-ops.
    pub fn on_output_ready(
        &mut self,
        graph: &Graph,
        backend: &mut dyn MediaBackend,
        node: NodeId,
        pad: PadId,
        media: MediaKind,
    ) -> BindOutcome {
        let branch = match graph.role_of(node) {
            Some(NodeRole::Branch(branch)) => branch,
            _ => return BindOutcome::Ignored,
        };
        let slot = match self.pending.get_mut(branch.index()).and_then(Option::as_mut) {
            Some(slot) if slot.link.demux == node => slot,
            _ => return BindOutcome::Ignored,
        };

        if slot.bound.is_some() {
            return BindOutcome::AlreadyBound;
        }
        if media != slot.link.expected {
            tracing::debug!(
                "{}: ignoring {:?} output {:?} (waiting for {:?})",
                branch,
                media,
                pad,
                slot.link.expected
            );
            return BindOutcome::Ignored;
        }

        match backend.link_pad(pad, slot.link.downstream) {
            Ok(()) => {
                slot.bound = Some(pad);
                tracing::info!("{}: bound {:?} output {:?}", branch, media, pad);
                BindOutcome::Bound { branch, pad }
            }
            Err(e) => {
                tracing::warn!("{}: failed to bind {:?}: {}", branch, pad, e);
                BindOutcome::LinkFailed
            }
        }
    }

    /// True when the branch has no deferred link or it has been made.
    pub fn is_bound(&self, branch: BranchId) -> bool {
        match self.pending.get(branch.index()) {
            Some(Some(slot)) => slot.bound.is_some(),
            _ => true,
        }
    }

    /// Wait for a fresh output again (the branch is being restarted).
    pub fn rearm(&mut self, branch: BranchId) {
        if let Some(Some(slot)) = self.pending.get_mut(branch.index()) {
            slot.bound = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, MediaBackend};
    use crate::pipeline::test_support::build_graph;

    #[test]
    fn test_binds_first_video_output_only() {
        let (graph, mut sim) = build_graph(2);
        let mut binder = PadBinder::new(&graph);
        let link = graph.branch(BranchId(1)).unwrap().deferred.unwrap();

        // The simulated demux announces audio on pad 0 and video on pad 1
        sim.start(link.demux).unwrap();
        let audio = PadId::new(link.demux, 0);
        let video = PadId::new(link.demux, 1);

        assert!(!binder.is_bound(BranchId(1)));
        assert_eq!(
            binder.on_output_ready(&graph, &mut sim, link.demux, audio, MediaKind::Audio),
            BindOutcome::Ignored
        );
        assert_eq!(
            binder.on_output_ready(&graph, &mut sim, link.demux, video, MediaKind::Video),
            BindOutcome::Bound {
                branch: BranchId(1),
                pad: video
            }
        );
        assert!(binder.is_bound(BranchId(1)));
        assert!(!binder.is_bound(BranchId(0)));
        assert!(sim.calls().contains(&BackendCall::LinkPad(video, link.downstream)));

        sim.clear_calls();
        assert_eq!(
            binder.on_output_ready(&graph, &mut sim, link.demux, video, MediaKind::Video),
            BindOutcome::AlreadyBound
        );
        assert!(sim.calls().is_empty());
    }

    #[test]
    fn test_non_demux_outputs_ignored() {
        let (graph, mut sim) = build_graph(1);
        let mut binder = PadBinder::new(&graph);
        let selector = graph.selector();
        let decoder = graph.node_by_name("decoder-0").unwrap();

        assert_eq!(
            binder.on_output_ready(&graph, &mut sim, selector, PadId::new(selector, 0), MediaKind::Video),
            BindOutcome::Ignored
        );
        assert_eq!(
            binder.on_output_ready(&graph, &mut sim, decoder, PadId::new(decoder, 0), MediaKind::Video),
            BindOutcome::Ignored
        );
        // The fallback has nothing deferred
        assert!(binder.is_bound(graph.fallback()));
    }

    #[test]
    fn test_rearm_and_link_failure() {
        let (graph, mut sim) = build_graph(1);
        let mut binder = PadBinder::new(&graph);
        let link = graph.branch(BranchId(0)).unwrap().deferred.unwrap();

        // Pad never allocated by the capability
        let bogus = PadId::new(link.demux, 9);
        assert_eq!(
            binder.on_output_ready(&graph, &mut sim, link.demux, bogus, MediaKind::Video),
            BindOutcome::LinkFailed
        );
        assert!(!binder.is_bound(BranchId(0)));

        sim.start(link.demux).unwrap();
        let video = PadId::new(link.demux, 1);
        assert!(matches!(
            binder.on_output_ready(&graph, &mut sim, link.demux, video, MediaKind::Video),
            BindOutcome::Bound { .. }
        ));

        binder.rearm(BranchId(0));
        assert!(!binder.is_bound(BranchId(0)));
        assert!(matches!(
            binder.on_output_ready(&graph, &mut sim, link.demux, video, MediaKind::Video),
            BindOutcome::Bound { .. }
        ));
    }
}
