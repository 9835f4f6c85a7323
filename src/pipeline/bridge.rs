//! Thread boundary between the control loop and its operators.
//!
//! `ControlHandle` is cheap to clone and can be used from any thread (the
//! signal handler, an admin surface, tests). Commands are queued and handled
//! by the loop between node events, so they never race a control decision.

use crate::pipeline::graph::{BranchKind, BranchState};
use crate::pipeline::id::BranchId;
use crate::pipeline::recovery::OutputConnectionState;
use crate::pipeline::selector::ActiveSelection;
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use std::time::Duration;

/// Command channel capacity.
const CMD_CHANNEL_CAPACITY: usize = 64;

/// How long `status` waits for the loop to answer.
const STATUS_TIMEOUT: Duration = Duration::from_secs(2);

/// Commands accepted by the control loop.
#[derive(Debug, Clone)]
pub enum ControlCommand {
    /// Manual switch to a branch.
    SwitchTo(BranchId),
    /// Reply with a status snapshot on the given channel.
    Status(Sender<StatusSnapshot>),
    /// Stop every node and leave the loop.
    Shutdown,
}

/// One branch as seen in a status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchStatus {
    pub id: BranchId,
    pub kind: BranchKind,
    pub uri: Option<String>,
    pub state: BranchState,
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub active: Option<ActiveSelection>,
    pub branches: Vec<BranchStatus>,
    pub output: OutputConnectionState,
}

impl StatusSnapshot {
    pub fn branch_state(&self, id: BranchId) -> Option<BranchState> {
        self.branches.iter().find(|b| b.id == id).map(|b| b.state)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Operator-side handle.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    cmd_tx: Sender<ControlCommand>,
}

impl ControlHandle {
    /// Create a handle and the receiver the control loop owns.
    pub fn new() -> (Self, Receiver<ControlCommand>) {
        let (cmd_tx, cmd_rx) = bounded(CMD_CHANNEL_CAPACITY);
        (Self { cmd_tx }, cmd_rx)
    }

    /// Queue a command. Returns false once the loop has gone away.
    pub fn send_command(&self, cmd: ControlCommand) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }

    pub fn switch_to(&self, branch: BranchId) -> bool {
        self.send_command(ControlCommand::SwitchTo(branch))
    }

    /// Ask the loop for a snapshot, waiting a bounded time for the answer.
    pub fn status(&self) -> Option<StatusSnapshot> {
        let (reply_tx, reply_rx) = bounded(1);
        if !self.send_command(ControlCommand::Status(reply_tx)) {
            return None;
        }
        reply_rx.recv_timeout(STATUS_TIMEOUT).ok()
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(ControlCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::pipeline::selector::SwitchReason;

    #[test]
    fn test_commands_reach_receiver() {
        let (handle, rx) = ControlHandle::new();
        assert!(handle.switch_to(BranchId(2)));
        handle.shutdown();

        assert!(matches!(rx.try_recv(), Ok(ControlCommand::SwitchTo(BranchId(2)))));
        assert!(matches!(rx.try_recv(), Ok(ControlCommand::Shutdown)));
    }

    #[test]
    fn test_send_after_loop_gone() {
        let (handle, rx) = ControlHandle::new();
        drop(rx);
        assert!(!handle.switch_to(BranchId(0)));
        assert!(handle.status().is_none());
    }

    #[test]
    fn test_status_round_trip_through_thread() {
        let (handle, rx) = ControlHandle::new();
        let responder = std::thread::spawn(move || {
            if let Ok(ControlCommand::Status(reply)) = rx.recv() {
                let _ = reply.send(StatusSnapshot {
                    active: None,
                    branches: vec![BranchStatus {
                        id: BranchId(0),
                        kind: BranchKind::SyntheticFallback,
                        uri: None,
                        state: BranchState::Playing,
                    }],
                    output: OutputConnectionState::Connected,
                });
            }
        });

        let snapshot = handle.status().unwrap();
        responder.join().unwrap();
        assert_eq!(snapshot.branch_state(BranchId(0)), Some(BranchState::Playing));
    }

    #[test]
    fn test_snapshot_json() {
        let snapshot = StatusSnapshot {
            active: Some(ActiveSelection {
                branch: BranchId(1),
                since: Utc::now(),
                reason: SwitchReason::Timer,
            }),
            branches: vec![BranchStatus {
                id: BranchId(1),
                kind: BranchKind::LiveSource,
                uri: Some("srt://cam-b:6001".into()),
                state: BranchState::Stalled,
            }],
            output: OutputConnectionState::Disconnected,
        };

        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["active"]["branch"], 1);
        assert_eq!(json["active"]["reason"], "timer");
        assert_eq!(json["branches"][0]["state"], "Stalled");
        assert_eq!(json["output"], "Disconnected");
    }
}
