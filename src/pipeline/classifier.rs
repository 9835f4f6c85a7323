//! Fault classifier.
//!
//! Raw fault text from the capability is noisy. Each event is triaged by an
//! ordered rule table; the first matching rule decides the verdict. The
//! verdict depends only on the event and the role of the node that raised
//! it, so the same event always classifies the same way.
//!
//! Built-in rules, in order:
//!
//! | # | Rule | Matches | Verdict |
//! |---|------|---------|---------|
//! | 1 | `output-transport-unavailable` | write/connect failure text on an output node | Transient, output |
//! | 2 | `cascading-stream-break` | stream-stopped text on a source or overlay node | Transient, that branch |
//! | 3 | `unclassified-error` | any other `Error` | PipelineFatal |
//! | 4 | `diagnostic` | `Warning` / `Info` | Transient |

use crate::pipeline::event::{FaultEvent, Severity};
use crate::pipeline::graph::{Graph, NodeRole};
use crate::pipeline::id::BranchId;
use serde::Serialize;
use std::fmt;

/// Text markers meaning the output transport cannot be written to right now.
pub const OUTPUT_UNAVAILABLE_MARKERS: &[&str] = &[
    "connection refused",
    "socket not found",
    "could not write",
    "failed to write",
    "write failure",
    "write error",
];

/// Text markers for a generic internal data-stream break.
pub const STREAM_BREAK_MARKERS: &[&str] = &["internal data stream error", "streaming stopped"];

/// How far a fault reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FaultScope {
    /// Logged; no action beyond bookkeeping.
    Transient,
    /// Only the affected branch is unusable.
    BranchFatal,
    /// The process must stop.
    PipelineFatal,
}

impl fmt::Display for FaultScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultScope::Transient => "transient",
            FaultScope::BranchFatal => "branch-fatal",
            FaultScope::PipelineFatal => "pipeline-fatal",
        };
        f.write_str(s)
    }
}

/// The part of the graph a verdict applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Affected {
    Output,
    Branch(BranchId),
    Overlay,
}

/// Classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FaultVerdict {
    pub scope: FaultScope,
    pub affected: Option<Affected>,
    /// Name of the rule that decided.
    pub rule: &'static str,
}

/// Lower-cased event text, computed once per event.
pub struct FaultText {
    message: String,
    debug: String,
}

impl FaultText {
    fn new(event: &FaultEvent) -> Self {
        Self {
            message: event.message.to_lowercase(),
            debug: event
                .debug
                .as_deref()
                .map(str::to_lowercase)
                .unwrap_or_default(),
        }
    }

    /// True when message or debug text contains any of the markers.
    pub fn contains_any(&self, markers: &[&str]) -> bool {
        markers
            .iter()
            .any(|m| self.message.contains(m) || self.debug.contains(m))
    }
}

/// One row of the rule table.
#[derive(Clone, Copy)]
pub struct ClassificationRule {
    pub name: &'static str,
    pub matches: fn(&FaultEvent, &FaultText, Option<NodeRole>) -> bool,
    pub verdict: fn(Option<NodeRole>) -> (FaultScope, Option<Affected>),
}

impl fmt::Debug for ClassificationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassificationRule")
            .field("name", &self.name)
            .finish()
    }
}

fn output_unavailable(_: &FaultEvent, text: &FaultText, role: Option<NodeRole>) -> bool {
    role == Some(NodeRole::Output) && text.contains_any(OUTPUT_UNAVAILABLE_MARKERS)
}

fn stream_break(_: &FaultEvent, text: &FaultText, role: Option<NodeRole>) -> bool {
    matches!(role, Some(NodeRole::Branch(_)) | Some(NodeRole::Overlay))
        && text.contains_any(STREAM_BREAK_MARKERS)
}

fn is_error(event: &FaultEvent, _: &FaultText, _: Option<NodeRole>) -> bool {
    event.severity == Severity::Error
}

fn is_diagnostic(event: &FaultEvent, _: &FaultText, _: Option<NodeRole>) -> bool {
    matches!(event.severity, Severity::Warning | Severity::Info)
}

fn transient_scoped(role: Option<NodeRole>) -> (FaultScope, Option<Affected>) {
    let affected = match role {
        Some(NodeRole::Output) => Some(Affected::Output),
        Some(NodeRole::Branch(b)) => Some(Affected::Branch(b)),
        Some(NodeRole::Overlay) => Some(Affected::Overlay),
        _ => None,
    };
    (FaultScope::Transient, affected)
}

fn pipeline_fatal(_: Option<NodeRole>) -> (FaultScope, Option<Affected>) {
    (FaultScope::PipelineFatal, None)
}

fn transient_unscoped(_: Option<NodeRole>) -> (FaultScope, Option<Affected>) {
    (FaultScope::Transient, None)
}

/// The built-in rule table, in evaluation order.
pub const BUILTIN_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        name: "output-transport-unavailable",
        matches: output_unavailable,
        verdict: transient_scoped,
    },
    ClassificationRule {
        name: "cascading-stream-break",
        matches: stream_break,
        verdict: transient_scoped,
    },
    ClassificationRule {
        name: "unclassified-error",
        matches: is_error,
        verdict: pipeline_fatal,
    },
    ClassificationRule {
        name: "diagnostic",
        matches: is_diagnostic,
        verdict: transient_unscoped,
    },
];

/// Name used when no rule matches.
const NO_RULE: &str = "no-match";

/// Ordered rule evaluation.
#[derive(Debug, Clone)]
pub struct FaultClassifier {
    rules: Vec<ClassificationRule>,
}

impl Default for FaultClassifier {
    fn default() -> Self {
        Self {
            rules: BUILTIN_RULES.to_vec(),
        }
    }
}

impl FaultClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Insert a rule at `position` (clamped to the table length).
    pub fn insert_rule(&mut self, position: usize, rule: ClassificationRule) {
        let position = position.min(self.rules.len());
        self.rules.insert(position, rule);
    }

    /// Classify an event raised by a node of `graph`.
    pub fn classify(&self, event: &FaultEvent, graph: &Graph) -> FaultVerdict {
        self.classify_with_role(event, graph.role_of(event.source))
    }

    /// Classify an event given the role of its originating node.
    ///
    /// Nodes unknown to the graph have no role and only match the
    /// severity rules. If nothing matches, the verdict is `PipelineFatal`.
    pub fn classify_with_role(&self, event: &FaultEvent, role: Option<NodeRole>) -> FaultVerdict {
        let text = FaultText::new(event);
        self.rules
            .iter()
            .find(|rule| (rule.matches)(event, &text, role))
            .map(|rule| {
                let (scope, affected) = (rule.verdict)(role);
                FaultVerdict {
                    scope,
                    affected,
                    rule: rule.name,
                }
            })
            .unwrap_or(FaultVerdict {
                scope: FaultScope::PipelineFatal,
                affected: None,
                rule: NO_RULE,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::NodeId;
    use proptest::prelude::*;

    fn classify(event: &FaultEvent, role: Option<NodeRole>) -> FaultVerdict {
        FaultClassifier::new().classify_with_role(event, role)
    }

    #[test]
    fn test_output_write_failure_is_transient() {
        let event = FaultEvent::error(NodeId(20), "Could not write to socket");
        let verdict = classify(&event, Some(NodeRole::Output));
        assert_eq!(verdict.scope, FaultScope::Transient);
        assert_eq!(verdict.affected, Some(Affected::Output));
        assert_eq!(verdict.rule, "output-transport-unavailable");
    }

    #[test]
    fn test_marker_in_debug_text() {
        let event = FaultEvent::error(NodeId(20), "Failed to open SRT")
            .with_debug("srtobject.c(1234): Connection refused");
        let verdict = classify(&event, Some(NodeRole::Output));
        assert_eq!(verdict.scope, FaultScope::Transient);
    }

    #[test]
    fn test_output_marker_on_source_is_fatal() {
        let event = FaultEvent::error(NodeId(3), "connection refused");
        let verdict = classify(&event, Some(NodeRole::Branch(BranchId(0))));
        assert_eq!(verdict.scope, FaultScope::PipelineFatal);
    }

    #[test]
    fn test_stream_break_on_branch_is_transient() {
        let event = FaultEvent::error(NodeId(4), "Internal data stream error.")
            .with_debug("streaming stopped, reason not-linked (-1)");
        let verdict = classify(&event, Some(NodeRole::Branch(BranchId(2))));
        assert_eq!(verdict.scope, FaultScope::Transient);
        assert_eq!(verdict.affected, Some(Affected::Branch(BranchId(2))));
    }

    #[test]
    fn test_stream_break_on_overlay_is_transient() {
        let event = FaultEvent::error(NodeId(30), "streaming stopped, reason error");
        let verdict = classify(&event, Some(NodeRole::Overlay));
        assert_eq!(verdict.affected, Some(Affected::Overlay));
    }

    #[test]
    fn test_stream_break_on_output_is_fatal() {
        let event = FaultEvent::error(NodeId(20), "Internal data stream error.");
        let verdict = classify(&event, Some(NodeRole::Output));
        assert_eq!(verdict.scope, FaultScope::PipelineFatal);
    }

    #[test]
    fn test_unknown_codec_is_fatal() {
        let event = FaultEvent::error(NodeId(5), "unknown codec");
        let verdict = classify(&event, Some(NodeRole::Branch(BranchId(2))));
        assert_eq!(verdict.scope, FaultScope::PipelineFatal);
        assert_eq!(verdict.rule, "unclassified-error");
    }

    #[test]
    fn test_unknown_node_error_is_fatal() {
        let event = FaultEvent::error(NodeId(999), "");
        assert_eq!(classify(&event, None).scope, FaultScope::PipelineFatal);
    }

    #[test]
    fn test_warnings_are_transient() {
        let event = FaultEvent::warning(NodeId(5), "unknown codec");
        let verdict = classify(&event, Some(NodeRole::Branch(BranchId(0))));
        assert_eq!(verdict.scope, FaultScope::Transient);
        assert_eq!(verdict.affected, None);
        assert_eq!(verdict.rule, "diagnostic");
    }

    #[test]
    fn test_inserted_rule_takes_precedence() {
        let mut classifier = FaultClassifier::new();
        classifier.insert_rule(
            0,
            ClassificationRule {
                name: "decoder-resync",
                matches: |_, text, _| text.contains_any(&["resync"]),
                verdict: |_| (FaultScope::Transient, None),
            },
        );

        let event = FaultEvent::error(NodeId(5), "decoder needs resync");
        let verdict = classifier.classify_with_role(&event, Some(NodeRole::Audio));
        assert_eq!(verdict.rule, "decoder-resync");
        assert_eq!(classifier.rules().len(), BUILTIN_RULES.len() + 1);
    }

    fn any_severity() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Info),
            Just(Severity::Warning),
            Just(Severity::Error)
        ]
    }

    fn any_role() -> impl Strategy<Value = Option<NodeRole>> {
        prop_oneof![
            Just(None),
            Just(Some(NodeRole::Output)),
            Just(Some(NodeRole::Overlay)),
            Just(Some(NodeRole::Selector)),
            Just(Some(NodeRole::Audio)),
            (0u32..8).prop_map(|b| Some(NodeRole::Branch(BranchId(b)))),
        ]
    }

    fn any_text() -> impl Strategy<Value = String> {
        prop_oneof![
            ".*",
            Just("Could not write to socket".to_string()),
            Just("Internal data stream error.".to_string()),
            Just("Socket not found".to_string()),
        ]
    }

    proptest! {
        #[test]
        fn test_classification_is_deterministic(
            severity in any_severity(),
            role in any_role(),
            message in any_text(),
            debug in proptest::option::of(any_text()),
        ) {
            let event = FaultEvent { source: NodeId(1), severity, message, debug };
            let classifier = FaultClassifier::new();
            let first = classifier.classify_with_role(&event, role);
            let second = classifier.classify_with_role(&event.clone(), role);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn test_errors_never_silently_dropped(
            role in any_role(),
            message in any_text(),
        ) {
            let event = FaultEvent::error(NodeId(1), message);
            let verdict = FaultClassifier::new().classify_with_role(&event, role);
            // An error is either fatal or explicitly scoped to a part of the graph
            prop_assert!(verdict.scope == FaultScope::PipelineFatal || verdict.affected.is_some());
        }

        #[test]
        fn test_non_errors_never_fatal(
            role in any_role(),
            message in any_text(),
        ) {
            let event = FaultEvent::warning(NodeId(1), message);
            let verdict = FaultClassifier::new().classify_with_role(&event, role);
            prop_assert_eq!(verdict.scope, FaultScope::Transient);
        }
    }
}
