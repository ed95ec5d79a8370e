//! Action decider: one oracle round trip, exactly one canonical action out.

use tracing::{debug, info, instrument, warn};

use crate::core::action::{Action, ResponseShape, normalize_response};
use crate::error::OrchestrationError;
use crate::io::oracle::{DecisionRequest, Oracle, OracleRequest};

/// Outcome of one decision request.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    /// Shape of the reply, when one could be normalized.
    pub shape: Option<ResponseShape>,
    pub repaired: bool,
    /// Set when the reply was unusable and `action` was synthesized.
    pub error: Option<OrchestrationError>,
}

impl Decision {
    fn synthesized(message: String, error: Option<OrchestrationError>) -> Self {
        Self {
            action: Action::error(message),
            shape: None,
            repaired: false,
            error,
        }
    }

    /// `object`, `batch` or `repaired`, for the run journal.
    pub fn shape_label(&self) -> Option<String> {
        let shape = self.shape?;
        let label = if self.repaired {
            "repaired"
        } else {
            match shape {
                ResponseShape::Object => "object",
                ResponseShape::Batch { .. } => "batch",
            }
        };
        Some(label.to_string())
    }
}

/// Ask the oracle for the next action on the request's task.
///
/// Never fails: an oracle error or an unrecoverable reply becomes an `error`
/// action so the loop accounts for it like any other failed step.
#[instrument(skip_all, fields(task_id = request.task.id, iteration = request.iteration))]
pub fn decide<O: Oracle + ?Sized>(oracle: &O, request: DecisionRequest) -> Decision {
    let request = OracleRequest::Decide(request);
    let raw = match oracle.consult(&request) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "oracle call failed");
            return Decision::synthesized(format!("oracle call failed: {err:#}"), None);
        }
    };

    match normalize_response(&raw) {
        Ok(normalized) => {
            if let ResponseShape::Batch { len } = normalized.shape {
                warn!(len, "oracle returned an action array; using the first element");
            }
            if normalized.repaired {
                info!("oracle reply repaired before parsing");
            }
            if let Some(reasoning) = normalized.action.reasoning() {
                debug!(reasoning, "oracle reasoning");
            }
            debug!(action = normalized.action.kind(), tool = ?normalized.action.tool_name(), "decided");
            Decision {
                action: normalized.action,
                shape: Some(normalized.shape),
                repaired: normalized.repaired,
                error: None,
            }
        }
        Err(err) => {
            warn!(err = %err, reply_bytes = raw.len(), "oracle reply unusable");
            Decision::synthesized(err.to_string(), Some(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loop_detector::Invocation;
    use crate::core::types::Progress;
    use crate::io::oracle::TaskSummary;
    use crate::test_support::{ScriptedOracle, task, write_file_call};
    use std::path::PathBuf;

    fn request() -> DecisionRequest {
        let task = task(1, &["a.txt"]);
        DecisionRequest {
            objective: "write a.txt".to_string(),
            working_directory: PathBuf::from("/work"),
            iteration: 1,
            task: TaskSummary::from(&task),
            progress: Progress::default(),
            plan: vec![TaskSummary::from(&task)],
            recent: vec![Invocation::new(1, "read_file")],
            tools: Vec::new(),
        }
    }

    #[test]
    fn canonical_reply_passes_through() {
        let oracle = ScriptedOracle::new().then_decide(write_file_call("a.txt", "hi"));
        let decision = decide(&oracle, request());
        assert_eq!(decision.action.tool_name(), Some("write_file"));
        assert_eq!(decision.shape_label().as_deref(), Some("object"));
        assert!(decision.error.is_none());

        let requests = oracle.requests();
        assert_eq!(requests.len(), 1);
        match &requests[0] {
            OracleRequest::Decide(sent) => assert_eq!(sent.recent.len(), 1),
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn array_reply_is_labelled_as_batch() {
        let oracle =
            ScriptedOracle::new().then_decide(format!("[{}]", write_file_call("a.txt", "hi")));
        let decision = decide(&oracle, request());
        assert_eq!(decision.shape, Some(ResponseShape::Batch { len: 1 }));
        assert_eq!(decision.shape_label().as_deref(), Some("batch"));
    }

    #[test]
    fn garbage_becomes_an_error_action() {
        let oracle = ScriptedOracle::new().then_decide("I think you should write the file.");
        let decision = decide(&oracle, request());
        assert_eq!(decision.action.kind(), "error");
        assert!(matches!(decision.error, Some(OrchestrationError::OracleFormat(_))));
        assert_eq!(oracle.decision_count(), 1);
    }

    #[test]
    fn oracle_failure_becomes_an_error_action() {
        let oracle = ScriptedOracle::new().then_decide_error("connection reset");
        let decision = decide(&oracle, request());
        assert_eq!(
            decision.action.message(),
            Some("oracle call failed: connection reset")
        );
        assert!(decision.shape_label().is_none());
    }
}
