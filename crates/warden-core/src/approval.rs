//! Approval outcomes and hook events.
//!
//! These types live in `warden-core` so that `warden-gateway` (which
//! resolves approvals) and the CLI can share them without circular deps.

use serde::{Deserialize, Serialize};

/// Reason reported when a request outlives its timeout.
pub const REASON_TIMED_OUT: &str = "Approval timed out";
/// Default reason for an operator denial without an explicit explanation.
pub const REASON_DENIED: &str = "Denied by user";
/// Reason reported when the owning agent session is torn down.
pub const REASON_SESSION_TERMINATED: &str = "Session terminated";

/// The resolution of a single approval request.
///
/// The wire shape is frozen: the external hook launcher maps
/// `blocked == false` to exit status 0 and `blocked == true` to exit
/// status 2, so renaming either field breaks deployed hook scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    /// Whether the requested tool use must be blocked.
    pub blocked: bool,
    /// Human-readable explanation, present only when blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApprovalOutcome {
    /// Outcome for an explicit operator approval.
    pub fn approved() -> Self {
        Self {
            blocked: false,
            reason: None,
        }
    }

    /// Outcome for a denial with the given reason.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
        }
    }

    /// Outcome for a request that outlived its timeout.
    pub fn timed_out() -> Self {
        Self::denied(REASON_TIMED_OUT)
    }

    /// Outcome for a request cancelled by session teardown.
    pub fn session_terminated() -> Self {
        Self::denied(REASON_SESSION_TERMINATED)
    }
}

/// A tool-use notification posted by the hook bridge.
///
/// `request_id` and `session_id` are the only fields the bridge must
/// supply; the rest enrich what the operator sees in the approval prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    /// Caller-supplied identifier, unique among in-flight requests.
    pub request_id: String,
    /// The agent session this request belongs to.
    pub session_id: String,
    /// Name of the tool the agent wants to run, when the bridge knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// One-line summary shown to the operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn approved_outcome_omits_reason_on_the_wire() {
        let json = serde_json::to_string(&ApprovalOutcome::approved()).unwrap();
        assert_eq!(json, r#"{"blocked":false}"#);
    }

    #[test]
    fn denied_outcome_carries_reason() {
        let json = serde_json::to_string(&ApprovalOutcome::denied("nope")).unwrap();
        assert_eq!(json, r#"{"blocked":true,"reason":"nope"}"#);
    }

    #[test]
    fn canned_outcomes_use_fixed_reasons() {
        assert_eq!(
            ApprovalOutcome::timed_out().reason.as_deref(),
            Some(REASON_TIMED_OUT)
        );
        assert_eq!(
            ApprovalOutcome::session_terminated().reason.as_deref(),
            Some(REASON_SESSION_TERMINATED)
        );
    }

    #[test]
    fn hook_event_optional_fields_default() {
        let event: HookEvent =
            serde_json::from_str(r#"{"request_id":"r1","session_id":"s1"}"#).unwrap();
        assert_eq!(event.request_id, "r1");
        assert_eq!(event.session_id, "s1");
        assert!(event.tool_name.is_none());
        assert!(event.description.is_none());
    }
}
