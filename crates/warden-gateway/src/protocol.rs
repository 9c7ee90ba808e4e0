use serde::{Deserialize, Serialize};

/// Messages an operator client sends over the control WebSocket.
///
/// Every connection must open with `Auth` carrying a current pairing code;
/// until that succeeds the gateway refuses decision messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Present a one-time pairing code to authenticate the connection.
    Auth { code: String },

    /// Approve a pending tool-use request.
    Approve { request_id: String },

    /// Deny a pending tool-use request, optionally with a reason.
    Deny {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// Messages the gateway sends to operator clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection, before authentication.
    Connected { connection_id: String },

    /// The presented pairing code was accepted.
    AuthOk,

    /// The presented pairing code was rejected or rate limited.
    AuthRejected,

    /// A tool-use request is awaiting a decision.
    ApprovalRequest {
        request_id: String,
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },

    /// Acknowledges an approve/deny; `delivered` is false when the request
    /// was no longer pending.
    Ack { request_id: String, delivered: bool },

    /// A coalesced frame of agent terminal output.
    Output { data: String },

    /// An agent session ended and its pending requests were cancelled.
    SessionEnded { session_id: String, cancelled: usize },

    /// The gateway could not act on the last client message.
    Error { message: String },
}

impl ServerMessage {
    /// Serialize for the wire. Falls back to an empty string only if
    /// serialization itself fails, which these shapes cannot.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
