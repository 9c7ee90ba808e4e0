use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;
use warden_core::approval::ApprovalOutcome;

/// One resolved approval, as recorded on disk.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Append-only log of every resolved approval request.
///
/// Writes happen on a background task so resolution paths never block
/// on disk I/O. Entries are JSON lines in `decisions.jsonl`.
pub struct DecisionLog {
    tx: mpsc::UnboundedSender<DecisionEntry>,
}

impl DecisionLog {
    /// Create a log rooted at `log_dir`, spawning the writer task.
    pub fn new(log_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<DecisionEntry>();

        tokio::spawn(async move {
            let _ = tokio::fs::create_dir_all(&log_dir).await;
            let log_file = log_dir.join("decisions.jsonl");

            while let Some(entry) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&entry) {
                    let open = tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&log_file)
                        .await;
                    if let Ok(mut file) = open {
                        use tokio::io::AsyncWriteExt;
                        let line = format!("{line}\n");
                        let _ = file.write_all(line.as_bytes()).await;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Record a resolved request.
    pub fn record(
        &self,
        request_id: impl Into<String>,
        session_id: impl Into<String>,
        tool_name: Option<String>,
        outcome: &ApprovalOutcome,
    ) {
        let entry = DecisionEntry {
            timestamp: Utc::now(),
            request_id: request_id.into(),
            session_id: session_id.into(),
            tool_name,
            blocked: outcome.blocked,
            reason: outcome.reason.clone(),
        };
        info!(
            request_id = %entry.request_id,
            session_id = %entry.session_id,
            blocked = entry.blocked,
            "decision"
        );
        let _ = self.tx.send(entry);
    }
}
