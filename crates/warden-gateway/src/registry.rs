use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use warden_core::approval::ApprovalOutcome;

/// Error returned when a registration cannot be accepted.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A request with this id is already awaiting a decision.
    #[error("request '{0}' is already pending")]
    DuplicateRequest(String),
}

/// One outstanding approval request.
///
/// Owned by the registry map for its whole lifetime; whichever resolver
/// removes it from the map is the one that gets to send on `tx`.
struct PendingApproval {
    session_id: String,
    registered_at: Instant,
    tx: oneshot::Sender<ApprovalOutcome>,
    timer: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingApproval>>>;

/// Tracks outstanding approval requests and routes decisions back to the
/// suspended hook callers.
///
/// Every resolution path (approve, deny, timeout, session teardown) removes
/// the entry from the map before sending on its oneshot channel, so a
/// request resolves exactly once no matter how the triggers race. Losers
/// of the race observe "not pending" and become no-ops.
pub struct ApprovalRegistry {
    pending: PendingMap,
}

impl ApprovalRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a new approval request and start its timeout timer.
    ///
    /// Returns a receiver that yields the outcome once the request is
    /// approved, denied, timed out, or cancelled with its session. A
    /// `request_id` that is still pending is rejected rather than
    /// overwritten, since overwriting would orphan the earlier waiter.
    pub async fn register(
        &self,
        request_id: &str,
        session_id: &str,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<ApprovalOutcome>, RegistryError> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().await;
        if pending.contains_key(request_id) {
            warn!(request_id = %request_id, "Rejected duplicate registration");
            return Err(RegistryError::DuplicateRequest(request_id.to_string()));
        }

        let timer = {
            let pending = Arc::clone(&self.pending);
            let request_id = request_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                // The timer resolves its own entry. If an explicit decision
                // already removed it, there is nothing left to do.
                if let Some(entry) = pending.lock().await.remove(&request_id) {
                    warn!(
                        request_id = %request_id,
                        timeout_secs = timeout.as_secs(),
                        "Approval timed out"
                    );
                    let _ = entry.tx.send(ApprovalOutcome::timed_out());
                }
            })
        };

        pending.insert(
            request_id.to_string(),
            PendingApproval {
                session_id: session_id.to_string(),
                registered_at: Instant::now(),
                tx,
                timer,
            },
        );
        info!(request_id = %request_id, session_id = %session_id, "Approval registered");
        Ok(rx)
    }

    /// Resolve a pending request as approved.
    ///
    /// Returns true if the id was pending. Returns false, with no side
    /// effect, if it was already resolved or never existed.
    pub async fn approve(&self, request_id: &str) -> bool {
        self.resolve(request_id, ApprovalOutcome::approved()).await
    }

    /// Resolve a pending request as denied.
    ///
    /// Falls back to the canned denial reason when none is given.
    pub async fn deny(&self, request_id: &str, reason: Option<String>) -> bool {
        let outcome = match reason {
            Some(reason) => ApprovalOutcome::denied(reason),
            None => ApprovalOutcome::denied(warden_core::approval::REASON_DENIED),
        };
        self.resolve(request_id, outcome).await
    }

    /// Resolve every pending request belonging to `session_id`.
    ///
    /// Runs under a single lock hold so a racing approve for one of the
    /// affected requests either wins outright or observes nothing pending.
    /// Returns how many requests were resolved.
    pub async fn cancel_session(&self, session_id: &str) -> usize {
        let mut pending = self.pending.lock().await;
        let ids: Vec<String> = pending
            .iter()
            .filter(|(_, entry)| entry.session_id == session_id)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &ids {
            if let Some(entry) = pending.remove(id) {
                entry.timer.abort();
                let _ = entry.tx.send(ApprovalOutcome::session_terminated());
            }
        }
        if !ids.is_empty() {
            info!(
                session_id = %session_id,
                cancelled = ids.len(),
                "Session cancelled, pending approvals resolved"
            );
        }
        ids.len()
    }

    /// Whether the given id currently has a live entry.
    pub async fn is_pending(&self, request_id: &str) -> bool {
        self.pending.lock().await.contains_key(request_id)
    }

    /// Number of requests currently awaiting a decision.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Session id of a pending request, if it exists.
    pub async fn session_of(&self, request_id: &str) -> Option<String> {
        self.pending
            .lock()
            .await
            .get(request_id)
            .map(|entry| entry.session_id.clone())
    }

    async fn resolve(&self, request_id: &str, outcome: ApprovalOutcome) -> bool {
        let entry = self.pending.lock().await.remove(request_id);
        match entry {
            Some(entry) => {
                entry.timer.abort();
                if entry.tx.send(outcome).is_err() {
                    warn!(request_id = %request_id, "Decision delivered but waiter dropped");
                } else {
                    info!(
                        request_id = %request_id,
                        waited_ms = entry.registered_at.elapsed().as_millis() as u64,
                        "Decision delivered"
                    );
                }
                true
            }
            None => {
                warn!(request_id = %request_id, "No pending approval for this request_id");
                false
            }
        }
    }
}

impl Default for ApprovalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use warden_core::approval::{REASON_DENIED, REASON_SESSION_TERMINATED, REASON_TIMED_OUT};

    const LONG: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn approve_resolves_the_waiter() {
        let registry = ApprovalRegistry::new();
        let rx = registry.register("r1", "s1", LONG).await.unwrap();

        assert!(registry.approve("r1").await);
        let outcome = rx.await.unwrap();
        assert!(!outcome.blocked);
        assert!(outcome.reason.is_none());
        assert!(!registry.is_pending("r1").await);
    }

    #[tokio::test]
    async fn deny_uses_given_reason() {
        let registry = ApprovalRegistry::new();
        let rx = registry.register("r1", "s1", LONG).await.unwrap();

        assert!(registry.deny("r1", Some("nope".into())).await);
        let outcome = rx.await.unwrap();
        assert!(outcome.blocked);
        assert_eq!(outcome.reason.as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn deny_without_reason_uses_default() {
        let registry = ApprovalRegistry::new();
        let rx = registry.register("r1", "s1", LONG).await.unwrap();

        assert!(registry.deny("r1", None).await);
        let outcome = rx.await.unwrap();
        assert!(outcome.blocked);
        assert_eq!(outcome.reason.as_deref(), Some(REASON_DENIED));
    }

    #[tokio::test]
    async fn timeout_resolves_and_removes() {
        let registry = ApprovalRegistry::new();
        let rx = registry
            .register("r1", "s1", Duration::from_millis(50))
            .await
            .unwrap();

        let outcome = rx.await.unwrap();
        assert!(outcome.blocked);
        assert_eq!(outcome.reason.as_deref(), Some(REASON_TIMED_OUT));
        assert!(!registry.is_pending("r1").await);

        // The timed-out id is gone, so a late decision is a no-op.
        assert!(!registry.approve("r1").await);
    }

    #[tokio::test]
    async fn second_decision_is_a_no_op() {
        let registry = ApprovalRegistry::new();
        let rx = registry.register("r1", "s1", LONG).await.unwrap();

        assert!(registry.approve("r1").await);
        assert!(!registry.approve("r1").await);
        assert!(!registry.deny("r1", Some("too late".into())).await);

        // The delivered outcome is the first one.
        let outcome = rx.await.unwrap();
        assert!(!outcome.blocked);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = ApprovalRegistry::new();
        let _rx = registry.register("r1", "s1", LONG).await.unwrap();

        let err = registry.register("r1", "s2", LONG).await.unwrap_err();
        assert_eq!(err, RegistryError::DuplicateRequest("r1".into()));
        assert_eq!(registry.pending_count().await, 1);
        assert_eq!(registry.session_of("r1").await.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn same_id_reusable_after_resolution() {
        let registry = ApprovalRegistry::new();
        let rx = registry.register("r1", "s1", LONG).await.unwrap();
        registry.approve("r1").await;
        rx.await.unwrap();

        // Once resolved the id is free again.
        let rx = registry.register("r1", "s1", LONG).await.unwrap();
        registry.deny("r1", None).await;
        assert!(rx.await.unwrap().blocked);
    }

    #[tokio::test]
    async fn cancel_session_scopes_to_one_session() {
        let registry = ApprovalRegistry::new();
        let rx_a1 = registry.register("a1", "s-a", LONG).await.unwrap();
        let rx_a2 = registry.register("a2", "s-a", LONG).await.unwrap();
        let rx_b1 = registry.register("b1", "s-b", LONG).await.unwrap();

        assert_eq!(registry.cancel_session("s-a").await, 2);

        for rx in [rx_a1, rx_a2] {
            let outcome = rx.await.unwrap();
            assert!(outcome.blocked);
            assert_eq!(outcome.reason.as_deref(), Some(REASON_SESSION_TERMINATED));
        }

        // The other session is untouched and still resolvable.
        assert_eq!(registry.pending_count().await, 1);
        assert!(registry.approve("b1").await);
        assert!(!rx_b1.await.unwrap().blocked);
    }

    #[tokio::test]
    async fn cancel_session_with_no_matches_resolves_nothing() {
        let registry = ApprovalRegistry::new();
        let _rx = registry.register("r1", "s1", LONG).await.unwrap();

        assert_eq!(registry.cancel_session("other").await, 0);
        assert_eq!(registry.pending_count().await, 1);
    }

    #[tokio::test]
    async fn approve_cancels_the_timer() {
        let registry = ApprovalRegistry::new();
        let rx = registry
            .register("r1", "s1", Duration::from_millis(50))
            .await
            .unwrap();

        assert!(registry.approve("r1").await);
        let outcome = rx.await.unwrap();
        assert!(!outcome.blocked);

        // Give the aborted timer a chance to misfire; it must not.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!registry.is_pending("r1").await);
    }

    #[tokio::test]
    async fn unknown_id_decisions_return_false() {
        let registry = ApprovalRegistry::new();
        assert!(!registry.approve("ghost").await);
        assert!(!registry.deny("ghost", None).await);
        assert!(!registry.is_pending("ghost").await);
        assert_eq!(registry.pending_count().await, 0);
    }
}
