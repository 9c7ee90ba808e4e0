//! The pairing authenticator: one live secret, per-source rate windows.

use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::info;

use crate::payload::{key_fingerprint, PairingEndpoint, PairingPayload};
use crate::rate_limit::AttemptTracker;
use crate::secret::PairingSecret;
use crate::{totp, PairingError};

/// Rate-limit knobs for code verification.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    /// Attempts admitted per source per window.
    pub max_attempts: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_secs: 60,
        }
    }
}

struct AuthState {
    secret: PairingSecret,
    attempts: AttemptTracker,
}

/// Verifies operator codes against the live secret and throttles
/// brute-force attempts per source address.
///
/// The secret and the rate table share one lock so that rotating the
/// secret clears every window atomically.
pub struct PairingAuthenticator {
    state: Mutex<AuthState>,
}

impl PairingAuthenticator {
    /// Create an authenticator with a freshly generated secret.
    pub fn new(limits: RateLimits) -> Result<Self, PairingError> {
        Ok(Self::with_secret(PairingSecret::generate()?, limits))
    }

    /// Create an authenticator around a known secret (fixtures and tests).
    pub fn with_secret(secret: PairingSecret, limits: RateLimits) -> Self {
        Self {
            state: Mutex::new(AuthState {
                secret,
                attempts: AttemptTracker::new(limits.max_attempts, limits.window_secs),
            }),
        }
    }

    /// Verify `code` from `source` against the current secret.
    ///
    /// Counts one attempt against the source's window. A source at its
    /// limit is rejected before the code is looked at, so a correct code
    /// cannot be used to escape the window.
    pub async fn verify_code(&self, code: &str, source: IpAddr) -> bool {
        self.verify_code_at(code, source, unix_now()).await
    }

    /// [`Self::verify_code`] at an explicit unix timestamp. Public for
    /// callers that need clock control (tests, replay analysis).
    pub async fn verify_code_at(&self, code: &str, source: IpAddr, now_secs: u64) -> bool {
        let mut state = self.state.lock().await;
        if !state.attempts.try_attempt(source, now_secs) {
            info!(%source, "pairing code rejected: rate limited");
            return false;
        }
        let accepted = totp::verify_at(state.secret.bytes(), code, now_secs);
        if accepted {
            info!(%source, "pairing code accepted");
        } else {
            info!(%source, "pairing code rejected: no match");
        }
        accepted
    }

    /// Replace the shared secret and clear every rate window.
    ///
    /// Invalidates all previously issued codes and pairing material. This
    /// must stay operator-gated: clearing the rate table is a side effect a
    /// remote source must never be able to trigger.
    pub async fn regenerate_secret(&self) -> Result<(), PairingError> {
        let fresh = PairingSecret::generate()?;
        let mut state = self.state.lock().await;
        state.secret = fresh;
        state.attempts.clear();
        info!("pairing secret rotated; rate windows cleared");
        Ok(())
    }

    /// Assemble the pairing material for the operator device.
    pub async fn issue_payload(
        &self,
        gateway_name: &str,
        public_key: &[u8],
        endpoint: PairingEndpoint,
    ) -> PairingPayload {
        let state = self.state.lock().await;
        PairingPayload {
            gateway_name: gateway_name.to_string(),
            fingerprint: key_fingerprint(public_key),
            secret: state.secret.encoded(),
            endpoint,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
