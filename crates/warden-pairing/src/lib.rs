//! Pairing and authentication primitives for the Warden gateway.
//!
//! Implements the trust-establishment half of the control plane: a shared
//! time-based secret (TOTP with a 30-second step, 6 digits, SHA-1),
//! per-source brute-force windows, and the pairing payload the operator
//! device scans.
//!
//! # Main types
//!
//! - [`PairingAuthenticator`] — verifies codes, throttles sources, rotates
//!   the secret.
//! - [`PairingSecret`] — the single live shared secret.
//! - [`PairingPayload`] / [`PairingEndpoint`] — material handed to the
//!   operator device.
//! - [`AttemptTracker`] — fixed-window attempt counters keyed by source
//!   address.

/// Code verification, rate limiting, and secret rotation.
pub mod authenticator;
/// Pairing material assembly.
pub mod payload;
/// Per-source fixed-window attempt counters.
pub mod rate_limit;
/// Secret generation and encoding.
pub mod secret;
/// HOTP/TOTP derivation (RFC 4226 / RFC 6238).
pub mod totp;

pub use authenticator::{PairingAuthenticator, RateLimits};
pub use payload::{key_fingerprint, PairingEndpoint, PairingPayload};
pub use rate_limit::AttemptTracker;
pub use secret::PairingSecret;

use thiserror::Error;

/// Errors from pairing operations.
///
/// Expected rejections (wrong code, rate-limited source) are `false`
/// returns, not errors; these variants cover genuinely unexpected failures.
#[derive(Debug, Error)]
pub enum PairingError {
    /// The OS entropy source failed.
    #[error("entropy source failed: {0}")]
    Entropy(String),

    /// HMAC construction rejected the secret.
    #[error("code derivation failed: {0}")]
    Crypto(String),
}
