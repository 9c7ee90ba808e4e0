//! Shared pairing secret generation and encoding.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::PairingError;

/// Raw length of a generated secret, in bytes.
pub const SECRET_LEN: usize = 20;

/// The shared time-based secret for one gateway instance.
///
/// Exactly one secret is live at a time; regenerating it invalidates every
/// previously issued code and all outstanding pairing material.
#[derive(Clone)]
pub struct PairingSecret {
    bytes: Vec<u8>,
}

impl PairingSecret {
    /// Generate a fresh secret from the OS entropy source.
    pub fn generate() -> Result<Self, PairingError> {
        let mut bytes = vec![0u8; SECRET_LEN];
        getrandom::getrandom(&mut bytes).map_err(|e| PairingError::Entropy(e.to_string()))?;
        Ok(Self { bytes })
    }

    /// Build a secret from known raw bytes (fixtures and tests).
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// The raw bytes used for code derivation.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Base64 encoding carried in pairing material.
    pub fn encoded(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

// Keeps the secret bytes out of debug logs.
impl std::fmt::Debug for PairingSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingSecret").finish_non_exhaustive()
    }
}
