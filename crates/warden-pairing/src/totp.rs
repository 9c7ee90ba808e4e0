//! HOTP/TOTP code derivation (RFC 4226 / RFC 6238).
//!
//! The parameters are pinned for interoperability with the paired operator
//! client and must not drift: 30-second time step, 6-digit codes, HMAC-SHA-1
//! with RFC 4226 dynamic truncation, ±1 step of clock-skew tolerance.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::PairingError;

type HmacSha1 = Hmac<Sha1>;

/// Seconds per TOTP time step.
pub const TIME_STEP_SECS: u64 = 30;
/// Digits per code.
pub const CODE_DIGITS: u32 = 6;
/// Steps of clock skew tolerated on either side of the current step.
pub const SKEW_STEPS: u64 = 1;

/// HOTP value for one counter (RFC 4226 §5.3 dynamic truncation).
fn hotp(secret: &[u8], counter: u64) -> Result<u32, PairingError> {
    let mut mac =
        HmacSha1::new_from_slice(secret).map_err(|e| PairingError::Crypto(e.to_string()))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let bin = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    Ok(bin % 10u32.pow(CODE_DIGITS))
}

/// The code for the time step containing `unix_secs`.
pub fn code_at(secret: &[u8], unix_secs: u64) -> Result<String, PairingError> {
    let value = hotp(secret, unix_secs / TIME_STEP_SECS)?;
    Ok(format!("{value:0width$}", width = CODE_DIGITS as usize))
}

/// Whether `code` matches the secret at `unix_secs`, tolerating
/// [`SKEW_STEPS`] steps on either side of the current step.
pub fn verify_at(secret: &[u8], code: &str, unix_secs: u64) -> bool {
    let code = code.trim();
    if code.len() != CODE_DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let step = unix_secs / TIME_STEP_SECS;
    let first = step.saturating_sub(SKEW_STEPS);
    for candidate in first..=step + SKEW_STEPS {
        match code_at(secret, candidate * TIME_STEP_SECS) {
            Ok(expected) if expected == code => return true,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "TOTP derivation failed during verification");
                return false;
            }
        }
    }
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // Shared secret from RFC 4226 appendix D / RFC 6238 appendix B.
    const RFC_SECRET: &[u8] = b"12345678901234567890";

    #[test]
    fn hotp_matches_rfc4226_vectors() {
        let expected = [
            755_224, 287_082, 359_152, 969_429, 338_314, 254_676, 287_922, 162_583, 399_871,
            520_489,
        ];
        for (counter, want) in expected.iter().enumerate() {
            assert_eq!(hotp(RFC_SECRET, counter as u64).unwrap(), *want);
        }
    }

    #[test]
    fn totp_matches_rfc6238_sha1_vectors() {
        // RFC 6238 appendix B values, truncated from 8 to 6 digits.
        assert_eq!(code_at(RFC_SECRET, 59).unwrap(), "287082");
        assert_eq!(code_at(RFC_SECRET, 1_111_111_109).unwrap(), "081804");
        assert_eq!(code_at(RFC_SECRET, 1_111_111_111).unwrap(), "050471");
        assert_eq!(code_at(RFC_SECRET, 1_234_567_890).unwrap(), "005924");
        assert_eq!(code_at(RFC_SECRET, 2_000_000_000).unwrap(), "279037");
    }

    #[test]
    fn codes_are_zero_padded_to_six_digits() {
        assert_eq!(code_at(RFC_SECRET, 1_111_111_109).unwrap().len(), 6);
        assert_eq!(code_at(RFC_SECRET, 1_234_567_890).unwrap().len(), 6);
    }

    #[test]
    fn skew_window_accepts_adjacent_steps_only() {
        let base = 1_111_111_110; // step boundary
        let code = code_at(RFC_SECRET, base).unwrap();

        assert!(verify_at(RFC_SECRET, &code, base));
        assert!(verify_at(RFC_SECRET, &code, base - 29));
        assert!(verify_at(RFC_SECRET, &code, base + 29));
        assert!(verify_at(RFC_SECRET, &code, base + TIME_STEP_SECS));
        assert!(verify_at(RFC_SECRET, &code, base - 1));

        assert!(!verify_at(RFC_SECRET, &code, base + 2 * TIME_STEP_SECS));
        assert!(!verify_at(RFC_SECRET, &code, base - 2 * TIME_STEP_SECS));
    }

    #[test]
    fn malformed_codes_rejected_without_derivation() {
        assert!(!verify_at(RFC_SECRET, "28708", 59));
        assert!(!verify_at(RFC_SECRET, "2870820", 59));
        assert!(!verify_at(RFC_SECRET, "28708a", 59));
        assert!(!verify_at(RFC_SECRET, "", 59));
        // Surrounding whitespace is tolerated.
        assert!(verify_at(RFC_SECRET, " 287082 ", 59));
    }

    #[test]
    fn verification_near_epoch_does_not_underflow() {
        let code = code_at(RFC_SECRET, 0).unwrap();
        assert!(verify_at(RFC_SECRET, &code, 0));
        assert!(verify_at(RFC_SECRET, &code, 29));
    }
}
