//! Pairing material handed to the operator device.
//!
//! The payload is rendered as a QR code by an external step and decoded by
//! the operator's client; field names are part of that contract.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// How the operator device reaches the gateway after pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PairingEndpoint {
    /// Connect straight to the gateway's listener.
    Direct {
        /// Advertised host the operator device connects to.
        host: String,
        /// Advertised port.
        port: u16,
    },
    /// Meet through a room allocated by the external relay service.
    Relay {
        /// Room identifier issued by the relay.
        room_id: String,
        /// Room secret issued by the relay.
        room_secret: String,
    },
}

/// Everything an operator device needs to pair with this gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingPayload {
    /// Identity the operator sees when confirming the pairing.
    pub gateway_name: String,
    /// base64url (unpadded) fingerprint of the gateway's raw public key.
    pub fingerprint: String,
    /// The current shared secret, base64-encoded.
    pub secret: String,
    /// Where to connect.
    #[serde(flatten)]
    pub endpoint: PairingEndpoint,
}

/// base64url (unpadded) fingerprint of raw public-key bytes.
pub fn key_fingerprint(public_key: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(public_key)
}
