//! Ed25519 request signing used by Discord's interactions endpoint.
//!
//! Discord signs `timestamp || body` with the application's key and sends the
//! hex signature in `X-Signature-Ed25519`. Unsigned or mis-signed requests
//! must be answered with 401, as must requests whose `X-Signature-Timestamp`
//! is more than [`MAX_TIMESTAMP_SKEW_SECS`] away from the local clock.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use super::DiscordError;

pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

pub const MAX_TIMESTAMP_SKEW_SECS: i64 = 300;

/// Parse the hex public key shown on the application's developer page.
pub fn parse_public_key(hex_key: &str) -> Result<VerifyingKey, DiscordError> {
    let bytes: [u8; 32] = hex::decode(hex_key.trim())
        .map_err(|e| DiscordError::PublicKey(e.to_string()))?
        .try_into()
        .map_err(|_| DiscordError::PublicKey("expected 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| DiscordError::PublicKey(e.to_string()))
}

pub fn verify(key: &VerifyingKey, signature_hex: &str, timestamp: &str, body: &[u8]) -> bool {
    let Ok(raw) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(raw) = <[u8; 64]>::try_from(raw.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&raw);

    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);
    key.verify(&message, &signature).is_ok()
}

/// `true` when `timestamp` (unix seconds) lies within the allowed skew of `now`.
pub fn is_fresh(timestamp: &str, now: DateTime<Utc>) -> bool {
    timestamp
        .trim()
        .parse::<i64>()
        .is_ok_and(|ts| (now.timestamp() - ts).abs() <= MAX_TIMESTAMP_SKEW_SECS)
}


#[cfg(test)]
mod tests {
    use super::testing::{public_key_hex, sign};
    use super::*;

    #[test]
    fn accepts_valid_signature() {
        let key = parse_public_key(&public_key_hex()).unwrap();
        let sig = sign("1700000000", br#"{"type":1}"#);
        assert!(verify(&key, &sig, "1700000000", br#"{"type":1}"#));
    }

    #[test]
    fn rejects_tampering() {
        let key = parse_public_key(&public_key_hex()).unwrap();
        let sig = sign("1700000000", br#"{"type":1}"#);
        assert!(!verify(&key, &sig, "1700000001", br#"{"type":1}"#));
        assert!(!verify(&key, &sig, "1700000000", br#"{"type":2}"#));
        assert!(!verify(&key, "zz", "1700000000", br#"{"type":1}"#));
        assert!(!verify(&key, "abcd", "1700000000", br#"{"type":1}"#));
    }

    #[test]
    fn timestamp_freshness() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(is_fresh("1700000000", now));
        assert!(is_fresh("1699999750", now));
        assert!(is_fresh("1700000300", now));
        assert!(!is_fresh("1699999699", now));
        assert!(!is_fresh("1700000301", now));
        assert!(!is_fresh("yesterday", now));
        assert!(!is_fresh("", now));
    }

    #[test]
    fn bad_public_keys_are_rejected() {
        assert!(parse_public_key("not-hex").is_err());
        assert!(parse_public_key("abcd").is_err());
    }
}
