//! # Gateway callback signatures
//!
//! The payment gateway signs every callback with a shared secret. The signature is the HMAC-SHA256 of the raw request
//! body, base64-encoded, and travels in a request header. The engine recomputes it over the exact bytes it received
//! and rejects the callback if the two differ. Nothing in the payload is trusted until the check passes.
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The base64-encoded HMAC-SHA256 of `data` under `secret`.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = mac_for(secret);
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}

/// Checks `signature` against the payload in constant time. Malformed signatures simply fail to verify.
pub fn verify_signature(secret: &str, data: &[u8], signature: &str) -> bool {
    let Ok(expected) = base64::decode(signature.trim()) else {
        return false;
    };
    let mut mac = mac_for(secret);
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

fn mac_for(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length, so this cannot fail.
    <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).unwrap_or_else(|_| unreachable!())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_vector() {
        // RFC 4231, test case 2
        let sig = calculate_hmac("Jefe", b"what do ya want for nothing?");
        assert_eq!(sig, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }

    #[test]
    fn tampered_payloads_fail() {
        let payload = br#"{"out_trade_no":"2024-1","trade_status":"TRADE_SUCCESS"}"#;
        let sig = calculate_hmac("secret", payload);
        assert!(verify_signature("secret", payload, &sig));
        assert!(verify_signature("secret", payload, &format!(" {sig} ")));
        assert!(!verify_signature("other secret", payload, &sig));
        assert!(!verify_signature("secret", br#"{"out_trade_no":"2024-1","trade_status":"TRADE_CLOSED"}"#, &sig));
        assert!(!verify_signature("secret", payload, "not base64!"));
        assert!(!verify_signature("secret", payload, ""));
    }
}
