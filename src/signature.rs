//! HMAC-SHA256 signatures for outbound deliveries.
//!
//! The signature covers `{timestamp}.{body}` so a receiver can reject
//! replays. Header value format: `sha256=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Prefix placed before the hex digest in the signature header.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the hex-encoded HMAC-SHA256 over `{timestamp}.{body}`.
#[must_use]
pub fn compute_signature(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");

    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

/// Full header value: `sha256=<hex>`.
#[must_use]
pub fn signature_header_value(secret: &str, timestamp: &str, body: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", compute_signature(secret, timestamp, body))
}

/// Verify a received header value in constant time.
///
/// Accepts the value with or without the `sha256=` prefix.
#[must_use]
pub fn verify_signature(header_value: &str, secret: &str, timestamp: &str, body: &[u8]) -> bool {
    let received = header_value
        .strip_prefix(SIGNATURE_PREFIX)
        .unwrap_or(header_value);
    let computed = compute_signature(secret, timestamp, body);
    received.as_bytes().ct_eq(computed.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_deterministic() {
        let a = compute_signature("secret", "1706400000", b"payload");
        let b = compute_signature("secret", "1706400000", b"payload");
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_depends_on_every_input() {
        let base = compute_signature("secret", "1706400000", b"payload");
        assert_ne!(base, compute_signature("other", "1706400000", b"payload"));
        assert_ne!(base, compute_signature("secret", "1706400001", b"payload"));
        assert_ne!(base, compute_signature("secret", "1706400000", b"payload2"));
    }

    #[test]
    fn test_signature_is_hex_sha256() {
        let sig = compute_signature("secret", "1706400000", b"payload");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_signature() {
        let header = signature_header_value("s", "1", b"{}");
        assert!(header.starts_with(SIGNATURE_PREFIX));
        assert!(verify_signature(&header, "s", "1", b"{}"));
        assert!(verify_signature(&header[SIGNATURE_PREFIX.len()..], "s", "1", b"{}"));
        assert!(!verify_signature(&header, "wrong", "1", b"{}"));
        assert!(!verify_signature("sha256=00", "s", "1", b"{}"));
    }
}
