//! Webhook signature verification.
//!
//! The sender signs the raw body with HMAC-SHA256 and sends
//! `Typeform-Signature: sha256=<base64 digest>`.

use axum::http::StatusCode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "typeform-signature";
/// The only supported signing algorithm.
pub const SIGNATURE_ALGORITHM: &str = "sha256";

/// Reasons a delivery's signature is not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Missing Typeform-Signature header")]
    Missing,

    #[error("Malformed signature header")]
    Malformed,

    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signature does not match body")]
    Mismatch,
}

impl SignatureError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Missing => StatusCode::FORBIDDEN,
            Self::Malformed => StatusCode::BAD_REQUEST,
            Self::UnsupportedAlgorithm(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Mismatch => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Verifies webhook bodies against a shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    mac: HmacSha256,
}

impl SignatureVerifier {
    pub fn new(secret: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    /// Header value for `body`.
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(body);
        format!(
            "{SIGNATURE_ALGORITHM}={}",
            STANDARD.encode(mac.finalize().into_bytes())
        )
    }

    /// Check a header value against `body`. The digest comparison is constant-time.
    pub fn verify(&self, header: Option<&str>, body: &[u8]) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::Missing)?;
        let (algorithm, signature) = header
            .trim()
            .split_once('=')
            .filter(|(algorithm, signature)| !algorithm.is_empty() && !signature.is_empty())
            .ok_or(SignatureError::Malformed)?;

        if !algorithm.eq_ignore_ascii_case(SIGNATURE_ALGORITHM) {
            return Err(SignatureError::UnsupportedAlgorithm(algorithm.to_string()));
        }

        let expected = STANDARD
            .decode(signature)
            .map_err(|_| SignatureError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(b"webhook-secret").unwrap()
    }

    #[test]
    fn test_signed_body_verifies() {
        let verifier = verifier();
        let body = br#"{"event_id":"evt-1"}"#;
        let header = verifier.sign(body);

        assert!(header.starts_with("sha256="));
        assert_eq!(verifier.verify(Some(&header), body), Ok(()));
    }

    #[test]
    fn test_tampered_body_is_mismatch() {
        let verifier = verifier();
        let header = verifier.sign(b"original");

        assert_eq!(
            verifier.verify(Some(&header), b"tampered"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_other_secret_is_mismatch() {
        let header = SignatureVerifier::new(b"other").unwrap().sign(b"body");
        assert_eq!(
            verifier().verify(Some(&header), b"body"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_header_errors_map_to_status() {
        let verifier = verifier();

        let missing = verifier.verify(None, b"body").unwrap_err();
        assert_eq!(missing.status_code(), StatusCode::FORBIDDEN);

        let malformed = verifier.verify(Some("sha256"), b"body").unwrap_err();
        assert_eq!(malformed, SignatureError::Malformed);
        assert_eq!(malformed.status_code(), StatusCode::BAD_REQUEST);

        let empty = verifier.verify(Some("sha256="), b"body").unwrap_err();
        assert_eq!(empty, SignatureError::Malformed);

        let not_base64 = verifier.verify(Some("sha256=%%%"), b"body").unwrap_err();
        assert_eq!(not_base64, SignatureError::Malformed);

        let unsupported = verifier.verify(Some("sha1=abcd"), b"body").unwrap_err();
        assert_eq!(unsupported, SignatureError::UnsupportedAlgorithm("sha1".into()));
        assert_eq!(unsupported.status_code(), StatusCode::NOT_IMPLEMENTED);

        assert_eq!(SignatureError::Mismatch.status_code(), StatusCode::UNAUTHORIZED);
    }
}
