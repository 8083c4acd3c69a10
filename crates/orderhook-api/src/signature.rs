//! Webhook signature verification.
//!
//! The partner signs each delivery with HMAC-SHA256 keyed by the webhook
//! secret. When a sequence GUID header is present the signed message is
//! `"{guid} {body}"`; otherwise it is the body alone. The signature arrives
//! hex-encoded.

use hmac::{Hmac, Mac};
use orderhook_core::error::DomainError;
use orderhook_core::secret::Secret;
use sha2::Sha256;

/// Header carrying the hex HMAC-SHA256 signature.
pub const SIGNATURE_HEADER: &str = "x-deliveroo-hmac-sha256";
/// Header carrying the per-delivery sequence GUID.
pub const SEQUENCE_GUID_HEADER: &str = "x-deliveroo-sequence-guid";

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(body: &[u8], sequence_guid: Option<&str>, secret: &Secret) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.expose().as_bytes())
        .expect("HMAC accepts keys of any length");
    if let Some(guid) = sequence_guid {
        mac.update(guid.as_bytes());
        mac.update(b" ");
    }
    mac.update(body);
    mac
}

/// Checks `signature` against the body and optional sequence GUID.
///
/// The comparison runs in constant time.
///
/// # Errors
///
/// Returns `DomainError::Authentication` if the signature is missing, not
/// hex, or does not match.
pub fn verify_signature(
    body: &[u8],
    signature: Option<&str>,
    sequence_guid: Option<&str>,
    secret: &Secret,
) -> Result<(), DomainError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DomainError::Authentication("signature header missing".into()))?;
    let expected = hex::decode(signature)
        .map_err(|_| DomainError::Authentication("signature is not hex".into()))?;

    keyed_mac(body, sequence_guid, secret)
        .verify_slice(&expected)
        .map_err(|_| DomainError::Authentication("signature mismatch".into()))
}

/// Computes the hex signature the partner would send for `body`.
#[must_use]
pub fn sign(body: &[u8], sequence_guid: Option<&str>, secret: &Secret) -> String {
    hex::encode(keyed_mac(body, sequence_guid, secret).finalize().into_bytes())
}
