use frost_secp256k1::{Signature, VerifyingKey};
use tracing::debug;

/// Checks a finished aggregate signature against an encoded group public key.
/// Malformed keys or signatures simply fail verification.
#[must_use]
pub fn verify(message: &[u8], signature: &[u8], group_public_key: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::deserialize(group_public_key) else {
        debug!("Group public key does not decode");
        return false;
    };
    let Ok(signature) = Signature::deserialize(signature) else {
        debug!("Signature does not decode");
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}

/// Hex-encoded variant used by the command line.
#[must_use]
pub fn verify_hex(message: &[u8], signature_hex: &str, group_public_key_hex: &str) -> bool {
    match (hex::decode(signature_hex), hex::decode(group_public_key_hex)) {
        (Ok(signature), Ok(group_public_key)) => verify(message, &signature, &group_public_key),
        _ => false,
    }
}
