use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::errors::TssError;

/// Command carried by every gossip payload.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Coordinator asks every peer for a fresh nonce commitment.
    #[display("COMMITMENT")]
    Commitment,
    #[display("COMMITMENT_SHARE")]
    CommitmentShare,
    /// Coordinator broadcasts the sorted commitment list.
    #[display("SIGN")]
    Sign,
    #[display("SIGNATURE_SHARE")]
    SignatureShare,
    #[display("DKG_ROUND1")]
    #[serde(rename = "DKG_ROUND1")]
    DkgRound1,
    #[display("DKG_ROUND2")]
    #[serde(rename = "DKG_ROUND2")]
    DkgRound2,
}

/// The only object ever published on the gossip topic.
///
/// `message` is the hex encoding of the bytes being signed (or its echo) and
/// `package` is base64 on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub sender: String,
    pub command: Command,
    pub message: String,
    #[serde(with = "base64_bytes")]
    pub package: Vec<u8>,
}

impl Payload {
    pub fn new(sender: impl Into<String>, command: Command, message: &[u8], package: Vec<u8>) -> Self {
        Self {
            sender: sender.into(),
            command,
            message: hex::encode(message),
            package,
        }
    }

    pub fn message_bytes(&self) -> Result<Vec<u8>, TssError> {
        hex::decode(&self.message)
            .map_err(|e| TssError::Decode(format!("Payload message is not hex: {e}")))
    }

    pub fn encode(&self) -> Result<Vec<u8>, TssError> {
        serde_json::to_vec(self).map_err(|e| TssError::Decode(format!("Failed to encode payload: {e}")))
    }

    pub fn decode(data: &[u8]) -> Result<Self, TssError> {
        serde_json::from_slice(data).map_err(|e| TssError::Decode(format!("Invalid payload: {e}")))
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}
