use std::error::Error;

use derive_more::Display;

#[derive(Debug, Display, Clone)]
pub enum NodeError {
    Error(String),
}

#[derive(Debug, Display, Clone)]
pub enum NetworkError {
    #[display("Send error: {_0}")]
    SendError(String),
    #[display("Response channel closed")]
    RecvError,
}

/// Signing phase a quorum wait belongs to.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    #[display("commitment")]
    Commitment,
    #[display("signature")]
    Signature,
}

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum TssError {
    /// Identity or threshold key present on disk but unparsable.
    #[display("Key material corrupt: {_0}")]
    KeyCorrupt(String),

    /// Malformed bytes on the wire.
    #[display("Decode error: {_0}")]
    Decode(String),

    #[display("Impersonation: payload claims {claimed} but was published by {origin}")]
    Impersonation { claimed: String, origin: String },

    #[display("Quorum timeout in {phase} phase: collected {collected}, required {required}")]
    QuorumTimeout {
        phase: Phase,
        collected: usize,
        required: usize,
    },

    /// The aggregate failed self-verification. `culprit` is the hex identifier of the
    /// first share found invalid when the group key package allows checking shares.
    #[display("Signing failed, contributed shares inconsistent: {reason}")]
    AggregationInvalid {
        culprit: Option<String>,
        reason: String,
    },

    #[display("DKG inconsistent: {_0}")]
    DkgInconsistent(String),

    #[display("Invalid identity: {_0}")]
    InvalidIdentity(String),

    #[display("Duplicate participant identifier: {_0}")]
    DuplicateIdentifier(String),

    #[display("No threshold key loaded")]
    NoThresholdKey,

    #[display("Session mismatch: {_0}")]
    SessionMismatch(String),

    #[display("A participant session is already open for another message")]
    SessionBusy,

    #[display("Coordinator session replaced by a newer signing request")]
    SessionReplaced,

    #[display("No unused nonce for this commitment")]
    NonceUnavailable,

    #[display("Storage error: {_0}")]
    Storage(String),

    #[display("Network error: {_0}")]
    Network(String),
}

impl TssError {
    /// Label used for drop metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::KeyCorrupt(_) => "key_corrupt",
            Self::Decode(_) => "decode",
            Self::Impersonation { .. } => "impersonation",
            Self::QuorumTimeout { .. } => "quorum_timeout",
            Self::AggregationInvalid { .. } => "aggregation_invalid",
            Self::DkgInconsistent(_) => "dkg_inconsistent",
            Self::InvalidIdentity(_) => "invalid_identity",
            Self::DuplicateIdentifier(_) => "duplicate_identifier",
            Self::NoThresholdKey => "no_threshold_key",
            Self::SessionMismatch(_) => "session_mismatch",
            Self::SessionBusy => "session_busy",
            Self::SessionReplaced => "session_replaced",
            Self::NonceUnavailable => "nonce_unavailable",
            Self::Storage(_) => "storage",
            Self::Network(_) => "network",
        }
    }
}

impl From<NetworkError> for TssError {
    fn from(e: NetworkError) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<TssError> for NodeError {
    fn from(e: TssError) -> Self {
        Self::Error(e.to_string())
    }
}

impl From<NetworkError> for NodeError {
    fn from(e: NetworkError) -> Self {
        Self::Error(e.to_string())
    }
}

impl Error for NodeError {}

impl Error for NetworkError {}

impl Error for TssError {}
