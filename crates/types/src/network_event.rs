use tokio::sync::mpsc;

/// A raw gossip delivery. `origin` is the transport-authenticated publisher.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub origin: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum NetworkEvent {
    SelfRequest {
        request: SelfRequest,
        response_channel: Option<mpsc::UnboundedSender<SelfResponse>>,
    },
    Gossip(InboundMessage),
    PeersConnected(Vec<String>),
    PeersDisconnected(Vec<String>),
    Unknown,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum SelfRequest {
    StartSigning { message: Vec<u8> },
    StartDkg,
    ListPeers,
    GroupPublicKey,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum SelfResponse {
    SigningFinished {
        message: Vec<u8>,
        signature: Vec<u8>,
    },
    Failed {
        reason: String,
    },
    /// `false` when a key already exists or a ceremony is running.
    DkgStarted {
        started: bool,
    },
    Peers {
        peers: Vec<String>,
    },
    GroupPublicKey {
        public_key: Option<String>,
    },
}
