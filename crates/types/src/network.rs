use futures::future::Future;
use std::{collections::BTreeMap, fmt::Debug, pin::Pin};
use tokio::sync::mpsc;

use crate::{
    errors::NetworkError,
    network_event::{SelfRequest, SelfResponse},
    payload::Payload,
};

pub type NetworkResponseFuture =
    Pin<Box<dyn Future<Output = Result<SelfResponse, NetworkError>> + Send>>;

#[derive(Debug, Clone)]
pub struct NetworkHandle {
    pub identity: String,
    pub tx: mpsc::UnboundedSender<NetworkMessage>,
    pub peers_to_names: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub enum NetworkMessage {
    /// Publish an encoded payload on the shared topic.
    Publish { data: Vec<u8> },
    SendSelfRequest {
        request: SelfRequest,
        response_channel: Option<mpsc::UnboundedSender<SelfResponse>>,
    },
}

/// Transport seen by the coordination layer. Identities are the textual peer
/// identifiers produced by the transport.
pub trait Network: Clone + Debug + Sync + Send + 'static {
    fn local_identity(&self) -> String;
    fn publish(&self, payload: &Payload) -> Result<(), NetworkError>;
    fn send_self_request(
        &self,
        request: SelfRequest,
        sync: bool,
    ) -> Result<Option<NetworkResponseFuture>, NetworkError>;
    fn peer_name(&self, identity: &str) -> String;
}

impl Network for NetworkHandle {
    fn local_identity(&self) -> String {
        self.identity.clone()
    }

    fn publish(&self, payload: &Payload) -> Result<(), NetworkError> {
        let data = payload
            .encode()
            .map_err(|e| NetworkError::SendError(e.to_string()))?;
        self.tx
            .send(NetworkMessage::Publish { data })
            .map_err(|e| {
                tracing::error!("❌ Failed to queue {} payload: {}", payload.command, e);
                NetworkError::SendError(e.to_string())
            })
    }

    fn send_self_request(
        &self,
        request: SelfRequest,
        sync: bool,
    ) -> Result<Option<NetworkResponseFuture>, NetworkError> {
        if sync {
            let (tx, mut rx) = mpsc::unbounded_channel::<SelfResponse>();

            self.tx
                .send(NetworkMessage::SendSelfRequest {
                    request,
                    response_channel: Some(tx),
                })
                .map_err(|e| NetworkError::SendError(e.to_string()))?;

            Ok(Some(Box::pin(async move {
                rx.recv().await.ok_or(NetworkError::RecvError)
            })))
        } else {
            self.tx
                .send(NetworkMessage::SendSelfRequest {
                    request,
                    response_channel: None,
                })
                .map_err(|e| NetworkError::SendError(e.to_string()))?;

            Ok(None)
        }
    }

    fn peer_name(&self, identity: &str) -> String {
        self.peers_to_names
            .get(identity)
            .map_or_else(|| identity.to_string(), Clone::clone)
    }
}

impl NetworkHandle {
    #[must_use]
    pub const fn new(
        identity: String,
        tx: mpsc::UnboundedSender<NetworkMessage>,
        peers_to_names: BTreeMap<String, String>,
    ) -> Self {
        Self {
            identity,
            tx,
            peers_to_names,
        }
    }
}
