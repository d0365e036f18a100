use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::{NodeState, handlers::requests::respond};
use types::errors::NodeError;
use types::network::Network;
use types::network_event::{NetworkEvent, SelfRequest, SelfResponse};
use types::open_sessions_metrics;

impl<N: Network> NodeState<N> {
    pub async fn poll(&mut self) -> Result<(), NodeError> {
        match self.network_events_stream.recv().await {
            Ok(event) => self.handle(Some(event)).await,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Node loop lagged, {skipped} network events skipped");
                Ok(())
            }
            Err(RecvError::Closed) => Err(NodeError::Error("Network event stream closed".into())),
        }
    }

    pub async fn start(&mut self) -> Result<(), NodeError> {
        info!(
            "Local identity: {} ({}-of-{})",
            self.identity, self.config.threshold, self.config.participants
        );

        loop {
            self.poll().await?;
        }
    }

    pub async fn handle(&mut self, send_message: Option<NetworkEvent>) -> Result<(), NodeError> {
        let mut handlers = std::mem::take(&mut self.handlers);

        for handler in &mut handlers {
            handler.handle(self, send_message.clone()).await?;
        }

        self.handlers = handlers;
        match send_message {
            Some(NetworkEvent::SelfRequest {
                request: SelfRequest::ListPeers,
                response_channel,
            }) => {
                let mut peers: Vec<String> = self
                    .peers
                    .iter()
                    .map(|peer| self.network_handle.peer_name(peer))
                    .collect();
                peers.sort();
                respond(response_channel, SelfResponse::Peers { peers });
            }
            Some(NetworkEvent::SelfRequest {
                request: SelfRequest::GroupPublicKey,
                response_channel,
            }) => {
                let public_key = self.protocol.group_public_key_hex().await;
                respond(response_channel, SelfResponse::GroupPublicKey { public_key });
            }
            Some(NetworkEvent::PeersConnected(list)) => {
                for peer in list {
                    self.peers.insert(peer);
                }
            }
            Some(NetworkEvent::PeersDisconnected(list)) => {
                for peer in &list {
                    self.peers.remove(peer);
                }
            }
            Some(NetworkEvent::Gossip(_)) => {
                let counts = self.protocol.session_counts().await;
                open_sessions_metrics!("coordinator", usize::from(counts.coordinator_open));
                open_sessions_metrics!("participant", usize::from(counts.participant_open));
            }
            _ => {}
        }
        Ok(())
    }
}
