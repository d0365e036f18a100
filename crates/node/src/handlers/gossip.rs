use tracing::debug;
use types::errors::NodeError;
use types::network::Network;
use types::network_event::{InboundMessage, NetworkEvent};

use crate::{NodeState, handlers::Handler};

/// Feeds topic deliveries into the coordination protocol.
#[derive(Debug, Default)]
pub struct GossipHandler;

#[async_trait::async_trait]
impl<N: Network> Handler<N> for GossipHandler {
    async fn handle(
        &mut self,
        node: &mut NodeState<N>,
        message: Option<NetworkEvent>,
    ) -> Result<(), NodeError> {
        match message {
            Some(NetworkEvent::Gossip(InboundMessage { origin, data })) => {
                // dropped payloads are already logged and counted by the protocol
                let _ = node.protocol.handle_inbound(&origin, &data).await;
            }
            Some(NetworkEvent::PeersConnected(peers)) if !peers.is_empty() => {
                debug!("{} peer(s) connected, re-sending pending DKG round 1", peers.len());
                node.protocol.rebroadcast_dkg_round1().await?;
            }
            _ => {}
        }
        Ok(())
    }
}
