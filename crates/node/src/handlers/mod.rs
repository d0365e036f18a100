pub mod gossip;
pub mod requests;

use types::errors::NodeError;
use types::network::Network;
use types::network_event::NetworkEvent;

use crate::NodeState;

#[async_trait::async_trait]
pub trait Handler<N: Network>: Send {
    async fn handle(
        &mut self,
        node: &mut NodeState<N>,
        message: Option<NetworkEvent>,
    ) -> Result<(), NodeError>;
}
