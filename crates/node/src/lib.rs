use std::{collections::HashSet, sync::Arc};

use tokio::sync::broadcast;
use tracing::info;
use types::{errors::NodeError, network::Network, network_event::NetworkEvent};

use crate::{
    handlers::{Handler, gossip::GossipHandler, requests::RequestHandler},
    key_manager::KeyStorage,
    protocol::CoordinationProtocol,
    signer::Signer,
};

pub mod config;
pub mod handlers;
pub mod key_manager;
pub mod main_loop;
pub mod protocol;
pub mod signer;
pub mod start_node;
pub mod utils;
pub mod verifier;

pub use config::{NodeConfig, PeerData};
pub use utils::swarm_manager;

#[cfg(test)]
mod tests;

pub struct NodeState<N: Network> {
    pub handlers: Vec<Box<dyn Handler<N>>>,

    pub identity: String,
    pub peers: HashSet<String>,

    pub config: NodeConfig,
    pub network_handle: N,
    pub network_events_stream: broadcast::Receiver<NetworkEvent>,

    pub protocol: CoordinationProtocol<N>,
}

impl<N: Network> NodeState<N> {
    /// Builds a node around `network_handle`, installing the threshold key from
    /// `storage` when one was saved earlier.
    pub fn new_from_config(
        network_handle: &N,
        config: NodeConfig,
        network_events_sender: &broadcast::Sender<NetworkEvent>,
        storage: Arc<dyn KeyStorage>,
    ) -> Result<Self, NodeError> {
        config.validate()?;

        let identity = network_handle.local_identity();
        let mut signer = Signer::new(&identity, config.threshold, config.participants)?;

        match key_manager::load_threshold_key(storage.as_ref())? {
            Some(key_set) => {
                signer.install_key_set(&key_set)?;
                info!(
                    "🔑 Loaded threshold key, group key {}",
                    key_set.group_public_key_hex()?
                );
            }
            None => info!("No threshold key yet, run DKG or import one"),
        }

        let protocol =
            CoordinationProtocol::new(network_handle.clone(), signer, config.timeouts(), storage);

        Ok(Self {
            handlers: vec![Box::new(GossipHandler), Box::new(RequestHandler)],
            identity,
            peers: HashSet::new(),
            config,
            network_handle: network_handle.clone(),
            network_events_stream: network_events_sender.subscribe(),
            protocol,
        })
    }
}
