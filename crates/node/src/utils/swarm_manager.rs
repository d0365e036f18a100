use futures::StreamExt;
use libp2p::{
    PeerId, Swarm, gossipsub, identity::Keypair, mdns, noise, swarm::NetworkBehaviour,
    swarm::SwarmEvent, tcp, yamux,
};
use std::{
    collections::{BTreeMap, HashSet, hash_map::DefaultHasher},
    hash::{Hash, Hasher},
    time::Duration,
};
use tokio::{
    io,
    sync::{
        broadcast,
        mpsc::{self, unbounded_channel},
    },
};
use tracing::{debug, info, warn};

use crate::PeerData;
use types::{
    errors::NodeError,
    network::{NetworkHandle, NetworkMessage},
    network_event::{InboundMessage, NetworkEvent},
    payload_dropped_metrics,
};

#[derive(NetworkBehaviour)]
pub struct MyBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub mdns: mdns::tokio::Behaviour,
}

pub struct SwarmManager {
    pub inner: Swarm<MyBehaviour>,

    pub network_manager_rx: mpsc::UnboundedReceiver<NetworkMessage>,
    pub network_events: broadcast::Sender<NetworkEvent>,

    /// Empty means every discovered peer is accepted.
    pub allowed_peers: HashSet<PeerId>,
    pub peers_to_names: BTreeMap<PeerId, String>,

    pub live_peers: HashSet<PeerId>,

    pub topic: gossipsub::IdentTopic,
}

fn parse_peer(peer: &PeerData) -> Result<PeerId, NodeError> {
    peer.public_key.parse().map_err(|e| {
        NodeError::Error(format!(
            "Allowed peer {} has an invalid public key {}: {e}",
            peer.name, peer.public_key
        ))
    })
}

impl SwarmManager {
    pub fn new(
        mut swarm: Swarm<MyBehaviour>,
        peer_data: &[PeerData],
        topic: &str,
    ) -> Result<(Self, NetworkHandle), NodeError> {
        let (send_commands, receiving_commands) = unbounded_channel::<NetworkMessage>();

        let (network_events_emitter, _) = broadcast::channel::<NetworkEvent>(256);

        let topic = gossipsub::IdentTopic::new(topic);
        swarm
            .behaviour_mut()
            .gossipsub
            .subscribe(&topic)
            .map_err(|e| NodeError::Error(e.to_string()))?;

        let mut allowed_peers = HashSet::new();
        let mut peers_to_names = BTreeMap::new();
        for peer in peer_data {
            let peer_id = parse_peer(peer)?;
            allowed_peers.insert(peer_id);
            peers_to_names.insert(peer_id, peer.name.clone());
        }

        let network_handle = NetworkHandle::new(
            swarm.local_peer_id().to_base58(),
            send_commands,
            peers_to_names
                .iter()
                .map(|(peer_id, name)| (peer_id.to_base58(), name.clone()))
                .collect(),
        );

        Ok((
            Self {
                topic,
                inner: swarm,
                network_manager_rx: receiving_commands,
                network_events: network_events_emitter,
                allowed_peers,
                peers_to_names,
                live_peers: HashSet::new(),
            },
            network_handle,
        ))
    }

    pub fn peer_name(&self, peer_id: &PeerId) -> String {
        self.peers_to_names
            .get(peer_id)
            .map_or_else(|| peer_id.to_string(), Clone::clone)
    }

    fn is_allowed(&self, peer_id: &PeerId) -> bool {
        self.allowed_peers.is_empty() || self.allowed_peers.contains(peer_id)
    }

    fn emit(&self, event: NetworkEvent) {
        if self.network_events.send(event).is_err() {
            debug!("No node loop subscribed to network events");
        }
    }

    pub async fn start(&mut self) {
        info!("Starting swarm manager on topic {}", self.topic);
        loop {
            tokio::select! {
                send_message = self.network_manager_rx.recv() => match send_message {
                    Some(NetworkMessage::Publish { data }) => {
                        if let Err(e) = self.inner
                            .behaviour_mut()
                            .gossipsub
                            .publish(self.topic.clone(), data)
                        {
                            warn!("Failed to publish on {}: {e}", self.topic);
                        }
                    }
                    Some(NetworkMessage::SendSelfRequest { request, response_channel }) => {
                        self.emit(NetworkEvent::SelfRequest { request, response_channel });
                    }
                    None => {
                        info!("All network handles dropped, stopping swarm manager");
                        return;
                    }
                },
                event = self.inner.select_next_some() => {
                    match event {
                        SwarmEvent::NewListenAddr { address, .. } => {
                            info!("Listening on {address}");
                        }
                        SwarmEvent::Behaviour(MyBehaviourEvent::Mdns(mdns::Event::Discovered(list))) => {
                            let mut peers_connected = vec![];
                            for (peer_id, _multiaddr) in list {
                                if self.is_allowed(&peer_id) && self.live_peers.insert(peer_id) {
                                    info!("Discovered peer: {}", self.peer_name(&peer_id));
                                    peers_connected.push(peer_id.to_base58());
                                    self.inner.behaviour_mut().gossipsub.add_explicit_peer(&peer_id);
                                }
                            }
                            if !peers_connected.is_empty() {
                                self.emit(NetworkEvent::PeersConnected(peers_connected));
                            }
                        },
                        SwarmEvent::Behaviour(MyBehaviourEvent::Mdns(mdns::Event::Expired(list))) => {
                            let mut peers_disconnected = vec![];
                            for (peer_id, _multiaddr) in list {
                                if self.live_peers.remove(&peer_id) {
                                    info!("Peer expired: {}", self.peer_name(&peer_id));
                                    peers_disconnected.push(peer_id.to_base58());
                                    self.inner.behaviour_mut().gossipsub.remove_explicit_peer(&peer_id);
                                }
                            }
                            if !peers_disconnected.is_empty() {
                                self.emit(NetworkEvent::PeersDisconnected(peers_disconnected));
                            }
                        },
                        SwarmEvent::Behaviour(MyBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                            message,
                            ..
                        })) => {
                            match message.source {
                                Some(source) if self.is_allowed(&source) => {
                                    self.emit(NetworkEvent::Gossip(InboundMessage {
                                        origin: source.to_base58(),
                                        data: message.data,
                                    }));
                                }
                                Some(source) => {
                                    payload_dropped_metrics!("not_allowed");
                                    warn!("Dropped gossip from non-allow-listed peer {source}");
                                }
                                None => {
                                    payload_dropped_metrics!("anonymous");
                                    debug!("Dropped gossip without an author");
                                }
                            }
                        },
                        _ => {}
                    }
                }
            }
        }
    }
}

pub fn build_swarm(
    keypair: Keypair,
    libp2p_udp_port: u16,
    libp2p_tcp_port: u16,
    peer_data: &[PeerData],
    topic: &str,
) -> Result<(NetworkHandle, SwarmManager), NodeError> {
    let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            tcp::Config::default(),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|e| NodeError::Error(format!("Failed to add tcp {e}")))?
        .with_quic()
        .with_behaviour(|key| {
            // Content hash plus the publisher's sequence number, so a deliberate
            // re-send of identical bytes is not swallowed as a duplicate.
            let message_id_fn = |message: &gossipsub::Message| {
                let mut s = DefaultHasher::new();
                message.data.hash(&mut s);
                message.source.hash(&mut s);
                message.sequence_number.hash(&mut s);
                gossipsub::MessageId::from(s.finish().to_string())
            };

            let gossipsub_config = gossipsub::ConfigBuilder::default()
                .heartbeat_interval(Duration::from_secs(5))
                .validation_mode(gossipsub::ValidationMode::Strict)
                .message_id_fn(message_id_fn)
                .max_transmit_size(64 * 1024)
                .flood_publish(true)
                .build()
                .map_err(io::Error::other)?;

            let gossipsub = gossipsub::Behaviour::new(
                gossipsub::MessageAuthenticity::Signed(key.clone()),
                gossipsub_config,
            )?;

            let mdns =
                mdns::tokio::Behaviour::new(mdns::Config::default(), key.public().to_peer_id())?;

            Ok(MyBehaviour { gossipsub, mdns })
        })
        .map_err(|e| NodeError::Error(format!("Failed to add behaviour {e}")))?
        .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();

    let quic_addr = format!("/ip4/0.0.0.0/udp/{libp2p_udp_port}/quic-v1")
        .parse()
        .map_err(|e| NodeError::Error(format!("Invalid quic address: {e}")))?;
    swarm
        .listen_on(quic_addr)
        .map_err(|e| NodeError::Error(format!("Failed to listen on quic {e}")))?;

    let tcp_addr = format!("/ip4/0.0.0.0/tcp/{libp2p_tcp_port}")
        .parse()
        .map_err(|e| NodeError::Error(format!("Invalid tcp address: {e}")))?;
    swarm
        .listen_on(tcp_addr)
        .map_err(|e| NodeError::Error(format!("Failed to listen on tcp {e}")))?;

    let (swarm_manager, network) = SwarmManager::new(swarm, peer_data, topic)
        .map_err(|e| NodeError::Error(format!("Failed to create swarm manager: {e}")))?;

    Ok((network, swarm_manager))
}
