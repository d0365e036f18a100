use std::{sync::Arc, time::Duration};

use frost_secp256k1::Identifier;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use types::{
    errors::TssError,
    network::Network,
    payload::{Command, Payload},
    payload_dropped_metrics, payload_received_metrics, payload_sent_metrics,
};

use crate::{
    key_manager::{KeyStorage, ThresholdKeySet},
    signer::{Signer, identity_to_identifier},
};

mod coordinator;
pub mod dkg;
mod participant;
pub mod session;

use session::ProtocolState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolTimeouts {
    /// How long the coordinator waits for commitments.
    pub commitment: Duration,
    /// How long the coordinator waits for signature shares.
    pub signature: Duration,
    /// How long a participant keeps its nonce for an unanswered commitment.
    pub participant_ttl: Duration,
}

impl Default for ProtocolTimeouts {
    fn default() -> Self {
        Self {
            commitment: Duration::from_secs(5),
            signature: Duration::from_secs(10),
            participant_ttl: Duration::from_secs(15),
        }
    }
}

/// Snapshot of the open sessions, mostly for the console and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub coordinator_open: bool,
    pub commitments: usize,
    pub signature_shares: usize,
    pub participant_open: bool,
}

struct Shared<N: Network> {
    network: N,
    identity: String,
    timeouts: ProtocolTimeouts,
    storage: Arc<dyn KeyStorage>,
    state: Mutex<ProtocolState>,
}

/// Gossip-driven signing and key generation for one node. Cloning is cheap;
/// all clones drive the same sessions.
pub struct CoordinationProtocol<N: Network> {
    shared: Arc<Shared<N>>,
}

impl<N: Network> Clone for CoordinationProtocol<N> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<N: Network> CoordinationProtocol<N> {
    pub fn new(
        network: N,
        signer: Signer,
        timeouts: ProtocolTimeouts,
        storage: Arc<dyn KeyStorage>,
    ) -> Self {
        let identity = signer.identity().to_string();
        if identity != network.local_identity() {
            warn!(
                "Signer identity {identity} differs from transport identity {}",
                network.local_identity()
            );
        }
        Self {
            shared: Arc::new(Shared {
                network,
                identity,
                timeouts,
                storage,
                state: Mutex::new(ProtocolState::new(signer)),
            }),
        }
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.shared.identity
    }

    pub async fn group_public_key_hex(&self) -> Option<String> {
        let state = self.shared.state.lock().await;
        state
            .signer
            .key_set()
            .and_then(|key_set| key_set.group_public_key_hex().ok())
    }

    pub async fn key_set(&self) -> Option<ThresholdKeySet> {
        self.shared.state.lock().await.signer.key_set()
    }

    pub async fn session_counts(&self) -> SessionCounts {
        let state = self.shared.state.lock().await;
        let coordinator = state.coordinator.as_ref();
        SessionCounts {
            coordinator_open: coordinator.is_some(),
            commitments: coordinator.map_or(0, |s| s.commitments.len()),
            signature_shares: coordinator.map_or(0, |s| s.shares.len()),
            participant_open: state.participant.is_some(),
        }
    }

    /// Number of unspent nonces held by the signer.
    pub async fn pending_nonces(&self) -> usize {
        self.shared.state.lock().await.signer.pending_nonces()
    }

    /// Entry point for every gossip delivery. `origin` is the publisher as
    /// reported by the transport. Returns why the payload was dropped, if it was.
    pub async fn handle_inbound(&self, origin: &str, data: &[u8]) -> Result<(), TssError> {
        let result = self.dispatch(origin, data).await;
        if let Err(e) = &result {
            payload_dropped_metrics!(e.kind());
            match e {
                TssError::Decode(_) | TssError::Impersonation { .. } => {
                    warn!("❌ Dropped payload from {origin}: {e}");
                }
                _ => debug!("Dropped payload from {origin}: {e}"),
            }
        }
        result
    }

    async fn dispatch(&self, origin: &str, data: &[u8]) -> Result<(), TssError> {
        let payload = Payload::decode(data)?;
        if payload.sender != origin {
            return Err(TssError::Impersonation {
                claimed: payload.sender,
                origin: origin.to_string(),
            });
        }
        if payload.sender == self.shared.identity {
            return Ok(());
        }

        payload_received_metrics!(payload.command);
        let message = payload.message_bytes()?;

        match payload.command {
            Command::Commitment => self.on_commitment_request(origin, message).await,
            Command::CommitmentShare => {
                self.on_commitment_share(origin, &message, &payload.package)
                    .await
            }
            Command::Sign => self.on_sign(origin, &message, &payload.package).await,
            Command::SignatureShare => {
                self.on_signature_share(origin, &message, &payload.package)
                    .await
            }
            Command::DkgRound1 => self.on_dkg_round1(origin, payload.package).await,
            Command::DkgRound2 => self.on_dkg_round2(origin, payload.package).await,
        }
    }

    fn publish(&self, command: Command, message: &[u8], package: Vec<u8>) -> Result<(), TssError> {
        let payload = Payload::new(self.shared.identity.clone(), command, message, package);
        self.shared.network.publish(&payload)?;
        payload_sent_metrics!(command);
        Ok(())
    }

    /// The claimed identifier inside a package must belong to the peer that published it.
    fn check_origin(origin: &str, identifier: &Identifier) -> Result<(), TssError> {
        let expected = identity_to_identifier(origin)?;
        if &expected == identifier {
            Ok(())
        } else {
            Err(TssError::Impersonation {
                claimed: crate::signer::identifier_hex(identifier),
                origin: origin.to_string(),
            })
        }
    }
}
