use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use types::{errors::TssError, network::Network, payload::Command};

use super::{CoordinationProtocol, session::ProtocolState};
use crate::{
    key_manager,
    signer::{
        identifier_hex, identity_to_identifier,
        wire::{Round1Message, decode_round2},
    },
};

/// Messages gathered for the key generation ceremony, keyed by sender identity.
#[derive(Debug, Default)]
pub struct DkgCeremony {
    started: bool,
    own_round1: Option<Vec<u8>>,
    round1: BTreeMap<String, Vec<u8>>,
    round2: BTreeMap<String, Vec<u8>>,
    round2_sent: bool,
}

impl DkgCeremony {
    #[must_use]
    pub const fn started(&self) -> bool {
        self.started
    }

    #[must_use]
    pub fn round1_count(&self) -> usize {
        self.round1.len()
    }

    #[must_use]
    pub fn round2_count(&self) -> usize {
        self.round2.len()
    }

    /// Returns whether the sender was new.
    fn record_round1(&mut self, sender: &str, package: Vec<u8>, participants: usize) -> Result<bool, TssError> {
        if self.round1.contains_key(sender) {
            return Ok(false);
        }
        if self.round1.len() >= participants {
            return Err(TssError::DkgInconsistent(format!(
                "round 1 from {sender} exceeds the {participants} participants"
            )));
        }
        self.round1.insert(sender.to_string(), package);
        Ok(true)
    }
}

impl<N: Network> CoordinationProtocol<N> {
    /// Starts key generation unless a key exists or a ceremony is already running.
    pub async fn start_dkg(&self) -> Result<bool, TssError> {
        let mut state = self.shared.state.lock().await;
        if state.signer.has_key() {
            warn!("Threshold key already present, not starting DKG");
            return Ok(false);
        }
        if state.dkg.started {
            debug!("DKG already running");
            return Ok(false);
        }

        self.begin_ceremony(&mut state)?;
        self.advance_dkg(&mut state)?;
        Ok(true)
    }

    fn begin_ceremony(&self, state: &mut ProtocolState) -> Result<(), TssError> {
        let round1 = state.signer.dkg_round1()?;
        state.dkg = DkgCeremony {
            started: true,
            own_round1: Some(round1.clone()),
            ..DkgCeremony::default()
        };
        state.dkg.round1.insert(self.shared.identity.clone(), round1.clone());

        self.publish(Command::DkgRound1, &[], round1)?;
        info!(
            "🔐 Started DKG as {} ({}-of-{})",
            self.shared.identity,
            state.signer.threshold(),
            state.signer.participants()
        );
        Ok(())
    }

    pub(super) async fn on_dkg_round1(&self, origin: &str, package: Vec<u8>) -> Result<(), TssError> {
        let message = Round1Message::decode(&package)?;
        Self::check_origin(origin, &message.identifier)?;

        let mut state = self.shared.state.lock().await;
        if state.signer.has_key() {
            return Err(TssError::SessionMismatch(
                "DKG round 1 after the key was established".into(),
            ));
        }

        let joined_now = !state.dkg.started;
        if joined_now {
            self.begin_ceremony(&mut state)?;
        }

        let participants = usize::from(state.signer.participants());
        // a surplus sender is dropped, the ceremony carries on
        let is_new = state.dkg.record_round1(origin, package, participants)?;
        debug!(
            "DKG round 1 from {origin} ({}/{participants})",
            state.dkg.round1_count()
        );

        // peers that joined late never saw our first broadcast
        if is_new && !joined_now {
            if let Some(own) = state.dkg.own_round1.clone() {
                self.publish(Command::DkgRound1, &[], own)?;
            }
        }

        self.advance_dkg(&mut state)
    }

    pub(super) async fn on_dkg_round2(&self, origin: &str, package: Vec<u8>) -> Result<(), TssError> {
        let expected = identity_to_identifier(origin)?;
        if let Some(forged) = decode_round2(&package)?
            .iter()
            .find(|triple| triple.sender != expected)
        {
            return Err(TssError::Impersonation {
                claimed: identifier_hex(&forged.sender),
                origin: origin.to_string(),
            });
        }

        let mut state = self.shared.state.lock().await;
        if state.signer.has_key() {
            return Err(TssError::SessionMismatch(
                "DKG round 2 after the key was established".into(),
            ));
        }
        if state.dkg.round2.contains_key(origin) {
            return Ok(());
        }
        state.dkg.round2.insert(origin.to_string(), package);
        debug!("DKG round 2 from {origin} ({})", state.dkg.round2_count());

        self.advance_dkg(&mut state)
    }

    fn advance_dkg(&self, state: &mut ProtocolState) -> Result<(), TssError> {
        let participants = usize::from(state.signer.participants());

        if state.dkg.started && !state.dkg.round2_sent && state.dkg.round1.len() == participants {
            let round1: Vec<Vec<u8>> = state.dkg.round1.values().cloned().collect();
            let round2 = match state.signer.dkg_round2(&round1) {
                Ok(round2) => round2,
                Err(e) => {
                    state.dkg = DkgCeremony::default();
                    return Err(e);
                }
            };
            state.dkg.round2_sent = true;
            self.publish(Command::DkgRound2, &[], round2)?;
            info!("DKG round 2 sent");
        }

        if state.dkg.round2_sent && state.dkg.round2.len() == participants - 1 {
            let round1: Vec<Vec<u8>> = state.dkg.round1.values().cloned().collect();
            let round2: Vec<Vec<u8>> = state.dkg.round2.values().cloned().collect();
            let result = state.signer.dkg_finalize(&round1, &round2);
            state.dkg = DkgCeremony::default();

            let key_set = result?;
            key_manager::save_threshold_key(self.shared.storage.as_ref(), &key_set)?;
        }

        Ok(())
    }

    /// Re-sends this node's round-1 message while the ceremony is still
    /// collecting, so newly connected peers can catch up.
    pub async fn rebroadcast_dkg_round1(&self) -> Result<(), TssError> {
        let state = self.shared.state.lock().await;
        if state.dkg.started && !state.dkg.round2_sent {
            if let Some(own) = state.dkg.own_round1.clone() {
                self.publish(Command::DkgRound1, &[], own)?;
            }
        }
        Ok(())
    }

    pub async fn dkg_status(&self) -> (bool, usize, usize) {
        let state = self.shared.state.lock().await;
        (
            state.dkg.started(),
            state.dkg.round1_count(),
            state.dkg.round2_count(),
        )
    }
}
