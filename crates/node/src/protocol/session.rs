use std::collections::BTreeMap;

use frost_secp256k1::Identifier;
use tokio::{sync::watch, time::Instant};
use types::errors::{Phase, TssError};

use super::dkg::DkgCeremony;
use crate::signer::{Commitment, CommitmentList, SignatureShare, Signer};

/// Everything the protocol mutates, guarded by one lock.
pub struct ProtocolState {
    pub signer: Signer,
    pub coordinator: Option<CoordinatorSession>,
    pub participant: Option<ParticipantSession>,
    pub dkg: DkgCeremony,
    next_epoch: u64,
}

impl ProtocolState {
    pub fn new(signer: Signer) -> Self {
        Self {
            signer,
            coordinator: None,
            participant: None,
            dkg: DkgCeremony::default(),
            next_epoch: 0,
        }
    }

    pub const fn next_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    /// Closes the coordinator session if it is still the one identified by `epoch`.
    pub fn close_coordinator(&mut self, epoch: u64) -> Option<CoordinatorSession> {
        if self.coordinator.as_ref().is_some_and(|s| s.epoch == epoch) {
            let session = self.coordinator.take()?;
            if let Some(own) = &session.own_commitment {
                self.signer.discard_nonces(own);
            }
            return Some(session);
        }
        None
    }

    /// Commits to `coordinator`'s request and returns the encoded commitment.
    pub fn open_participant(
        &mut self,
        coordinator: &str,
        message: &[u8],
        deadline: Instant,
    ) -> Result<Vec<u8>, TssError> {
        let commitment = self.signer.commit()?;
        let package = match commitment.encode() {
            Ok(package) => package,
            Err(e) => {
                self.signer.discard_nonces(&commitment);
                return Err(e);
            }
        };
        self.participant = Some(ParticipantSession {
            coordinator: coordinator.to_string(),
            message: message.to_vec(),
            commitment,
            deadline,
        });
        Ok(package)
    }

    pub fn close_participant(&mut self) -> Option<ParticipantSession> {
        let session = self.participant.take()?;
        self.signer.discard_nonces(&session.commitment);
        Some(session)
    }

    /// Drops a participant session whose coordinator went quiet.
    pub fn expire_participant(&mut self, now: Instant) -> Option<ParticipantSession> {
        if self.participant.as_ref().is_some_and(|s| s.deadline <= now) {
            return self.close_participant();
        }
        None
    }
}

/// State of the signing attempt this node initiated.
pub struct CoordinatorSession {
    pub epoch: u64,
    pub message: Vec<u8>,
    pub phase: Phase,
    pub commitments: CommitmentList,
    pub own_commitment: Option<Commitment>,
    pub shares: BTreeMap<Identifier, SignatureShare>,
    /// Count of contributions collected from other peers in the current phase.
    pub progress: watch::Sender<usize>,
}

impl CoordinatorSession {
    pub fn new(epoch: u64, message: Vec<u8>) -> (Self, watch::Receiver<usize>) {
        let (progress, receiver) = watch::channel(0);
        (
            Self {
                epoch,
                message,
                phase: Phase::Commitment,
                commitments: CommitmentList::new(),
                own_commitment: None,
                shares: BTreeMap::new(),
                progress,
            },
            receiver,
        )
    }

    /// Moves to the signature phase with a fresh progress channel.
    pub fn enter_signature_phase(&mut self) -> watch::Receiver<usize> {
        let (progress, receiver) = watch::channel(0);
        self.phase = Phase::Signature;
        self.progress = progress;
        receiver
    }

    pub fn matches(&self, message: &[u8], phase: Phase) -> bool {
        self.phase == phase && self.message == message
    }
}

/// State held while this node has committed to another node's signing attempt.
pub struct ParticipantSession {
    pub coordinator: String,
    pub message: Vec<u8>,
    pub commitment: Commitment,
    pub deadline: Instant,
}
