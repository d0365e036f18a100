use std::time::Duration;

use tokio::{sync::watch, time::Instant};
use tracing::{debug, info, warn};
use types::{
    errors::{Phase, TssError},
    payload::Command,
    signing_outcome_metrics,
};

use super::{CoordinationProtocol, session::CoordinatorSession};
use crate::signer::{Commitment, SignatureShare};
use types::network::Network;

impl<N: Network> CoordinationProtocol<N> {
    /// Runs one signing session with this node as coordinator and returns the
    /// encoded aggregate signature.
    pub async fn start_signing(&self, message: &[u8]) -> Result<Vec<u8>, TssError> {
        let started = Instant::now();
        let result = self.run_coordinator(message).await;
        match &result {
            Ok(signature) => {
                info!("✅ Signed {} ({})", hex::encode(message), hex::encode(signature));
                signing_outcome_metrics!("success", started);
            }
            Err(e) => {
                warn!("❌ Signing {} failed: {e}", hex::encode(message));
                signing_outcome_metrics!(e.kind(), started);
            }
        }
        result
    }

    async fn run_coordinator(&self, message: &[u8]) -> Result<Vec<u8>, TssError> {
        let (epoch, threshold, participants, progress) = {
            let mut state = self.shared.state.lock().await;
            if !state.signer.has_key() {
                return Err(TssError::NoThresholdKey);
            }
            let epoch = state.next_epoch();
            let (session, progress) = CoordinatorSession::new(epoch, message.to_vec());
            if let Some(stale) = state.coordinator.take() {
                warn!(
                    "Replacing unfinished signing session for {}",
                    hex::encode(&stale.message)
                );
                if let Some(own) = &stale.own_commitment {
                    state.signer.discard_nonces(own);
                }
            }
            state.coordinator = Some(session);
            (
                epoch,
                usize::from(state.signer.threshold()),
                usize::from(state.signer.participants()),
                progress,
            )
        };

        let result = self
            .drive_session(epoch, message, threshold, participants, progress)
            .await;

        self.shared.state.lock().await.close_coordinator(epoch);
        result
    }

    async fn drive_session(
        &self,
        epoch: u64,
        message: &[u8],
        threshold: usize,
        participants: usize,
        progress: watch::Receiver<usize>,
    ) -> Result<Vec<u8>, TssError> {
        self.publish(Command::Commitment, message, Vec::new())?;
        debug!("Requested commitments for {}", hex::encode(message));

        let collected = Self::await_quorum(
            progress,
            Phase::Commitment,
            participants - 1,
            threshold - 1,
            self.shared.timeouts.commitment,
        )
        .await?;
        info!("Collected {collected} commitments");

        let (commitments, progress) = {
            let mut state = self.shared.state.lock().await;
            if !state.coordinator.as_ref().is_some_and(|session| session.epoch == epoch) {
                return Err(TssError::SessionReplaced);
            }
            let own = state.signer.commit()?;
            let Some(session) = state.coordinator.as_mut() else {
                state.signer.discard_nonces(&own);
                return Err(TssError::SessionReplaced);
            };
            session.commitments.insert(own.clone());
            session.own_commitment = Some(own);
            let progress = session.enter_signature_phase();
            (session.commitments.clone(), progress)
        };

        self.publish(Command::Sign, message, commitments.encode()?)?;

        // Each share is bound to the full list, so every listed peer has to answer.
        let expected = commitments.len() - 1;
        let collected = Self::await_quorum(
            progress,
            Phase::Signature,
            expected,
            expected,
            self.shared.timeouts.signature,
        )
        .await?;
        info!("Collected {collected} signature shares");

        let mut state = self.shared.state.lock().await;
        let shares: Vec<SignatureShare> = state
            .coordinator
            .as_ref()
            .filter(|session| session.epoch == epoch)
            .ok_or(TssError::SessionReplaced)?
            .shares
            .values()
            .cloned()
            .collect();

        let signature = state
            .signer
            .sign_as_coordinator(message, &commitments, &shares)?;
        if let Some(session) = state.coordinator.as_mut() {
            session.own_commitment = None;
        }
        Ok(signature)
    }

    /// Waits until `target` contributions arrive or `timeout` elapses, then
    /// accepts anything at or above `minimum`.
    async fn await_quorum(
        mut progress: watch::Receiver<usize>,
        phase: Phase,
        target: usize,
        minimum: usize,
        timeout: Duration,
    ) -> Result<usize, TssError> {
        let reached = tokio::time::timeout(timeout, progress.wait_for(|count| *count >= target))
            .await
            .map(|waited| waited.map(|count| *count));

        match reached {
            Ok(Ok(count)) => Ok(count),
            Ok(Err(_)) => Err(TssError::SessionReplaced),
            Err(_) => {
                let collected = *progress.borrow();
                if collected >= minimum {
                    debug!("{phase} phase timed out with {collected} of {target}, proceeding");
                    Ok(collected)
                } else {
                    Err(TssError::QuorumTimeout {
                        phase,
                        collected,
                        required: minimum,
                    })
                }
            }
        }
    }

    pub(super) async fn on_commitment_share(
        &self,
        origin: &str,
        message: &[u8],
        package: &[u8],
    ) -> Result<(), TssError> {
        let mut state = self.shared.state.lock().await;
        let Some(session) = state
            .coordinator
            .as_mut()
            .filter(|session| session.matches(message, Phase::Commitment))
        else {
            return Err(TssError::SessionMismatch(
                "commitment for a session this node is not collecting".into(),
            ));
        };

        let commitment = Commitment::decode(package)?;
        Self::check_origin(origin, &commitment.identifier)?;

        if !session.commitments.insert(commitment) {
            debug!("Duplicate commitment from {origin}");
            return Ok(());
        }
        let count = session.commitments.len();
        session.progress.send_replace(count);
        debug!("Commitment {count} from {origin}");
        Ok(())
    }

    pub(super) async fn on_signature_share(
        &self,
        origin: &str,
        message: &[u8],
        package: &[u8],
    ) -> Result<(), TssError> {
        let mut state = self.shared.state.lock().await;
        let Some(session) = state
            .coordinator
            .as_mut()
            .filter(|session| session.matches(message, Phase::Signature))
        else {
            return Err(TssError::SessionMismatch(
                "signature share for a session this node is not collecting".into(),
            ));
        };

        let share = SignatureShare::decode(package)?;
        Self::check_origin(origin, &share.identifier)?;

        if !session.commitments.contains(&share.identifier) {
            return Err(TssError::SessionMismatch(format!(
                "{origin} is not in the commitment list"
            )));
        }
        if session.shares.contains_key(&share.identifier) {
            debug!("Duplicate signature share from {origin}");
            return Ok(());
        }

        session.shares.insert(share.identifier, share);
        let count = session.shares.len();
        session.progress.send_replace(count);
        debug!("Signature share {count} from {origin}");
        Ok(())
    }
}
