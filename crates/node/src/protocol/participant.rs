use tokio::time::Instant;
use tracing::{debug, info};
use types::{errors::TssError, network::Network, payload::Command};

use super::CoordinationProtocol;
use crate::signer::CommitmentList;

impl<N: Network> CoordinationProtocol<N> {
    /// `COMMITMENT`: another node asks for a fresh commitment over `message`.
    pub(super) async fn on_commitment_request(
        &self,
        origin: &str,
        message: Vec<u8>,
    ) -> Result<(), TssError> {
        let now = Instant::now();
        let package = {
            let mut state = self.shared.state.lock().await;
            if let Some(expired) = state.expire_participant(now) {
                debug!(
                    "Participant session for {} from {} expired",
                    hex::encode(&expired.message),
                    expired.coordinator
                );
            }

            let deadline = now + self.shared.timeouts.participant_ttl;
            match state.participant.as_mut() {
                // a retry of the same request gets the unspent commitment again
                Some(open) if open.coordinator == origin && open.message == message => {
                    debug!("Repeated commitment request from {origin}, resending");
                    open.deadline = deadline;
                    open.commitment.encode()?
                }
                // the coordinator only runs one session, so its older one is dead
                Some(open) if open.coordinator == origin => {
                    debug!(
                        "{origin} moved on from {}, replacing participant session",
                        hex::encode(&open.message)
                    );
                    state.close_participant();
                    state.open_participant(origin, &message, deadline)?
                }
                Some(_) => return Err(TssError::SessionBusy),
                None => state.open_participant(origin, &message, deadline)?,
            }
        };

        if let Err(e) = self.publish(Command::CommitmentShare, &message, package) {
            self.shared.state.lock().await.close_participant();
            return Err(e);
        }
        debug!("Committed to {}'s session", origin);
        Ok(())
    }

    /// `SIGN`: the coordinator distributed the final commitment list.
    pub(super) async fn on_sign(
        &self,
        origin: &str,
        message: &[u8],
        package: &[u8],
    ) -> Result<(), TssError> {
        let share = {
            let mut state = self.shared.state.lock().await;
            state.expire_participant(Instant::now());

            let Some(open) = &state.participant else {
                return Err(TssError::SessionMismatch(
                    "sign request without an open participant session".into(),
                ));
            };
            if open.coordinator != origin || open.message != message {
                return Err(TssError::SessionMismatch(format!(
                    "sign request from {origin} does not match the open session"
                )));
            }

            let commitments = CommitmentList::decode(package)?;
            let own_identifier = state.signer.identifier();
            let own_committed = commitments
                .get(&own_identifier)
                .is_some_and(|listed| *listed == open.commitment.commitments);

            if !own_committed {
                state.close_participant();
                return Err(TssError::SessionMismatch(format!(
                    "commitment list from {origin} omits this node's commitment"
                )));
            }

            // signing consumes the nonce
            state.participant = None;
            state.signer.sign_as_participant(message, &commitments)?
        };

        self.publish(Command::SignatureShare, message, share.encode())?;
        info!("✍️ Sent signature share to {origin}");
        Ok(())
    }
}
