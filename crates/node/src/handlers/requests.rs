use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};
use types::errors::NodeError;
use types::network::Network;
use types::network_event::{NetworkEvent, SelfRequest, SelfResponse};

use crate::{NodeState, handlers::Handler};

/// Serves operator requests that start protocol work.
#[derive(Debug, Default)]
pub struct RequestHandler;

pub(crate) fn respond(channel: Option<UnboundedSender<SelfResponse>>, response: SelfResponse) {
    if let Some(channel) = channel {
        if channel.send(response).is_err() {
            error!("Requester went away before the response was ready");
        }
    }
}

#[async_trait::async_trait]
impl<N: Network> Handler<N> for RequestHandler {
    async fn handle(
        &mut self,
        node: &mut NodeState<N>,
        message: Option<NetworkEvent>,
    ) -> Result<(), NodeError> {
        match message {
            Some(NetworkEvent::SelfRequest {
                request: SelfRequest::StartSigning { message },
                response_channel,
            }) => {
                info!("Signing request for {}", hex::encode(&message));
                // the session waits on gossip this loop has to keep delivering
                let protocol = node.protocol.clone();
                tokio::spawn(async move {
                    let response = match protocol.start_signing(&message).await {
                        Ok(signature) => SelfResponse::SigningFinished { message, signature },
                        Err(e) => SelfResponse::Failed {
                            reason: e.to_string(),
                        },
                    };
                    respond(response_channel, response);
                });
            }
            Some(NetworkEvent::SelfRequest {
                request: SelfRequest::StartDkg,
                response_channel,
            }) => {
                let response = match node.protocol.start_dkg().await {
                    Ok(started) => SelfResponse::DkgStarted { started },
                    Err(e) => SelfResponse::Failed {
                        reason: e.to_string(),
                    },
                };
                respond(response_channel, response);
            }
            _ => {}
        }
        Ok(())
    }
}
