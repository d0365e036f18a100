use tokio::io::{self, AsyncBufReadExt};
use tracing::{error, warn};
use types::{
    errors::NodeError,
    network::Network,
    network_event::{SelfRequest, SelfResponse},
};

/// An operator command typed on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Sign(Vec<u8>),
    Dkg,
    Peers,
    Key,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(text) = line.strip_prefix("/sign ") {
            let text = text.trim();
            return (!text.is_empty()).then(|| Self::Sign(text.as_bytes().to_vec()));
        }
        match line {
            "/dkg" => Some(Self::Dkg),
            "/peers" => Some(Self::Peers),
            "/key" => Some(Self::Key),
            _ => None,
        }
    }

    fn into_request(self) -> SelfRequest {
        match self {
            Self::Sign(message) => SelfRequest::StartSigning { message },
            Self::Dkg => SelfRequest::StartDkg,
            Self::Peers => SelfRequest::ListPeers,
            Self::Key => SelfRequest::GroupPublicKey,
        }
    }
}

#[must_use]
pub fn render_response(response: &SelfResponse) -> String {
    match response {
        SelfResponse::SigningFinished { message, signature } => format!(
            "Signature over {}: {}",
            String::from_utf8_lossy(message),
            hex::encode(signature)
        ),
        SelfResponse::Failed { reason } => format!("Failed: {reason}"),
        SelfResponse::DkgStarted { started: true } => "DKG started".to_string(),
        SelfResponse::DkgStarted { started: false } => {
            "DKG not started, a key exists or a ceremony is running".to_string()
        }
        SelfResponse::Peers { peers } => {
            let mut out = format!("Connected peers ({}):", peers.len());
            for peer in peers {
                out.push_str("\n  ");
                out.push_str(peer);
            }
            out
        }
        SelfResponse::GroupPublicKey {
            public_key: Some(key),
        } => format!("Group public key: {key}"),
        SelfResponse::GroupPublicKey { public_key: None } => "No threshold key yet".to_string(),
    }
}

/// Reads commands from stdin until it closes. Each command is answered on stdout
/// from its own task, so a long signing session does not block the prompt.
pub async fn run_console<N: Network>(network: N) -> Result<(), NodeError> {
    let mut stdin = io::BufReader::new(io::stdin()).lines();
    println!("Commands: /sign <text>, /dkg, /peers, /key");

    while let Some(line) = stdin
        .next_line()
        .await
        .map_err(|e| NodeError::Error(format!("Failed to read stdin: {e}")))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = ConsoleCommand::parse(&line) else {
            warn!("Unknown command: {}", line.trim());
            continue;
        };

        match network.send_self_request(command.into_request(), true) {
            Ok(Some(response)) => {
                tokio::spawn(async move {
                    match response.await {
                        Ok(response) => println!("{}", render_response(&response)),
                        Err(e) => error!("No response from node: {e}"),
                    }
                });
            }
            Ok(None) => {}
            Err(e) => error!("Failed to reach node: {e}"),
        }
    }

    Ok(())
}
