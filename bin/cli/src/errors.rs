use derive_more::Display;
use types::errors::{NodeError, TssError};

#[derive(Debug, Display)]
pub enum CliError {
    #[display("Config error: {_0}")]
    Config(String),

    #[display("{_0}")]
    Key(TssError),

    #[display("{_0}")]
    Node(NodeError),

    #[display("Io error: {_0}")]
    Io(std::io::Error),

    #[display("Signature does not verify")]
    InvalidSignature,
}

impl std::error::Error for CliError {}

impl From<TssError> for CliError {
    fn from(error: TssError) -> Self {
        Self::Key(error)
    }
}

impl From<NodeError> for CliError {
    fn from(error: NodeError) -> Self {
        Self::Node(error)
    }
}
