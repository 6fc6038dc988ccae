use derive_more::Display;
use types::errors::NodeError;

#[derive(Debug, Display)]
pub enum CliError {
    #[display("Config error: {_0}")]
    Config(String),

    #[display("Io error: {_0}")]
    Io(std::io::Error),

    #[display("Invalid argument: {_0}")]
    InvalidArgument(String),

    #[display("{_0}")]
    Relay(NodeError),
}

impl std::error::Error for CliError {}

impl From<NodeError> for CliError {
    fn from(error: NodeError) -> Self {
        Self::Relay(error)
    }
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}
