use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("{command}: expected at least {expected} arguments, got {got}")]
    MissingArguments {
        command: String,
        expected: usize,
        got: usize,
    },

    #[error("Unknown mutual request kind: {0}")]
    UnknownKind(String),

    #[error("Unknown reaction: {0}")]
    UnknownReaction(String),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    #[error("Not a routed envelope: {0}")]
    NotAnEnvelope(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
