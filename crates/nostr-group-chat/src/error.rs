use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Malformed kind {kind} control message {message_id}: {reason}")]
    Decode {
        kind: u32,
        message_id: String,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Decode errors are skipped during replay; everything else reaches the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
