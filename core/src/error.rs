use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("No datum tone found within the search window")]
    SyncNotFound,

    #[error("Header field count mismatch: expected 3 fields, found {found}")]
    HeaderFieldCount { found: usize },

    #[error("Unknown transmission mode: {0:?}")]
    UnknownMode(String),

    #[error("Character {0:?} has no tone assignment")]
    UnmappedCharacter(char),

    #[error("Insufficient data")]
    InsufficientData,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Record storage failed: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
