use thiserror::Error;

#[derive(Error, Debug)]
pub enum UnmixingError {
    #[error("Invalid input: {0}")]
    InputError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Failed to read input image: {0}")]
    InputReadError(String),

    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Failed to write artifact: {0}")]
    OutputWriteError(String),

    #[error("Failed to encode artifact: {0}")]
    EncodeError(String),

    #[error("Run cancelled before {0}")]
    Cancelled(String),

    #[error("Session {0} already has a run in flight")]
    SessionBusy(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UnmixingError>;
