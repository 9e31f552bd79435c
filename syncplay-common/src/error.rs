//! Common error types shared across the SyncPlay workspace

use thiserror::Error;

/// Common result type for SyncPlay primitives
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared by `syncplay-common` consumers
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
