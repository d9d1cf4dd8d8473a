//! Common error types for the seismic monitoring services

use thiserror::Error;

/// Common result type for seismo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across seismo crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
