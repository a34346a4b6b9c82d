//! Common error types for dsadmin

use thiserror::Error;

/// Common result type for dsadmin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the dsadmin crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Distinguished name syntax error
    #[error("Invalid DN: {0}")]
    Dn(#[from] crate::dn::DnError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
