//! Error types for dsadmin-browser
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation.

use thiserror::Error;

/// Main error type for the browser engine
#[derive(Error, Debug)]
pub enum Error {
    /// LDAP connectivity errors
    #[error("LDAP error: {0}")]
    Ldap(#[from] dsadmin_common::ldap::LdapError),

    /// Distinguished name syntax errors
    #[error("Invalid DN: {0}")]
    Dn(#[from] dsadmin_common::dn::DnError),

    /// The referenced node is not (or no longer) in the model
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Fetch queue errors
    #[error("Fetch queue error: {0}")]
    Queue(String),
}

/// Convenience Result type using the browser Error
pub type Result<T> = std::result::Result<T, Error>;
