//! Error types for dsadmin-tasks
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation.

use thiserror::Error;

/// Main error type for the task engine
#[derive(Error, Debug)]
pub enum Error {
    /// The task was refused before any work started; one human-readable
    /// reason per conflicting registered task
    #[error("task is incompatible with running tasks: {}", .0.join("; "))]
    Incompatible(Vec<String>),

    /// A state transition that would violate the monotonic lifecycle
    #[error("invalid task state: {0}")]
    InvalidState(String),

    /// The server is in the wrong lifecycle state for this task
    #[error("server state: {0}")]
    ServerState(String),

    /// LDAP connectivity errors from operation bodies
    #[error("LDAP error: {0}")]
    Ldap(#[from] dsadmin_common::ldap::LdapError),
}

/// Convenience Result type using the task Error
pub type Result<T> = std::result::Result<T, Error>;
