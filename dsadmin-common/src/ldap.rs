//! Minimal LDAP connectivity interface
//!
//! The engines consume the directory through these traits only. The real
//! protocol client lives outside this workspace; tests provide in-memory
//! implementations. Connections are not shared across concurrent
//! operations: every fetch worker and every task acquires its own
//! connection from the pool and releases it by dropping it.

use crate::dn::Dn;
use crate::entry::SearchEntry;
use thiserror::Error;

/// The filter used to retrieve all entries, subentries included
pub const ALL_OBJECTS_FILTER: &str = "(|(objectClass=*)(objectClass=ldapsubentry))";

/// LDAP search scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SearchScope {
    /// The base entry only
    Base,
    /// Immediate children of the base entry
    OneLevel,
    /// The base entry and all of its subordinates
    WholeSubtree,
}

/// Errors surfaced by the connectivity layer.
///
/// Cloneable so a summarized error can be attached to a tree node and
/// carried in events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LdapError {
    /// The base entry of an operation does not exist
    #[error("no such object: {0}")]
    NoSuchObject(String),

    /// The connection was closed underneath the operation
    #[error("connection closed")]
    ConnectionClosed,

    /// The server cannot be reached
    #[error("server unavailable: {0}")]
    Unavailable(String),

    /// The search filter could not be parsed by the server
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Any other failed operation, with the LDAP result code
    #[error("operation failed (result code {code}): {message}")]
    OperationFailed { code: u32, message: String },
}

/// Result of a search, with server-side truncation reported out of band
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Entries returned, in server order
    pub entries: Vec<SearchEntry>,

    /// True when the server stopped at the requested size limit
    pub truncated: bool,
}

/// A single modification within a modify operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    pub op: ChangeOp,
    pub attribute: String,
    pub values: Vec<String>,
}

/// Modification type for [`AttributeChange`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Add,
    Delete,
    Replace,
}

/// One authenticated connection.
///
/// Not thread-safe for concurrent use; callers own the connection
/// exclusively until they drop it.
pub trait LdapConnection: Send {
    /// Run a search. `size_limit` of 0 means unlimited; when the server
    /// truncates at the limit the outcome's `truncated` flag is set
    /// instead of returning an error.
    fn search(
        &mut self,
        base: &Dn,
        scope: SearchScope,
        filter: &str,
        size_limit: usize,
    ) -> Result<SearchOutcome, LdapError>;

    /// Apply modifications to an existing entry
    fn modify(&mut self, dn: &Dn, changes: &[AttributeChange]) -> Result<(), LdapError>;

    /// Add a new entry
    fn add(&mut self, entry: &SearchEntry) -> Result<(), LdapError>;

    /// Delete an entry
    fn delete(&mut self, dn: &Dn) -> Result<(), LdapError>;

    /// Liveness check (fail fast on a stale connection)
    fn is_alive(&self) -> bool;
}

/// Supplies authenticated connections on demand.
///
/// Implementations may hand out pooled connections; recycling happens in
/// the connection's `Drop`.
pub trait ConnectionPool: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn LdapConnection>, LdapError>;
}
