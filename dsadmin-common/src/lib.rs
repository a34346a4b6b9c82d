//! # dsadmin Common Library
//!
//! Shared code for the dsadmin engine crates including:
//! - Distinguished name handling (`Dn`)
//! - LDAP entry representation and the minimal connectivity interface
//! - Server descriptor types
//! - Event types and the `EventBus`
//! - Configuration loading

pub mod config;
pub mod dn;
pub mod entry;
pub mod error;
pub mod events;
pub mod ldap;
pub mod server;

pub use dn::Dn;
pub use error::{Error, Result};
