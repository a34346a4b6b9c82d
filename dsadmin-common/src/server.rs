//! Server descriptor types
//!
//! A snapshot of the administered server's state as reported by the
//! external configuration layer: lifecycle status, authentication state
//! and the backend/base-DN inventory. The browser seeds suffixes from it;
//! the task coordinator gates lifecycle operations on it.

use crate::dn::Dn;
use serde::{Deserialize, Serialize};

/// Directory server lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Started,
    Stopped,
    Unknown,
}

/// One storage backend and the suffixes it owns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// Backend identifier, e.g. `"userRoot"`
    pub backend_id: String,

    /// Base DNs of the naming contexts this backend serves
    pub base_dns: Vec<Dn>,
}

/// Snapshot of the administered server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub hostname: String,
    pub status: ServerStatus,
    pub authenticated: bool,
    pub backends: Vec<BackendDescriptor>,
}

impl ServerDescriptor {
    /// A descriptor for a server nothing is known about yet
    pub fn unknown() -> Self {
        ServerDescriptor {
            hostname: String::new(),
            status: ServerStatus::Unknown,
            authenticated: false,
            backends: Vec::new(),
        }
    }

    /// All base DNs across all backends
    pub fn suffixes(&self) -> Vec<Dn> {
        self.backends
            .iter()
            .flat_map(|b| b.base_dns.iter().cloned())
            .collect()
    }

    /// The backend owning `dn`, if any (the backend with a base DN that is
    /// `dn` itself or an ancestor of it)
    pub fn backend_for_dn(&self, dn: &Dn) -> Option<&BackendDescriptor> {
        self.backends.iter().find(|b| {
            b.base_dns
                .iter()
                .any(|base| base == dn || dn.is_descendant_of(base))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_for_dn() {
        let server = ServerDescriptor {
            hostname: "ldap.example.com".to_string(),
            status: ServerStatus::Started,
            authenticated: true,
            backends: vec![BackendDescriptor {
                backend_id: "userRoot".to_string(),
                base_dns: vec![Dn::parse("dc=example,dc=com").unwrap()],
            }],
        };

        let inside = Dn::parse("ou=People,dc=example,dc=com").unwrap();
        let outside = Dn::parse("dc=other,dc=org").unwrap();

        assert_eq!(
            server.backend_for_dn(&inside).unwrap().backend_id,
            "userRoot"
        );
        assert!(server.backend_for_dn(&outside).is_none());
        assert_eq!(server.suffixes().len(), 1);
    }
}
