//! Distinguished name handling
//!
//! `Dn` is the identity type for every directory entry tracked by the
//! browser engine. Equality, hashing and ordering use a normalized form
//! (lowercased, whitespace between RDNs stripped) so that tree lookups are
//! stable regardless of how the server or the caller spelled the DN.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Distinguished name syntax errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnError {
    /// An RDN without an attribute=value shape
    #[error("invalid RDN \"{0}\": missing '='")]
    MissingEquals(String),

    /// An RDN with an empty attribute type
    #[error("invalid RDN \"{0}\": empty attribute type")]
    EmptyAttributeType(String),
}

/// A parsed distinguished name.
///
/// The empty DN is the synthetic root suffix. Components are stored
/// leftmost (deepest) first, as written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dn {
    /// RDNs as written (escapes preserved), leftmost first
    components: Vec<String>,

    /// Normalized form used for equality, hashing and ordering
    norm: String,
}

impl Dn {
    /// The empty (root) DN.
    pub fn root() -> Self {
        Dn {
            components: Vec::new(),
            norm: String::new(),
        }
    }

    /// Parse a DN string.
    ///
    /// An empty or all-whitespace string parses to the root DN. Commas
    /// escaped with a backslash do not split RDNs.
    pub fn parse(s: &str) -> Result<Self, DnError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut components = Vec::new();
        for raw in split_unescaped_commas(trimmed) {
            let rdn = raw.trim();
            let eq = rdn
                .find('=')
                .ok_or_else(|| DnError::MissingEquals(rdn.to_string()))?;
            if rdn[..eq].trim().is_empty() {
                return Err(DnError::EmptyAttributeType(rdn.to_string()));
            }
            components.push(rdn.to_string());
        }

        let norm = components
            .iter()
            .map(|c| c.to_lowercase())
            .collect::<Vec<_>>()
            .join(",");

        Ok(Dn { components, norm })
    }

    /// True for the empty (root) DN.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Number of RDN components (0 for the root DN).
    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    /// The leftmost RDN as written, e.g. `"cn=John Doe"`.
    ///
    /// `None` for the root DN.
    pub fn rdn(&self) -> Option<&str> {
        self.components.first().map(|s| s.as_str())
    }

    /// The value part of the leftmost RDN, unescaped, e.g. `"John Doe"`.
    ///
    /// This is what the tree displays for non-suffix nodes.
    pub fn rdn_value(&self) -> Option<String> {
        self.rdn().map(|rdn| {
            let value = match rdn.find('=') {
                Some(eq) => &rdn[eq + 1..],
                None => rdn,
            };
            unescape(value.trim())
        })
    }

    /// The parent DN (one component shorter).
    ///
    /// `None` for the root DN; a single-component DN's parent is the root.
    pub fn parent(&self) -> Option<Dn> {
        if self.components.is_empty() {
            return None;
        }
        let components: Vec<String> = self.components[1..].to_vec();
        let norm = components
            .iter()
            .map(|c| c.to_lowercase())
            .collect::<Vec<_>>()
            .join(",");
        Some(Dn { components, norm })
    }

    /// True if `self` is a strict descendant of `ancestor`.
    ///
    /// Every DN is a descendant of the root DN; no DN is a descendant of
    /// itself.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        if self.components.len() <= ancestor.components.len() {
            return false;
        }
        let skip = self.components.len() - ancestor.components.len();
        self.components[skip..]
            .iter()
            .zip(&ancestor.components)
            .all(|(a, b)| a.to_lowercase() == b.to_lowercase())
    }

    /// The normalized form (lowercased, comma-joined).
    pub fn normalized(&self) -> &str {
        &self.norm
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join(","))
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.norm == other.norm
    }
}

impl Eq for Dn {}

impl std::hash::Hash for Dn {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.norm.hash(state);
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.norm.cmp(&other.norm)
    }
}

impl TryFrom<String> for Dn {
    type Error = DnError;

    fn try_from(s: String) -> Result<Self, DnError> {
        Dn::parse(&s)
    }
}

impl From<Dn> for String {
    fn from(dn: Dn) -> String {
        dn.to_string()
    }
}

impl std::str::FromStr for Dn {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, DnError> {
        Dn::parse(s)
    }
}

/// Split on commas not preceded by a backslash.
fn split_unescaped_commas(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            ',' => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Remove backslash escapes from an RDN value.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let dn = Dn::parse("dc=example,dc=com").unwrap();
        assert_eq!(dn.to_string(), "dc=example,dc=com");
        assert_eq!(dn.num_components(), 2);
        assert!(!dn.is_root());
    }

    #[test]
    fn test_root_dn() {
        let root = Dn::parse("").unwrap();
        assert!(root.is_root());
        assert_eq!(root, Dn::root());
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn test_equality_is_case_and_space_insensitive() {
        let a = Dn::parse("DC=Example, DC=COM").unwrap();
        let b = Dn::parse("dc=example,dc=com").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parent_chain() {
        let dn = Dn::parse("uid=jdoe,ou=People,dc=example,dc=com").unwrap();
        let parent = dn.parent().unwrap();
        assert_eq!(parent, Dn::parse("ou=People,dc=example,dc=com").unwrap());
        let suffix = parent.parent().unwrap();
        assert_eq!(suffix, Dn::parse("dc=example,dc=com").unwrap());
        assert_eq!(suffix.parent().unwrap(), Dn::parse("dc=com").unwrap());
        assert!(Dn::parse("dc=com").unwrap().parent().unwrap().is_root());
    }

    #[test]
    fn test_descendant() {
        let suffix = Dn::parse("dc=example,dc=com").unwrap();
        let child = Dn::parse("ou=People,dc=example,dc=com").unwrap();
        let grandchild = Dn::parse("uid=jdoe,ou=People,dc=example,dc=com").unwrap();

        assert!(child.is_descendant_of(&suffix));
        assert!(grandchild.is_descendant_of(&suffix));
        assert!(grandchild.is_descendant_of(&child));
        assert!(!suffix.is_descendant_of(&child));
        assert!(!suffix.is_descendant_of(&suffix));
        assert!(child.is_descendant_of(&Dn::root()));
    }

    #[test]
    fn test_escaped_comma() {
        let dn = Dn::parse("cn=Smith\\, John,ou=People,dc=example,dc=com").unwrap();
        assert_eq!(dn.num_components(), 3);
        assert_eq!(dn.rdn_value().unwrap(), "Smith, John");
    }

    #[test]
    fn test_rdn_value() {
        let dn = Dn::parse("ou=People,dc=example,dc=com").unwrap();
        assert_eq!(dn.rdn(), Some("ou=People"));
        assert_eq!(dn.rdn_value().unwrap(), "People");
    }

    #[test]
    fn test_invalid_rdn() {
        assert!(Dn::parse("no-equals-here").is_err());
        assert!(Dn::parse("=value,dc=com").is_err());
    }
}
