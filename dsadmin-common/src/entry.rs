//! LDAP search entry representation
//!
//! A `SearchEntry` is what the connectivity layer hands back for each
//! directory entry. Attribute lookup is case-insensitive (keys are stored
//! lowercased, as LDAP attribute names are case-insensitive).

use crate::dn::Dn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute holding the entry's object classes
pub const OBJECTCLASS_ATTR: &str = "objectclass";

/// Operational attribute with the number of immediate subordinates
pub const NUMSUBORDINATES_ATTR: &str = "numsubordinates";

/// Operational attribute telling whether the entry has subordinates
pub const HASSUBORDINATES_ATTR: &str = "hassubordinates";

/// One directory entry as returned by a search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEntry {
    /// Entry distinguished name
    pub dn: Dn,

    /// Attributes, keyed by lowercased attribute name
    attributes: HashMap<String, Vec<String>>,
}

impl SearchEntry {
    /// Create an entry with no attributes
    pub fn new(dn: Dn) -> Self {
        SearchEntry {
            dn,
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attr<S: Into<String>>(mut self, name: &str, values: Vec<S>) -> Self {
        self.set_attr(name, values.into_iter().map(Into::into).collect());
        self
    }

    /// Set an attribute, replacing any existing values
    pub fn set_attr(&mut self, name: &str, values: Vec<String>) {
        self.attributes.insert(name.to_lowercase(), values);
    }

    /// All values of an attribute (case-insensitive name lookup)
    pub fn attr(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .get(&name.to_lowercase())
            .map(|v| v.as_slice())
    }

    /// First value of an attribute
    pub fn attr_first(&self, name: &str) -> Option<&str> {
        self.attr(name).and_then(|v| v.first()).map(|s| s.as_str())
    }

    /// The entry's object class values
    pub fn object_classes(&self) -> Vec<String> {
        self.attr(OBJECTCLASS_ATTR)
            .map(|v| v.to_vec())
            .unwrap_or_default()
    }

    /// Number of immediate subordinates, if the server reported it
    pub fn num_subordinates(&self) -> Option<u64> {
        self.attr_first(NUMSUBORDINATES_ATTR)
            .and_then(|v| v.parse().ok())
    }

    /// Whether the entry has subordinates.
    ///
    /// Prefers the `hassubordinates` attribute; falls back to
    /// `numsubordinates > 0`; `false` when neither is present.
    pub fn has_subordinates(&self) -> bool {
        if let Some(v) = self.attr_first(HASSUBORDINATES_ATTR) {
            return v.eq_ignore_ascii_case("true");
        }
        self.num_subordinates().map(|n| n > 0).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dn: &str) -> SearchEntry {
        SearchEntry::new(Dn::parse(dn).unwrap())
    }

    #[test]
    fn test_attr_lookup_is_case_insensitive() {
        let e = entry("ou=People,dc=example,dc=com")
            .with_attr("objectClass", vec!["top", "organizationalUnit"]);
        assert_eq!(
            e.attr("OBJECTCLASS").unwrap(),
            &["top".to_string(), "organizationalUnit".to_string()]
        );
        assert_eq!(e.object_classes().len(), 2);
    }

    #[test]
    fn test_has_subordinates_prefers_explicit_attr() {
        let e = entry("ou=a,dc=example,dc=com")
            .with_attr(HASSUBORDINATES_ATTR, vec!["TRUE"])
            .with_attr(NUMSUBORDINATES_ATTR, vec!["0"]);
        assert!(e.has_subordinates());
    }

    #[test]
    fn test_has_subordinates_falls_back_to_count() {
        let e = entry("ou=a,dc=example,dc=com").with_attr(NUMSUBORDINATES_ATTR, vec!["3"]);
        assert!(e.has_subordinates());
        assert_eq!(e.num_subordinates(), Some(3));

        let leaf = entry("uid=x,ou=a,dc=example,dc=com");
        assert!(!leaf.has_subordinates());
        assert_eq!(leaf.num_subordinates(), None);
    }
}
