//! Directory tree nodes
//!
//! A `DirectoryNode` mirrors one remote entry (or a suffix) in the local
//! tree. Parent identity is carried by the DN itself: a node's DN is
//! always a descendant of its parent's DN, and the synthetic root is the
//! empty DN.

use dsadmin_common::dn::Dn;
use dsadmin_common::entry::SearchEntry;

/// Whether a node's children are known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionState {
    /// Children unknown; displayed with a placeholder
    Unexpanded,

    /// Children reflect the last successful fetch
    Expanded,
}

/// One node of the Directory Node Model
#[derive(Debug, Clone)]
pub struct DirectoryNode {
    /// Entry distinguished name
    pub dn: Dn,

    /// What the tree displays: the full DN for suffixes, the RDN value
    /// otherwise
    pub display_name: String,

    /// Object class values from the last fetch of this entry
    pub object_classes: Vec<String>,

    /// Container/leaf semantics as decided by [`ContainerRules`]
    pub is_container: bool,

    /// True once a fetch told us whether this node has children
    pub leaf_known: bool,

    /// Number of immediate subordinates, if the server reported it
    pub num_subordinates: Option<u64>,

    /// True for top-level naming-context nodes
    pub is_suffix: bool,

    /// Whether children are known
    pub expansion: ExpansionState,

    /// Summarized error of the last failed fetch, if any. A node carrying
    /// an error is always Unexpanded.
    pub error: Option<String>,

    /// Owned children, ordered by normalized DN
    pub children: Vec<DirectoryNode>,
}

impl DirectoryNode {
    /// Create an unexpanded suffix node
    pub fn suffix(dn: Dn) -> Self {
        let display_name = dn.to_string();
        DirectoryNode {
            dn,
            display_name,
            object_classes: Vec::new(),
            is_container: true,
            leaf_known: false,
            num_subordinates: None,
            is_suffix: true,
            expansion: ExpansionState::Unexpanded,
            error: None,
            children: Vec::new(),
        }
    }

    /// Create an unexpanded plain node (added under the root without being
    /// a declared suffix)
    pub fn plain(dn: Dn) -> Self {
        let display_name = dn.rdn_value().unwrap_or_else(|| dn.to_string());
        DirectoryNode {
            dn,
            display_name,
            object_classes: Vec::new(),
            is_container: true,
            leaf_known: false,
            num_subordinates: None,
            is_suffix: false,
            expansion: ExpansionState::Unexpanded,
            error: None,
            children: Vec::new(),
        }
    }

    /// Translate a fetched entry into an unexpanded child node
    pub fn from_entry(entry: &SearchEntry, rules: &ContainerRules) -> Self {
        let display_name = entry
            .dn
            .rdn_value()
            .unwrap_or_else(|| entry.dn.to_string());
        DirectoryNode {
            display_name,
            object_classes: entry.object_classes(),
            is_container: rules.is_container(entry),
            leaf_known: true,
            num_subordinates: entry.num_subordinates(),
            is_suffix: false,
            expansion: ExpansionState::Unexpanded,
            error: None,
            children: Vec::new(),
            dn: entry.dn.clone(),
        }
    }

    /// Copy the attributes of a freshly fetched descriptor onto this node,
    /// keeping identity, expansion state and children intact. Used by the
    /// model when a refresh re-encounters an existing child.
    pub(crate) fn update_from(&mut self, fresh: &DirectoryNode) {
        self.display_name = fresh.display_name.clone();
        self.object_classes = fresh.object_classes.clone();
        self.is_container = fresh.is_container;
        self.leaf_known = fresh.leaf_known;
        self.num_subordinates = fresh.num_subordinates;
    }
}

/// Decides container/leaf semantics for fetched entries
#[derive(Debug, Clone)]
pub struct ContainerRules {
    /// Object classes treated as containers regardless of reported
    /// subordinates (lowercased)
    container_classes: Vec<String>,
}

impl ContainerRules {
    pub fn new(container_classes: &[String]) -> Self {
        ContainerRules {
            container_classes: container_classes.iter().map(|c| c.to_lowercase()).collect(),
        }
    }

    /// An entry is a container if the server reports subordinates or one
    /// of its object classes is configured as a container class.
    pub fn is_container(&self, entry: &SearchEntry) -> bool {
        if entry.has_subordinates() {
            return true;
        }
        entry
            .object_classes()
            .iter()
            .any(|oc| self.container_classes.contains(&oc.to_lowercase()))
    }
}
