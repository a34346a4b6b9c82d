//! Directory Node Model
//!
//! A mutable tree of [`DirectoryNode`]s under a synthetic root (the empty
//! DN). All mutation goes through [`TreeModel`], which serializes writers
//! behind one lock and emits structural-change events only after the model
//! is internally consistent again.

use crate::node::{DirectoryNode, ExpansionState};
use dsadmin_common::dn::Dn;
use dsadmin_common::events::{EventBus, TreeEvent};
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

/// The tree itself. Only [`TreeModel`] touches it.
#[derive(Debug, Default)]
struct DirectoryTree {
    /// Children of the synthetic root, ordered by normalized DN
    root_children: Vec<DirectoryNode>,
}

impl DirectoryTree {
    fn node(&self, dn: &Dn) -> Option<&DirectoryNode> {
        self.root_children.iter().find_map(|s| node_in(s, dn))
    }

    fn node_mut(&mut self, dn: &Dn) -> Option<&mut DirectoryNode> {
        self.root_children
            .iter_mut()
            .find_map(|s| node_mut_in(s, dn))
    }

    /// Insert a node under the root, keeping DN order. Returns false when
    /// a node with the same DN is already there (idempotent).
    fn add_under_root(&mut self, node: DirectoryNode) -> bool {
        match self
            .root_children
            .binary_search_by(|c| c.dn.cmp(&node.dn))
        {
            Ok(_) => false,
            Err(pos) => {
                self.root_children.insert(pos, node);
                true
            }
        }
    }

    fn remove_all_under_root(&mut self) -> usize {
        let count = self.root_children.len();
        self.root_children.clear();
        count
    }

    /// Replace `dn`'s child list atomically. Children whose DN matches a
    /// still-present DN keep their identity (including any expanded
    /// subtree); their displayed attributes are refreshed from the fetch.
    fn apply_expansion(&mut self, dn: &Dn, fetched: Vec<DirectoryNode>) -> bool {
        let node = match self.node_mut(dn) {
            Some(node) => node,
            None => return false,
        };

        let mut old: Vec<DirectoryNode> = std::mem::take(&mut node.children);
        let mut merged: Vec<DirectoryNode> = Vec::with_capacity(fetched.len());
        for fresh in fetched {
            if merged.iter().any(|c| c.dn == fresh.dn) {
                // Duplicate DN in the fetch result; the first one wins
                continue;
            }
            match old.iter().position(|c| c.dn == fresh.dn) {
                Some(pos) => {
                    let mut kept = old.remove(pos);
                    kept.update_from(&fresh);
                    merged.push(kept);
                }
                None => merged.push(fresh),
            }
        }
        merged.sort_by(|a, b| a.dn.cmp(&b.dn));

        node.children = merged;
        node.expansion = ExpansionState::Expanded;
        node.leaf_known = true;
        node.error = None;
        true
    }

    /// Detach `dn` and its subtree. Returns the DN of the nearest
    /// surviving ancestor (the parent; the root DN for top-level nodes).
    fn remove_node(&mut self, dn: &Dn) -> Option<Dn> {
        if let Some(pos) = self.root_children.iter().position(|c| c.dn == *dn) {
            self.root_children.remove(pos);
            return Some(Dn::root());
        }
        for child in self.root_children.iter_mut() {
            if let Some(parent) = remove_in(child, dn) {
                return Some(parent);
            }
        }
        None
    }

    /// Revert `dn` to Unexpanded with an error marker attached
    fn mark_fetch_error(&mut self, dn: &Dn, summary: String) -> bool {
        match self.node_mut(dn) {
            Some(node) => {
                node.expansion = ExpansionState::Unexpanded;
                node.children.clear();
                node.error = Some(summary);
                true
            }
            None => false,
        }
    }
}

fn node_in<'a>(node: &'a DirectoryNode, dn: &Dn) -> Option<&'a DirectoryNode> {
    if node.dn == *dn {
        return Some(node);
    }
    if !dn.is_descendant_of(&node.dn) {
        return None;
    }
    node.children.iter().find_map(|c| node_in(c, dn))
}

fn node_mut_in<'a>(node: &'a mut DirectoryNode, dn: &Dn) -> Option<&'a mut DirectoryNode> {
    if node.dn == *dn {
        return Some(node);
    }
    if !dn.is_descendant_of(&node.dn) {
        return None;
    }
    node.children.iter_mut().find_map(|c| node_mut_in(c, dn))
}

fn remove_in(node: &mut DirectoryNode, dn: &Dn) -> Option<Dn> {
    if let Some(pos) = node.children.iter().position(|c| c.dn == *dn) {
        node.children.remove(pos);
        return Some(node.dn.clone());
    }
    if dn.is_descendant_of(&node.dn) {
        for child in node.children.iter_mut() {
            if let Some(parent) = remove_in(child, dn) {
                return Some(parent);
            }
        }
    }
    None
}

/// Public handle to the Directory Node Model.
///
/// Mutations take the write lock, and the corresponding event is emitted
/// after the guard is dropped, so observers never see a half-applied
/// mutation.
pub struct TreeModel {
    tree: RwLock<DirectoryTree>,
    events: EventBus<TreeEvent>,
}

impl TreeModel {
    pub fn new(event_capacity: usize) -> Self {
        TreeModel {
            tree: RwLock::new(DirectoryTree::default()),
            events: EventBus::new(event_capacity),
        }
    }

    /// Subscribe to structural-change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    /// Insert a suffix (or plain) node under the root; the node may come
    /// pre-seeded with children. Re-adding an existing DN is a no-op.
    /// Returns whether a node was inserted.
    pub fn add_under_root(&self, node: DirectoryNode) -> bool {
        let dn = node.dn.clone();
        let inserted = {
            let mut tree = self.tree.write().unwrap();
            tree.add_under_root(node)
        };
        if inserted {
            debug!(dn = %dn, "node added under root");
            self.events.emit_lossy(TreeEvent::NodesInserted {
                parent: Dn::root(),
                count: 1,
                timestamp: chrono::Utc::now(),
            });
        }
        inserted
    }

    /// Clear all children of the synthetic root
    pub fn remove_all_under_root(&self) {
        let removed = {
            let mut tree = self.tree.write().unwrap();
            tree.remove_all_under_root()
        };
        if removed > 0 {
            debug!(removed, "cleared all nodes under root");
            self.events.emit_lossy(TreeEvent::StructureChanged {
                dn: Dn::root(),
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Atomically replace `dn`'s children with a fetch result. Returns
    /// false when the node has left the model (the fetch result is then
    /// discarded by the caller).
    pub fn apply_expansion(&self, dn: &Dn, fetched: Vec<DirectoryNode>) -> bool {
        let applied = {
            let mut tree = self.tree.write().unwrap();
            tree.apply_expansion(dn, fetched)
        };
        if applied {
            self.events.emit_lossy(TreeEvent::StructureChanged {
                dn: dn.clone(),
                timestamp: chrono::Utc::now(),
            });
        }
        applied
    }

    /// Detach `dn` and its subtree; one structure-changed event fires for
    /// the nearest surviving ancestor. Returns that ancestor's DN.
    pub fn remove_node(&self, dn: &Dn) -> Option<Dn> {
        let parent = {
            let mut tree = self.tree.write().unwrap();
            tree.remove_node(dn)
        };
        if let Some(parent_dn) = &parent {
            debug!(dn = %dn, "node removed");
            self.events.emit_lossy(TreeEvent::StructureChanged {
                dn: parent_dn.clone(),
                timestamp: chrono::Utc::now(),
            });
        }
        parent
    }

    /// Attach a fetch error marker, reverting the node to Unexpanded
    pub fn mark_fetch_error(&self, dn: &Dn, summary: String) -> bool {
        let marked = {
            let mut tree = self.tree.write().unwrap();
            tree.mark_fetch_error(dn, summary)
        };
        if marked {
            self.events.emit_lossy(TreeEvent::NodeChanged {
                dn: dn.clone(),
                timestamp: chrono::Utc::now(),
            });
        }
        marked
    }

    /// Whether `dn` is currently in the model
    pub fn contains(&self, dn: &Dn) -> bool {
        let tree = self.tree.read().unwrap();
        if dn.is_root() {
            return true;
        }
        tree.node(dn).is_some()
    }

    /// Linear search by DN among `parent`'s direct children; `None` is the
    /// not-found sentinel.
    pub fn find_child_index(&self, parent: &Dn, child: &Dn) -> Option<usize> {
        let tree = self.tree.read().unwrap();
        if parent.is_root() {
            return tree.root_children.iter().position(|c| c.dn == *child);
        }
        tree.node(parent)
            .and_then(|p| p.children.iter().position(|c| c.dn == *child))
    }

    /// Run a closure against a node under the read lock
    pub fn with_node<R>(&self, dn: &Dn, f: impl FnOnce(&DirectoryNode) -> R) -> Option<R> {
        let tree = self.tree.read().unwrap();
        tree.node(dn).map(f)
    }

    /// DNs of the direct children of `parent`
    pub fn child_dns(&self, parent: &Dn) -> Vec<Dn> {
        let tree = self.tree.read().unwrap();
        if parent.is_root() {
            return tree.root_children.iter().map(|c| c.dn.clone()).collect();
        }
        tree.node(parent)
            .map(|p| p.children.iter().map(|c| c.dn.clone()).collect())
            .unwrap_or_default()
    }

    /// DNs of the current top-level suffix nodes
    pub fn suffixes(&self) -> Vec<Dn> {
        let tree = self.tree.read().unwrap();
        tree.root_children.iter().map(|c| c.dn.clone()).collect()
    }

    /// Total number of nodes in the model
    pub fn node_count(&self) -> usize {
        fn count(node: &DirectoryNode) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        let tree = self.tree.read().unwrap();
        tree.root_children.iter().map(count).sum()
    }
}
