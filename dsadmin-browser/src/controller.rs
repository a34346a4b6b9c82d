//! Browser Controller
//!
//! The single coordination point between filter/base-DN state, the Entry
//! Fetch Queue and the Directory Node Model. UI code (out of scope) calls
//! the operations here; fetch workers call back into the controller
//! through the [`FetchHandler`] implementation to run searches and apply
//! their results.

use crate::error::{Error, Result};
use crate::model::TreeModel;
use crate::node::{ContainerRules, DirectoryNode};
use crate::queue::{FetchHandler, FetchKind, FetchQueue, FetchRequest};
use dsadmin_common::config::BrowserSettings;
use dsadmin_common::dn::Dn;
use dsadmin_common::events::{BrowserEvent, EventBus, TreeEvent};
use dsadmin_common::ldap::{ConnectionPool, LdapError, SearchScope, ALL_OBJECTS_FILTER};
use dsadmin_common::server::ServerDescriptor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Browser event bus capacity
const EVENT_CAPACITY: usize = 1000;

/// Runtime options of the controller.
///
/// An explicit configuration struct handed in at construction; the
/// setters on [`BrowserController`] adjust it for subsequent fetches only
/// (already-expanded nodes keep their children until refreshed).
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Effective search filter applied to every fetch
    pub filter: String,

    /// Only materialize container children
    pub show_container_only: bool,

    /// Object classes treated as containers
    pub container_classes: Vec<String>,

    /// Maximum number of children per node; exceeding it truncates the
    /// fetch and fires SizeLimitReached instead of failing
    pub max_children: usize,

    /// Expand a fetched node's single container child automatically
    pub automatic_expand: bool,

    /// Fixed number of fetch worker threads
    pub fetch_workers: usize,
}

impl From<&BrowserSettings> for BrowserOptions {
    fn from(settings: &BrowserSettings) -> Self {
        BrowserOptions {
            filter: settings.filter.clone(),
            show_container_only: settings.show_container_only,
            container_classes: settings.container_classes.clone(),
            max_children: settings.max_children,
            automatic_expand: settings.automatic_expand,
            fetch_workers: settings.fetch_workers,
        }
    }
}

impl Default for BrowserOptions {
    fn default() -> Self {
        BrowserOptions::from(&BrowserSettings::default())
    }
}

/// State shared between the controller facade and the fetch workers
struct ControllerShared {
    model: Arc<TreeModel>,
    events: EventBus<BrowserEvent>,
    pool: RwLock<Arc<dyn ConnectionPool>>,
    options: RwLock<BrowserOptions>,

    /// Bumped on every connection swap; fetch results carrying an older
    /// generation are abandoned, never applied against the new connection
    generation: AtomicU64,
}

impl ControllerShared {
    fn make_request(&self, dn: Dn, kind: FetchKind) -> FetchRequest {
        let options = self.options.read().unwrap();
        FetchRequest {
            seq: 0,
            dn,
            kind,
            filter: options.filter.clone(),
            size_limit: options.max_children,
            generation: self.generation.load(Ordering::Acquire),
        }
    }

    /// Base-scope read validating that an entry exists
    fn validate_base(&self, dn: &Dn) -> std::result::Result<(), LdapError> {
        let pool = self.pool.read().unwrap().clone();
        let mut conn = pool.acquire()?;
        conn.search(dn, SearchScope::Base, ALL_OBJECTS_FILTER, 1)?;
        Ok(())
    }

    /// Run the LDAP side of a fetch and translate the result into child
    /// descriptors, applying container rules and the size cap.
    fn run_fetch(
        &self,
        request: &FetchRequest,
    ) -> std::result::Result<(Vec<DirectoryNode>, bool), LdapError> {
        let pool = self.pool.read().unwrap().clone();
        let mut conn = pool.acquire()?;

        // Seeding validates the base entry first so a vanished suffix is
        // reported as NoSuchObject rather than as zero children
        if request.kind == FetchKind::SeedSuffix {
            conn.search(&request.dn, SearchScope::Base, ALL_OBJECTS_FILTER, 1)?;
        }

        let outcome = conn.search(
            &request.dn,
            SearchScope::OneLevel,
            &request.filter,
            request.size_limit,
        )?;

        let (rules, show_container_only) = {
            let options = self.options.read().unwrap();
            (
                ContainerRules::new(&options.container_classes),
                options.show_container_only,
            )
        };

        let mut children: Vec<DirectoryNode> = outcome
            .entries
            .iter()
            .map(|entry| DirectoryNode::from_entry(entry, &rules))
            .collect();
        if show_container_only {
            children.retain(|c| c.is_container);
        }

        let mut truncated = outcome.truncated;
        if request.size_limit > 0 && children.len() > request.size_limit {
            children.truncate(request.size_limit);
            truncated = true;
        }

        Ok((children, truncated))
    }
}

impl FetchHandler for ControllerShared {
    fn execute(&self, request: &FetchRequest) -> Vec<FetchRequest> {
        if request.generation != self.generation.load(Ordering::Acquire) {
            debug!(dn = %request.dn, "discarding fetch bound to a replaced connection");
            return Vec::new();
        }
        if !self.model.contains(&request.dn) {
            debug!(dn = %request.dn, "discarding fetch for a removed node");
            return Vec::new();
        }

        match self.run_fetch(request) {
            Err(e) => {
                warn!(dn = %request.dn, error = %e, "fetch failed");
                self.model.mark_fetch_error(&request.dn, e.to_string());
                Vec::new()
            }
            Ok((children, truncated)) => {
                // Re-check before mutating: the node may have been removed
                // or the connection swapped while the search ran
                if request.generation != self.generation.load(Ordering::Acquire) {
                    debug!(dn = %request.dn, "discarding result from a replaced connection");
                    return Vec::new();
                }

                let child_count = children.len();
                let single_container = match children.as_slice() {
                    [only] if only.is_container => Some(only.dn.clone()),
                    _ => None,
                };

                if !self.model.apply_expansion(&request.dn, children) {
                    debug!(dn = %request.dn, "discarding result for a removed node");
                    return Vec::new();
                }
                debug!(dn = %request.dn, children = child_count, truncated, "expansion applied");

                if truncated {
                    self.events.emit_lossy(BrowserEvent::SizeLimitReached {
                        dn: request.dn.clone(),
                        timestamp: chrono::Utc::now(),
                    });
                }

                let automatic_expand = self.options.read().unwrap().automatic_expand;
                match (automatic_expand, single_container) {
                    (true, Some(child_dn)) => {
                        debug!(dn = %child_dn, "automatically expanding single container child");
                        vec![self.make_request(child_dn, FetchKind::Expand)]
                    }
                    _ => Vec::new(),
                }
            }
        }
    }

    fn queue_became_active(&self) {
        self.events.emit_lossy(BrowserEvent::UpdateStart {
            timestamp: chrono::Utc::now(),
        });
    }

    fn queue_drained(&self) {
        self.events.emit_lossy(BrowserEvent::UpdateEnd {
            timestamp: chrono::Utc::now(),
        });
    }
}

/// The LDAP entry browser controller
pub struct BrowserController {
    shared: Arc<ControllerShared>,
    queue: FetchQueue,
}

impl BrowserController {
    /// Create a controller over `model`, fetching through `pool`
    pub fn new(
        model: Arc<TreeModel>,
        pool: Arc<dyn ConnectionPool>,
        options: BrowserOptions,
    ) -> Self {
        let workers = options.fetch_workers;
        let shared = Arc::new(ControllerShared {
            model,
            events: EventBus::new(EVENT_CAPACITY),
            pool: RwLock::new(pool),
            options: RwLock::new(options),
            generation: AtomicU64::new(0),
        });
        let queue = FetchQueue::new(workers, shared.clone());
        info!("browser controller started");
        BrowserController { shared, queue }
    }

    /// Subscribe to browser notifications
    pub fn events(&self) -> broadcast::Receiver<BrowserEvent> {
        self.shared.events.subscribe()
    }

    /// Subscribe to tree-structural-change notifications
    pub fn tree_events(&self) -> broadcast::Receiver<TreeEvent> {
        self.shared.model.subscribe()
    }

    /// The model this controller mutates
    pub fn model(&self) -> &Arc<TreeModel> {
        &self.shared.model
    }

    /// Add a suffix node under the root and seed it. Re-adding an existing
    /// suffix is a no-op.
    pub fn add_suffix(&self, dn: Dn) -> Result<()> {
        if dn.is_root() {
            return Err(Error::NodeNotFound("the root DN cannot be a suffix".to_string()));
        }
        if !self.shared.model.add_under_root(DirectoryNode::suffix(dn.clone())) {
            debug!(dn = %dn, "suffix already present");
            return Ok(());
        }
        self.queue.submit(self.shared.make_request(dn, FetchKind::SeedSuffix))
    }

    /// Add a plain (non-suffix) node under the root and seed it
    pub fn add_node_under_root(&self, dn: Dn) -> Result<()> {
        if dn.is_root() {
            return Err(Error::NodeNotFound("the root DN cannot be added".to_string()));
        }
        if !self.shared.model.add_under_root(DirectoryNode::plain(dn.clone())) {
            debug!(dn = %dn, "node already present under root");
            return Ok(());
        }
        self.queue.submit(self.shared.make_request(dn, FetchKind::SeedSuffix))
    }

    /// Fetch (or re-fetch) the children of a node
    pub fn expand_node(&self, dn: &Dn) -> Result<()> {
        if !self.shared.model.contains(dn) {
            return Err(Error::NodeNotFound(dn.to_string()));
        }
        self.queue
            .submit(self.shared.make_request(dn.clone(), FetchKind::Expand))
    }

    /// Re-fetch a node's children with the current filter
    pub fn refresh_node(&self, dn: &Dn) -> Result<()> {
        self.expand_node(dn)
    }

    /// Detach a node and its subtree. Any outstanding fetch for it becomes
    /// a no-op on completion. Returns the nearest surviving ancestor.
    pub fn remove_node(&self, dn: &Dn) -> Result<Dn> {
        self.shared
            .model
            .remove_node(dn)
            .ok_or_else(|| Error::NodeNotFound(dn.to_string()))
    }

    /// Clear everything under the root (base-DN or global filter change).
    /// Queued fetches are dropped; in-flight results will be discarded on
    /// arrival.
    pub fn remove_all_under_root(&self) {
        self.queue.cancel_pending();
        self.shared.model.remove_all_under_root();
    }

    /// Change the search filter applied to subsequent fetches.
    /// Already-expanded nodes are untouched until their next refresh.
    pub fn set_filter(&self, filter: impl Into<String>) {
        self.shared.options.write().unwrap().filter = filter.into();
    }

    /// Cap the number of children materialized per node
    pub fn set_max_children(&self, max_children: usize) {
        self.shared.options.write().unwrap().max_children = max_children;
    }

    pub fn set_automatic_expand(&self, automatic_expand: bool) {
        self.shared.options.write().unwrap().automatic_expand = automatic_expand;
    }

    pub fn set_show_container_only(&self, show_container_only: bool) {
        self.shared.options.write().unwrap().show_container_only = show_container_only;
    }

    pub fn set_container_classes(&self, container_classes: Vec<String>) {
        self.shared.options.write().unwrap().container_classes = container_classes;
    }

    /// Snapshot of the current options
    pub fn options(&self) -> BrowserOptions {
        self.shared.options.read().unwrap().clone()
    }

    /// Linear search by DN among a node's direct children; `None` when
    /// absent. Used to avoid duplicate insertion.
    pub fn find_child_node(&self, parent: &Dn, child: &Dn) -> Option<usize> {
        self.shared.model.find_child_index(parent, child)
    }

    /// Replace the underlying connection pool (e.g. after
    /// re-authentication).
    ///
    /// In-flight and queued fetches bound to the old connection are
    /// abandoned. Every suffix is re-validated against the new connection
    /// and the server's backend inventory: vanished suffixes are removed,
    /// survivors are re-seeded.
    pub fn set_connection_pool(
        &self,
        pool: Arc<dyn ConnectionPool>,
        server: &ServerDescriptor,
    ) -> Result<()> {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.queue.cancel_pending();
        *self.shared.pool.write().unwrap() = pool;
        info!(generation, host = %server.hostname, "connection replaced, revalidating suffixes");

        let inventory = server.suffixes();
        for suffix in self.shared.model.suffixes() {
            if !inventory.contains(&suffix) {
                info!(dn = %suffix, "suffix no longer served, removing");
                self.shared.model.remove_node(&suffix);
                continue;
            }
            match self.shared.validate_base(&suffix) {
                Ok(()) => {
                    self.queue
                        .submit(self.shared.make_request(suffix, FetchKind::SeedSuffix))?;
                }
                Err(LdapError::NoSuchObject(_)) => {
                    warn!(dn = %suffix, "suffix gone on new connection, removing");
                    self.shared.model.remove_node(&suffix);
                }
                Err(e) => {
                    warn!(dn = %suffix, error = %e, "suffix validation failed");
                    self.shared.model.mark_fetch_error(&suffix, e.to_string());
                }
            }
        }
        Ok(())
    }

    /// Number of queued (not yet started) fetch requests
    pub fn queue_len(&self) -> usize {
        self.queue.queue_len()
    }

    /// True when no fetch is queued or executing
    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    /// Stop the fetch workers and join them
    pub fn shutdown(self) {
        self.queue.shutdown();
    }
}
