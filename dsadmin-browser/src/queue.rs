//! Entry Fetch Queue
//!
//! Decouples LDAP I/O latency from model mutation and bounds concurrency:
//! a fixed pool of worker threads drains fetch requests in FIFO order
//! across distinct nodes, while per-node ordering stays serialized (two
//! fetches for the same node never run concurrently).
//!
//! Queue semantics:
//! - a pending (not yet started) request for a node is replaced by a newer
//!   request for the same node (latest wins);
//! - a request for a node whose fetch is currently executing queues behind
//!   it and runs after the in-flight fetch completes, so the final model
//!   state reflects the most recent request, not a stale race.

use crate::error::{Error, Result};
use dsadmin_common::dn::Dn;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// What a fetch is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Validate a newly added top-level node and load its children
    SeedSuffix,

    /// Load (or reload) the children of an existing node
    Expand,
}

/// One unit of fetch work
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Queue-assigned sequence number (ordering/diagnostics)
    pub seq: u64,

    /// Target node
    pub dn: Dn,

    pub kind: FetchKind,

    /// Effective search filter at enqueue time
    pub filter: String,

    /// Maximum number of children to materialize
    pub size_limit: usize,

    /// Connection generation this request is bound to; results from an
    /// older generation are discarded after a connection swap
    pub generation: u64,
}

/// Executes fetches and receives queue activity transitions.
///
/// Implemented by the browser controller; `execute` may return follow-up
/// requests (automatic expansion) which the worker re-enqueues.
pub trait FetchHandler: Send + Sync {
    fn execute(&self, request: &FetchRequest) -> Vec<FetchRequest>;

    /// The queue went from idle to busy. Called before the triggering
    /// request becomes runnable, so the notification orders before any
    /// resulting model mutation.
    fn queue_became_active(&self);

    /// The queue drained (no queued and no executing requests left)
    fn queue_drained(&self);
}

/// Shared state between submitters and workers
struct SharedQueueState {
    pending: Mutex<PendingState>,
    work_available: Condvar,
    stop_flag: AtomicBool,
}

struct PendingState {
    /// FIFO across distinct nodes
    queue: VecDeque<FetchRequest>,

    /// Nodes with a fetch currently executing
    executing: HashSet<Dn>,
}

/// Fixed-size pool of fetch worker threads
pub struct FetchQueue {
    state: Arc<SharedQueueState>,
    handler: Arc<dyn FetchHandler>,
    threads: Vec<JoinHandle<()>>,
    next_seq: AtomicU64,
}

impl FetchQueue {
    /// Create the queue and start `worker_count` threads (minimum 1)
    pub fn new(worker_count: usize, handler: Arc<dyn FetchHandler>) -> Self {
        let state = Arc::new(SharedQueueState {
            pending: Mutex::new(PendingState {
                queue: VecDeque::new(),
                executing: HashSet::new(),
            }),
            work_available: Condvar::new(),
            stop_flag: AtomicBool::new(false),
        });

        let worker_count = worker_count.max(1);
        let mut threads = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let state_clone = Arc::clone(&state);
            let handler_clone = Arc::clone(&handler);
            threads.push(thread::spawn(move || {
                Self::worker_loop(worker_id, state_clone, handler_clone);
            }));
        }

        info!(workers = worker_count, "fetch queue started");

        Self {
            state,
            handler,
            threads,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Submit a fetch request
    pub fn submit(&self, mut request: FetchRequest) -> Result<()> {
        if self.state.stop_flag.load(Ordering::Relaxed) {
            return Err(Error::Queue("fetch queue is shutting down".to_string()));
        }
        request.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        {
            let mut pending = self.state.pending.lock().unwrap();
            let was_idle = pending.queue.is_empty() && pending.executing.is_empty();
            if was_idle {
                self.handler.queue_became_active();
            }
            Self::insert_request(&mut pending, request);
        }
        self.state.work_available.notify_one();
        Ok(())
    }

    /// Replace a queued request for the same node in place (latest wins),
    /// or append.
    fn insert_request(pending: &mut PendingState, request: FetchRequest) {
        if let Some(existing) = pending.queue.iter_mut().find(|r| r.dn == request.dn) {
            debug!(dn = %request.dn, superseded = existing.seq, seq = request.seq,
                "queued fetch request superseded");
            *existing = request;
        } else {
            pending.queue.push_back(request);
        }
    }

    /// Discard all queued-but-not-started requests. In-flight fetches are
    /// unaffected; their results are discarded by the handler's
    /// node-still-present / generation checks.
    pub fn cancel_pending(&self) {
        let mut pending = self.state.pending.lock().unwrap();
        let dropped = pending.queue.len();
        pending.queue.clear();
        if dropped > 0 {
            debug!(dropped, "cancelled pending fetch requests");
            if pending.executing.is_empty() {
                self.handler.queue_drained();
            }
        }
    }

    /// Number of queued (not yet started) requests
    pub fn queue_len(&self) -> usize {
        self.state.pending.lock().unwrap().queue.len()
    }

    /// True when nothing is queued and nothing is executing
    pub fn is_idle(&self) -> bool {
        let pending = self.state.pending.lock().unwrap();
        pending.queue.is_empty() && pending.executing.is_empty()
    }

    fn worker_loop(worker_id: usize, state: Arc<SharedQueueState>, handler: Arc<dyn FetchHandler>) {
        debug!(worker_id, "fetch worker started");

        loop {
            let request = {
                let mut pending = state.pending.lock().unwrap();
                loop {
                    if state.stop_flag.load(Ordering::Relaxed) {
                        debug!(worker_id, "fetch worker received shutdown signal");
                        return;
                    }

                    // First queued request whose node is not already being
                    // fetched; per-node ordering stays serialized.
                    let PendingState { queue, executing } = &mut *pending;
                    if let Some(pos) = queue.iter().position(|r| !executing.contains(&r.dn)) {
                        let request = queue.remove(pos).unwrap();
                        executing.insert(request.dn.clone());
                        break request;
                    }

                    pending = state.work_available.wait(pending).unwrap();
                }
            };

            debug!(worker_id, dn = %request.dn, seq = request.seq, "fetch starting");
            let followups = handler.execute(&request);
            debug!(worker_id, dn = %request.dn, seq = request.seq, "fetch finished");

            {
                let mut pending = state.pending.lock().unwrap();
                pending.executing.remove(&request.dn);
                for followup in followups {
                    Self::insert_request(&mut pending, followup);
                }
                if pending.queue.is_empty() && pending.executing.is_empty() {
                    handler.queue_drained();
                }
            }
            // Wake everyone: a request queued behind this node may now run
            state.work_available.notify_all();
        }
    }

    /// Stop the workers and join them
    pub fn shutdown(self) {
        info!("shutting down fetch queue");
        self.state.stop_flag.store(true, Ordering::Relaxed);
        self.state.work_available.notify_all();

        for (idx, handle) in self.threads.into_iter().enumerate() {
            if handle.join().is_err() {
                tracing::error!(worker_id = idx, "fetch worker panicked");
            }
        }
        info!("fetch queue shut down");
    }
}
