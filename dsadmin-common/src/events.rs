//! Event types and the event bus
//!
//! The engines communicate with their (out of scope) observers through
//! typed broadcast channels instead of listener interfaces:
//! - **EventBus** (tokio::broadcast): one-to-many event fan-out
//! - **mpsc sinks**: caller-supplied progress streams for tasks
//! - **Shared state** (`Arc<RwLock<T>>`): read-heavy access
//!
//! Each engine owns a bus of its own event type: `BrowserEvent` for the
//! browser controller, `TreeEvent` for the node model, `TaskEvent` for the
//! task coordinator.

use crate::dn::Dn;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Browser controller notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BrowserEvent {
    /// The fetch queue went from idle to busy; fired before any child
    /// mutation of the update it announces
    UpdateStart {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The fetch queue drained; fired after all mutations of the update
    UpdateEnd {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A fetch was truncated at the configured maximum number of children
    SizeLimitReached {
        dn: Dn,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Tree-structural-change notifications from the node model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TreeEvent {
    /// Nodes were inserted under `parent`
    NodesInserted {
        parent: Dn,
        count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A node's own attributes changed (e.g. an error marker was attached)
    NodeChanged {
        dn: Dn,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The subtree under `dn` changed structurally; `dn` is the nearest
    /// surviving node (the root DN when everything below the root changed)
    StructureChanged {
        dn: Dn,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Administrative task kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    Import,
    Export,
    Backup,
    Restore,
    NewIndex,
    ModifyIndex,
    DeleteIndex,
    RebuildIndex,
    NewSchemaElement,
    DeleteSchemaElement,
    StartServer,
    StopServer,
    RestartServer,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskKind::Import => "Import",
            TaskKind::Export => "Export",
            TaskKind::Backup => "Backup",
            TaskKind::Restore => "Restore",
            TaskKind::NewIndex => "New Index",
            TaskKind::ModifyIndex => "Modify Index",
            TaskKind::DeleteIndex => "Delete Index",
            TaskKind::RebuildIndex => "Rebuild Index",
            TaskKind::NewSchemaElement => "New Schema Element",
            TaskKind::DeleteSchemaElement => "Delete Schema Element",
            TaskKind::StartServer => "Start Server",
            TaskKind::StopServer => "Stop Server",
            TaskKind::RestartServer => "Restart Server",
        };
        write!(f, "{}", name)
    }
}

/// Administrative task lifecycle state.
///
/// Transitions are monotonic: Pending, then Running, then exactly one
/// terminal state. A task never re-enters Running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    FinishedSuccessfully,
    FinishedWithError,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::FinishedSuccessfully | TaskState::FinishedWithError
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::FinishedSuccessfully => "finished successfully",
            TaskState::FinishedWithError => "finished with error",
        };
        write!(f, "{}", name)
    }
}

/// Task coordinator notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskEvent {
    /// A task changed state
    StateChanged {
        task_id: Uuid,
        kind: TaskKind,
        state: TaskState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One line of console output from a running task
    OutputLine {
        task_id: Uuid,
        line: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A task reached a terminal state; `summary` is keyed by that state
    Completed {
        task_id: Uuid,
        kind: TaskKind,
        state: TaskState,
        summary: String,
        return_code: Option<i32>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Post-operation side effect: the backend's indexes must be rebuilt
    /// before it can serve searches again
    IndexRebuildRequired {
        backend_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast event bus.
///
/// Wraps tokio::broadcast, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// Generic over the event type so each engine gets its own typed channel.
#[derive(Clone)]
pub struct EventBus<E> {
    tx: broadcast::Sender<E>,
    capacity: usize,
}

impl<E: Clone> EventBus<E> {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` if no subscriber is
    /// listening.
    pub fn emit(&self, event: E) -> Result<usize, broadcast::error::SendError<E>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    pub fn emit_lossy(&self, event: E) {
        let _ = self.tx.send(event);
    }

    /// Number of currently attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eventbus_new() {
        let bus: EventBus<BrowserEvent> = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_emit_no_subscribers() {
        let bus: EventBus<BrowserEvent> = EventBus::new(100);
        let event = BrowserEvent::UpdateStart {
            timestamp: chrono::Utc::now(),
        };

        assert!(bus.emit(event.clone()).is_err());
        // Lossy emission never fails
        bus.emit_lossy(event);
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus: EventBus<TreeEvent> = EventBus::new(100);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(TreeEvent::StructureChanged {
            dn: Dn::root(),
            timestamp: chrono::Utc::now(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            TreeEvent::StructureChanged { dn, .. } => assert!(dn.is_root()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_task_state_terminal() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::FinishedSuccessfully.is_terminal());
        assert!(TaskState::FinishedWithError.is_terminal());
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let event = TaskEvent::Completed {
            task_id: Uuid::new_v4(),
            kind: TaskKind::Import,
            state: TaskState::FinishedSuccessfully,
            summary: "Import completed successfully".to_string(),
            return_code: Some(0),
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Completed\""));
        let back: TaskEvent = serde_json::from_str(&json).unwrap();
        match back {
            TaskEvent::Completed { state, .. } => {
                assert_eq!(state, TaskState::FinishedSuccessfully)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
