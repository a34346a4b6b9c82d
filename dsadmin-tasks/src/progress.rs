//! Task progress streaming
//!
//! A [`ProgressHandle`] is the one channel a running task writes through:
//! console output lines, state transitions and the final summary, each
//! delivered both on the coordinator's broadcast bus and, when the caller
//! supplied one, on a dedicated mpsc sink (the progress dialog of the
//! launching panel).

use dsadmin_common::events::{EventBus, TaskEvent, TaskKind, TaskState};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Write side of a task's progress stream
#[derive(Clone)]
pub struct ProgressHandle {
    task_id: Uuid,
    kind: TaskKind,
    bus: EventBus<TaskEvent>,
    sink: Option<mpsc::UnboundedSender<TaskEvent>>,
}

impl ProgressHandle {
    pub(crate) fn new(
        task_id: Uuid,
        kind: TaskKind,
        bus: EventBus<TaskEvent>,
        sink: Option<mpsc::UnboundedSender<TaskEvent>>,
    ) -> Self {
        ProgressHandle {
            task_id,
            kind,
            bus,
            sink,
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    fn emit(&self, event: TaskEvent) {
        if let Some(sink) = &self.sink {
            let _ = sink.send(event.clone());
        }
        self.bus.emit_lossy(event);
    }

    /// Append one line of console output
    pub fn log_line(&self, line: impl Into<String>) {
        self.emit(TaskEvent::OutputLine {
            task_id: self.task_id,
            line: line.into(),
            timestamp: chrono::Utc::now(),
        });
    }

    /// Post-operation side effect: the given backend needs its indexes
    /// rebuilt before it can serve searches again
    pub fn index_rebuild_required(&self, backend_id: impl Into<String>) {
        self.emit(TaskEvent::IndexRebuildRequired {
            backend_id: backend_id.into(),
            timestamp: chrono::Utc::now(),
        });
    }

    pub(crate) fn state_changed(&self, state: TaskState) {
        self.emit(TaskEvent::StateChanged {
            task_id: self.task_id,
            kind: self.kind,
            state,
            timestamp: chrono::Utc::now(),
        });
    }

    pub(crate) fn completed(&self, state: TaskState, summary: String, return_code: Option<i32>) {
        self.emit(TaskEvent::Completed {
            task_id: self.task_id,
            kind: self.kind,
            state,
            summary,
            return_code,
            timestamp: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_reaches_bus_and_sink() {
        let bus: EventBus<TaskEvent> = EventBus::new(16);
        let mut bus_rx = bus.subscribe();
        let (tx, mut sink_rx) = mpsc::unbounded_channel();

        let handle = ProgressHandle::new(Uuid::new_v4(), TaskKind::Backup, bus, Some(tx));
        handle.log_line("backing up userRoot");

        for received in [bus_rx.recv().await.unwrap(), sink_rx.recv().await.unwrap()] {
            match received {
                TaskEvent::OutputLine { line, .. } => assert_eq!(line, "backing up userRoot"),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_progress_without_subscribers_does_not_panic() {
        let handle = ProgressHandle::new(Uuid::new_v4(), TaskKind::Export, EventBus::new(16), None);
        handle.log_line("nobody is listening");
    }
}
