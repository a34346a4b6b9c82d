//! Administrative tasks
//!
//! A [`TaskOperation`] is the work itself; an [`AdminTask`] is the record
//! the coordinator tracks: identity, kind, backend footprint, and the
//! monotonic state machine
//! Pending -> Running -> {FinishedSuccessfully | FinishedWithError}.

use crate::error::{Error, Result};
use crate::progress::ProgressHandle;
use dsadmin_common::events::{TaskKind, TaskState};
use std::collections::BTreeSet;
use std::sync::Mutex;
use uuid::Uuid;

/// A unit of long-running administrative work.
///
/// `run` executes synchronously on the coordinator-assigned worker thread.
/// A task finishes successfully when `run` returns `Ok` with no return
/// code or a return code of 0; a nonzero code or an `Err` ends it in
/// FinishedWithError. Failures never cross the coordinator boundary.
pub trait TaskOperation: Send + 'static {
    fn kind(&self) -> TaskKind;

    /// Human-readable description, used in incompatibility messages and
    /// summaries, e.g. `"Import into backend userRoot"`
    fn description(&self) -> String;

    /// Identifiers of the backends this task will modify
    fn backends(&self) -> BTreeSet<String>;

    /// Perform the work. The optional return value is the exit code when
    /// the task ran an external process.
    fn run(&mut self, progress: &ProgressHandle) -> anyhow::Result<Option<i32>>;

    /// Hook invoked after the task reached a terminal state, for side
    /// effects that must run after completion
    fn post_operation(&mut self, _outcome: TaskState, _progress: &ProgressHandle) {}
}

/// A task as tracked by the coordinator
pub struct AdminTask {
    id: Uuid,
    kind: TaskKind,
    description: String,
    backends: BTreeSet<String>,
    state: Mutex<TaskState>,
    last_error: Mutex<Option<anyhow::Error>>,
    return_code: Mutex<Option<i32>>,
}

impl AdminTask {
    pub fn new(operation: &dyn TaskOperation) -> Self {
        AdminTask {
            id: Uuid::new_v4(),
            kind: operation.kind(),
            description: operation.description(),
            backends: operation.backends(),
            state: Mutex::new(TaskState::Pending),
            last_error: Mutex::new(None),
            return_code: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn backends(&self) -> &BTreeSet<String> {
        &self.backends
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Summarized last execution error, if the task failed
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().as_ref().map(|e| e.to_string())
    }

    /// Exit code of the external process the task launched, if any
    pub fn return_code(&self) -> Option<i32> {
        *self.return_code.lock().unwrap()
    }

    /// Whether `candidate` may start while this task is registered.
    ///
    /// The canonical rule: a Running task rejects any candidate whose
    /// backend set intersects its own; disjoint sets always allow
    /// concurrent execution. A rejection pushes a human-readable reason
    /// naming both tasks.
    pub fn can_launch(&self, candidate: &AdminTask, reasons: &mut Vec<String>) -> bool {
        if self.state() != TaskState::Running {
            return true;
        }
        let shared: Vec<&String> = self.backends.intersection(&candidate.backends).collect();
        if shared.is_empty() {
            return true;
        }
        let shared = shared
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        reasons.push(format!(
            "{} cannot be launched: {} is running and both operate on backend(s) {}",
            candidate.description, self.description, shared
        ));
        false
    }

    /// Pending -> Running. Any other source state is an error.
    pub(crate) fn transition_to_running(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if *state != TaskState::Pending {
            return Err(Error::InvalidState(format!(
                "cannot launch task in state \"{}\"",
                state
            )));
        }
        *state = TaskState::Running;
        Ok(())
    }

    /// Running -> terminal. No transition leaves a terminal state.
    pub(crate) fn finish(&self, outcome: TaskState, error: Option<anyhow::Error>, code: Option<i32>) {
        debug_assert!(outcome.is_terminal());
        let mut state = self.state.lock().unwrap();
        if state.is_terminal() {
            return;
        }
        *state = outcome;
        drop(state);
        *self.last_error.lock().unwrap() = error;
        *self.return_code.lock().unwrap() = code;
    }
}
