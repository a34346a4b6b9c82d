//! Task Coordinator
//!
//! Holds the set of tracked tasks. Launching checks the candidate against
//! every registered task under a single registry mutex, so two tasks that
//! touch the same backend can never both slip past the compatibility
//! check: check-all and register are one atomic step, and registration
//! happens before the task transitions to Running.

use crate::error::{Error, Result};
use crate::progress::ProgressHandle;
use crate::task::{AdminTask, TaskOperation};
use dsadmin_common::events::{EventBus, TaskEvent, TaskKind, TaskState};
use dsadmin_common::server::{ServerDescriptor, ServerStatus};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

/// Coordinates launch, exclusivity and execution of administrative tasks
pub struct TaskCoordinator {
    registry: Mutex<Vec<Arc<AdminTask>>>,
    events: EventBus<TaskEvent>,
    server: RwLock<ServerDescriptor>,
}

impl TaskCoordinator {
    pub fn new(event_capacity: usize, server: ServerDescriptor) -> Self {
        TaskCoordinator {
            registry: Mutex::new(Vec::new()),
            events: EventBus::new(event_capacity),
            server: RwLock::new(server),
        }
    }

    /// Subscribe to task notifications
    pub fn events(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Current snapshot of the administered server
    pub fn server_descriptor(&self) -> ServerDescriptor {
        self.server.read().unwrap().clone()
    }

    pub fn set_server_descriptor(&self, server: ServerDescriptor) {
        *self.server.write().unwrap() = server;
    }

    /// All tracked tasks (terminal ones included until pruned)
    pub fn tasks(&self) -> Vec<Arc<AdminTask>> {
        self.registry.lock().unwrap().clone()
    }

    /// Currently running tasks
    pub fn running_tasks(&self) -> Vec<Arc<AdminTask>> {
        self.registry
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.is_running())
            .cloned()
            .collect()
    }

    /// Drop terminal tasks from the registry
    pub fn prune_terminal(&self) {
        self.registry
            .lock()
            .unwrap()
            .retain(|t| !t.state().is_terminal());
    }

    /// Launch an operation.
    ///
    /// Pre-flight checks run before any work starts: the server lifecycle
    /// gate, then the compatibility check against every registered task.
    /// Any incompatibility refuses the launch with the collected reasons
    /// and the task never transitions to Running. Otherwise the task is
    /// registered, transitioned to Running and executed on a dedicated
    /// worker thread, streaming progress to the coordinator bus and the
    /// optional caller-supplied sink.
    pub fn launch(
        &self,
        mut operation: Box<dyn TaskOperation>,
        sink: Option<mpsc::UnboundedSender<TaskEvent>>,
    ) -> Result<Arc<AdminTask>> {
        self.check_server_state(operation.kind())?;

        let task = Arc::new(AdminTask::new(operation.as_ref()));
        let progress = ProgressHandle::new(task.id(), task.kind(), self.events.clone(), sink);

        {
            let mut registry = self.registry.lock().unwrap();
            registry.retain(|t| !t.state().is_terminal());

            let mut reasons = Vec::new();
            for registered in registry.iter() {
                registered.can_launch(&task, &mut reasons);
            }
            if !reasons.is_empty() {
                warn!(task = %task.description(), ?reasons, "task launch refused");
                return Err(Error::Incompatible(reasons));
            }

            // Register before Running so a concurrent launch sees this
            // task during its own compatibility check
            registry.push(task.clone());
            task.transition_to_running()?;
        }

        info!(task_id = %task.id(), task = %task.description(), "task launched");
        progress.state_changed(TaskState::Running);

        let worker_task = task.clone();
        let worker_progress = progress;
        std::thread::spawn(move || {
            Self::run_task(&mut operation, &worker_task, &worker_progress);
        });

        Ok(task)
    }

    /// Execute the operation body, capturing every failure (including
    /// panics) into task state; nothing escapes to the caller.
    fn run_task(
        operation: &mut Box<dyn TaskOperation>,
        task: &Arc<AdminTask>,
        progress: &ProgressHandle,
    ) {
        let result = catch_unwind(AssertUnwindSafe(|| operation.run(progress)));

        let (outcome, summary, return_code) = match result {
            Ok(Ok(code)) if code.unwrap_or(0) == 0 => {
                task.finish(TaskState::FinishedSuccessfully, None, code);
                (
                    TaskState::FinishedSuccessfully,
                    format!("{} completed successfully", task.description()),
                    code,
                )
            }
            Ok(Ok(code)) => {
                let summary = format!(
                    "{} failed with return code {}",
                    task.description(),
                    code.unwrap_or(-1)
                );
                task.finish(
                    TaskState::FinishedWithError,
                    Some(anyhow::anyhow!(summary.clone())),
                    code,
                );
                (TaskState::FinishedWithError, summary, code)
            }
            Ok(Err(e)) => {
                let summary = format!("{} failed: {}", task.description(), e);
                task.finish(TaskState::FinishedWithError, Some(e), None);
                (TaskState::FinishedWithError, summary, None)
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(task_id = %task.id(), %message, "task panicked");
                let summary = format!("{} failed: {}", task.description(), message);
                task.finish(
                    TaskState::FinishedWithError,
                    Some(anyhow::anyhow!("task panicked: {}", message)),
                    None,
                );
                (TaskState::FinishedWithError, summary, None)
            }
        };

        info!(task_id = %task.id(), state = %outcome, "task finished");
        progress.state_changed(outcome);
        progress.completed(outcome, summary, return_code);

        // Post-operation side effects run after the terminal state is
        // visible; a panicking hook must not take the worker down with it
        if catch_unwind(AssertUnwindSafe(|| {
            operation.post_operation(outcome, progress)
        }))
        .is_err()
        {
            error!(task_id = %task.id(), "post-operation hook panicked");
        }
    }

    /// Lifecycle tasks only make sense in the matching server state
    fn check_server_state(&self, kind: TaskKind) -> Result<()> {
        let status = self.server.read().unwrap().status;
        match (kind, status) {
            (TaskKind::StartServer, ServerStatus::Started) => Err(Error::ServerState(
                "the server is already started".to_string(),
            )),
            (TaskKind::StopServer, ServerStatus::Stopped) => Err(Error::ServerState(
                "the server is already stopped".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
