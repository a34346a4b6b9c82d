//! Concrete administrative operations
//!
//! Two families:
//! - external-process utilities (server lifecycle, import, index rebuild):
//!   the process's output is streamed line by line to the progress handle
//!   and its exit code becomes the task's return code;
//! - LDAP operations (schema edits) performed through the connection pool.

use crate::progress::ProgressHandle;
use crate::task::TaskOperation;
use anyhow::Context;
use dsadmin_common::dn::Dn;
use dsadmin_common::events::{TaskKind, TaskState};
use dsadmin_common::ldap::{AttributeChange, ChangeOp, ConnectionPool};
use std::collections::BTreeSet;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::debug;

/// The subschema entry schema edits are applied to
pub const SCHEMA_DN: &str = "cn=schema";

/// Backend identifier of the schema backend
pub const SCHEMA_BACKEND_ID: &str = "schema";

/// Run an external command, streaming its output to `progress` one line
/// at a time. Returns the process exit code.
pub fn run_command_streaming(
    program: &Path,
    args: &[String],
    progress: &ProgressHandle,
) -> anyhow::Result<i32> {
    debug!(program = %program.display(), ?args, "launching external command");
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("cannot launch {}", program.display()))?;

    // stderr drains on its own thread so a chatty process cannot fill one
    // pipe while we block on the other
    let stderr = child.stderr.take().context("stderr not captured")?;
    let stderr_progress = progress.clone();
    let stderr_thread = std::thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
            stderr_progress.log_line(line);
        }
    });

    let stdout = child.stdout.take().context("stdout not captured")?;
    for line in BufReader::new(stdout).lines() {
        progress.log_line(line.context("cannot read command output")?);
    }

    let status = child.wait().context("cannot wait for command")?;
    let _ = stderr_thread.join();
    Ok(status.code().unwrap_or(-1))
}

/// Start, stop or restart the server by running the corresponding
/// server-side utility.
///
/// Lifecycle tasks touch no backend: their exclusivity is server-wide and
/// enforced by the launching panels, while the coordinator gates them on
/// the current server status.
pub struct ServerLifecycleTask {
    kind: TaskKind,
    command: PathBuf,
    args: Vec<String>,
}

impl ServerLifecycleTask {
    pub fn start(command: PathBuf, args: Vec<String>) -> Self {
        ServerLifecycleTask {
            kind: TaskKind::StartServer,
            command,
            args,
        }
    }

    pub fn stop(command: PathBuf, args: Vec<String>) -> Self {
        ServerLifecycleTask {
            kind: TaskKind::StopServer,
            command,
            args,
        }
    }

    pub fn restart(command: PathBuf, args: Vec<String>) -> Self {
        ServerLifecycleTask {
            kind: TaskKind::RestartServer,
            command,
            args,
        }
    }
}

impl TaskOperation for ServerLifecycleTask {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn description(&self) -> String {
        self.kind.to_string()
    }

    fn backends(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn run(&mut self, progress: &ProgressHandle) -> anyhow::Result<Option<i32>> {
        run_command_streaming(&self.command, &self.args, progress).map(Some)
    }
}

/// Rebuild the indexes of one backend with the server-side rebuild utility
pub struct RebuildIndexTask {
    backend_id: String,
    command: PathBuf,
    args: Vec<String>,
}

impl RebuildIndexTask {
    pub fn new(backend_id: impl Into<String>, command: PathBuf, args: Vec<String>) -> Self {
        RebuildIndexTask {
            backend_id: backend_id.into(),
            command,
            args,
        }
    }
}

impl TaskOperation for RebuildIndexTask {
    fn kind(&self) -> TaskKind {
        TaskKind::RebuildIndex
    }

    fn description(&self) -> String {
        format!("Rebuild indexes of backend {}", self.backend_id)
    }

    fn backends(&self) -> BTreeSet<String> {
        BTreeSet::from([self.backend_id.clone()])
    }

    fn run(&mut self, progress: &ProgressHandle) -> anyhow::Result<Option<i32>> {
        run_command_streaming(&self.command, &self.args, progress).map(Some)
    }
}

/// Import LDIF data into one backend with the server-side import utility.
///
/// A successful import leaves the backend's indexes stale; the
/// post-operation hook reports that a rebuild is required.
pub struct ImportLdifTask {
    backend_id: String,
    ldif_file: PathBuf,
    command: PathBuf,
    args: Vec<String>,
}

impl ImportLdifTask {
    pub fn new(
        backend_id: impl Into<String>,
        ldif_file: PathBuf,
        command: PathBuf,
        args: Vec<String>,
    ) -> Self {
        ImportLdifTask {
            backend_id: backend_id.into(),
            ldif_file,
            command,
            args,
        }
    }
}

impl TaskOperation for ImportLdifTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Import
    }

    fn description(&self) -> String {
        format!(
            "Import {} into backend {}",
            self.ldif_file.display(),
            self.backend_id
        )
    }

    fn backends(&self) -> BTreeSet<String> {
        BTreeSet::from([self.backend_id.clone()])
    }

    fn run(&mut self, progress: &ProgressHandle) -> anyhow::Result<Option<i32>> {
        run_command_streaming(&self.command, &self.args, progress).map(Some)
    }

    fn post_operation(&mut self, outcome: TaskState, progress: &ProgressHandle) {
        if outcome == TaskState::FinishedSuccessfully {
            progress.log_line(format!(
                "Indexes of backend {} must be rebuilt",
                self.backend_id
            ));
            progress.index_rebuild_required(self.backend_id.clone());
        }
    }
}

/// Add one schema element definition (an attribute type or an object
/// class) to the subschema entry.
pub struct NewSchemaElementTask {
    pool: Arc<dyn ConnectionPool>,

    /// Subschema attribute, e.g. "attributeTypes" or "objectClasses"
    attribute: String,

    /// The element definition in schema syntax
    definition: String,
}

impl NewSchemaElementTask {
    pub fn new(
        pool: Arc<dyn ConnectionPool>,
        attribute: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        NewSchemaElementTask {
            pool,
            attribute: attribute.into(),
            definition: definition.into(),
        }
    }
}

impl TaskOperation for NewSchemaElementTask {
    fn kind(&self) -> TaskKind {
        TaskKind::NewSchemaElement
    }

    fn description(&self) -> String {
        format!("New schema element in {}", self.attribute)
    }

    fn backends(&self) -> BTreeSet<String> {
        BTreeSet::from([SCHEMA_BACKEND_ID.to_string()])
    }

    fn run(&mut self, progress: &ProgressHandle) -> anyhow::Result<Option<i32>> {
        let schema_dn = Dn::parse(SCHEMA_DN)?;
        let mut conn = self.pool.acquire()?;
        conn.modify(
            &schema_dn,
            &[AttributeChange {
                op: ChangeOp::Add,
                attribute: self.attribute.clone(),
                values: vec![self.definition.clone()],
            }],
        )?;
        progress.log_line(format!("Added schema element to {}", self.attribute));
        Ok(None)
    }
}

/// Delete one schema element definition from the subschema entry
pub struct DeleteSchemaElementTask {
    pool: Arc<dyn ConnectionPool>,
    attribute: String,
    definition: String,
}

impl DeleteSchemaElementTask {
    pub fn new(
        pool: Arc<dyn ConnectionPool>,
        attribute: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        DeleteSchemaElementTask {
            pool,
            attribute: attribute.into(),
            definition: definition.into(),
        }
    }
}

impl TaskOperation for DeleteSchemaElementTask {
    fn kind(&self) -> TaskKind {
        TaskKind::DeleteSchemaElement
    }

    fn description(&self) -> String {
        format!("Delete schema element from {}", self.attribute)
    }

    fn backends(&self) -> BTreeSet<String> {
        BTreeSet::from([SCHEMA_BACKEND_ID.to_string()])
    }

    fn run(&mut self, progress: &ProgressHandle) -> anyhow::Result<Option<i32>> {
        let schema_dn = Dn::parse(SCHEMA_DN)?;
        let mut conn = self.pool.acquire()?;
        conn.modify(
            &schema_dn,
            &[AttributeChange {
                op: ChangeOp::Delete,
                attribute: self.attribute.clone(),
                values: vec![self.definition.clone()],
            }],
        )?;
        progress.log_line(format!("Deleted schema element from {}", self.attribute));
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsadmin_common::events::{EventBus, TaskEvent};
    use uuid::Uuid;

    fn progress() -> (ProgressHandle, tokio::sync::mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = ProgressHandle::new(
            Uuid::new_v4(),
            TaskKind::StartServer,
            EventBus::new(64),
            Some(tx),
        );
        (handle, rx)
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_streams_lines_and_exit_code() {
        let (handle, mut rx) = progress();
        let code = run_command_streaming(
            &PathBuf::from("sh"),
            &["-c".to_string(), "echo one; echo two".to_string()],
            &handle,
        )
        .unwrap();
        assert_eq!(code, 0);

        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TaskEvent::OutputLine { line, .. } = event {
                lines.push(line);
            }
        }
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_reports_nonzero_exit() {
        let (handle, _rx) = progress();
        let code = run_command_streaming(
            &PathBuf::from("sh"),
            &["-c".to_string(), "exit 3".to_string()],
            &handle,
        )
        .unwrap();
        assert_eq!(code, 3);
    }

    #[test]
    fn test_missing_command_is_an_error() {
        let (handle, _rx) = progress();
        let result = run_command_streaming(
            &PathBuf::from("/nonexistent/dsadmin-test-utility"),
            &[],
            &handle,
        );
        assert!(result.is_err());
    }
}
