//! # dsadmin Task Engine
//!
//! Background execution and mutual exclusion for long administrative
//! operations (import, backup, reindex, schema edit, server lifecycle)
//! against one directory server.
//!
//! - [`task::AdminTask`]: a tracked unit of work with a monotonic state
//!   machine and a declared backend footprint
//! - [`coordinator::TaskCoordinator`]: holds the in-flight tasks,
//!   enforces the backend-overlap exclusivity rule before launch, runs
//!   each approved task on its own worker thread and streams progress
//! - [`ops`]: concrete operations (external-process utilities and
//!   schema edits)

pub mod coordinator;
pub mod error;
pub mod ops;
pub mod progress;
pub mod task;

pub use coordinator::TaskCoordinator;
pub use error::{Error, Result};
pub use progress::ProgressHandle;
pub use task::{AdminTask, TaskOperation};

// Shared vocabulary re-exported from dsadmin-common
pub use dsadmin_common::events::{TaskEvent, TaskKind, TaskState};
