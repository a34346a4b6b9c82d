//! # dsadmin Browser Engine
//!
//! Incremental, asynchronous directory-tree browser: mirrors a remote LDAP
//! subtree into a bounded, lazily-populated local tree model.
//!
//! Three cooperating pieces:
//! - [`model::TreeModel`]: the Directory Node Model, a single-writer tree
//!   of [`node::DirectoryNode`]s with structural-change events
//! - [`queue::FetchQueue`]: a fixed pool of worker threads draining
//!   expand/seed requests, serialized per node
//! - [`controller::BrowserController`]: the coordination point between
//!   filter/base-DN state, the fetch queue and the model

pub mod controller;
pub mod error;
pub mod model;
pub mod node;
pub mod queue;

pub use controller::{BrowserController, BrowserOptions};
pub use error::{Error, Result};
pub use model::TreeModel;
pub use node::{ContainerRules, DirectoryNode, ExpansionState};
pub use queue::{FetchKind, FetchQueue, FetchRequest};
