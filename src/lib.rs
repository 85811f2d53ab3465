//! Multi-tenant work tracking core.
//!
//! Organizations own projects, epics, tasks and everything hanging off them.
//! Every mutation goes through [`access::authorize`], commits against one
//! organization's rows as a unit, and hands the resulting domain events to the
//! [`realtime`] fan-out layer after the commit.

pub mod access;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod query;
pub mod realtime;
pub mod services;
pub mod storage;
pub mod store;
pub mod telemetry;

pub use access::{Action, Role, authorize};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use identity::Caller;
pub use store::WorkItemStore;
