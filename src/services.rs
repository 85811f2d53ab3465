//! Mutation and lookup operations of the work-item store.
//!
//! Every operation follows the same order: find the organization the caller
//! is addressing, authorize against the role stored there, validate, mutate
//! inside one transaction, and let the store publish the events afterwards.

pub mod comments;
pub mod memberships;
pub mod notifications;
pub mod organizations;
pub mod projects;
pub mod rules;
pub mod tasks;
pub mod time_entries;

#[cfg(test)]
pub(crate) mod fixtures;
