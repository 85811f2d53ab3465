pub mod activity;
pub mod comment;
pub mod directory;
pub mod epic;
pub mod file;
pub mod label;
pub mod membership;
pub mod notification;
pub mod organization;
pub mod project;
pub mod task;
pub mod tenant;
pub mod time_entry;
pub mod user;
