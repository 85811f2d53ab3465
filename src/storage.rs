use std::path::PathBuf;

use thiserror::Error;

use crate::models::{directory::Directory, tenant::Tenant};

pub mod json;
pub mod memory;
pub mod migrations;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to load document from '{path}': {source}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON from '{path}': {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Document '{path}' has a non-numeric version field")]
    InvalidVersion { path: PathBuf },

    #[error("Failed to save document to '{path}': {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize document to JSON: {source}")]
    SerializeFailed {
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to create backup at '{path}': {source}")]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to cleanup old backups in '{dir}': {source}")]
    CleanupFailed {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Document was written by a newer version of workboard (version {0}). Please upgrade to open it."
    )]
    FutureVersion(u32),

    #[error("Document has unsupported version {0}. This version of workboard cannot read it.")]
    UnsupportedVersion(u32),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Everything a backend hands back on start-up.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub directory: Directory,
    pub tenants: Vec<Tenant>,
}

/// Persistence collaborator. Each save replaces one document atomically:
/// either the whole new document is durable or the previous one still is.
pub trait Storage: Send + Sync {
    fn load(&self) -> Result<Snapshot, StorageError>;
    fn save_directory(&self, directory: &Directory) -> Result<(), StorageError>;
    fn save_tenant(&self, tenant: &Tenant) -> Result<(), StorageError>;
}
