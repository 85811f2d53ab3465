use std::path::Path;

use serde_json::Value;

use crate::{
    models::{directory::DIRECTORY_VERSION, tenant::TENANT_VERSION},
    storage::StorageError,
};

type MigrationFn = fn(Value) -> Result<Value, StorageError>;

/// The two kinds of document a backend persists. Each has its own version line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    Directory,
    Tenant,
}

impl DocumentKind {
    pub fn current_version(self) -> u32 {
        match self {
            DocumentKind::Directory => DIRECTORY_VERSION,
            DocumentKind::Tenant => TENANT_VERSION,
        }
    }

    /// Index `n` upgrades a document from version `n + 1` to `n + 2`.
    fn migrations(self) -> Vec<MigrationFn> {
        match self {
            DocumentKind::Directory => vec![],
            DocumentKind::Tenant => vec![],
        }
    }
}

/// Documents written before versioning carry no field and count as version 1.
pub fn detect_version(path: &Path, value: &Value) -> Result<u32, StorageError> {
    match value.get("version") {
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| StorageError::InvalidVersion {
                path: path.to_path_buf(),
            }),
        None => Ok(1),
    }
}

/// Brings `data` from `from_version` up to the current version of `kind`,
/// one step at a time, and stamps the result with that version.
pub fn upgrade(kind: DocumentKind, mut data: Value, from_version: u32) -> Result<Value, StorageError> {
    let to_version = kind.current_version();

    if from_version > to_version {
        return Err(StorageError::FutureVersion(from_version));
    }

    let migrations = kind.migrations();
    for version in from_version..to_version {
        let step = migrations
            .get((version - 1) as usize)
            .ok_or(StorageError::UnsupportedVersion(version))?;
        data = step(data)?;
    }

    if let Some(obj) = data.as_object_mut() {
        obj.insert("version".to_string(), Value::from(to_version));
    }

    Ok(data)
}
