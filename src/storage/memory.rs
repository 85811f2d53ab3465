use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
    models::{directory::Directory, tenant::Tenant},
    storage::{Snapshot, Storage, StorageError},
};

#[derive(Default)]
struct Documents {
    directory: Option<String>,
    tenants: BTreeMap<Uuid, String>,
}

/// Keeps serialized documents in memory. Used by tests and throwaway runs.
///
/// Saves can be switched to fail, which is how callers exercise rollback.
#[derive(Default)]
pub struct MemoryStorage {
    documents: Mutex<Documents>,
    fail_saves: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("saves disabled".to_string()))
        } else {
            Ok(())
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, StorageError> {
    serde_json::from_str(json).map_err(|e| StorageError::ParseFailed {
        path: "<memory>".into(),
        source: e,
    })
}

impl Storage for MemoryStorage {
    fn load(&self) -> Result<Snapshot, StorageError> {
        let documents = self.documents.lock();

        let directory: Directory = match &documents.directory {
            Some(json) => parse(json)?,
            None => Directory::default(),
        };

        let tenants = directory
            .organization_ids()
            .filter_map(|id| documents.tenants.get(&id))
            .map(|json| parse::<Tenant>(json))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Snapshot { directory, tenants })
    }

    fn save_directory(&self, directory: &Directory) -> Result<(), StorageError> {
        self.check_available()?;
        let json = serde_json::to_string(directory)
            .map_err(|e| StorageError::SerializeFailed { source: e })?;
        self.documents.lock().directory = Some(json);
        Ok(())
    }

    fn save_tenant(&self, tenant: &Tenant) -> Result<(), StorageError> {
        self.check_available()?;
        let json =
            serde_json::to_string(tenant).map_err(|e| StorageError::SerializeFailed { source: e })?;
        self.documents.lock().tenants.insert(tenant.id(), json);
        Ok(())
    }
}
