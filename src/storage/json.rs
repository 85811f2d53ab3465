use std::{
    fs::{self, OpenOptions, rename, write},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::to_string_pretty;
use tracing::debug;
use uuid::Uuid;

use crate::{
    models::{directory::Directory, tenant::Tenant},
    storage::{
        Snapshot, Storage, StorageError,
        migrations::{DocumentKind, detect_version, upgrade},
    },
};

/// Backups kept per document
const MAX_BACKUPS: usize = 5;

/// One JSON document for the directory, one per organization:
///
/// ```text
/// <root>/directory.json
/// <root>/tenants/<organization-id>.json
/// <root>/backups/<document-stem>/<nanos>.json
/// ```
pub struct JsonFileStorage {
    root: PathBuf,
}

impl JsonFileStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn directory_path(&self) -> PathBuf {
        self.root.join("directory.json")
    }

    fn tenant_path(&self, organization_id: Uuid) -> PathBuf {
        self.root
            .join("tenants")
            .join(format!("{organization_id}.json"))
    }

    fn backup_dir(&self, path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        self.root.join("backups").join(stem)
    }

    fn read_document<T: DeserializeOwned>(
        &self,
        path: &Path,
        kind: DocumentKind,
    ) -> Result<Option<T>, StorageError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::LoadFailed {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        let data: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| StorageError::ParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        let version = detect_version(path, &data)?;
        let data = upgrade(kind, data, version)?;

        serde_json::from_value(data)
            .map(Some)
            .map_err(|e| StorageError::ParseFailed {
                path: path.to_path_buf(),
                source: e,
            })
    }

    fn write_document<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StorageError> {
        let json =
            to_string_pretty(value).map_err(|e| StorageError::SerializeFailed { source: e })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::SaveFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let temp_path = PathBuf::from(format!("{}.tmp.{}", path.display(), Uuid::new_v4()));
        write(&temp_path, json).map_err(|e| StorageError::SaveFailed {
            path: temp_path.clone(),
            source: e,
        })?;

        let lock_file_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_file_path)
            .map_err(|e| StorageError::SaveFailed {
                path: lock_file_path.clone(),
                source: e,
            })?;
        lock_file
            .lock_exclusive()
            .map_err(|e| StorageError::SaveFailed {
                path: lock_file_path,
                source: e,
            })?;

        self.create_backup(path)?;
        self.cleanup_old_backups(path)?;

        rename(&temp_path, path).map_err(|e| StorageError::SaveFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        lock_file.unlock().map_err(|e| StorageError::SaveFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        debug!(path = %path.display(), "Document saved");
        Ok(())
    }

    fn create_backup(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            return Ok(());
        }

        let backup_dir = self.backup_dir(path);
        fs::create_dir_all(&backup_dir).map_err(|e| StorageError::BackupFailed {
            path: backup_dir.clone(),
            source: e,
        })?;

        let nanos = jiff::Timestamp::now().as_nanosecond();
        let backup_path = backup_dir.join(format!("{nanos:024}.json"));
        fs::copy(path, &backup_path).map_err(|e| StorageError::BackupFailed {
            path: backup_path,
            source: e,
        })?;

        Ok(())
    }

    fn cleanup_old_backups(&self, path: &Path) -> Result<(), StorageError> {
        let backup_dir = self.backup_dir(path);
        if !backup_dir.exists() {
            return Ok(());
        }

        let mut file_entries = fs::read_dir(&backup_dir)
            .map_err(|e| StorageError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?
            .flatten()
            .filter(|entry| entry.metadata().map(|m| m.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect::<Vec<_>>();

        if file_entries.len() <= MAX_BACKUPS {
            return Ok(());
        }

        file_entries.sort();
        let excess = file_entries.len() - MAX_BACKUPS;

        for file_path in &file_entries[..excess] {
            fs::remove_file(file_path).map_err(|e| StorageError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?;
        }

        Ok(())
    }
}

impl Storage for JsonFileStorage {
    fn load(&self) -> Result<Snapshot, StorageError> {
        let directory: Directory = self
            .read_document(&self.directory_path(), DocumentKind::Directory)?
            .unwrap_or_default();

        // Tenant files the directory does not reference are leftovers of an
        // organization whose creation never committed.
        let mut tenants = Vec::with_capacity(directory.slugs.len());
        for organization_id in directory.organization_ids() {
            let path = self.tenant_path(organization_id);
            let tenant: Tenant = self
                .read_document(&path, DocumentKind::Tenant)?
                .ok_or_else(|| StorageError::LoadFailed {
                    path: path.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })?;
            tenants.push(tenant);
        }

        Ok(Snapshot { directory, tenants })
    }

    fn save_directory(&self, directory: &Directory) -> Result<(), StorageError> {
        self.write_document(&self.directory_path(), directory)
    }

    fn save_tenant(&self, tenant: &Tenant) -> Result<(), StorageError> {
        self.write_document(&self.tenant_path(tenant.id()), tenant)
    }
}
