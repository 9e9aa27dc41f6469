use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::DataManagerError;

/// Durable string key-value storage local to the device.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, DataManagerError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), DataManagerError>;
    fn remove(&mut self, key: &str) -> Result<(), DataManagerError>;
}

/**
 * FileStore keeps one file per key in a directory. Writes go through a
 * temporary file and a rename, so a crash mid-write leaves the old value.
 */
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, DataManagerError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .map_err(|_| DataManagerError::LocalStore(format!("Failed to create local store directory: {:?}", dir)))?;
        }

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, DataManagerError> {
        let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(DataManagerError::LocalStore(format!("Illegal key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, DataManagerError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(DataManagerError::LocalStore(format!("Failed to read {:?}: {}", path, err))),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), DataManagerError> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("json.tmp");

        fs::write(&tmp_path, value)
            .map_err(|err| DataManagerError::LocalStore(format!("Failed to write {:?}: {}", tmp_path, err)))?;
        fs::rename(&tmp_path, &path)
            .map_err(|err| DataManagerError::LocalStore(format!("Failed to replace {:?}: {}", path, err)))?;

        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), DataManagerError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(DataManagerError::LocalStore(format!("Failed to remove {:?}: {}", path, err))),
        }
    }
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, DataManagerError> {
        self.entries
            .lock()
            .map_err(|_| DataManagerError::LocalStore("Memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, DataManagerError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), DataManagerError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), DataManagerError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
