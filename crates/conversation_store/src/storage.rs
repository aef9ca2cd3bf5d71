use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConversationStoreError;
use crate::paths::{storage_file_name, storage_root, validate_key};

/// String key-value persistence, one text value per key.
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Result<Option<String>, ConversationStoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), ConversationStoreError>;
    fn remove(&mut self, key: &str) -> Result<(), ConversationStoreError>;
}

/// Stores each key as `<root>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage rooted at `<cwd>/.chat/storage`.
    #[must_use]
    pub fn in_cwd(cwd: &Path) -> Self {
        Self::new(storage_root(cwd))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ConversationStoreError> {
        Ok(self.root.join(storage_file_name(key)?))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, ConversationStoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConversationStoreError::io("reading stored value", path, source)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConversationStoreError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root).map_err(|source| {
            ConversationStoreError::io("creating storage directory", &self.root, source)
        })?;

        // Readers see either the old value or the new one, never a partial write.
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value)
            .map_err(|source| ConversationStoreError::io("writing stored value", &staging, source))?;
        fs::rename(&staging, &path)
            .map_err(|source| ConversationStoreError::io("replacing stored value", &path, source))?;

        debug!(key, path = %path.display(), bytes = value.len(), "stored value");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), ConversationStoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ConversationStoreError::io("removing stored value", path, source)),
        }
    }
}

/// In-process storage, for tests and for running without a writable disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, ConversationStoreError> {
        validate_key(key)?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConversationStoreError> {
        validate_key(key)?;
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), ConversationStoreError> {
        validate_key(key)?;
        self.entries.remove(key);
        Ok(())
    }
}
