use std::path::{Path, PathBuf};

use crate::error::ConversationStoreError;

pub const STORAGE_DIR: [&str; 2] = [".chat", "storage"];

#[must_use]
pub fn storage_root(cwd: &Path) -> PathBuf {
    cwd.join(STORAGE_DIR[0]).join(STORAGE_DIR[1])
}

/// File name holding the value stored under `key`.
pub fn storage_file_name(key: &str) -> Result<String, ConversationStoreError> {
    validate_key(key)?;
    Ok(format!("{key}.json"))
}

pub(crate) fn validate_key(key: &str) -> Result<(), ConversationStoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConversationStoreError::InvalidKey {
            key: key.to_owned(),
        })
    }
}
