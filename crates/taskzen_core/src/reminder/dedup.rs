//! Records which reminder instances have already gone out.

use crate::error::AppError;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Keyed "sent" record. `try_claim` must insert-if-absent in one atomic step.
pub trait DedupStore: Send + Sync {
    /// Returns `true` when the caller now owns `key`, `false` if it was already claimed.
    fn try_claim(&self, key: &str) -> Result<bool, AppError>;

    /// Gives a claimed key back so a later cycle can retry it.
    fn release(&self, key: &str) -> Result<(), AppError>;

    fn contains(&self, key: &str) -> Result<bool, AppError>;
}

/// Lives as long as the process. Not shared between instances.
#[derive(Debug, Default)]
pub struct InMemoryDedup {
    keys: Mutex<HashSet<String>>,
}

impl InMemoryDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DedupStore for InMemoryDedup {
    fn try_claim(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.lock().insert(key.to_string()))
    }

    fn release(&self, key: &str) -> Result<(), AppError> {
        self.lock().remove(key);
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.lock().contains(key))
    }
}

/// One marker file per key; `create_new` makes the claim atomic across
/// processes sharing the directory, and the record survives restarts.
#[derive(Debug, Clone)]
pub struct DirectoryDedup {
    dir: PathBuf,
}

impl DirectoryDedup {
    pub fn open(dir: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(dir)
            .map_err(|err| AppError::io(format!("{}: {}", dir.display(), err)))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn marker(&self, key: &str) -> PathBuf {
        self.dir.join(file_name_for(key))
    }
}

impl DedupStore for DirectoryDedup {
    fn try_claim(&self, key: &str) -> Result<bool, AppError> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.marker(key))
        {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(AppError::io(format!("claim {key}: {err}"))),
        }
    }

    fn release(&self, key: &str) -> Result<(), AppError> {
        match std::fs::remove_file(self.marker(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::io(format!("release {key}: {err}"))),
        }
    }

    fn contains(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.marker(key).exists())
    }
}

/// Escapes everything outside `[A-Za-z0-9_-]` as `~XX` so distinct keys map to distinct names.
fn file_name_for(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            name.push(byte as char);
        } else {
            name.push_str(&format!("~{byte:02X}"));
        }
    }
    name
}
