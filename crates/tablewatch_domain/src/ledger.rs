use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::NotifiedKey;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("ledger i/o failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Keys that have already produced a notification. Entries are never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationLedger {
    keys: BTreeSet<NotifiedKey>,
}

impl NotificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_notified(&self, key: &NotifiedKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns true when the key was not present before.
    pub fn mark_notified(&mut self, key: NotifiedKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NotifiedKey> {
        self.keys.iter()
    }
}

impl FromIterator<NotifiedKey> for NotificationLedger {
    fn from_iter<I: IntoIterator<Item = NotifiedKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Durable home of the ledger between runs.
pub trait LedgerStore: Send + Sync {
    /// Never fails: unreadable state is treated as an empty history.
    fn load(&self) -> NotificationLedger;
    fn save(&self, ledger: &NotificationLedger) -> Result<(), PersistError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    notified: Vec<NotifiedKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

/// Stores the ledger as a JSON document, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "ledger".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> PersistError {
        PersistError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl LedgerStore for JsonFileStore {
    fn load(&self) -> NotificationLedger {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no ledger yet, starting empty");
                return NotificationLedger::new();
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "ledger unreadable, starting empty");
                return NotificationLedger::new();
            }
        };
        match serde_json::from_str::<LedgerFile>(&raw) {
            Ok(file) => file.notified.into_iter().collect(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "ledger corrupt, starting empty");
                NotificationLedger::new()
            }
        }
    }

    fn save(&self, ledger: &NotificationLedger) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
            }
        }
        let file = LedgerFile {
            notified: ledger.iter().cloned().collect(),
            updated_at: Some(Utc::now()),
        };
        let payload = serde_json::to_string_pretty(&file)?;
        let temp = self.temp_path();
        fs::write(&temp, payload).map_err(|err| self.io_error(err))?;
        fs::rename(&temp, &self.path).map_err(|err| self.io_error(err))?;
        Ok(())
    }
}

/// Process-local store used for dry runs and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<NotificationLedger>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(ledger: NotificationLedger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    pub fn snapshot(&self) -> NotificationLedger {
        self.inner.lock().clone()
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self) -> NotificationLedger {
        self.snapshot()
    }

    fn save(&self, ledger: &NotificationLedger) -> Result<(), PersistError> {
        *self.inner.lock() = ledger.clone();
        Ok(())
    }
}
