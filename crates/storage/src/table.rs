//! A keyed record table, optionally persisted as JSON lines.
//!
//! Rows are loaded into memory on open and the whole file is rewritten on
//! every mutation. Reads never touch the disk.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use stepwise_core::error::StorageError;
use stepwise_core::storage::{FileRecord, SessionRecord, ToolResultRecord};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A record that can live in a [`Table`].
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync {
    /// Label used in errors and logs.
    const KIND: &'static str;

    fn id(&self) -> &str;

    /// Copy the immutable fields of `previous` into `self` before an update.
    fn carry_over(&mut self, previous: &Self);
}

impl Record for FileRecord {
    const KIND: &'static str = "file";

    fn id(&self) -> &str {
        &self.id
    }

    fn carry_over(&mut self, previous: &Self) {
        self.created_at = previous.created_at;
    }
}

impl Record for ToolResultRecord {
    const KIND: &'static str = "tool result";

    fn id(&self) -> &str {
        &self.id
    }

    fn carry_over(&mut self, previous: &Self) {
        self.created_at = previous.created_at;
    }
}

impl Record for SessionRecord {
    const KIND: &'static str = "session";

    fn id(&self) -> &str {
        &self.id
    }

    fn carry_over(&mut self, previous: &Self) {
        self.created_at = previous.created_at;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

pub struct Table<T: Record> {
    path: Option<PathBuf>,
    rows: RwLock<Vec<T>>,
}

impl<T: Record> Table<T> {
    /// A table that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            rows: RwLock::new(Vec::new()),
        }
    }

    /// A table backed by a JSONL file. A missing file starts empty and is
    /// created on first write.
    pub fn open(path: PathBuf) -> Self {
        let rows = load_from_disk::<T>(&path);
        debug!(path = %path.display(), kind = T::KIND, count = rows.len(), "Table loaded");
        Self {
            path: Some(path),
            rows: RwLock::new(rows),
        }
    }

    pub async fn insert(&self, record: T) -> Result<T, StorageError> {
        let mut rows = self.rows.write().await;
        if rows.iter().any(|r| r.id() == record.id()) {
            return Err(StorageError::Duplicate {
                kind: T::KIND,
                id: record.id().to_string(),
            });
        }
        let mut next = rows.clone();
        next.push(record.clone());
        self.commit(&mut rows, next)?;
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Option<T> {
        self.rows.read().await.iter().find(|r| r.id() == id).cloned()
    }

    /// Replace the row with the same id. `None` if there is no such row.
    pub async fn replace(&self, mut record: T) -> Result<Option<T>, StorageError> {
        let mut rows = self.rows.write().await;
        let Some(index) = rows.iter().position(|r| r.id() == record.id()) else {
            return Ok(None);
        };
        record.carry_over(&rows[index]);
        let mut next = rows.clone();
        next[index] = record.clone();
        self.commit(&mut rows, next)?;
        Ok(Some(record))
    }

    pub async fn all(&self) -> Vec<T> {
        self.rows.read().await.clone()
    }

    pub async fn filter(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows.read().await.iter().filter(|r| predicate(r)).cloned().collect()
    }

    pub async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let mut rows = self.rows.write().await;
        if !rows.iter().any(|r| r.id() == id) {
            return Ok(false);
        }
        let next = rows.iter().filter(|r| r.id() != id).cloned().collect();
        self.commit(&mut rows, next)?;
        Ok(true)
    }

    /// Write `next` to disk, then make it the in-memory state. A failed
    /// write leaves `rows` untouched.
    fn commit(&self, rows: &mut Vec<T>, next: Vec<T>) -> Result<(), StorageError> {
        self.flush(&next)?;
        *rows = next;
        Ok(())
    }

    /// Rewrite the backing file, if any, with `rows`.
    fn flush(&self, rows: &[T]) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut content = String::new();
        for row in rows {
            let line = serde_json::to_string(row)
                .map_err(|e| StorageError::Corrupt(format!("failed to serialize {}: {e}", T::KIND)))?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(path, &content)?;
        debug!(path = %path.display(), kind = T::KIND, count = rows.len(), "Table flushed");
        Ok(())
    }
}

fn load_from_disk<T: Record>(path: &Path) -> Vec<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<T>(line) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!(error = %e, kind = T::KIND, "Skipping corrupted record");
                None
            }
        })
        .collect()
}
