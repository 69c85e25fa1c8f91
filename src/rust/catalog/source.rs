use std::path::{Path, PathBuf};
use std::sync::{Mutex, Weak};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors raised by catalog data sources.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed catalog data: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Catalog source unavailable: {0}")]
    Unavailable(String),
}

/// Causes or remedies as stored: either a native list or one delimited string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawField {
    List(Vec<Value>),
    Text(String),
}

/// A problem record exactly as the storage layer hands it over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemRecord {
    pub name: String,
    #[serde(default)]
    pub causes: Option<RawField>,
    #[serde(default)]
    pub remedies: Option<RawField>,
}

impl ProblemRecord {
    pub fn new(name: impl Into<String>, causes: RawField, remedies: RawField) -> Self {
        Self {
            name: name.into(),
            causes: Some(causes),
            remedies: Some(remedies),
        }
    }
}

/// What changed in the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    Created(String),
    Updated(String),
    Deleted(String),
}

/// Receives mutation notifications from a [`CatalogSource`].
pub trait CatalogObserver: Send + Sync {
    fn on_catalog_change(&self, event: CatalogEvent);
}

/// Read side of the problem store, plus its mutation hook.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<ProblemRecord>, CatalogError>;

    /// Registers an observer to be told about creates, updates and deletes.
    /// Sources that never change can ignore this.
    fn subscribe(&self, _observer: Weak<dyn CatalogObserver>) {}
}

/// An in-process problem store that notifies observers on every write.
#[derive(Default)]
pub struct InMemoryCatalogSource {
    records: Mutex<Vec<ProblemRecord>>,
    observers: Mutex<Vec<Weak<dyn CatalogObserver>>>,
}

impl InMemoryCatalogSource {
    pub fn new(records: Vec<ProblemRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Inserts or replaces the record with the same name.
    pub fn upsert(&self, record: ProblemRecord) {
        let event = {
            let mut records = lock_or_recover(&self.records);
            match records.iter_mut().find(|r| r.name == record.name) {
                Some(existing) => {
                    *existing = record.clone();
                    CatalogEvent::Updated(record.name)
                }
                None => {
                    records.push(record.clone());
                    CatalogEvent::Created(record.name)
                }
            }
        };
        self.notify(event);
    }

    pub fn remove(&self, name: &str) -> bool {
        let removed = {
            let mut records = lock_or_recover(&self.records);
            let before = records.len();
            records.retain(|r| r.name != name);
            records.len() != before
        };
        if removed {
            self.notify(CatalogEvent::Deleted(name.to_string()));
        }
        removed
    }

    fn notify(&self, event: CatalogEvent) {
        let mut observers = lock_or_recover(&self.observers);
        observers.retain(|o| o.strong_count() > 0);
        for observer in observers.iter().filter_map(Weak::upgrade) {
            observer.on_catalog_change(event.clone());
        }
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalogSource {
    async fn fetch_all(&self) -> Result<Vec<ProblemRecord>, CatalogError> {
        Ok(lock_or_recover(&self.records).clone())
    }

    fn subscribe(&self, observer: Weak<dyn CatalogObserver>) {
        lock_or_recover(&self.observers).push(observer);
    }
}

/// Reads a JSON array of [`ProblemRecord`]s on every fetch.
///
/// A missing file yields no records, which makes the catalog fall back to
/// its built-in defaults.
#[derive(Debug, Clone)]
pub struct JsonFileCatalogSource {
    path: PathBuf,
}

impl JsonFileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CatalogSource for JsonFileCatalogSource {
    async fn fetch_all(&self) -> Result<Vec<ProblemRecord>, CatalogError> {
        if !self.path.exists() {
            debug!("Catalog file {:?} does not exist", self.path);
            return Ok(Vec::new());
        }
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Catalog source lock was poisoned, recovering");
        poisoned.into_inner()
    })
}
