//! Cached catalog of known crop problems.
//!
//! The catalog is loaded lazily from a [`CatalogSource`], kept as one
//! immutable snapshot, and dropped whenever the source reports a change.
//! Concurrent cache misses share a single reload.

mod source;

pub use source::{
    CatalogError, CatalogEvent, CatalogObserver, CatalogSource, InMemoryCatalogSource,
    JsonFileCatalogSource, ProblemRecord, RawField,
};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

/// Causes and remedies for one issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub causes: Vec<String>,
    pub remedies: Vec<String>,
}

/// A named issue with its flattened causes and remedies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemEntry {
    pub name: String,
    pub details: ProblemDetails,
}

impl ProblemEntry {
    pub fn new(name: impl Into<String>, causes: &[&str], remedies: &[&str]) -> Self {
        Self {
            name: name.into(),
            details: ProblemDetails {
                causes: causes.iter().map(|s| s.to_string()).collect(),
                remedies: remedies.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    /// Flattens a storage record. List items and comma-separated pieces are
    /// stripped of surrounding brackets, quotes and whitespace; pieces that
    /// end up empty are dropped.
    pub fn from_record(record: &ProblemRecord) -> Self {
        Self {
            name: record.name.trim().to_string(),
            details: ProblemDetails {
                causes: flatten_field(record.causes.as_ref()),
                remedies: flatten_field(record.remedies.as_ref()),
            },
        }
    }
}

lazy_static! {
    static ref DEFAULT_PROBLEMS: Vec<ProblemEntry> = vec![
        ProblemEntry::new(
            "Nitrogen Deficiency",
            &["yellow leaves", "pale green leaves"],
            &["Apply urea", "Use organic compost"],
        ),
        ProblemEntry::new(
            "Iron Deficiency",
            &["yellow leaves", "pale veins", "white veins", "chlorosis"],
            &["Apply FeSO4", "Use foliar iron spray", "Use iron chelates"],
        ),
        ProblemEntry::new(
            "Root Rot",
            &["wilting", "rotted roots", "waterlogging"],
            &["Avoid overwatering", "Improve soil drainage"],
        ),
    ];
}

/// An ordered snapshot of problem entries keyed by name.
///
/// Iteration order is the order the source returned the records in; a later
/// record with a duplicate name replaces the earlier one in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    entries: Vec<ProblemEntry>,
}

impl Catalog {
    pub fn from_entries(entries: impl IntoIterator<Item = ProblemEntry>) -> Self {
        let mut deduped: Vec<ProblemEntry> = Vec::new();
        for entry in entries {
            match deduped.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => existing.details = entry.details,
                None => deduped.push(entry),
            }
        }
        Self { entries: deduped }
    }

    pub fn from_records(records: &[ProblemRecord]) -> Self {
        Self::from_entries(
            records
                .iter()
                .filter(|r| !r.name.trim().is_empty())
                .map(ProblemEntry::from_record),
        )
    }

    /// The built-in three-entry catalog used when storage has no records.
    pub fn defaults() -> Self {
        Self::from_entries(DEFAULT_PROBLEMS.iter().cloned())
    }

    pub fn get(&self, name: &str) -> Option<&ProblemDetails> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.details)
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProblemEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Process-wide problem cache in front of a [`CatalogSource`].
pub struct ProblemCatalog {
    source: Arc<dyn CatalogSource>,
    cache: RwLock<Option<Arc<Catalog>>>,
    reload_lock: Mutex<()>,
    loads: AtomicU64,
    /// Bumped by every invalidation
    generation: AtomicU64,
}

impl ProblemCatalog {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
            reload_lock: Mutex::new(()),
            loads: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Creates the cache and subscribes it to the source's mutation events.
    pub fn subscribed(source: Arc<dyn CatalogSource>) -> Arc<Self> {
        let catalog = Arc::new(Self::new(Arc::clone(&source)));
        let observer: Arc<dyn CatalogObserver> = catalog.clone();
        source.subscribe(Arc::downgrade(&observer));
        catalog
    }

    /// Returns the cached catalog, loading it first if the cache is empty or
    /// `force_refresh` is set. Never returns an empty catalog.
    pub async fn get_problems(&self, force_refresh: bool) -> Arc<Catalog> {
        if !force_refresh {
            if let Some(cached) = self.cached() {
                return cached;
            }
        }

        let observed = self.loads.load(Ordering::Acquire);
        let _guard = self.reload_lock.lock().await;

        // Someone else finished a reload while we waited.
        if self.loads.load(Ordering::Acquire) != observed || !force_refresh {
            if let Some(cached) = self.cached() {
                return cached;
            }
        }

        let generation = self.generation.load(Ordering::Acquire);
        match self.source.fetch_all().await {
            Ok(records) => {
                let mut catalog = Catalog::from_records(&records);
                if catalog.is_empty() {
                    info!("Catalog source returned no problems, using built-in defaults");
                    catalog = Catalog::defaults();
                }
                let catalog = Arc::new(catalog);
                // An invalidation during the fetch means these records may predate it.
                if self.generation.load(Ordering::Acquire) != generation {
                    debug!("Catalog invalidated during reload, serving {} problems uncached", catalog.len());
                    return catalog;
                }
                self.store(Some(Arc::clone(&catalog)));
                self.loads.fetch_add(1, Ordering::AcqRel);
                debug!("Loaded {} problems into the catalog cache", catalog.len());
                catalog
            }
            Err(e) => {
                warn!("Failed to load problem catalog, serving defaults: {}", e);
                Arc::new(Catalog::defaults())
            }
        }
    }

    /// Drops the cached snapshot; the next read reloads from the source.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.store(None);
        info!("Problem catalog cache cleared");
    }

    pub fn is_cached(&self) -> bool {
        self.cached().is_some()
    }

    fn cached(&self) -> Option<Arc<Catalog>> {
        match self.cache.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                warn!("Catalog cache lock poisoned, ignoring cached value");
                poisoned.into_inner().clone()
            }
        }
    }

    fn store(&self, value: Option<Arc<Catalog>>) {
        match self.cache.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => {
                warn!("Catalog cache lock poisoned, overwriting");
                *poisoned.into_inner() = value;
            }
        }
    }
}

impl CatalogObserver for ProblemCatalog {
    fn on_catalog_change(&self, event: CatalogEvent) {
        debug!("Catalog changed: {:?}", event);
        self.invalidate();
    }
}

fn flatten_field(field: Option<&RawField>) -> Vec<String> {
    let pieces: Vec<String> = match field {
        None => return Vec::new(),
        Some(RawField::List(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect(),
        Some(RawField::Text(text)) => text
            .split(',')
            .filter(|piece| !piece.trim().is_empty())
            .map(str::to_string)
            .collect(),
    };
    pieces
        .iter()
        .map(|piece| strip_decoration(piece))
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn strip_decoration(piece: &str) -> String {
    piece
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '[' | ']' | '\'' | '"'))
        .to_string()
}
