//! Per-asset analysis cache.
//!
//! Every tier reads its facts from here. Entries are created from asset store
//! metadata the first time an asset is seen and then only grow: later stages
//! attach a visual descriptor or a year estimate, but the probed metadata of
//! an existing entry is never rewritten. The cache is an explicit handle that
//! callers pass around by `&mut`, so there is a single writer per run.

pub mod year;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::library::{Asset, AssetStore};
use crate::media::Descriptor;

/// Schema revision stamped on every entry.
pub const FACTS_VERSION: u32 = 1;

/// Where `AssetFacts::estimated_year` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YearSource {
    Metadata,
    Heuristic,
}

impl YearSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            YearSource::Metadata => "metadata",
            YearSource::Heuristic => "heuristic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "metadata" => Some(YearSource::Metadata),
            "heuristic" => Some(YearSource::Heuristic),
            _ => None,
        }
    }
}

/// Cached facts about one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetFacts {
    pub id: String,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// 0 when unknown.
    pub file_size: u64,
    pub feature_descriptor: Option<Descriptor>,
    pub estimated_year: Option<i32>,
    pub year_source: Option<YearSource>,
    pub heuristic_year: Option<i32>,
    pub last_analyzed: DateTime<Utc>,
    pub version: u32,
}

impl AssetFacts {
    pub fn new(id: impl Into<String>, duration: f64, width: u32, height: u32, file_size: u64) -> Self {
        Self {
            id: id.into(),
            duration,
            width,
            height,
            file_size,
            feature_descriptor: None,
            estimated_year: None,
            year_source: None,
            heuristic_year: None,
            last_analyzed: Utc::now(),
            version: FACTS_VERSION,
        }
    }
}

/// Durable backing for the cache.
pub trait FactsStore {
    fn load_facts(&self) -> Result<Vec<AssetFacts>, StoreError>;

    /// Insert or replace the given entries.
    fn save_facts(&self, facts: &[AssetFacts]) -> Result<(), StoreError>;

    fn remove_facts(&self, ids: &[String]) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct AnalysisCache {
    entries: HashMap<String, AssetFacts>,
    dirty: BTreeSet<String>,
    removed: BTreeSet<String>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrate from durable storage.
    pub fn load(store: &dyn FactsStore) -> Result<Self, StoreError> {
        let entries: HashMap<String, AssetFacts> = store
            .load_facts()?
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();
        debug!("Loaded {} cached asset facts", entries.len());
        Ok(Self {
            entries,
            ..Self::default()
        })
    }

    /// Create entries for assets not seen before. Existing entries are left
    /// untouched. Assets the store no longer knows are skipped, as are assets
    /// whose metadata cannot be read.
    ///
    /// Returns the number of entries created. Fails only when every lookup
    /// failed, since then the store itself is unreadable.
    pub fn ensure(&mut self, store: &dyn AssetStore, assets: &[Asset]) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut created = 0;
        let mut readable = false;
        let mut first_error = None;

        for asset in assets {
            if self.entries.contains_key(&asset.id) {
                continue;
            }
            let meta = match store.metadata(&asset.id) {
                Ok(meta) => {
                    readable = true;
                    meta
                }
                Err(e) => {
                    warn!("Skipping {}: unreadable metadata: {}", asset.id, e);
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            let Some(meta) = meta else {
                debug!("Asset {} vanished before analysis", asset.id);
                continue;
            };

            let mut facts = AssetFacts::new(asset.id.clone(), meta.duration, meta.width, meta.height, meta.file_size);
            let (estimated, source, heuristic) = year::estimate(meta.created_at, &asset.file_name(), now);
            facts.estimated_year = estimated;
            facts.year_source = source;
            facts.heuristic_year = heuristic;
            facts.last_analyzed = now;

            self.removed.remove(&asset.id);
            self.dirty.insert(asset.id.clone());
            self.entries.insert(asset.id.clone(), facts);
            created += 1;
        }

        match first_error {
            Some(e) if !readable => Err(e),
            _ => Ok(created),
        }
    }

    pub fn get(&self, id: &str) -> Option<&AssetFacts> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mutate an entry in place. Returns `false` if there is no entry.
    pub fn set<F>(&mut self, id: &str, updater: F) -> bool
    where
        F: FnOnce(&mut AssetFacts),
    {
        match self.entries.get_mut(id) {
            Some(facts) => {
                updater(facts);
                facts.last_analyzed = Utc::now();
                self.dirty.insert(id.to_string());
                true
            }
            None => false,
        }
    }

    /// Drop entries for assets that were removed from the library.
    pub fn forget(&mut self, ids: &[String]) {
        for id in ids {
            if self.entries.remove(id).is_some() {
                self.dirty.remove(id);
                self.removed.insert(id.clone());
            }
        }
    }

    /// Number of changes not yet written by `flush`.
    pub fn pending(&self) -> usize {
        self.dirty.len() + self.removed.len()
    }

    /// Write pending changes. On failure nothing is marked clean, so a later
    /// flush retries the same set.
    pub fn flush(&mut self, store: &dyn FactsStore) -> Result<usize, StoreError> {
        let pending = self.pending();
        if pending == 0 {
            return Ok(0);
        }

        let changed: Vec<AssetFacts> = self
            .dirty
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect();
        if !changed.is_empty() {
            store.save_facts(&changed)?;
        }

        let removed: Vec<String> = self.removed.iter().cloned().collect();
        if !removed.is_empty() {
            store.remove_facts(&removed)?;
        }

        self.dirty.clear();
        self.removed.clear();
        Ok(pending)
    }
}
