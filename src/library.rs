//! The asset store port: enumerating videos and reading or mutating their
//! metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// A video tracked by the library, addressed by a stable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub path: PathBuf,
}

impl Asset {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Metadata the library knows about a video without decoding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// Seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Bytes, 0 when unknown.
    pub file_size: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub favorite: bool,
}

/// Read and write access to the video library.
pub trait AssetStore {
    fn list(&self) -> Result<Vec<Asset>, StoreError>;

    /// `Ok(None)` when the id is not (or no longer) in the library.
    fn metadata(&self, id: &str) -> Result<Option<AssetMetadata>, StoreError>;

    /// Remove the given assets in one transaction. Returns how many were
    /// removed; unknown ids are ignored.
    fn delete(&mut self, ids: &[String]) -> Result<usize, StoreError>;

    fn set_favorite(&mut self, id: &str, favorite: bool) -> Result<(), StoreError>;

    fn set_creation_date(&mut self, id: &str, date: DateTime<Utc>) -> Result<(), StoreError>;
}

/// In-memory asset store. Keeps insertion order for `list`.
#[derive(Debug, Default, Clone)]
pub struct MemoryLibrary {
    entries: Vec<(Asset, AssetMetadata)>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an asset.
    pub fn insert(&mut self, asset: Asset, metadata: AssetMetadata) {
        match self.entries.iter_mut().find(|(a, _)| a.id == asset.id) {
            Some(entry) => *entry = (asset, metadata),
            None => self.entries.push((asset, metadata)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut AssetMetadata, StoreError> {
        self.entries
            .iter_mut()
            .find(|(a, _)| a.id == id)
            .map(|(_, m)| m)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

impl AssetStore for MemoryLibrary {
    fn list(&self) -> Result<Vec<Asset>, StoreError> {
        Ok(self.entries.iter().map(|(a, _)| a.clone()).collect())
    }

    fn metadata(&self, id: &str) -> Result<Option<AssetMetadata>, StoreError> {
        Ok(self
            .entries
            .iter()
            .find(|(a, _)| a.id == id)
            .map(|(_, m)| m.clone()))
    }

    fn delete(&mut self, ids: &[String]) -> Result<usize, StoreError> {
        let before = self.entries.len();
        self.entries.retain(|(a, _)| !ids.contains(&a.id));
        Ok(before - self.entries.len())
    }

    fn set_favorite(&mut self, id: &str, favorite: bool) -> Result<(), StoreError> {
        self.entry_mut(id)?.favorite = favorite;
        Ok(())
    }

    fn set_creation_date(&mut self, id: &str, date: DateTime<Utc>) -> Result<(), StoreError> {
        self.entry_mut(id)?.created_at = Some(date);
        Ok(())
    }
}
