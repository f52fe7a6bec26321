pub mod discovery;
pub mod probe;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, MAIN_SEPARATOR};
use std::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{CatalogEntry, Database};

pub use discovery::discover_videos;
pub use probe::{parse_probe, probe_video, VideoProbe};

#[derive(Debug, Clone)]
pub enum ScanProgress {
    Started { total_files: usize },
    Scanning { current: usize, total: usize, path: String },
    Completed { scanned: usize, new: usize, updated: usize, removed: usize },
    Error { message: String },
}

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub total_found: usize,
    pub scanned: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Catalog ids whose files are no longer on disk.
    pub removed: Vec<String>,
}

/// Stable catalog id for a video path.
pub fn video_id(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    digest[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

pub struct Scanner {
    config: Config,
}

impl Scanner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Catalog every video under `directory`. Files whose modification time
    /// matches the catalog are not probed again, and rows for files that
    /// disappeared from the directory are removed.
    pub fn scan_directory(
        &self,
        directory: &Path,
        db: &Database,
        progress_tx: Option<mpsc::Sender<ScanProgress>>,
    ) -> Result<ScanResult> {
        let directory = directory.canonicalize()?;
        let video_paths = discover_videos(&directory, &self.config.library.video_extensions)?;

        let total = video_paths.len();
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(ScanProgress::Started { total_files: total });
        }
        info!("Scanning {} ({} videos found)", directory.display(), total);

        let root = root_prefix(&directory);
        let known = db.video_mtimes_under(&root)?;
        let mut present = HashSet::with_capacity(total);
        let mut result = ScanResult {
            total_found: total,
            ..ScanResult::default()
        };

        for (index, path) in video_paths.iter().enumerate() {
            let path_str = path.to_string_lossy().to_string();
            present.insert(path_str.clone());

            if let Some(ref tx) = progress_tx {
                let _ = tx.send(ScanProgress::Scanning {
                    current: index + 1,
                    total,
                    path: path_str.clone(),
                });
            }

            let modified_at = file_mtime(path);
            if let Some(recorded) = known.get(&path_str) {
                if recorded.is_some() && *recorded == modified_at {
                    result.unchanged += 1;
                    continue;
                }
            }

            match self.scan_single_file(path, modified_at) {
                Ok(entry) => {
                    db.upsert_video(&entry)?;
                    if known.contains_key(&path_str) {
                        result.updated += 1;
                    } else {
                        result.new += 1;
                    }
                    result.scanned += 1;
                }
                Err(e) => {
                    warn!("Skipping {}: {:#}", path.display(), e);
                    if let Some(ref tx) = progress_tx {
                        let _ = tx.send(ScanProgress::Error {
                            message: format!("Error scanning {}: {}", path.display(), e),
                        });
                    }
                }
            }
        }

        result.removed = db.remove_videos_not_in(&root, &present)?;
        if !result.removed.is_empty() {
            debug!("{} videos vanished from {}", result.removed.len(), directory.display());
        }

        if let Some(ref tx) = progress_tx {
            let _ = tx.send(ScanProgress::Completed {
                scanned: result.scanned,
                new: result.new,
                updated: result.updated,
                removed: result.removed.len(),
            });
        }

        Ok(result)
    }

    fn scan_single_file(&self, path: &Path, modified_at: Option<String>) -> Result<CatalogEntry> {
        let file_metadata = std::fs::metadata(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let directory = path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();

        let probe = probe_video(&self.config.library.ffprobe, path)?;

        Ok(CatalogEntry {
            id: video_id(path),
            path: path.to_string_lossy().to_string(),
            filename,
            directory,
            size_bytes: file_metadata.len(),
            modified_at,
            duration: probe.duration,
            width: probe.width,
            height: probe.height,
            created_at: probe.created_at,
        })
    }
}

fn root_prefix(directory: &Path) -> String {
    let mut root = directory.to_string_lossy().to_string();
    if !root.ends_with(MAIN_SEPARATOR) {
        root.push(MAIN_SEPARATOR);
    }
    root
}

fn file_mtime(path: &Path) -> Option<String> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let modified: DateTime<Utc> = modified.into();
    Some(modified.format("%Y-%m-%dT%H:%M:%S").to_string())
}
