//! Runs the tiers in order and publishes progress.

use std::collections::HashSet;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{AnalysisCache, FactsStore};
use crate::config::DetectionConfig;
use crate::error::DetectError;
use crate::library::{Asset, AssetStore};
use crate::media::{FeatureExtractor, FrameSampler};
use crate::results::{self, ResultStore};

use super::{metadata, visual, DetectionPhase, DetectionStatus, DuplicateGroup};

const CACHE_DONE: f32 = 0.2;
const EXACT_DONE: f32 = 0.25;
const NEAR_DONE: f32 = 0.35;
const EXTRACT_DONE: f32 = 0.65;
const VISUAL_DONE: f32 = 0.95;

/// Tiered duplicate detection over an asset store.
///
/// Each `detect` call runs to completion on the calling thread. There is no
/// cancellation: a caller that loses interest simply stops reading the status
/// channel.
pub struct Detector<'a> {
    config: DetectionConfig,
    store: &'a dyn AssetStore,
    facts: &'a dyn FactsStore,
    sampler: &'a dyn FrameSampler,
    extractor: &'a dyn FeatureExtractor,
    results: Option<&'a dyn ResultStore>,
    status: watch::Sender<DetectionStatus>,
}

impl<'a> Detector<'a> {
    pub fn new(
        config: DetectionConfig,
        store: &'a dyn AssetStore,
        facts: &'a dyn FactsStore,
        sampler: &'a dyn FrameSampler,
        extractor: &'a dyn FeatureExtractor,
    ) -> Self {
        let (status, _) = watch::channel(DetectionStatus::default());
        Self {
            config,
            store,
            facts,
            sampler,
            extractor,
            results: None,
            status,
        }
    }

    /// Save every completed run's groups as the new snapshot.
    pub fn with_results(mut self, results: &'a dyn ResultStore) -> Self {
        self.results = Some(results);
        self
    }

    /// Publish status on an existing channel instead of the internal one.
    pub fn with_status(mut self, status: watch::Sender<DetectionStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<DetectionStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> DetectionStatus {
        self.status.borrow().clone()
    }

    /// Group `assets` into duplicates: tier 1 groups first, then tier 2, then
    /// (when `include_visual_similarity`) tier 3.
    ///
    /// Individual assets that cannot be read or analysed are skipped. The run
    /// fails with `DetectError::Setup` only when no asset metadata can be read
    /// at all, which means the store itself is unreadable.
    pub fn detect(
        &self,
        cache: &mut AnalysisCache,
        assets: &[Asset],
        include_visual_similarity: bool,
    ) -> Result<Vec<DuplicateGroup>, DetectError> {
        self.status.send_modify(|s| {
            *s = DetectionStatus {
                is_running: true,
                ..DetectionStatus::default()
            }
        });
        let assets = distinct(assets);
        info!("Detecting duplicates among {} videos", assets.len());

        self.report(DetectionPhase::CachePopulating, 0.0, "Reading video metadata");
        let created = match cache.ensure(self.store, &assets) {
            Ok(created) => created,
            Err(e) => {
                self.finish_failed();
                return Err(DetectError::Setup(e));
            }
        };
        debug!("Cached facts for {} new videos", created);
        self.flush_cache(cache);
        self.report(DetectionPhase::CachePopulating, CACHE_DONE, "Video metadata ready");

        let ids: Vec<String> = assets
            .iter()
            .filter(|a| cache.contains(&a.id))
            .map(|a| a.id.clone())
            .collect();

        self.report(DetectionPhase::ExactMatching, CACHE_DONE, "Finding exact duplicates");
        let exact = metadata::group_exact(&ids, cache, self.config.exact_duration_tolerance);
        let mut claimed = claimed_ids(&exact);
        self.report(DetectionPhase::ExactMatching, EXACT_DONE, "Exact duplicates done");

        self.report(DetectionPhase::NearMatching, EXACT_DONE, "Finding near duplicates");
        let remaining: Vec<String> = ids.iter().filter(|id| !claimed.contains(*id)).cloned().collect();
        let near = metadata::group_near(&remaining, cache, self.config.near_duration_tolerance);
        claimed.extend(claimed_ids(&near));
        self.report(DetectionPhase::NearMatching, NEAR_DONE, "Near duplicates done");

        let mut groups = exact;
        groups.extend(near);

        if include_visual_similarity {
            let candidates: Vec<Asset> = assets
                .iter()
                .filter(|a| cache.contains(&a.id) && !claimed.contains(&a.id))
                .cloned()
                .collect();
            groups.extend(self.visual_tier(cache, &candidates));
        }

        info!(
            "Found {} duplicate groups covering {} videos",
            groups.len(),
            groups.iter().map(|g| g.len()).sum::<usize>()
        );

        if let Some(store) = self.results {
            if let Err(e) = results::save(store, &groups) {
                warn!("Failed to save duplicate groups: {}", e);
            }
        }

        self.status.send_modify(|s| {
            s.phase = DetectionPhase::Done;
            s.progress = 1.0;
            s.step_description = format!("Found {} groups", groups.len());
            s.is_running = false;
        });

        Ok(groups)
    }

    fn visual_tier(&self, cache: &mut AnalysisCache, candidates: &[Asset]) -> Vec<DuplicateGroup> {
        let total = candidates.len().max(1) as f32;

        self.report(DetectionPhase::VisualExtracting, NEAR_DONE, "Analysing video frames");
        let added = visual::extract_missing(
            candidates,
            cache,
            &self.config.sample_positions,
            self.sampler,
            self.extractor,
            |index, asset| {
                let progress = NEAR_DONE + (EXTRACT_DONE - NEAR_DONE) * (index as f32 / total);
                self.report(
                    DetectionPhase::VisualExtracting,
                    progress,
                    &format!("Analysing {} ({}/{})", asset.file_name(), index + 1, candidates.len()),
                );
            },
        );
        debug!("Extracted {} new descriptors", added);
        if added > 0 {
            self.flush_cache(cache);
        }
        self.report(DetectionPhase::VisualExtracting, EXTRACT_DONE, "Frame analysis done");

        self.report(DetectionPhase::VisualComparing, EXTRACT_DONE, "Comparing videos");
        let groups = visual::group_visual(
            candidates,
            cache,
            self.extractor,
            self.config.visual_distance_threshold,
            |row, rows| {
                let progress = EXTRACT_DONE + (VISUAL_DONE - EXTRACT_DONE) * ((row + 1) as f32 / rows as f32);
                self.report(DetectionPhase::VisualComparing, progress, "Comparing videos");
            },
        );
        self.report(DetectionPhase::VisualComparing, VISUAL_DONE, "Visual comparison done");

        groups
    }

    fn flush_cache(&self, cache: &mut AnalysisCache) {
        if let Err(e) = cache.flush(self.facts) {
            warn!("Failed to save analysis cache, continuing in memory: {}", e);
        }
    }

    /// Progress never moves backwards within a run.
    fn report(&self, phase: DetectionPhase, progress: f32, step: &str) {
        self.status.send_modify(|s| {
            s.phase = phase;
            s.progress = s.progress.max(progress.clamp(0.0, 1.0));
            s.step_description = step.to_string();
        });
    }

    fn finish_failed(&self) {
        self.status.send_modify(|s| {
            s.is_running = false;
            s.step_description = "Detection failed".to_string();
        });
    }
}

impl std::fmt::Debug for Detector<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("config", &self.config)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

/// `assets` without repeated ids, first occurrence kept.
fn distinct(assets: &[Asset]) -> Vec<Asset> {
    let mut seen = HashSet::with_capacity(assets.len());
    assets.iter().filter(|a| seen.insert(a.id.as_str())).cloned().collect()
}

fn claimed_ids(groups: &[DuplicateGroup]) -> HashSet<String> {
    groups.iter().flat_map(|g| g.members.iter().cloned()).collect()
}
