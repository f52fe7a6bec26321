//! Tier 3: grouping by visual descriptors.
//!
//! Extraction samples a handful of frames per video and keeps one
//! representative descriptor, which is stored in the analysis cache and never
//! recomputed. Comparison then clusters every candidate that has a
//! descriptor.

use tracing::{debug, warn};

use crate::cache::AnalysisCache;
use crate::library::Asset;
use crate::media::{Descriptor, FeatureExtractor, FrameSampler};

use super::clustering::cluster;
use super::{DuplicateGroup, SimilarityType};

/// Default frame positions, as fractions of the duration.
pub const SAMPLE_POSITIONS: [f64; 5] = [0.1, 0.25, 0.5, 0.75, 0.9];

/// The middle descriptor when there are at least three, else the first.
pub fn representative(mut descriptors: Vec<Descriptor>) -> Option<Descriptor> {
    if descriptors.len() >= 3 {
        let middle = descriptors.len() / 2;
        Some(descriptors.swap_remove(middle))
    } else {
        descriptors.into_iter().next()
    }
}

/// Sample `positions` of one video and reduce them to a representative
/// descriptor. Frames that fail to decode are skipped.
pub fn extract_descriptor(
    asset: &Asset,
    duration: f64,
    positions: &[f64],
    sampler: &dyn FrameSampler,
    extractor: &dyn FeatureExtractor,
) -> Option<Descriptor> {
    if duration.is_nan() || duration <= 0.0 {
        return None;
    }

    let mut descriptors = Vec::with_capacity(positions.len());
    for &fraction in positions {
        match sampler.frame(asset, duration, fraction) {
            Ok(Some(frame)) => {
                if let Some(descriptor) = extractor.descriptor(&frame) {
                    descriptors.push(descriptor);
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Frame at {:.2} of {} failed: {:#}", fraction, asset.id, e),
        }
    }

    representative(descriptors)
}

/// Attach descriptors to every candidate that does not have one yet.
///
/// `on_asset(index, asset)` is called before each candidate is looked at.
/// Returns the number of descriptors added.
pub fn extract_missing<F>(
    candidates: &[Asset],
    cache: &mut AnalysisCache,
    positions: &[f64],
    sampler: &dyn FrameSampler,
    extractor: &dyn FeatureExtractor,
    mut on_asset: F,
) -> usize
where
    F: FnMut(usize, &Asset),
{
    let mut added = 0;

    for (index, asset) in candidates.iter().enumerate() {
        on_asset(index, asset);

        let duration = match cache.get(&asset.id) {
            Some(facts) if facts.feature_descriptor.is_none() => facts.duration,
            _ => continue,
        };

        match extract_descriptor(asset, duration, positions, sampler, extractor) {
            Some(descriptor) => {
                cache.set(&asset.id, |facts| facts.feature_descriptor = Some(descriptor));
                added += 1;
            }
            None => warn!("No usable frames in {}, skipping visual comparison", asset.path.display()),
        }
    }

    added
}

/// Cluster candidates whose descriptors are closer than `threshold`.
///
/// `on_row(index, total)` reports comparison progress.
pub fn group_visual<F>(
    candidates: &[Asset],
    cache: &AnalysisCache,
    extractor: &dyn FeatureExtractor,
    threshold: f32,
    mut on_row: F,
) -> Vec<DuplicateGroup>
where
    F: FnMut(usize, usize),
{
    let described: Vec<(&str, &Descriptor)> = candidates
        .iter()
        .filter_map(|asset| {
            let facts = cache.get(&asset.id)?;
            let descriptor = facts.feature_descriptor.as_ref()?;
            Some((asset.id.as_str(), descriptor))
        })
        .collect();
    let total = described.len();

    cluster(
        total,
        |i, j| {
            let distance = extractor.distance(described[i].1, described[j].1);
            (distance < threshold).then_some(distance)
        },
        |i| on_row(i, total),
    )
    .into_iter()
    .map(|c| {
        let members = c.members.iter().map(|&i| described[i].0.to_string()).collect();
        DuplicateGroup::new(SimilarityType::VisuallySimilar, members, c.worst)
    })
    .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::library::{AssetMetadata, AssetStore, MemoryLibrary};
    use anyhow::{bail, Result};
    use image::{DynamicImage, Rgb, RgbImage};
    use std::cell::Cell;
    use std::collections::HashMap;

    /// Frames whose first pixel encodes the sample fraction; fails for the
    /// configured ids.
    pub(crate) struct FakeSampler {
        pub failing: Vec<String>,
        pub calls: Cell<usize>,
    }

    impl FakeSampler {
        pub(crate) fn new() -> Self {
            Self {
                failing: Vec::new(),
                calls: Cell::new(0),
            }
        }
    }

    impl FrameSampler for FakeSampler {
        fn frame(&self, asset: &Asset, _duration: f64, at_fraction: f64) -> Result<Option<DynamicImage>> {
            self.calls.set(self.calls.get() + 1);
            if self.failing.contains(&asset.id) {
                bail!("decoder stalled");
            }
            let level = (at_fraction * 100.0) as u8;
            Ok(Some(DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([level, 0, 0])))))
        }
    }

    /// One-byte descriptor holding the frame's red level; distance is the
    /// absolute difference.
    pub(crate) struct FakeExtractor;

    impl FeatureExtractor for FakeExtractor {
        fn descriptor(&self, image: &DynamicImage) -> Option<Descriptor> {
            let level = image.to_rgb8().get_pixel(0, 0)[0];
            Some(Descriptor::from_bytes(vec![level]))
        }

        fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32 {
            (a.as_bytes()[0] as f32 - b.as_bytes()[0] as f32).abs()
        }
    }

    fn library(ids: &[(&str, f64)]) -> MemoryLibrary {
        let mut lib = MemoryLibrary::new();
        for &(id, duration) in ids {
            lib.insert(
                Asset::new(id, format!("/videos/{}.mp4", id)),
                AssetMetadata {
                    duration,
                    width: 1280,
                    height: 720,
                    file_size: 1,
                    created_at: None,
                    favorite: false,
                },
            );
        }
        lib
    }

    fn cache_with_descriptors(values: &HashMap<&str, u8>) -> (AnalysisCache, Vec<Asset>) {
        let ids: Vec<(&str, f64)> = values.keys().map(|id| (*id, 30.0)).collect();
        let lib = library(&ids);
        let mut assets = lib.list().unwrap();
        assets.sort_by(|a, b| a.id.cmp(&b.id));
        let mut cache = AnalysisCache::new();
        cache.ensure(&lib, &assets).unwrap();
        for (id, value) in values {
            cache.set(id, |f| f.feature_descriptor = Some(Descriptor::from_bytes(vec![*value])));
        }
        (cache, assets)
    }

    #[test]
    fn test_representative_picks_middle() {
        let d = |b: u8| Descriptor::from_bytes(vec![b]);
        assert_eq!(representative(vec![d(1), d(2), d(3), d(4), d(5)]), Some(d(3)));
        assert_eq!(representative(vec![d(1), d(2), d(3), d(4)]), Some(d(3)));
        assert_eq!(representative(vec![d(1), d(2), d(3)]), Some(d(2)));
        assert_eq!(representative(vec![d(1), d(2)]), Some(d(1)));
        assert_eq!(representative(vec![]), None);
    }

    #[test]
    fn test_extract_descriptor_uses_middle_sample() {
        let asset = Asset::new("a", "/videos/a.mp4");
        let sampler = FakeSampler::new();
        let descriptor = extract_descriptor(&asset, 30.0, &SAMPLE_POSITIONS, &sampler, &FakeExtractor).unwrap();
        assert_eq!(descriptor.as_bytes(), &[50]);
        assert_eq!(sampler.calls.get(), 5);
    }

    #[test]
    fn test_extract_descriptor_needs_duration() {
        let asset = Asset::new("a", "/videos/a.mp4");
        let sampler = FakeSampler::new();
        assert!(extract_descriptor(&asset, 0.0, &SAMPLE_POSITIONS, &sampler, &FakeExtractor).is_none());
        assert!(extract_descriptor(&asset, f64::NAN, &SAMPLE_POSITIONS, &sampler, &FakeExtractor).is_none());
        assert_eq!(sampler.calls.get(), 0);
    }

    #[test]
    fn test_extract_missing_skips_failures_and_is_idempotent() {
        let lib = library(&[("a", 30.0), ("b", 30.0), ("c", 0.0)]);
        let assets = lib.list().unwrap();
        let mut cache = AnalysisCache::new();
        cache.ensure(&lib, &assets).unwrap();

        let mut sampler = FakeSampler::new();
        sampler.failing.push("b".to_string());

        let mut seen = Vec::new();
        let added = extract_missing(&assets, &mut cache, &SAMPLE_POSITIONS, &sampler, &FakeExtractor, |i, _| {
            seen.push(i)
        });
        assert_eq!(added, 1);
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(cache.get("a").unwrap().feature_descriptor.is_some());
        assert!(cache.get("b").unwrap().feature_descriptor.is_none());
        assert!(cache.get("c").unwrap().feature_descriptor.is_none());

        cache.set("a", |f| f.feature_descriptor = Some(Descriptor::from_bytes(vec![7])));
        let calls = sampler.calls.get();
        sampler.failing.clear();
        extract_missing(&assets, &mut cache, &SAMPLE_POSITIONS, &sampler, &FakeExtractor, |_, _| {});
        assert_eq!(cache.get("a").unwrap().feature_descriptor.as_ref().unwrap().as_bytes(), &[7]);
        // only b is resampled; c has no duration
        assert_eq!(sampler.calls.get(), calls + 5);
    }

    #[test]
    fn test_distance_below_threshold_groups() {
        let (cache, assets) = cache_with_descriptors(&HashMap::from([("a", 100u8), ("b", 125u8)]));
        let groups = group_visual(&assets, &cache, &FakeExtractor, 30.0, |_, _| {});
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].similarity_type, SimilarityType::VisuallySimilar);
        assert_eq!(groups[0].score, 25.0);
        assert_eq!(groups[0].members, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_distance_above_threshold_does_not_group() {
        let (cache, assets) = cache_with_descriptors(&HashMap::from([("a", 100u8), ("b", 135u8)]));
        assert!(group_visual(&assets, &cache, &FakeExtractor, 30.0, |_, _| {}).is_empty());
    }

    #[test]
    fn test_score_is_worst_accepted_distance() {
        let (cache, assets) =
            cache_with_descriptors(&HashMap::from([("a", 100u8), ("b", 110u8), ("c", 129u8), ("d", 250u8)]));
        let mut rows = 0;
        let groups = group_visual(&assets, &cache, &FakeExtractor, 30.0, |_, total| {
            assert_eq!(total, 4);
            rows += 1;
        });
        assert_eq!(rows, 4);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);
        assert_eq!(groups[0].score, 29.0);
    }
}
