//! Tiers 1 and 2: grouping by probed metadata alone.

use crate::cache::{AnalysisCache, AssetFacts};

use super::clustering::cluster;
use super::{DuplicateGroup, SimilarityType};

/// Same resolution, same known file size, durations within `tolerance`.
/// An unknown (zero) file size never matches.
pub fn is_exact_match(a: &AssetFacts, b: &AssetFacts, tolerance: f64) -> bool {
    a.file_size > 0
        && a.file_size == b.file_size
        && a.width == b.width
        && a.height == b.height
        && (a.duration - b.duration).abs() < tolerance
}

/// Same resolution, durations within `tolerance`.
pub fn is_near_match(a: &AssetFacts, b: &AssetFacts, tolerance: f64) -> bool {
    a.width == b.width && a.height == b.height && (a.duration - b.duration).abs() < tolerance
}

/// Tier 1 over `ids`.
pub fn group_exact(ids: &[String], cache: &AnalysisCache, tolerance: f64) -> Vec<DuplicateGroup> {
    group_by(ids, cache, SimilarityType::ExactDuplicate, |a, b| {
        is_exact_match(a, b, tolerance)
    })
}

/// Tier 2 over `ids`; callers pass only what tier 1 did not claim.
pub fn group_near(ids: &[String], cache: &AnalysisCache, tolerance: f64) -> Vec<DuplicateGroup> {
    group_by(ids, cache, SimilarityType::NearDuplicate, |a, b| {
        is_near_match(a, b, tolerance)
    })
}

fn group_by<P>(
    ids: &[String],
    cache: &AnalysisCache,
    similarity_type: SimilarityType,
    predicate: P,
) -> Vec<DuplicateGroup>
where
    P: Fn(&AssetFacts, &AssetFacts) -> bool,
{
    let facts: Vec<&AssetFacts> = ids.iter().filter_map(|id| cache.get(id)).collect();

    cluster(
        facts.len(),
        |i, j| predicate(facts[i], facts[j]).then_some(0.0),
        |_| {},
    )
    .into_iter()
    .map(|c| {
        let members = c.members.iter().map(|&i| facts[i].id.clone()).collect();
        DuplicateGroup::new(similarity_type, members, 0.0)
    })
    .collect()
}
