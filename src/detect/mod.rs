//! Tiered duplicate detection.
//!
//! Tier 1 groups exact metadata matches, tier 2 groups near metadata matches
//! among what tier 1 left over, and tier 3 compares visual descriptors of the
//! remainder. An asset belongs to at most one group across all tiers.

pub mod clustering;
pub mod metadata;
pub mod orchestrator;
pub mod visual;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use orchestrator::Detector;

/// Which tier produced a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SimilarityType {
    ExactDuplicate,
    NearDuplicate,
    VisuallySimilar,
}

impl SimilarityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityType::ExactDuplicate => "exactDuplicate",
            SimilarityType::NearDuplicate => "nearDuplicate",
            SimilarityType::VisuallySimilar => "visuallySimilar",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exactDuplicate" => Some(SimilarityType::ExactDuplicate),
            "nearDuplicate" => Some(SimilarityType::NearDuplicate),
            "visuallySimilar" => Some(SimilarityType::VisuallySimilar),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SimilarityType::ExactDuplicate => "Exact duplicate",
            SimilarityType::NearDuplicate => "Near duplicate",
            SimilarityType::VisuallySimilar => "Visually similar",
        }
    }
}

impl std::fmt::Display for SimilarityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Assets considered the same content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub id: String,
    /// Discovery order.
    pub members: Vec<String>,
    pub similarity_type: SimilarityType,
    /// 0 for the metadata tiers. For visual groups, the largest descriptor
    /// distance among the accepted matches (a worst-fit marker, not a
    /// confidence).
    pub score: f32,
}

impl DuplicateGroup {
    pub fn new(similarity_type: SimilarityType, members: Vec<String>, score: f32) -> Self {
        let id = group_id(similarity_type, &members);
        Self {
            id,
            members,
            similarity_type,
            score,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// A group needs at least two members to mean anything.
    pub fn is_valid(&self) -> bool {
        self.members.len() >= 2
    }

    /// Remove a member; returns whether the group is still valid.
    pub fn remove_member(&mut self, id: &str) -> bool {
        self.members.retain(|m| m != id);
        self.is_valid()
    }
}

/// Stable token derived from the tier and the member list.
fn group_id(similarity_type: SimilarityType, members: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(similarity_type.as_str().as_bytes());
    for member in members {
        hasher.update([0u8]);
        hasher.update(member.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionPhase {
    #[default]
    Idle,
    CachePopulating,
    ExactMatching,
    NearMatching,
    VisualExtracting,
    VisualComparing,
    Done,
}

/// Observable state of a detection run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionStatus {
    pub phase: DetectionPhase,
    /// Monotonic within a run, 0.0..=1.0.
    pub progress: f32,
    pub step_description: String,
    pub is_running: bool,
}

impl DetectionStatus {
    /// Progress as a percentage (0-100).
    pub fn percent(&self) -> u8 {
        (self.progress.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}
