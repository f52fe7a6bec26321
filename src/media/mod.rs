//! Frame sampling and visual feature descriptors.

pub mod descriptor;
pub mod sampler;

use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::library::Asset;

pub use descriptor::PerceptualHashExtractor;
pub use sampler::FfmpegSampler;

/// Opaque, byte-serializable summary of a video frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor(Vec<u8>);

impl Descriptor {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Decodes a single frame of a video.
pub trait FrameSampler {
    /// Decode the frame at `at_fraction` (0.0..=1.0) of `duration` seconds.
    /// `Ok(None)` means the position produced no frame.
    fn frame(&self, asset: &Asset, duration: f64, at_fraction: f64) -> Result<Option<DynamicImage>>;
}

/// Turns frames into descriptors and measures the distance between them.
pub trait FeatureExtractor {
    fn descriptor(&self, image: &DynamicImage) -> Option<Descriptor>;

    /// Smaller means more alike. Incomparable descriptors return
    /// `f32::INFINITY`.
    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32;
}
