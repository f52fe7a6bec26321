use anyhow::{bail, Context, Result};
use image::DynamicImage;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

use super::FrameSampler;
use crate::library::Asset;

/// Samples frames by asking `ffmpeg` for a single PNG on stdout.
#[derive(Debug, Clone)]
pub struct FfmpegSampler {
    ffmpeg: PathBuf,
}

impl FfmpegSampler {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl Default for FfmpegSampler {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

/// Seek position in seconds for a fraction of the clip.
pub fn seek_position(duration: f64, at_fraction: f64) -> f64 {
    (duration * at_fraction.clamp(0.0, 1.0)).max(0.0)
}

impl FrameSampler for FfmpegSampler {
    fn frame(&self, asset: &Asset, duration: f64, at_fraction: f64) -> Result<Option<DynamicImage>> {
        let position = seek_position(duration, at_fraction);

        let output = Command::new(&self.ffmpeg)
            .arg("-v")
            .arg("error")
            .arg("-ss")
            .arg(format!("{:.3}", position))
            .arg("-i")
            .arg(asset.path())
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .output()
            .with_context(|| format!("Failed to run {}", self.ffmpeg.display()))?;

        if !output.status.success() {
            bail!(
                "ffmpeg failed on {}: {}",
                asset.path().display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        if output.stdout.is_empty() {
            debug!("No frame at {:.3}s in {}", position, asset.path().display());
            return Ok(None);
        }

        let frame = image::load_from_memory(&output.stdout)
            .with_context(|| format!("Undecodable frame from {}", asset.path().display()))?;
        Ok(Some(frame))
    }
}
