use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::detect::visual::SAMPLE_POSITIONS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,

    /// ffmpeg binary used to decode sample frames.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    /// ffprobe binary used to read duration and dimensions while scanning.
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

fn default_video_extensions() -> Vec<String> {
    vec![
        "mp4".to_string(),
        "mov".to_string(),
        "m4v".to_string(),
        "mkv".to_string(),
        "avi".to_string(),
        "webm".to_string(),
        "3gp".to_string(),
        "mts".to_string(),
    ]
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            video_extensions: default_video_extensions(),
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Max duration difference (seconds) for exact duplicates.
    #[serde(default = "default_exact_duration_tolerance")]
    pub exact_duration_tolerance: f64,

    /// Max duration difference (seconds) for near duplicates.
    #[serde(default = "default_near_duration_tolerance")]
    pub near_duration_tolerance: f64,

    /// Descriptor distance below which two videos look the same.
    #[serde(default = "default_visual_distance_threshold")]
    pub visual_distance_threshold: f32,

    /// Frame positions sampled for the visual tier, as fractions of the duration.
    #[serde(default = "default_sample_positions")]
    pub sample_positions: Vec<f64>,

    #[serde(default = "default_include_visual_similarity")]
    pub include_visual_similarity: bool,

    /// Side of the perceptual hash grid.
    #[serde(default = "default_hash_size")]
    pub hash_size: u32,
}

fn default_exact_duration_tolerance() -> f64 {
    0.5
}

fn default_near_duration_tolerance() -> f64 {
    3.0
}

fn default_visual_distance_threshold() -> f32 {
    30.0 // Tuned against 16x16 gradient hashes; not derived
}

fn default_sample_positions() -> Vec<f64> {
    SAMPLE_POSITIONS.to_vec()
}

fn default_include_visual_similarity() -> bool {
    true
}

fn default_hash_size() -> u32 {
    16
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            exact_duration_tolerance: default_exact_duration_tolerance(),
            near_duration_tolerance: default_near_duration_tolerance(),
            visual_distance_threshold: default_visual_distance_threshold(),
            sample_positions: default_sample_positions(),
            include_visual_similarity: default_include_visual_similarity(),
            hash_size: default_hash_size(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vidupe")
        .join("vidupe.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            library: LibraryConfig::default(),
            detection: DetectionConfig::default(),
        }
    }
}

impl Config {
    /// Load from `VIDUPE_CONFIG` or the default location, writing defaults
    /// if no file exists yet.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var_os("VIDUPE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(Self::config_path);

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vidupe")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
