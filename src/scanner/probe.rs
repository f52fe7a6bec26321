use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::Path;
use std::process::Command;

/// Stream facts read from a container by `ffprobe`.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProbe {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub created_at: Option<DateTime<Utc>>,
}

pub fn probe_video(ffprobe: &Path, path: &Path) -> Result<VideoProbe> {
    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .with_context(|| format!("Failed to run {}", ffprobe.display()))?;

    if !output.status.success() {
        bail!(
            "ffprobe failed on {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    parse_probe(&output.stdout).with_context(|| format!("Unusable ffprobe output for {}", path.display()))
}

/// Pull duration, dimensions and creation time out of ffprobe's JSON.
///
/// Duration prefers the container value and falls back to the video stream.
/// The creation time comes from the container tags, then the stream tags.
pub fn parse_probe(json: &[u8]) -> Result<VideoProbe> {
    let root: Value = serde_json::from_slice(json)?;

    let stream = root["streams"]
        .as_array()
        .and_then(|streams| streams.iter().find(|s| s["codec_type"] == "video"))
        .ok_or_else(|| anyhow!("No video stream"))?;

    let width = stream["width"].as_u64().unwrap_or(0) as u32;
    let height = stream["height"].as_u64().unwrap_or(0) as u32;

    let duration = number(&root["format"]["duration"])
        .or_else(|| number(&stream["duration"]))
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let created_at = creation_time(&root["format"]).or_else(|| creation_time(stream));

    Ok(VideoProbe {
        duration,
        width,
        height,
        created_at,
    })
}

// ffprobe reports most numbers as strings
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn creation_time(section: &Value) -> Option<DateTime<Utc>> {
    let raw = section["tags"]["creation_time"].as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        // Cameras without a clock write the epoch
        .filter(|dt| dt.timestamp() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PHONE_CLIP: &str = r#"{
        "streams": [
            { "index": 0, "codec_type": "audio", "duration": "12.480000" },
            {
                "index": 1,
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "duration": "12.466667",
                "tags": { "creation_time": "2016-07-04T18:22:05.000000Z" }
            }
        ],
        "format": {
            "filename": "clip.mov",
            "duration": "12.480000",
            "tags": { "creation_time": "2016-07-04T18:22:04.000000Z" }
        }
    }"#;

    #[test]
    fn test_parse_probe() {
        let probe = parse_probe(PHONE_CLIP.as_bytes()).unwrap();
        assert_eq!(probe.duration, 12.48);
        assert_eq!((probe.width, probe.height), (1920, 1080));
        assert_eq!(
            probe.created_at,
            Some(Utc.with_ymd_and_hms(2016, 7, 4, 18, 22, 4).unwrap())
        );
    }

    #[test]
    fn test_stream_fallbacks() {
        let json = r#"{
            "streams": [{
                "codec_type": "video", "width": 640, "height": 480, "duration": "3.5",
                "tags": { "creation_time": "2009-01-02T03:04:05Z" }
            }],
            "format": {}
        }"#;
        let probe = parse_probe(json.as_bytes()).unwrap();
        assert_eq!(probe.duration, 3.5);
        assert_eq!(probe.created_at.map(|d| d.timestamp()), Some(1230865445));
    }

    #[test]
    fn test_epoch_creation_time_ignored() {
        let json = r#"{
            "streams": [{ "codec_type": "video", "width": 320, "height": 240 }],
            "format": { "duration": "1.0", "tags": { "creation_time": "1970-01-01T00:00:00.000000Z" } }
        }"#;
        let probe = parse_probe(json.as_bytes()).unwrap();
        assert!(probe.created_at.is_none());
    }

    #[test]
    fn test_audio_only_is_rejected() {
        let json = r#"{ "streams": [{ "codec_type": "audio" }], "format": { "duration": "4.0" } }"#;
        assert!(parse_probe(json.as_bytes()).is_err());
        assert!(parse_probe(b"not json").is_err());
    }

    #[test]
    fn test_missing_binary() {
        let result = probe_video(Path::new("/nonexistent/ffprobe"), Path::new("/tmp/clip.mp4"));
        assert!(result.is_err());
    }
}
