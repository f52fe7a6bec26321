use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn discover_videos(directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut videos = Vec::new();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if path.is_file() && has_video_extension(path, extensions) {
            videos.push(path.to_path_buf());
        }
    }

    // Sort by path for consistent ordering
    videos.sort();

    Ok(videos)
}

fn has_video_extension(path: &Path, extensions: &[String]) -> bool {
    // Skip AppleDouble and other dotfiles that share a video extension
    let hidden = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false);
    if hidden {
        return false;
    }

    match path.extension() {
        Some(ext) => {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            extensions.iter().any(|e| e.to_lowercase() == ext_lower)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_discover_videos() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("holiday.mp4")).unwrap();
        File::create(dir.path().join("birthday.MOV")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        File::create(dir.path().join("._holiday.mp4")).unwrap();

        fs::create_dir(dir.path().join("2019")).unwrap();
        File::create(dir.path().join("2019/beach.mkv")).unwrap();

        let extensions = vec!["mp4".to_string(), "mov".to_string(), "mkv".to_string()];
        let videos = discover_videos(dir.path(), &extensions).unwrap();

        assert_eq!(videos.len(), 3);
        assert!(videos.windows(2).all(|w| w[0] < w[1]));
    }
}
