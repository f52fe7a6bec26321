use anyhow::{bail, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::library::AssetStore;
use crate::results::ResultSnapshot;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("Unknown export format: {}", other),
        }
    }

    /// Guess from the output file's extension, defaulting to JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Json,
        }
    }
}

/// Duplicate group data for export
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedGroup {
    pub id: String,
    pub similarity_type: String,
    pub score: f32,
    pub members: Vec<ExportedVideo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedVideo {
    pub id: String,
    pub path: String,
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub file_size: Option<u64>,
    pub created_at: Option<String>,
    pub favorite: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
    scan_date: String,
    groups: &'a [ExportedGroup],
}

/// Export a result snapshot to a file. Returns the number of groups written.
pub fn export_groups(
    snapshot: &ResultSnapshot,
    library: &dyn AssetStore,
    output_path: &Path,
    format: ExportFormat,
) -> Result<usize> {
    let groups = groups_for_export(snapshot, library)?;
    let count = groups.len();

    match format {
        ExportFormat::Json => export_json(&snapshot.scan_date.to_rfc3339(), &groups, output_path)?,
        ExportFormat::Csv => export_csv(&groups, output_path)?,
    }

    Ok(count)
}

fn groups_for_export(snapshot: &ResultSnapshot, library: &dyn AssetStore) -> Result<Vec<ExportedGroup>> {
    let paths: std::collections::HashMap<String, String> = library
        .list()?
        .into_iter()
        .map(|a| (a.id.clone(), a.path.to_string_lossy().to_string()))
        .collect();

    let mut groups = Vec::with_capacity(snapshot.groups.len());
    for group in &snapshot.groups {
        let mut members = Vec::with_capacity(group.members.len());
        for id in &group.members {
            let meta = library.metadata(id)?;
            members.push(ExportedVideo {
                id: id.clone(),
                path: paths.get(id).cloned().unwrap_or_default(),
                duration: meta.as_ref().map(|m| m.duration),
                width: meta.as_ref().map(|m| m.width),
                height: meta.as_ref().map(|m| m.height),
                file_size: meta.as_ref().map(|m| m.file_size),
                created_at: meta.as_ref().and_then(|m| m.created_at).map(|d| d.to_rfc3339()),
                favorite: meta.as_ref().map(|m| m.favorite).unwrap_or(false),
            });
        }
        groups.push(ExportedGroup {
            id: group.id.clone(),
            similarity_type: group.similarity_type.as_str().to_string(),
            score: group.score,
            members,
        });
    }

    Ok(groups)
}

fn export_json(scan_date: &str, groups: &[ExportedGroup], output_path: &Path) -> Result<()> {
    let document = ExportDocument {
        scan_date: scan_date.to_string(),
        groups,
    };
    let json = serde_json::to_string_pretty(&document)?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_csv(groups: &[ExportedGroup], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "group_id",
        "similarity_type",
        "score",
        "video_id",
        "path",
        "duration",
        "width",
        "height",
        "file_size",
        "created_at",
        "favorite",
    ])?;

    // One row per member
    for group in groups {
        for video in &group.members {
            wtr.write_record([
                group.id.as_str(),
                group.similarity_type.as_str(),
                format!("{:.2}", group.score).as_str(),
                video.id.as_str(),
                video.path.as_str(),
                video.duration.map(|v| format!("{:.3}", v)).unwrap_or_default().as_str(),
                video.width.map(|v| v.to_string()).unwrap_or_default().as_str(),
                video.height.map(|v| v.to_string()).unwrap_or_default().as_str(),
                video.file_size.map(|v| v.to_string()).unwrap_or_default().as_str(),
                video.created_at.as_deref().unwrap_or(""),
                if video.favorite { "true" } else { "false" },
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.1} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.1} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.1} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
