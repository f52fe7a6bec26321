//! The `videos` catalog and its `AssetStore` implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

use super::{format_timestamp, timestamp_column, Database};
use crate::error::StoreError;
use crate::library::{Asset, AssetMetadata, AssetStore};

/// One scanned video as written to the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: String,
    pub path: String,
    pub filename: String,
    pub directory: String,
    pub size_bytes: u64,
    pub modified_at: Option<String>,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub created_at: Option<DateTime<Utc>>,
}

impl Database {
    /// Insert a video or refresh its probed metadata. The favorite flag is
    /// kept, and a creation date already on record wins over the probed one.
    pub fn upsert_video(&self, entry: &CatalogEntry) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO videos (
                id, path, filename, directory, size_bytes, modified_at,
                duration, width, height, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                path = excluded.path,
                filename = excluded.filename,
                directory = excluded.directory,
                size_bytes = excluded.size_bytes,
                modified_at = excluded.modified_at,
                duration = excluded.duration,
                width = excluded.width,
                height = excluded.height,
                created_at = COALESCE(videos.created_at, excluded.created_at),
                scanned_at = CURRENT_TIMESTAMP
            "#,
            params![
                entry.id,
                entry.path,
                entry.filename,
                entry.directory,
                entry.size_bytes as i64,
                entry.modified_at,
                entry.duration,
                entry.width,
                entry.height,
                entry.created_at.as_ref().map(format_timestamp),
            ],
        )?;
        Ok(())
    }

    /// Path -> recorded modification time for every video under `root`.
    pub fn video_mtimes_under(&self, root: &str) -> Result<HashMap<String, Option<String>>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, modified_at FROM videos WHERE substr(path, 1, length(?1)) = ?1")?;
        let rows = stmt
            .query_map([root], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(rows)
    }

    /// Drop catalog rows under `root` whose path is not in `present`.
    /// Returns the ids removed.
    pub fn remove_videos_not_in(&self, root: &str, present: &HashSet<String>) -> Result<Vec<String>, StoreError> {
        let known = {
            let mut stmt = self.conn.prepare("SELECT id, path FROM videos WHERE substr(path, 1, length(?1)) = ?1")?;
            let rows = stmt
                .query_map([root], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let tx = self.conn.unchecked_transaction()?;
        let mut removed = Vec::new();
        for (id, path) in known {
            if !present.contains(&path) {
                tx.execute("DELETE FROM videos WHERE id = ?", [&id])?;
                removed.push(id);
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    pub fn video_count(&self) -> Result<i64, StoreError> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM videos", [], |row| row.get(0))?;
        Ok(count)
    }

    fn video_path(&self, id: &str) -> Result<Option<String>, StoreError> {
        let path = self
            .conn
            .query_row("SELECT path FROM videos WHERE id = ?", [id], |row| row.get(0))
            .optional()?;
        Ok(path)
    }
}

impl AssetStore for Database {
    fn list(&self) -> Result<Vec<Asset>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT id, path FROM videos ORDER BY path")?;
        let assets = stmt
            .query_map([], |row| {
                Ok(Asset {
                    id: row.get(0)?,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assets)
    }

    fn metadata(&self, id: &str) -> Result<Option<AssetMetadata>, StoreError> {
        let meta = self
            .conn
            .query_row(
                r#"
                SELECT duration, width, height, size_bytes, created_at, is_favorite
                FROM videos
                WHERE id = ?
                "#,
                [id],
                |row| {
                    let created_at = match row.get::<_, Option<String>>(4)? {
                        Some(s) => Some(timestamp_column(4, &s)?),
                        None => None,
                    };
                    Ok(AssetMetadata {
                        duration: row.get(0)?,
                        width: row.get(1)?,
                        height: row.get(2)?,
                        file_size: row.get::<_, i64>(3)?.max(0) as u64,
                        created_at,
                        favorite: row.get::<_, i32>(5)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    /// Removes the catalog rows and the files. If any file cannot be removed
    /// the catalog changes are rolled back; files already removed stay gone
    /// and the next scan drops their rows.
    fn delete(&mut self, ids: &[String]) -> Result<usize, StoreError> {
        let mut targets = Vec::new();
        for id in ids {
            if let Some(path) = self.video_path(id)? {
                targets.push((id.clone(), path));
            }
        }

        let tx = self.conn.transaction()?;
        for (id, path) in &targets {
            tx.execute("DELETE FROM videos WHERE id = ?", [id])?;
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Deleted {}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("{} already gone from disk", path)
                }
                Err(e) => return Err(e.into()),
            }
        }
        tx.commit()?;

        Ok(targets.len())
    }

    fn set_favorite(&mut self, id: &str, favorite: bool) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE videos SET is_favorite = ? WHERE id = ?",
            params![favorite as i32, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_creation_date(&mut self, id: &str, date: DateTime<Utc>) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE videos SET created_at = ? WHERE id = ?",
            params![format_timestamp(&date), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn entry(id: &str, path: &str) -> CatalogEntry {
        CatalogEntry {
            id: id.to_string(),
            path: path.to_string(),
            filename: path.rsplit('/').next().unwrap_or_default().to_string(),
            directory: "/videos".to_string(),
            size_bytes: 1234,
            modified_at: Some("2024-01-01T00:00:00".to_string()),
            duration: 42.5,
            width: 1920,
            height: 1080,
            created_at: None,
        }
    }

    #[test]
    fn test_upsert_and_read_metadata() {
        let db = test_db();
        db.upsert_video(&entry("a", "/videos/a.mp4")).unwrap();

        let assets = db.list().unwrap();
        assert_eq!(assets, vec![Asset::new("a", "/videos/a.mp4")]);

        let meta = db.metadata("a").unwrap().unwrap();
        assert_eq!(meta.duration, 42.5);
        assert_eq!((meta.width, meta.height, meta.file_size), (1920, 1080, 1234));
        assert!(!meta.favorite);
        assert!(db.metadata("zzz").unwrap().is_none());
    }

    #[test]
    fn test_rescan_keeps_user_changes() {
        let mut db = test_db();
        db.upsert_video(&entry("a", "/videos/a.mp4")).unwrap();

        let date = Utc.with_ymd_and_hms(2012, 8, 1, 10, 0, 0).unwrap();
        db.set_favorite("a", true).unwrap();
        db.set_creation_date("a", date).unwrap();

        let mut rescanned = entry("a", "/videos/a.mp4");
        rescanned.size_bytes = 999;
        rescanned.created_at = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        db.upsert_video(&rescanned).unwrap();

        let meta = db.metadata("a").unwrap().unwrap();
        assert!(meta.favorite);
        assert_eq!(meta.created_at, Some(date));
        assert_eq!(meta.file_size, 999);
        assert_eq!(db.video_count().unwrap(), 1);
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let mut db = test_db();
        assert!(matches!(db.set_favorite("nope", true), Err(StoreError::NotFound(_))));
        assert!(matches!(
            db.set_creation_date("nope", Utc::now()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_removes_rows_and_files() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.mp4");
        std::fs::write(&file, b"not really a video").unwrap();
        let path = file.to_string_lossy().to_string();

        let mut db = test_db();
        db.upsert_video(&entry("a", &path)).unwrap();
        db.upsert_video(&entry("b", "/videos/missing-on-disk.mp4")).unwrap();

        let removed = db
            .delete(&["a".to_string(), "b".to_string(), "unknown".to_string()])
            .unwrap();
        assert_eq!(removed, 2);
        assert!(!file.exists());
        assert_eq!(db.video_count().unwrap(), 0);
    }

    #[test]
    fn test_remove_videos_not_in() {
        let db = test_db();
        db.upsert_video(&entry("a", "/videos/a.mp4")).unwrap();
        db.upsert_video(&entry("b", "/videos/b.mp4")).unwrap();
        db.upsert_video(&entry("c", "/elsewhere/c.mp4")).unwrap();

        let present: HashSet<String> = ["/videos/a.mp4".to_string()].into_iter().collect();
        let removed = db.remove_videos_not_in("/videos/", &present).unwrap();
        assert_eq!(removed, vec!["b".to_string()]);
        assert_eq!(db.video_count().unwrap(), 2);

        let mtimes = db.video_mtimes_under("/videos/").unwrap();
        assert_eq!(mtimes.len(), 1);
        assert_eq!(mtimes["/videos/a.mp4"].as_deref(), Some("2024-01-01T00:00:00"));
    }
}
