use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};

use super::{format_timestamp, timestamp_column, Database};
use crate::detect::{DuplicateGroup, SimilarityType};
use crate::error::StoreError;
use crate::results::{ResultSnapshot, ResultStore};

impl ResultStore for Database {
    fn replace_groups(&self, groups: &[DuplicateGroup], scan_date: DateTime<Utc>) -> Result<(), StoreError> {
        let scan_date = format_timestamp(&scan_date);
        let tx = self.conn.unchecked_transaction()?;

        tx.execute("DELETE FROM duplicate_groups", [])?;
        tx.execute(
            "INSERT OR REPLACE INTO result_snapshot (id, scan_date) VALUES (1, ?)",
            [&scan_date],
        )?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO duplicate_groups (id, position, similarity_type, score, member_ids, scan_date)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for (position, group) in groups.iter().enumerate() {
                let members = serde_json::to_string(&group.members)?;
                stmt.execute(params![
                    group.id,
                    position as i64,
                    group.similarity_type.as_str(),
                    group.score as f64,
                    members,
                    scan_date,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Stored {} duplicate groups", groups.len());
        Ok(())
    }

    fn latest_groups(&self) -> Result<Option<ResultSnapshot>, StoreError> {
        let scan_date: Option<String> = self
            .conn
            .query_row("SELECT scan_date FROM result_snapshot WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        let Some(scan_date) = scan_date else {
            return Ok(None);
        };
        let scan_date = timestamp_column(0, &scan_date)?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, similarity_type, score, member_ids
            FROM duplicate_groups
            ORDER BY position
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups = Vec::with_capacity(rows.len());
        for (id, kind, score, members) in rows {
            let Some(similarity_type) = SimilarityType::parse(&kind) else {
                warn!("Skipping group {} with unknown similarity type {:?}", id, kind);
                continue;
            };
            let members: Vec<String> = serde_json::from_str(&members)?;
            groups.push(DuplicateGroup {
                id,
                members,
                similarity_type,
                score: score as f32,
            });
        }

        Ok(Some(ResultSnapshot { scan_date, groups }))
    }
}
