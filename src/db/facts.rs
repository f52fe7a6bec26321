use rusqlite::params;
use tracing::warn;

use super::{format_timestamp, timestamp_column, Database};
use crate::cache::{AssetFacts, FactsStore, YearSource};
use crate::error::StoreError;
use crate::media::Descriptor;

impl FactsStore for Database {
    fn load_facts(&self) -> Result<Vec<AssetFacts>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, duration, width, height, file_size, feature_descriptor,
                   estimated_year, year_source, heuristic_year, last_analyzed, version
            FROM asset_facts
            "#,
        )?;

        let facts = stmt
            .query_map([], |row| {
                let year_source: Option<String> = row.get(7)?;
                let last_analyzed: String = row.get(9)?;
                Ok(AssetFacts {
                    id: row.get(0)?,
                    duration: row.get(1)?,
                    width: row.get(2)?,
                    height: row.get(3)?,
                    file_size: row.get::<_, i64>(4)?.max(0) as u64,
                    feature_descriptor: row.get::<_, Option<Vec<u8>>>(5)?.map(Descriptor::from_bytes),
                    estimated_year: row.get(6)?,
                    year_source: year_source.as_deref().and_then(YearSource::parse),
                    heuristic_year: row.get(8)?,
                    last_analyzed: timestamp_column(9, &last_analyzed)?,
                    version: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(facts)
    }

    fn save_facts(&self, facts: &[AssetFacts]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO asset_facts (
                    id, duration, width, height, file_size, feature_descriptor,
                    estimated_year, year_source, heuristic_year, last_analyzed, version
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for f in facts {
                stmt.execute(params![
                    f.id,
                    f.duration,
                    f.width,
                    f.height,
                    f.file_size as i64,
                    f.feature_descriptor.as_ref().map(|d| d.as_bytes()),
                    f.estimated_year,
                    f.year_source.map(|s| s.as_str()),
                    f.heuristic_year,
                    format_timestamp(&f.last_analyzed),
                    f.version,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn remove_facts(&self, ids: &[String]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        for id in ids {
            let removed = tx.execute("DELETE FROM asset_facts WHERE id = ?", [id])?;
            if removed == 0 {
                warn!("No cached facts to remove for {}", id);
            }
        }
        tx.commit()?;
        Ok(())
    }
}
