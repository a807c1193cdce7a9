use super::models::{format_timestamp, parse_timestamp, MediaRow};
use super::sqlite::Database;
use crate::model::{ExtensionRow, MediaRecord, PersistentFolder};
use rusqlite::types::Type;
use rusqlite::{params, Result};
use tracing::debug;

impl Database {
    // ── Folders ──────────────────────────────────────────────────

    pub fn insert_folder(&self, path: &str) -> Result<PersistentFolder> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT INTO folder (path, created_at) VALUES (?1, ?2)",
            params![path, now],
        )?;
        let id = self.connection().last_insert_rowid();
        debug!("Inserted folder {} ({})", id, path);
        Ok(PersistentFolder {
            id,
            path: path.to_string(),
        })
    }

    pub fn get_folders(&self) -> Result<Vec<PersistentFolder>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT id, path FROM folder ORDER BY id")?;
        let folders = stmt
            .query_map([], |row| {
                Ok(PersistentFolder {
                    id: row.get(0)?,
                    path: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(folders)
    }

    // ── Extensions ───────────────────────────────────────────────

    pub fn insert_extension(&self, name: &str) -> Result<ExtensionRow> {
        self.connection().execute(
            "INSERT INTO extension (name) VALUES (?1)",
            params![name],
        )?;
        Ok(ExtensionRow {
            id: self.connection().last_insert_rowid(),
            name: name.to_string(),
        })
    }

    pub fn get_extensions(&self) -> Result<Vec<ExtensionRow>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT id, name FROM extension ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ExtensionRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Media Records ────────────────────────────────────────────

    pub fn insert_media_record(
        &self,
        folder_id: i64,
        extension_id: i64,
        record: &MediaRecord,
    ) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT INTO media_record \
             (folder_id, basename, extension_id, start_time, duration_secs, \
              group_id, derived, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                folder_id,
                record.basename,
                extension_id,
                format_timestamp(&record.start),
                record.duration_secs,
                record.group_id,
                record.derived,
                now,
            ],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn get_media_records(&self, folder_id: i64) -> Result<Vec<MediaRow>> {
        let mut stmt = self.connection().prepare(
            "SELECT mr.id, mr.folder_id, mr.basename, e.name, mr.start_time, \
                    mr.duration_secs, mr.group_id, mr.derived \
             FROM media_record mr \
             JOIN extension e ON e.id = mr.extension_id \
             WHERE mr.folder_id = ?1 \
             ORDER BY mr.start_time, mr.basename",
        )?;
        let rows = stmt
            .query_map(params![folder_id], |row| {
                let start_text: String = row.get(4)?;
                let start_time = parse_timestamp(&start_text).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
                })?;
                Ok(MediaRow {
                    id: row.get(0)?,
                    folder_id: row.get(1)?,
                    basename: row.get(2)?,
                    extension: row.get(3)?,
                    start_time,
                    duration_secs: row.get(5)?,
                    group_id: row.get(6)?,
                    derived: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_media_records(&self, folder_id: i64) -> Result<i64> {
        self.connection().query_row(
            "SELECT COUNT(*) FROM media_record WHERE folder_id = ?1",
            params![folder_id],
            |row| row.get(0),
        )
    }
}
