use rusqlite::{Connection, Result};
use tracing::{debug, info};

const SCHEMA_VERSION: i64 = 1;

/// The catalogue: one SQLite connection, owned by whichever thread drives the loader.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        debug!("Opening catalogue at {}", path);
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        let db = Database { conn };
        db.migrate_schema()?;
        Ok(db)
    }

    pub fn schema_version(&self) -> Result<i64> {
        self.conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
    }

    /// Older layouts are dropped and recreated; the next sync repopulates them from disk.
    fn migrate_schema(&self) -> Result<()> {
        let version = self.schema_version()?;
        if version > 0 && version < SCHEMA_VERSION {
            info!(
                "Catalogue schema {} is older than {}, recreating tables",
                version, SCHEMA_VERSION
            );
            self.conn.execute_batch(
                "DROP TABLE IF EXISTS media_record;
                 DROP TABLE IF EXISTS extension;
                 DROP TABLE IF EXISTS folder;",
            )?;
        }

        self.conn.execute_batch(include_str!("schema.sql"))?;
        debug!("Catalogue schema at version {}", SCHEMA_VERSION);
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Delete every row. Media rows go first because they reference the other tables.
    pub fn truncate_all(&self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
             DELETE FROM media_record;
             DELETE FROM extension;
             DELETE FROM folder;
             COMMIT;",
        )?;
        info!("Catalogue truncated");
        Ok(())
    }
}
