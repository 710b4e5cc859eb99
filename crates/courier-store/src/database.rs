//! The SQLite handle behind [`crate::SqliteStore`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, StoreError};
use crate::migrations;

const DATA_FILE: &str = "courier.db";

/// How long a writer waits on another process holding the file lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A migrated SQLite connection. Table operations live in `impl Database`
/// blocks next to the tables they touch.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open `courier.db` in the platform data directory, creating it if
    /// needed (e.g. `~/.local/share/courier` on Linux).
    pub fn open_default() -> Result<Self> {
        let dirs = ProjectDirs::from("org", "courier", "courier").ok_or(StoreError::NoDataDir)?;
        let dir = dirs.data_dir();
        std::fs::create_dir_all(dir)?;
        Self::open_at(&dir.join(DATA_FILE))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "Opening store");
        let conn = Connection::open(path)?;
        // Nodes of a local cluster may share one file.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::prepare(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Backing file, `None` for in-memory databases.
    pub fn path(&self) -> Option<PathBuf> {
        // rusqlite reports "" for in-memory connections.
        self.conn.path().filter(|p| !p.is_empty()).map(PathBuf::from)
    }

    pub fn schema_version(&self) -> Result<u32> {
        migrations::schema_version(&self.conn)
    }
}
