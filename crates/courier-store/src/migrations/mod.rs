//! Schema migrations.
//!
//! Steps run in version order on every open; the `user_version` pragma
//! records the last one applied.

pub mod v001_initial;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

const STEPS: &[(u32, &str, Step)] = &[(1, "v001_initial", v001_initial::up)];

/// Version the schema reaches once every step has run.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |(version, _, _)| *version)
}

pub fn schema_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let mut current = schema_version(conn)?;
    for &(version, name, step) in STEPS {
        if current >= version {
            continue;
        }
        info!(migration = name, from = current, to = version, "Applying schema migration");
        step(conn).map_err(|source| StoreError::Migration { version, source })?;
        conn.pragma_update(None, "user_version", version)?;
        current = version;
    }
    debug!(version = current, "Schema up to date");
    Ok(())
}
