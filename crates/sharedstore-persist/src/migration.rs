//! SQLite schema setup.
//!
//! The schema version lives in `PRAGMA user_version`. A database written by a
//! newer schema is refused rather than guessed at.

use rusqlite::Connection;

use crate::error::{PersistError, Result};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS entries (
        key TEXT PRIMARY KEY,             -- prefix + namespace
        value TEXT NOT NULL,              -- JSON-encoded store value
        updated_at INTEGER NOT NULL       -- local write time (Unix ms)
    );
"#;

/// Bring `conn` to [`SCHEMA_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let found: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    match found {
        SCHEMA_VERSION => Ok(()),
        0 => {
            let tx = conn.transaction()?;
            tx.execute_batch(SCHEMA_V1)?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            tx.commit()?;
            tracing::debug!(version = SCHEMA_VERSION, "created persistence schema");
            Ok(())
        }
        newer => Err(PersistError::Migration(format!(
            "database schema version {newer} is newer than supported version {SCHEMA_VERSION}"
        ))),
    }
}

pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
