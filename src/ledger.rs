//! Reading and writing the schema revision stored in a file.

use log::debug;
use rusqlite::{Connection, OptionalExtension};

use crate::constants::{LEGACY_HISTORY_TABLE_NAME, VERSION_TABLE_NAME};
use crate::database::table_exists;
use crate::error::SchemaError;

/// Zero padded revision id as stored in the version table.
pub fn format_revision(revision: i64) -> String {
    format!("{:04}", revision)
}

/// Current revision, falling back to the legacy history table.
///
/// `None` means an uninitialized file. A version row that is not numeric is
/// treated as absent.
pub fn read_version(conn: &Connection) -> Result<Option<i64>, SchemaError> {
    if let Some(version) = revision_ledger_version(conn)? {
        return Ok(Some(version));
    }
    legacy_version(conn)
}

fn revision_ledger_version(conn: &Connection) -> Result<Option<i64>, SchemaError> {
    if !table_exists(conn, VERSION_TABLE_NAME)? {
        return Ok(None);
    }
    let raw: Option<Option<String>> = conn
        .query_row(
            &format!("SELECT version_num FROM {} LIMIT 1", VERSION_TABLE_NAME),
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.flatten().and_then(|v| v.trim().parse::<i64>().ok()))
}

/// Highest id of the legacy history table.
pub fn legacy_version(conn: &Connection) -> Result<Option<i64>, SchemaError> {
    if !table_exists(conn, LEGACY_HISTORY_TABLE_NAME)? {
        return Ok(None);
    }
    let version: Option<i64> = conn.query_row(
        &format!("SELECT MAX(id) FROM {}", LEGACY_HISTORY_TABLE_NAME),
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Replaces the stored revision.
pub fn write_version(conn: &Connection, revision: i64) -> Result<(), SchemaError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
             version_num VARCHAR(32) NOT NULL,
             CONSTRAINT {}_pkc PRIMARY KEY (version_num)
         );
         DELETE FROM {};",
        VERSION_TABLE_NAME, VERSION_TABLE_NAME, VERSION_TABLE_NAME
    ))?;
    conn.execute(
        &format!("INSERT INTO {} (version_num) VALUES (?1)", VERSION_TABLE_NAME),
        [format_revision(revision)],
    )?;
    debug!("Stored schema revision {}", format_revision(revision));
    Ok(())
}
