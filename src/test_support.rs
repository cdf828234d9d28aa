//! Fixtures shared by the unit tests.

use rusqlite::Connection;
use tempfile::TempDir;

use crate::constants::{Format, LEGACY_HISTORY_TABLE_NAME};
use crate::database::SchemaDatabase;
use crate::spatial::functions;
use crate::spatial::metadata::{init_spatial_metadata, SpatialiteFileVersion};

/// In-memory connection with SpatiaLite catalogs and the spatial SQL
/// functions registered.
pub fn spatial_conn(version: SpatialiteFileVersion) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    functions::register(&conn, Format::Spatialite).unwrap();
    init_spatial_metadata(&conn, version).unwrap();
    conn
}

/// Records `id` in the legacy history table, creating it when needed.
pub fn legacy_history(conn: &Connection, id: i64) {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
             id INTEGER PRIMARY KEY,
             app_name VARCHAR(255) NOT NULL,
             migration VARCHAR(255) NOT NULL,
             applied DATETIME NOT NULL
         )",
        LEGACY_HISTORY_TABLE_NAME
    ))
    .unwrap();
    conn.execute(
        &format!(
            "INSERT INTO {} (id, app_name, migration, applied) VALUES (?1, 'threedi_tools', ?2, '2021-01-01 00:00:00')",
            LEGACY_HISTORY_TABLE_NAME
        ),
        rusqlite::params![id, format!("{:04}_auto", id)],
    )
    .unwrap();
}

/// A file-backed database in a fresh temporary directory. The directory
/// lives as long as the returned guard.
pub fn file_db(name: &str) -> (TempDir, SchemaDatabase) {
    let dir = TempDir::new().unwrap();
    let db = SchemaDatabase::new(dir.path().join(name));
    (dir, db)
}

/// A SpatiaLite file with catalogs and nothing else.
pub fn empty_spatialite(name: &str, version: SpatialiteFileVersion) -> (TempDir, SchemaDatabase) {
    let (dir, db) = file_db(name);
    {
        let conn = Connection::open(db.path()).unwrap();
        init_spatial_metadata(&conn, version).unwrap();
    }
    (dir, db)
}

/// A SpatiaLite file whose legacy history ends at `id`.
pub fn legacy_spatialite(name: &str, id: i64) -> (TempDir, SchemaDatabase) {
    let (dir, db) = empty_spatialite(name, SpatialiteFileVersion::V4);
    {
        let conn = Connection::open(db.path()).unwrap();
        legacy_history(&conn, id);
    }
    (dir, db)
}
