//! SpatiaLite metadata catalogs.
//!
//! Two generations of the catalog layout exist in the wild. Files created by
//! SpatiaLite 3 describe geometry columns with a textual `type`, files from
//! SpatiaLite 4 onwards use an integer `geometry_type`. Both are read; new
//! files are always created with the newer layout.

use chrono::Utc;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{quote_ident, table_exists};
use crate::error::SchemaError;

use super::crs;
use super::functions::SPATIAL_LIB_VERSION;
use super::geometry::GeometryKind;
use super::index;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpatialiteFileVersion {
    V3,
    V4,
}

impl SpatialiteFileVersion {
    pub fn major(self) -> u32 {
        match self {
            SpatialiteFileVersion::V3 => 3,
            SpatialiteFileVersion::V4 => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryColumn {
    pub table: String,
    pub column: String,
    pub kind: GeometryKind,
    pub srid: i32,
    pub spatial_index_enabled: bool,
}

const SPATIAL_REF_SYS_V4: &str = r#"
CREATE TABLE spatial_ref_sys (
    srid INTEGER NOT NULL PRIMARY KEY,
    auth_name TEXT NOT NULL,
    auth_srid INTEGER NOT NULL,
    ref_sys_name TEXT NOT NULL DEFAULT 'Unknown',
    proj4text TEXT NOT NULL,
    srtext TEXT NOT NULL DEFAULT 'Undefined'
);
CREATE TABLE geometry_columns (
    f_table_name TEXT NOT NULL,
    f_geometry_column TEXT NOT NULL,
    geometry_type INTEGER NOT NULL,
    coord_dimension INTEGER NOT NULL,
    srid INTEGER NOT NULL,
    spatial_index_enabled INTEGER NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (f_table_name, f_geometry_column)
);
CREATE TABLE views_geometry_columns (
    view_name TEXT NOT NULL,
    view_geometry TEXT NOT NULL,
    view_rowid TEXT NOT NULL,
    f_table_name TEXT NOT NULL,
    f_geometry_column TEXT NOT NULL,
    read_only INTEGER NOT NULL,
    CONSTRAINT pk_geomv PRIMARY KEY (view_name, view_geometry)
);
"#;

const SPATIAL_REF_SYS_V3: &str = r#"
CREATE TABLE spatial_ref_sys (
    srid INTEGER NOT NULL PRIMARY KEY,
    auth_name VARCHAR(256) NOT NULL,
    auth_srid INTEGER NOT NULL,
    ref_sys_name VARCHAR(256),
    proj4text VARCHAR(2048) NOT NULL,
    srs_wkt VARCHAR(8192)
);
CREATE TABLE geometry_columns (
    f_table_name VARCHAR(256) NOT NULL,
    f_geometry_column VARCHAR(256) NOT NULL,
    type VARCHAR(30) NOT NULL,
    coord_dimension INTEGER NOT NULL,
    srid INTEGER,
    spatial_index_enabled INTEGER NOT NULL
);
CREATE TABLE views_geometry_columns (
    view_name VARCHAR(256) NOT NULL,
    view_geometry VARCHAR(256) NOT NULL,
    view_rowid VARCHAR(30) NOT NULL,
    f_table_name VARCHAR(256) NOT NULL,
    f_geometry_column VARCHAR(256) NOT NULL
);
"#;

const SPATIALITE_HISTORY: &str = r#"
CREATE TABLE IF NOT EXISTS spatialite_history (
    event_id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    geometry_column TEXT,
    event TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    ver_sqlite TEXT NOT NULL,
    ver_splite TEXT NOT NULL
);
"#;

/// Reference systems seeded into a new catalog.
const SEED_SRIDS: [i32; 5] = [4326, 4258, 28992, 28991, 3857];

/// Catalog layout of the file, `None` when it has no SpatiaLite metadata.
pub fn file_version(conn: &Connection) -> Result<Option<SpatialiteFileVersion>, SchemaError> {
    if !table_exists(conn, "spatial_ref_sys")? {
        return Ok(None);
    }
    let has_srs_wkt = column_exists(conn, "spatial_ref_sys", "srs_wkt")?;
    Ok(Some(if has_srs_wkt {
        SpatialiteFileVersion::V3
    } else {
        SpatialiteFileVersion::V4
    }))
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, SchemaError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM pragma_table_info(?1) WHERE lower(name) = lower(?2)",
            params![table, column],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn log_event(conn: &Connection, table: &str, column: Option<&str>, event: &str) -> Result<(), SchemaError> {
    if !table_exists(conn, "spatialite_history")? {
        return Ok(());
    }
    let sqlite_version: String = conn.query_row("SELECT sqlite_version()", [], |r| r.get(0))?;
    conn.execute(
        "INSERT INTO spatialite_history (table_name, geometry_column, event, timestamp, ver_sqlite, ver_splite)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            table,
            column,
            event,
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            sqlite_version,
            SPATIAL_LIB_VERSION
        ],
    )?;
    Ok(())
}

/// Creates the SpatiaLite catalogs in an empty file.
pub fn init_spatial_metadata(
    conn: &Connection,
    version: SpatialiteFileVersion,
) -> Result<(), SchemaError> {
    if table_exists(conn, "spatial_ref_sys")? {
        return Err(SchemaError::Error(
            "Spatial metadata is already initialized".to_string(),
        ));
    }
    let ddl = match version {
        SpatialiteFileVersion::V3 => SPATIAL_REF_SYS_V3,
        SpatialiteFileVersion::V4 => SPATIAL_REF_SYS_V4,
    };
    conn.execute_batch(ddl)?;
    conn.execute_batch(SPATIALITE_HISTORY)?;
    conn.execute(
        "INSERT INTO spatial_ref_sys (srid, auth_name, auth_srid, ref_sys_name, proj4text)
         VALUES (-1, 'NONE', -1, 'Undefined - Cartesian', ''), (0, 'NONE', 0, 'Undefined - Geographic Long/Lat', '')",
        [],
    )?;
    for srid in SEED_SRIDS {
        ensure_srid(conn, srid)?;
    }
    log_event(conn, "spatial_ref_sys", None, "table successfully populated")?;
    debug!("Initialized spatial metadata (file version {})", version.major());
    Ok(())
}

/// Adds `srid` to `spatial_ref_sys` when it is not there yet.
pub fn ensure_srid(conn: &Connection, srid: i32) -> Result<(), SchemaError> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM spatial_ref_sys WHERE srid = ?1", [srid], |r| r.get(0))
        .optional()?;
    if exists.is_some() {
        return Ok(());
    }
    let crs = crs::lookup(srid).ok_or_else(|| SchemaError::invalid_srid(srid, "unknown CRS"))?;
    let text_column = match file_version(conn)? {
        Some(SpatialiteFileVersion::V3) => "srs_wkt",
        _ => "srtext",
    };
    conn.execute(
        &format!(
            "INSERT INTO spatial_ref_sys (srid, auth_name, auth_srid, ref_sys_name, proj4text, {})
             VALUES (?1, 'epsg', ?1, ?2, ?3, ?4)",
            text_column
        ),
        params![srid, crs.name, crs.proj4(), crs.definition()],
    )?;
    Ok(())
}

pub fn geometry_columns(conn: &Connection) -> Result<Vec<GeometryColumn>, SchemaError> {
    let Some(version) = file_version(conn)? else {
        return Ok(Vec::new());
    };
    if !table_exists(conn, "geometry_columns")? {
        return Ok(Vec::new());
    }
    let sql = match version {
        SpatialiteFileVersion::V3 => {
            "SELECT f_table_name, f_geometry_column, type, srid, spatial_index_enabled FROM geometry_columns"
        }
        SpatialiteFileVersion::V4 => {
            "SELECT f_table_name, f_geometry_column, geometry_type, srid, spatial_index_enabled FROM geometry_columns"
        }
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| {
        let kind = match version {
            SpatialiteFileVersion::V3 => GeometryKind::from_name(&row.get::<_, String>(2)?),
            SpatialiteFileVersion::V4 => GeometryKind::from_code(row.get::<_, u32>(2)?),
        };
        Ok(GeometryColumn {
            table: row.get(0)?,
            column: row.get(1)?,
            kind: kind.unwrap_or(GeometryKind::Geometry),
            srid: row.get::<_, Option<i32>>(3)?.unwrap_or(0),
            spatial_index_enabled: row.get::<_, i64>(4)? != 0,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn geometry_column(
    conn: &Connection,
    table: &str,
    column: &str,
) -> Result<Option<GeometryColumn>, SchemaError> {
    Ok(geometry_columns(conn)?.into_iter().find(|g| {
        g.table.eq_ignore_ascii_case(table) && g.column.eq_ignore_ascii_case(column)
    }))
}

fn register(
    conn: &Connection,
    table: &str,
    column: &str,
    kind: GeometryKind,
    srid: i32,
) -> Result<(), SchemaError> {
    let version = file_version(conn)?.ok_or_else(|| {
        SchemaError::Error("Spatial metadata is not initialized".to_string())
    })?;
    ensure_srid(conn, srid)?;
    unregister(conn, table, column)?;
    match version {
        SpatialiteFileVersion::V3 => conn.execute(
            "INSERT INTO geometry_columns (f_table_name, f_geometry_column, type, coord_dimension, srid, spatial_index_enabled)
             VALUES (?1, ?2, ?3, 2, ?4, 0)",
            params![table, column, kind.name(), srid],
        )?,
        SpatialiteFileVersion::V4 => conn.execute(
            "INSERT INTO geometry_columns (f_table_name, f_geometry_column, geometry_type, coord_dimension, srid, spatial_index_enabled)
             VALUES (lower(?1), lower(?2), ?3, 2, ?4, 0)",
            params![table, column, kind.code(), srid],
        )?,
    };
    Ok(())
}

fn unregister(conn: &Connection, table: &str, column: &str) -> Result<(), SchemaError> {
    conn.execute(
        "DELETE FROM geometry_columns WHERE lower(f_table_name) = lower(?1) AND lower(f_geometry_column) = lower(?2)",
        params![table, column],
    )?;
    Ok(())
}

/// Appends a geometry column to `table` and registers it.
pub fn add_geometry_column(
    conn: &Connection,
    table: &str,
    column: &str,
    srid: i32,
    kind: GeometryKind,
) -> Result<(), SchemaError> {
    if !column_exists(conn, table, column)? {
        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table),
            quote_ident(column),
            kind.name()
        ))?;
    }
    register(conn, table, column, kind, srid)?;
    log_event(conn, table, Some(column), "Geometry [XY] successfully created")?;
    Ok(())
}

/// Registers an existing column as a geometry column.
pub fn recover_geometry_column(
    conn: &Connection,
    table: &str,
    column: &str,
    srid: i32,
    kind: GeometryKind,
) -> Result<(), SchemaError> {
    if !column_exists(conn, table, column)? {
        return Err(SchemaError::Error(format!(
            "Cannot recover geometry column {}.{}: no such column",
            table, column
        )));
    }
    register(conn, table, column, kind, srid)?;
    log_event(conn, table, Some(column), "Geometry successfully recovered")?;
    Ok(())
}

/// Removes the catalog entry and spatial index of a geometry column; the
/// column itself stays.
pub fn discard_geometry_column(conn: &Connection, table: &str, column: &str) -> Result<(), SchemaError> {
    index::disable_spatialite_index(conn, table, column)?;
    unregister(conn, table, column)?;
    log_event(conn, table, Some(column), "Geometry successfully discarded")?;
    Ok(())
}

/// Drops a table together with its geometry registrations and spatial indexes.
pub fn drop_geo_table(conn: &Connection, table: &str) -> Result<(), SchemaError> {
    let columns: Vec<String> = geometry_columns(conn)?
        .into_iter()
        .filter(|g| g.table.eq_ignore_ascii_case(table))
        .map(|g| g.column)
        .collect();
    for column in columns {
        discard_geometry_column(conn, table, &column)?;
    }
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))?;
    Ok(())
}

/// Renames a table and moves its geometry registrations along. Spatial
/// indexes are dropped and have to be created again for the new name.
pub fn rename_geo_table(conn: &Connection, from: &str, to: &str) -> Result<(), SchemaError> {
    let columns: Vec<GeometryColumn> = geometry_columns(conn)?
        .into_iter()
        .filter(|g| g.table.eq_ignore_ascii_case(from))
        .collect();
    for col in &columns {
        discard_geometry_column(conn, from, &col.column)?;
    }
    conn.execute_batch(&format!(
        "ALTER TABLE {} RENAME TO {}",
        quote_ident(from),
        quote_ident(to)
    ))?;
    for col in columns {
        recover_geometry_column(conn, to, &col.column, col.srid, col.kind)?;
    }
    Ok(())
}
