//! DDL helpers shared by the migration steps.
//!
//! Every helper tolerates being run against a file where it already took
//! effect, so a step that half-succeeded before can be run again.

use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};
use rusqlite::{Connection, ToSql};

use crate::constants::LEGACY_SRID;
use crate::database::{quote_ident, table_exists, table_names};
use crate::error::SchemaError;
use crate::spatial::codec::{decode_blob, encode_spatialite};
use crate::spatial::metadata::{column_exists, drop_geo_table, recover_geometry_column};
use crate::spatial::{Coord, Geometry, GeometryKind};

/// Tables present in the file when a step started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSet(BTreeSet<String>);

impl TableSet {
    pub fn read(conn: &Connection) -> Result<Self, SchemaError> {
        Ok(TableSet(table_names(conn)?))
    }

    pub fn contains(&self, table: &str) -> bool {
        self.0.contains(table)
    }

    pub fn insert(&mut self, table: &str) {
        self.0.insert(table.to_string());
    }

    pub fn remove(&mut self, table: &str) {
        self.0.remove(table);
    }
}

/// What a value lookup does with a value that has no mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownValuePolicy {
    /// Leave the value unchanged.
    PassThrough,
    /// Fail the step.
    Reject,
}

pub fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    decl: &str,
) -> Result<bool, SchemaError> {
    if !table_exists(conn, table)? || column_exists(conn, table, column)? {
        return Ok(false);
    }
    conn.execute_batch(&format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(table),
        quote_ident(column),
        decl
    ))?;
    Ok(true)
}

pub fn drop_column_if_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, SchemaError> {
    if !table_exists(conn, table)? || !column_exists(conn, table, column)? {
        return Ok(false);
    }
    conn.execute_batch(&format!(
        "ALTER TABLE {} DROP COLUMN {}",
        quote_ident(table),
        quote_ident(column)
    ))?;
    Ok(true)
}

pub fn rename_column_if_exists(
    conn: &Connection,
    table: &str,
    from: &str,
    to: &str,
) -> Result<bool, SchemaError> {
    if !table_exists(conn, table)? || !column_exists(conn, table, from)? || column_exists(conn, table, to)? {
        return Ok(false);
    }
    conn.execute_batch(&format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {}",
        quote_ident(table),
        quote_ident(from),
        quote_ident(to)
    ))?;
    Ok(true)
}

pub fn drop_table_if_exists(conn: &Connection, table: &str) -> Result<(), SchemaError> {
    drop_geo_table(conn, table)
}

/// True when the step that turns `legacy` into `target` already ran: the
/// legacy table is gone and the new one is in place.
pub fn already_applied(conn: &Connection, legacy: &str, target: &str) -> Result<bool, SchemaError> {
    let done = !table_exists(conn, legacy)? && table_exists(conn, target)?;
    if done {
        debug!("{} was already migrated to {}", legacy, target);
    }
    Ok(done)
}

/// Drops tables that are in the way of tables a step is about to create.
pub fn drop_conflicting(conn: &Connection, tables: &[&str]) -> Result<(), SchemaError> {
    for table in tables {
        if table_exists(conn, table)? {
            warn!("Dropping existing table {} that conflicts with the new schema", table);
            drop_geo_table(conn, table)?;
        }
    }
    Ok(())
}

/// Creates `table` with a registered `geom` column in the legacy CRS.
pub fn create_geo_table(
    conn: &Connection,
    table: &str,
    columns_ddl: &str,
    kind: GeometryKind,
) -> Result<(), SchemaError> {
    drop_conflicting(conn, &[table])?;
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({}, geom {})",
        quote_ident(table),
        columns_ddl,
        kind.name()
    ))?;
    recover_geometry_column(conn, table, "geom", LEGACY_SRID, kind)
}

pub fn create_table(conn: &Connection, table: &str, columns_ddl: &str) -> Result<(), SchemaError> {
    drop_conflicting(conn, &[table])?;
    conn.execute_batch(&format!("CREATE TABLE {} ({})", quote_ident(table), columns_ddl))?;
    Ok(())
}

/// Copies rows between tables with an explicit `(destination, source)` column
/// map. Source columns that do not exist are copied as NULL.
pub fn copy_columns(
    conn: &Connection,
    src: &str,
    dst: &str,
    mapping: &[(&str, &str)],
) -> Result<usize, SchemaError> {
    if !table_exists(conn, src)? {
        return Ok(0);
    }
    let mut dst_cols = Vec::with_capacity(mapping.len());
    let mut src_exprs = Vec::with_capacity(mapping.len());
    for (to, from) in mapping {
        dst_cols.push(quote_ident(to));
        if column_exists(conn, src, from)? {
            src_exprs.push(quote_ident(from));
        } else {
            src_exprs.push("NULL".to_string());
        }
    }
    let copied = conn.execute(
        &format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_ident(dst),
            dst_cols.join(", "),
            src_exprs.join(", "),
            quote_ident(src)
        ),
        [],
    )?;
    debug!("Copied {} rows from {} to {}", copied, src, dst);
    Ok(copied)
}

/// Rewrites the values of `column` through `map`.
pub fn remap_values<T: ToSql>(
    conn: &Connection,
    table: &str,
    column: &str,
    map: &[(T, T)],
    policy: UnknownValuePolicy,
) -> Result<usize, SchemaError> {
    if map.is_empty() || !table_exists(conn, table)? || !column_exists(conn, table, column)? {
        return Ok(0);
    }
    let col = quote_ident(column);
    let tbl = quote_ident(table);
    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(map.len() * 2);
    for (from, to) in map {
        params.push(from);
        params.push(to);
    }

    if policy == UnknownValuePolicy::Reject {
        let known = (1..=params.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let unknown: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {tbl} WHERE {col} IS NOT NULL AND {col} NOT IN ({known})"
            ),
            params.as_slice(),
            |r| r.get(0),
        )?;
        if unknown > 0 {
            return Err(SchemaError::UpgradeFailed(format!(
                "{} rows of {}.{} hold a value without a mapping",
                unknown, table, column
            )));
        }
    }

    let cases = (0..map.len())
        .map(|i| format!("WHEN ?{} THEN ?{}", 2 * i + 1, 2 * i + 2))
        .collect::<Vec<_>>()
        .join(" ");
    let changed = conn.execute(
        &format!("UPDATE {tbl} SET {col} = CASE {col} {cases} ELSE {col} END WHERE {col} IS NOT NULL"),
        params.as_slice(),
    )?;
    Ok(changed)
}

/// `column` quoted when `table` has it, `NULL` otherwise.
pub fn column_or_null(conn: &Connection, table: &str, column: &str) -> Result<String, SchemaError> {
    Ok(if column_exists(conn, table, column)? {
        quote_ident(column)
    } else {
        "NULL".to_string()
    })
}

/// Decodes a stored geometry; undecodable blobs read as absent.
pub fn geometry_from_blob(blob: Option<Vec<u8>>) -> Option<Geometry> {
    blob.and_then(|bytes| decode_blob(&bytes).ok())
        .map(|b| b.geometry)
        .filter(|g| !g.is_empty())
}

/// Encodes a geometry for a table still in the legacy CRS.
pub fn legacy_blob(geom: &Geometry) -> Vec<u8> {
    encode_spatialite(geom, LEGACY_SRID)
}

/// Point coordinates keyed by id.
pub fn read_points(conn: &Connection, table: &str, column: &str) -> Result<HashMap<i64, Coord>, SchemaError> {
    if !table_exists(conn, table)? || !column_exists(conn, table, column)? {
        return Ok(HashMap::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT id, {} FROM {}",
        quote_ident(column),
        quote_ident(table)
    ))?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<Vec<u8>>>(1)?)))?;
    let mut points = HashMap::new();
    for row in rows {
        let (id, blob) = row?;
        if let Some(Geometry::Point(Some(c))) = geometry_from_blob(blob) {
            points.insert(id, c);
        }
    }
    Ok(points)
}

/// Ids of rows whose geometry is NULL or empty.
pub fn null_geometry_ids(conn: &Connection, table: &str, column: &str) -> Result<Vec<i64>, SchemaError> {
    if !table_exists(conn, table)? || !column_exists(conn, table, column)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT id, {} FROM {} ORDER BY id",
        quote_ident(column),
        quote_ident(table)
    ))?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<Vec<u8>>>(1)?)))?;
    let mut ids = Vec::new();
    for row in rows {
        let (id, blob) = row?;
        if geometry_from_blob(blob).is_none() {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::metadata::{geometry_column, SpatialiteFileVersion};
    use crate::test_support::spatial_conn;
    use pretty_assertions::assert_eq;

    fn values(conn: &Connection) -> Vec<Option<String>> {
        conn.prepare("SELECT flow_variable FROM agg ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    fn agg(conn: &Connection) {
        conn.execute_batch(
            "CREATE TABLE agg (id INTEGER PRIMARY KEY, flow_variable TEXT);
             INSERT INTO agg VALUES (1, 'waterlevel'), (2, 'discharge'), (3, NULL), (4, 'wet_cross-section');",
        )
        .unwrap();
    }

    const FLOW_VARIABLES: [(&str, &str); 2] = [
        ("waterlevel", "water_level"),
        ("wet_cross-section", "wet_cross_section"),
    ];

    #[test]
    fn test_remap_pass_through() {
        let conn = Connection::open_in_memory().unwrap();
        agg(&conn);
        remap_values(&conn, "agg", "flow_variable", &FLOW_VARIABLES, UnknownValuePolicy::PassThrough)
            .unwrap();
        assert_eq!(
            values(&conn),
            vec![
                Some("water_level".to_string()),
                Some("discharge".to_string()),
                None,
                Some("wet_cross_section".to_string())
            ]
        );
    }

    #[test]
    fn test_remap_reject() {
        let conn = Connection::open_in_memory().unwrap();
        agg(&conn);
        let err = remap_values(&conn, "agg", "flow_variable", &FLOW_VARIABLES, UnknownValuePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, SchemaError::UpgradeFailed(_)));
        // nothing was rewritten
        assert_eq!(values(&conn)[0].as_deref(), Some("waterlevel"));
    }

    #[test]
    fn test_column_helpers_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        agg(&conn);
        assert!(add_column_if_missing(&conn, "agg", "interval", "INTEGER").unwrap());
        assert!(!add_column_if_missing(&conn, "agg", "interval", "INTEGER").unwrap());
        assert!(rename_column_if_exists(&conn, "agg", "interval", "timestep").unwrap());
        assert!(!rename_column_if_exists(&conn, "agg", "interval", "timestep").unwrap());
        assert!(drop_column_if_exists(&conn, "agg", "timestep").unwrap());
        assert!(!drop_column_if_exists(&conn, "agg", "timestep").unwrap());
        assert!(!add_column_if_missing(&conn, "missing", "x", "TEXT").unwrap());
    }

    #[test]
    fn test_copy_columns_fills_missing_with_null() {
        let conn = Connection::open_in_memory().unwrap();
        agg(&conn);
        create_table(&conn, "aggregation_settings", "id INTEGER PRIMARY KEY, flow_variable TEXT, interval INTEGER")
            .unwrap();
        let n = copy_columns(
            &conn,
            "agg",
            "aggregation_settings",
            &[("id", "id"), ("flow_variable", "flow_variable"), ("interval", "timestep")],
        )
        .unwrap();
        assert_eq!(n, 4);
        let nulls: i64 = conn
            .query_row("SELECT COUNT(*) FROM aggregation_settings WHERE interval IS NULL", [], |r| r.get(0))
            .unwrap();
        assert_eq!(nulls, 4);
    }

    #[test]
    fn test_create_geo_table_replaces_conflicting() {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        conn.execute_batch("CREATE TABLE obstacle (junk TEXT)").unwrap();
        create_geo_table(&conn, "obstacle", "id INTEGER PRIMARY KEY, code TEXT", GeometryKind::LineString)
            .unwrap();
        assert!(!column_exists(&conn, "obstacle", "junk").unwrap());
        let col = geometry_column(&conn, "obstacle", "geom").unwrap().unwrap();
        assert_eq!(col.srid, LEGACY_SRID);

        let mut tables = TableSet::read(&conn).unwrap();
        assert!(tables.contains("obstacle"));
        tables.remove("obstacle");
        assert!(!tables.contains("obstacle"));
    }

    #[test]
    fn test_points_and_null_geometries() {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        conn.execute_batch("CREATE TABLE nodes (id INTEGER PRIMARY KEY, the_geom POINT)").unwrap();
        conn.execute(
            "INSERT INTO nodes VALUES (1, ?1), (2, NULL), (3, X'00')",
            [legacy_blob(&Geometry::point(4.5, 52.0))],
        )
        .unwrap();
        let points = read_points(&conn, "nodes", "the_geom").unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[&1], Coord::new(4.5, 52.0));
        assert_eq!(null_geometry_ids(&conn, "nodes", "the_geom").unwrap(), vec![2, 3]);
        assert_eq!(column_or_null(&conn, "nodes", "code").unwrap(), "NULL");
    }
}
