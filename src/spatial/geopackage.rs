//! GeoPackage container and layer translation.

use chrono::Utc;
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::database::{quote_ident, table_exists};
use crate::error::SchemaError;

use super::codec::{decode_blob, encode_gpkg};
use super::crs;
use super::geometry::{Envelope, GeometryKind};

/// `GPKG` as a big endian integer.
pub const GPKG_APPLICATION_ID: i32 = 0x4750_4B47;
pub const GPKG_USER_VERSION: i32 = 10300;

/// Warning emitted for rows whose feature id cannot be kept.
pub const FID_ZERO_WARNING: &str = "Feature id 0 not preserved";

const CONTAINER_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);
CREATE TABLE IF NOT EXISTS gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL,
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE IF NOT EXISTS gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE IF NOT EXISTS gpkg_extensions (
    table_name TEXT,
    column_name TEXT,
    extension_name TEXT NOT NULL,
    definition TEXT NOT NULL,
    scope TEXT NOT NULL,
    CONSTRAINT ge_tce UNIQUE (table_name, column_name, extension_name)
);
"#;

/// Geometry column of a layer being translated.
#[derive(Debug, Clone)]
pub struct LayerGeometry {
    pub column: String,
    pub kind: GeometryKind,
    pub srid: i32,
}

#[derive(Debug, Default)]
pub struct LayerReport {
    pub rows: usize,
    pub warnings: Vec<String>,
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Turns an empty SQLite file into a GeoPackage container.
pub fn init_container(conn: &Connection) -> Result<(), SchemaError> {
    conn.execute_batch(&format!(
        "PRAGMA application_id = {};
         PRAGMA user_version = {};",
        GPKG_APPLICATION_ID, GPKG_USER_VERSION
    ))?;
    conn.execute_batch(CONTAINER_DDL)?;
    conn.execute(
        "INSERT OR IGNORE INTO gpkg_spatial_ref_sys VALUES
            ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', 'undefined cartesian coordinate reference system'),
            ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', 'undefined geographic coordinate reference system')",
        [],
    )?;
    ensure_srs(conn, 4326)?;
    Ok(())
}

pub fn ensure_srs(conn: &Connection, srid: i32) -> Result<(), SchemaError> {
    let crs = crs::lookup(srid).ok_or_else(|| SchemaError::invalid_srid(srid, "unknown CRS"))?;
    conn.execute(
        "INSERT OR IGNORE INTO gpkg_spatial_ref_sys
            (srs_name, srs_id, organization, organization_coordsys_id, definition)
         VALUES (?1, ?2, 'EPSG', ?2, ?3)",
        params![crs.name, srid, crs.definition()],
    )?;
    Ok(())
}

/// SRS registered for a geometry layer.
pub fn layer_srs(conn: &Connection, table: &str) -> Result<Option<i32>, SchemaError> {
    if !table_exists(conn, "gpkg_geometry_columns")? {
        return Ok(None);
    }
    Ok(conn
        .query_row(
            "SELECT srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
            [table],
            |r| r.get(0),
        )
        .optional()?)
}

struct SourceColumn {
    name: String,
    decl_type: String,
    not_null: bool,
    pk: bool,
}

fn source_columns(conn: &Connection, table: &str) -> Result<Vec<SourceColumn>, SchemaError> {
    let mut stmt =
        conn.prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid")?;
    let cols = stmt
        .query_map([table], |row| {
            Ok(SourceColumn {
                name: row.get(0)?,
                decl_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
                pk: row.get::<_, i64>(3)? == 1,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols)
}

fn merge(env: Option<Envelope>, other: Envelope) -> Envelope {
    match env {
        None => other,
        Some(e) => Envelope {
            min_x: e.min_x.min(other.min_x),
            min_y: e.min_y.min(other.min_y),
            max_x: e.max_x.max(other.max_x),
            max_y: e.max_y.max(other.max_y),
        },
    }
}

/// Copies `table` from `src` into the container behind `dst`.
///
/// Feature ids are kept. Rows whose geometry cannot be decoded are skipped
/// and reported, never fatal. A missing source table or failing DDL is.
pub fn translate_layer(
    src: &Connection,
    dst: &Connection,
    table: &str,
    geometry: Option<&LayerGeometry>,
) -> Result<LayerReport, SchemaError> {
    if !table_exists(src, table)? {
        return Err(SchemaError::ConversionFailed(format!(
            "source table {} does not exist",
            table
        )));
    }
    let columns = source_columns(src, table)?;
    let geom_idx = geometry.and_then(|g| {
        columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(&g.column))
    });
    // only an integer key can serve as feature id
    let pk_idx = columns
        .iter()
        .position(|c| c.pk && c.decl_type.to_ascii_uppercase().contains("INT"));

    let defs: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if Some(i) == pk_idx {
                format!("{} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL", quote_ident(&c.name))
            } else if Some(i) == geom_idx {
                let kind = geometry.map_or(GeometryKind::Geometry, |g| g.kind);
                format!("{} {}", quote_ident(&c.name), kind.name())
            } else {
                let mut def = format!("{} {}", quote_ident(&c.name), c.decl_type);
                if c.pk {
                    def.push_str(" PRIMARY KEY");
                }
                if c.not_null {
                    def.push_str(" NOT NULL");
                }
                def
            }
        })
        .collect();
    dst.execute_batch(&format!(
        "CREATE TABLE {} ({})",
        quote_ident(table),
        defs.join(", ")
    ))
    .map_err(|e| SchemaError::ConversionFailed(format!("{}: {}", table, e)))?;

    let col_list = columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let mut select = src.prepare(&format!("SELECT {} FROM {}", col_list, quote_ident(table)))?;
    let mut insert = dst.prepare(&format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        col_list,
        placeholders
    ))?;

    let mut report = LayerReport::default();
    let mut extent: Option<Envelope> = None;
    let mut renumbered: Vec<Vec<Value>> = Vec::new();
    let mut rows = select.query([])?;
    'rows: while let Some(row) = rows.next()? {
        let mut values: Vec<Value> = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(row.get::<_, Value>(i)?);
        }

        if let (Some(gi), Some(layer)) = (geom_idx, geometry) {
            if let Value::Blob(bytes) = &values[gi] {
                match decode_blob(bytes) {
                    Ok(blob) => {
                        if let Some(env) = blob.geometry.envelope() {
                            extent = Some(merge(extent, env));
                        }
                        values[gi] = Value::Blob(encode_gpkg(&blob.geometry, layer.srid));
                    }
                    Err(e) => {
                        let fid = pk_idx.map(|p| format!("{:?}", values[p])).unwrap_or_default();
                        report
                            .warnings
                            .push(format!("Skipping feature {} of {}: {}", fid, table, e));
                        continue 'rows;
                    }
                }
            }
        }

        if let Some(p) = pk_idx {
            if values[p] == Value::Integer(0) {
                // renumbered after the other rows so it cannot take a kept id
                values[p] = Value::Null;
                report.warnings.push(FID_ZERO_WARNING.to_string());
                renumbered.push(values);
                continue;
            }
        }

        insert.execute(params_from_iter(values.iter()))?;
        report.rows += 1;
    }
    for values in renumbered {
        insert.execute(params_from_iter(values.iter()))?;
        report.rows += 1;
    }

    let now = timestamp();
    match geometry {
        Some(layer) => {
            ensure_srs(dst, layer.srid)?;
            dst.execute(
                "INSERT INTO gpkg_contents (table_name, data_type, identifier, last_change, min_x, min_y, max_x, max_y, srs_id)
                 VALUES (?1, 'features', ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    table,
                    now,
                    extent.map(|e| e.min_x),
                    extent.map(|e| e.min_y),
                    extent.map(|e| e.max_x),
                    extent.map(|e| e.max_y),
                    layer.srid
                ],
            )?;
            dst.execute(
                "INSERT INTO gpkg_geometry_columns (table_name, column_name, geometry_type_name, srs_id, z, m)
                 VALUES (?1, ?2, ?3, ?4, 0, 0)",
                params![table, layer.column, layer.kind.name(), layer.srid],
            )?;
        }
        None => {
            dst.execute(
                "INSERT INTO gpkg_contents (table_name, data_type, identifier, last_change)
                 VALUES (?1, 'attributes', ?1, ?2)",
                params![table, now],
            )?;
        }
    }
    debug!("Translated {} rows of {}", report.rows, table);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::codec::encode_spatialite;
    use crate::spatial::geometry::Geometry;

    fn source() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE pipe (id INTEGER PRIMARY KEY, code TEXT NOT NULL, geom BLOB);
             CREATE TABLE material (id INTEGER PRIMARY KEY, description TEXT);
             INSERT INTO material VALUES (0, 'Concrete'), (1, 'PVC');",
        )
        .unwrap();
        let line = Geometry::from_wkt("LINESTRING(0 0, 10 5)").unwrap();
        conn.execute(
            "INSERT INTO pipe VALUES (7, 'a', ?1), (8, 'b', X'FF00'), (9, 'c', NULL)",
            [encode_spatialite(&line, 28992)],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_container_metadata() {
        let dst = Connection::open_in_memory().unwrap();
        init_container(&dst).unwrap();
        let app: i32 = dst.query_row("PRAGMA application_id", [], |r| r.get(0)).unwrap();
        let ver: i32 = dst.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(app, GPKG_APPLICATION_ID);
        assert_eq!(ver, 10300);
        let srs: Vec<i32> = dst
            .prepare("SELECT srs_id FROM gpkg_spatial_ref_sys ORDER BY srs_id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(srs, vec![-1, 0, 4326]);
    }

    #[test]
    fn test_translate_geometry_layer() {
        let src = source();
        let dst = Connection::open_in_memory().unwrap();
        init_container(&dst).unwrap();
        let layer = LayerGeometry {
            column: "geom".into(),
            kind: GeometryKind::LineString,
            srid: 28992,
        };
        let report = translate_layer(&src, &dst, "pipe", Some(&layer)).unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("Skipping feature"));

        let blob: Vec<u8> = dst
            .query_row("SELECT geom FROM pipe WHERE id = 7", [], |r| r.get(0))
            .unwrap();
        let decoded = decode_blob(&blob).unwrap();
        assert_eq!(&blob[0..2], b"GP");
        assert_eq!(decoded.srid, 28992);
        assert_eq!(layer_srs(&dst, "pipe").unwrap(), Some(28992));

        let max_x: f64 = dst
            .query_row("SELECT max_x FROM gpkg_contents WHERE table_name = 'pipe'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(max_x, 10.0);
    }

    #[test]
    fn test_translate_attributes_renumbers_fid_zero() {
        let src = source();
        let dst = Connection::open_in_memory().unwrap();
        init_container(&dst).unwrap();
        let report = translate_layer(&src, &dst, "material", None).unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.warnings, vec![FID_ZERO_WARNING.to_string()]);
        let ids: Vec<i64> = dst
            .prepare("SELECT id FROM material ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_missing_table_fails() {
        let src = source();
        let dst = Connection::open_in_memory().unwrap();
        init_container(&dst).unwrap();
        let err = translate_layer(&src, &dst, "nope", None).unwrap_err();
        assert!(matches!(err, SchemaError::ConversionFailed(_)));
    }
}
