//! SpatiaLite to GeoPackage conversion.
//!
//! The source is never modified: tables are read from a scratch copy and
//! written into a fresh container next to it, which then lands beside the
//! original file with a `.gpkg` extension. The handle is re-pointed at the
//! new file afterwards.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use log::{info, warn, Level};
use logging_timer::timer;
use rusqlite::Connection;

use crate::constants::{LEGACY_HISTORY_TABLE_NAME, VERSION_TABLE_NAME};
use crate::database::{table_exists, table_names, SchemaDatabase};
use crate::error::{SchemaError, SchemaWarning};
use crate::models::ModelDef;
use crate::spatial::geopackage::{init_container, translate_layer, LayerGeometry, FID_ZERO_WARNING};
use crate::spatial::index::ensure_spatial_indexes;
use crate::spatial::metadata::{geometry_columns, GeometryColumn};

/// SpatiaLite bookkeeping that has no GeoPackage counterpart.
const SPATIALITE_ONLY_TABLES: [&str; 2] = ["spatialite_history", "views_geometry_columns"];

/// SpatiaLite catalogs and their helpers, never model data.
const CATALOG_TABLES: [&str; 9] = [
    "spatial_ref_sys",
    "spatial_ref_sys_aux",
    "geometry_columns",
    "geometry_columns_auth",
    "geometry_columns_statistics",
    "geometry_columns_field_infos",
    "geometry_columns_time",
    "sql_statements_log",
    "spatialindex",
];

const CATALOG_PREFIXES: [&str; 7] = ["sqlite_", "idx_", "rtree_", "gpkg_", "views_", "virts_", "vector_layers"];

/// Catalogs re-created in the container for tools that expect them.
const POST_CONVERSION_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS views_geometry_columns (
    view_name TEXT,
    view_geometry TEXT,
    view_rowid TEXT,
    f_table_name VARCHAR(256),
    f_geometry_column VARCHAR(256)
);
CREATE VIEW IF NOT EXISTS spatial_ref_sys AS
    SELECT srs_id AS srid,
           organization AS auth_name,
           organization_coordsys_id AS auth_srid,
           definition AS srtext
    FROM gpkg_spatial_ref_sys;
"#;

/// Tables without a registered geometry column that still have to move.
fn attribute_tables(
    conn: &Connection,
    models: &[ModelDef],
    layers: &[GeometryColumn],
) -> Result<Vec<String>, SchemaError> {
    let spatial: BTreeSet<String> = layers.iter().map(|l| l.table.to_lowercase()).collect();
    let mut tables = Vec::new();
    for model in models {
        if spatial.contains(&model.table.to_lowercase()) || !table_exists(conn, model.table)? {
            continue;
        }
        tables.push(model.table.to_string());
    }
    if table_exists(conn, VERSION_TABLE_NAME)? {
        tables.push(VERSION_TABLE_NAME.to_string());
    }
    Ok(tables)
}

fn is_catalog(table: &str) -> bool {
    let lower = table.to_lowercase();
    CATALOG_TABLES.contains(&lower.as_str())
        || CATALOG_PREFIXES.iter().any(|p| lower.starts_with(p))
        || SPATIALITE_ONLY_TABLES.contains(&lower.as_str())
        || matches!(lower.as_str(), "elementarygeometries" | "knn" | "knn2" | "data_licenses")
        || lower == LEGACY_HISTORY_TABLE_NAME
        || lower == VERSION_TABLE_NAME
}

/// Tables that hold data but are neither a layer nor a declared model.
/// They do not come across and are reported.
fn skipped_tables(
    conn: &Connection,
    layers: &[GeometryColumn],
    attributes: &[String],
) -> Result<Vec<String>, SchemaError> {
    let moved: BTreeSet<String> = layers
        .iter()
        .map(|l| l.table.to_lowercase())
        .chain(attributes.iter().map(|t| t.to_lowercase()))
        .collect();
    Ok(table_names(conn)?
        .into_iter()
        .filter(|t| !is_catalog(t) && !moved.contains(&t.to_lowercase()))
        .collect())
}

fn as_conversion_error(table: &str, e: SchemaError) -> SchemaError {
    match e {
        SchemaError::ConversionFailed(_) => e,
        other => SchemaError::ConversionFailed(format!("{}: {}", table, other)),
    }
}

/// Writes every layer into a new container at `out`. Returns the per-layer
/// issues worth reporting.
fn translate(
    src: &Connection,
    out: &Path,
    layers: &[GeometryColumn],
    attributes: &[String],
) -> Result<Vec<String>, SchemaError> {
    let dst = Connection::open(out)?;
    init_container(&dst)?;
    dst.execute_batch("BEGIN")?;
    let result = (|| -> Result<Vec<String>, SchemaError> {
        let mut issues = Vec::new();
        for layer in layers {
            let geometry = LayerGeometry {
                column: layer.column.clone(),
                kind: layer.kind,
                srid: layer.srid,
            };
            let report = translate_layer(src, &dst, &layer.table, Some(&geometry))
                .map_err(|e| as_conversion_error(&layer.table, e))?;
            issues.extend(report.warnings);
        }
        for table in attributes {
            let report =
                translate_layer(src, &dst, table, None).map_err(|e| as_conversion_error(table, e))?;
            issues.extend(report.warnings);
        }
        Ok(issues)
    })();
    match result {
        Ok(issues) => {
            dst.execute_batch("COMMIT")?;
            Ok(issues
                .into_iter()
                .filter(|issue| issue != FID_ZERO_WARNING)
                .collect())
        }
        Err(e) => {
            dst.execute_batch("ROLLBACK")?;
            Err(e)
        }
    }
}

/// Converts the file behind `db` and re-points the handle at the result.
///
/// Returns a `ConversionIssues` warning when some layers did not come across
/// cleanly. Renumbered zero feature ids are not reported.
pub fn convert_to_geopackage(
    db: &SchemaDatabase,
    models: &[ModelDef],
) -> Result<Option<SchemaWarning>, SchemaError> {
    if db.is_in_memory() {
        return Err(SchemaError::ConversionFailed(
            "an in-memory database cannot be converted".to_string(),
        ));
    }
    let _tmr = timer!(Level::Debug; "convert_to_geopackage", "{}", db.path().display());
    let target = db.path().with_extension("gpkg");

    let issues = db.file_transaction(false, false, |work| {
        let src = work.get_connection()?;
        for table in SPATIALITE_ONLY_TABLES {
            src.execute_batch(&format!("DROP TABLE IF EXISTS {}", table))?;
        }
        let layers = geometry_columns(&src)?;
        let attributes = attribute_tables(&src, models, &layers)?;
        let skipped = skipped_tables(&src, &layers, &attributes)?;
        info!(
            "Converting {} geometry and {} attribute tables",
            layers.len(),
            attributes.len()
        );
        let scratch = work.path().with_file_name("converted.gpkg");
        let mut issues = translate(&src, &scratch, &layers, &attributes)?;
        issues.extend(
            skipped
                .iter()
                .map(|t| format!("Table {} is not part of the schema and was not converted", t)),
        );
        fs::copy(&scratch, &target)?;
        Ok(issues)
    })?;

    db.set_path(&target);
    {
        let conn = db.get_connection()?;
        conn.execute_batch(POST_CONVERSION_DDL)?;
    }
    ensure_spatial_indexes(db, models)?;
    info!("Converted schematisation to '{}'", target.display());

    if issues.is_empty() {
        return Ok(None);
    }
    let warning = SchemaWarning::ConversionIssues(issues);
    warn!("{}", warning);
    Ok(Some(warning))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::Format;
    use crate::ledger;
    use crate::models::DECLARED_MODELS;
    use crate::spatial::geopackage::layer_srs;
    use crate::spatial::metadata::{add_geometry_column, SpatialiteFileVersion};
    use crate::spatial::GeometryKind;
    use crate::test_support::empty_spatialite;
    use pretty_assertions::assert_eq;

    fn spatialite_at_230() -> (tempfile::TempDir, SchemaDatabase) {
        let (dir, db) = empty_spatialite("model.sqlite", SpatialiteFileVersion::V4);
        {
            let conn = db.get_connection().unwrap();
            conn.execute_batch(
                "CREATE TABLE connection_node (id INTEGER PRIMARY KEY NOT NULL, code VARCHAR(100));
                 CREATE TABLE material (id INTEGER PRIMARY KEY NOT NULL, description TEXT);
                 INSERT INTO material (id, description) VALUES (0, 'Concrete'), (1, 'PVC');",
            )
            .unwrap();
            add_geometry_column(&conn, "connection_node", "geom", 28992, GeometryKind::Point).unwrap();
            conn.execute_batch(
                "INSERT INTO connection_node (id, code, geom) VALUES
                    (1, 'a', GeomFromText('POINT(155000 463000)', 28992)),
                    (2, 'b', GeomFromText('POINT(155010 463010)', 28992));",
            )
            .unwrap();
            ledger::write_version(&conn, 230).unwrap();
        }
        (dir, db)
    }

    #[test]
    fn test_convert_spatialite_file() {
        let (dir, db) = spatialite_at_230();
        let original = db.path();
        let warning = convert_to_geopackage(&db, DECLARED_MODELS).unwrap();
        assert_eq!(warning, None);

        assert_eq!(db.path(), dir.path().join("model.gpkg"));
        assert!(original.exists());
        assert_eq!(db.format().unwrap(), Format::Geopackage);

        let conn = db.get_connection().unwrap();
        assert_eq!(ledger::read_version(&conn).unwrap(), Some(230));
        assert_eq!(layer_srs(&conn, "connection_node").unwrap(), Some(28992));
        let nodes: i64 = conn
            .query_row("SELECT COUNT(*) FROM connection_node", [], |r| r.get(0))
            .unwrap();
        assert_eq!(nodes, 2);
        let materials: Vec<(i64, String)> = conn
            .prepare("SELECT id, description FROM material ORDER BY id")
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(materials, vec![(1, "PVC".to_string()), (2, "Concrete".to_string())]);

        assert!(table_exists(&conn, "rtree_connection_node_geom").unwrap());
        assert!(table_exists(&conn, "views_geometry_columns").unwrap());
        assert!(!table_exists(&conn, "spatialite_history").unwrap());
        let srids: i64 = conn
            .query_row("SELECT COUNT(*) FROM spatial_ref_sys WHERE srid = 28992", [], |r| r.get(0))
            .unwrap();
        assert_eq!(srids, 1);
    }

    #[test]
    fn test_failed_conversion_keeps_original() {
        let (dir, db) = spatialite_at_230();
        let original = db.path();
        // the target path is taken by a directory, so the final copy fails
        fs::create_dir(dir.path().join("model.gpkg")).unwrap();
        db.reset_pool();
        let before = fs::read(&original).unwrap();

        assert!(convert_to_geopackage(&db, DECLARED_MODELS).is_err());

        db.reset_pool();
        assert_eq!(db.path(), original);
        assert!(fs::read(&original).unwrap() == before, "original file was modified");
        assert_eq!(db.format().unwrap(), Format::Spatialite);
        let conn = db.get_connection().unwrap();
        assert!(table_exists(&conn, "geometry_columns").unwrap());
        assert_eq!(ledger::read_version(&conn).unwrap(), Some(230));
    }

    #[test]
    fn test_undecodable_rows_are_reported() {
        let (_dir, db) = spatialite_at_230();
        db.get_connection()
            .unwrap()
            .execute_batch("INSERT INTO connection_node (id, code, geom) VALUES (3, 'c', X'FF00')")
            .unwrap();
        let warning = convert_to_geopackage(&db, DECLARED_MODELS).unwrap();
        let Some(SchemaWarning::ConversionIssues(issues)) = warning else {
            panic!("expected conversion issues");
        };
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("connection_node"));
    }

    #[test]
    fn test_undeclared_table_is_reported() {
        let (_dir, db) = spatialite_at_230();
        db.get_connection()
            .unwrap()
            .execute_batch(
                "CREATE TABLE my_notes (id INTEGER PRIMARY KEY, note TEXT);
                 INSERT INTO my_notes VALUES (1, 'check the weirs');",
            )
            .unwrap();
        let warning = convert_to_geopackage(&db, DECLARED_MODELS).unwrap();
        let Some(SchemaWarning::ConversionIssues(issues)) = warning else {
            panic!("expected conversion issues");
        };
        assert_eq!(
            issues,
            vec!["Table my_notes is not part of the schema and was not converted".to_string()]
        );
    }

    #[test]
    fn test_is_catalog() {
        assert!(is_catalog("spatial_ref_sys"));
        assert!(is_catalog("idx_connection_node_geom_node"));
        assert!(is_catalog("SpatialIndex"));
        assert!(is_catalog("schema_version"));
        assert!(!is_catalog("weir"));
    }

    #[test]
    fn test_in_memory_is_refused() {
        let db = SchemaDatabase::in_memory();
        let err = convert_to_geopackage(&db, DECLARED_MODELS).unwrap_err();
        assert!(matches!(err, SchemaError::ConversionFailed(_)));
    }
}
