//! R-tree spatial indexes for geometry columns.
//!
//! Both storage flavours back their index with an SQLite `rtree` virtual
//! table kept in sync by triggers. Only the naming and the catalog
//! bookkeeping differ.

use log::{debug, info};
use logging_timer::timer;
use rusqlite::{params, Connection};

use crate::constants::Format;
use crate::database::{detect_format, primary_key_column, quote_ident, table_exists, SchemaDatabase};
use crate::error::SchemaError;
use crate::models::{ModelDef, GEOMETRY_COLUMN};

pub fn index_table_name(format: Format, table: &str, column: &str) -> String {
    match format {
        Format::Geopackage => format!("rtree_{}_{}", table, column),
        Format::Spatialite | Format::Unknown => format!("idx_{}_{}", table, column),
    }
}

struct IndexNames {
    index: String,
    key: &'static str,
    min_x: &'static str,
    max_x: &'static str,
    min_y: &'static str,
    max_y: &'static str,
    insert_trigger: String,
    update_trigger: String,
    delete_trigger: String,
}

impl IndexNames {
    fn new(format: Format, table: &str, column: &str) -> Self {
        let index = index_table_name(format, table, column);
        match format {
            Format::Geopackage => IndexNames {
                key: "id",
                min_x: "minx",
                max_x: "maxx",
                min_y: "miny",
                max_y: "maxy",
                insert_trigger: format!("{}_insert", index),
                update_trigger: format!("{}_update", index),
                delete_trigger: format!("{}_delete", index),
                index,
            },
            Format::Spatialite | Format::Unknown => IndexNames {
                key: "pkid",
                min_x: "xmin",
                max_x: "xmax",
                min_y: "ymin",
                max_y: "ymax",
                insert_trigger: format!("gii_{}_{}", table, column),
                update_trigger: format!("giu_{}_{}", table, column),
                delete_trigger: format!("gid_{}_{}", table, column),
                index,
            },
        }
    }
}

fn non_empty(expr: &str) -> String {
    format!("{expr} IS NOT NULL AND ST_IsEmpty({expr}) = 0")
}

fn envelope_select(key: &str, geom: &str) -> String {
    format!(
        "{key}, ST_MinX({geom}), ST_MaxX({geom}), ST_MinY({geom}), ST_MaxY({geom})"
    )
}

/// Creates the index table, fills it and installs the sync triggers.
///
/// Fails when an index for the column already exists.
pub fn create_spatial_index(
    conn: &Connection,
    format: Format,
    table: &str,
    column: &str,
) -> Result<(), SchemaError> {
    let names = IndexNames::new(format, table, column);
    if table_exists(conn, &names.index)? {
        return Err(SchemaError::SpatialIndex {
            index: names.index,
            message: "index already exists".to_string(),
        });
    }

    let pk = primary_key_column(conn, table)?;
    let t = quote_ident(table);
    let c = quote_ident(column);
    let idx = quote_ident(&names.index);
    let new_geom = format!("NEW.{}", c);

    let ddl = format!(
        "CREATE VIRTUAL TABLE {idx} USING rtree({key}, {minx}, {maxx}, {miny}, {maxy});
         INSERT INTO {idx} SELECT {fill} FROM {t} WHERE {fill_where};
         CREATE TRIGGER {ins} AFTER INSERT ON {t} FOR EACH ROW BEGIN
             INSERT INTO {idx} SELECT {new_row} WHERE {new_where};
         END;
         CREATE TRIGGER {upd} AFTER UPDATE ON {t} FOR EACH ROW BEGIN
             DELETE FROM {idx} WHERE {key} = OLD.{pk};
             INSERT INTO {idx} SELECT {new_row} WHERE {new_where};
         END;
         CREATE TRIGGER {del} AFTER DELETE ON {t} FOR EACH ROW BEGIN
             DELETE FROM {idx} WHERE {key} = OLD.{pk};
         END;",
        key = names.key,
        minx = names.min_x,
        maxx = names.max_x,
        miny = names.min_y,
        maxy = names.max_y,
        fill = envelope_select(&pk, &c),
        fill_where = non_empty(&c),
        new_row = envelope_select(&format!("NEW.{}", pk), &new_geom),
        new_where = non_empty(&new_geom),
        ins = quote_ident(&names.insert_trigger),
        upd = quote_ident(&names.update_trigger),
        del = quote_ident(&names.delete_trigger),
    );
    conn.execute_batch(&ddl).map_err(|e| SchemaError::SpatialIndex {
        index: names.index.clone(),
        message: e.to_string(),
    })?;

    match format {
        Format::Geopackage => {
            conn.execute(
                "INSERT OR REPLACE INTO gpkg_extensions (table_name, column_name, extension_name, definition, scope)
                 VALUES (?1, ?2, 'gpkg_rtree_index', 'http://www.geopackage.org/spec120/#extension_rtree', 'write-only')",
                params![table, column],
            )?;
        }
        Format::Spatialite | Format::Unknown => {
            if table_exists(conn, "geometry_columns")? {
                conn.execute(
                    "UPDATE geometry_columns SET spatial_index_enabled = 1
                     WHERE lower(f_table_name) = lower(?1) AND lower(f_geometry_column) = lower(?2)",
                    params![table, column],
                )?;
            }
        }
    }
    debug!("Created spatial index {}", names.index);
    Ok(())
}

fn drop_index_objects(conn: &Connection, names: &IndexNames) -> Result<(), SchemaError> {
    conn.execute_batch(&format!(
        "DROP TRIGGER IF EXISTS {};
         DROP TRIGGER IF EXISTS {};
         DROP TRIGGER IF EXISTS {};
         DROP TABLE IF EXISTS {};",
        quote_ident(&names.insert_trigger),
        quote_ident(&names.update_trigger),
        quote_ident(&names.delete_trigger),
        quote_ident(&names.index),
    ))?;
    Ok(())
}

/// Drops a SpatiaLite index and its triggers; missing parts are ignored.
pub fn disable_spatialite_index(conn: &Connection, table: &str, column: &str) -> Result<(), SchemaError> {
    drop_index_objects(conn, &IndexNames::new(Format::Spatialite, table, column))?;
    if table_exists(conn, "geometry_columns")? {
        conn.execute(
            "UPDATE geometry_columns SET spatial_index_enabled = 0
             WHERE lower(f_table_name) = lower(?1) AND lower(f_geometry_column) = lower(?2)",
            params![table, column],
        )?;
    }
    Ok(())
}

pub fn disable_gpkg_index(conn: &Connection, table: &str, column: &str) -> Result<(), SchemaError> {
    drop_index_objects(conn, &IndexNames::new(Format::Geopackage, table, column))?;
    if table_exists(conn, "gpkg_extensions")? {
        conn.execute(
            "DELETE FROM gpkg_extensions WHERE table_name = ?1 AND column_name = ?2
             AND extension_name = 'gpkg_rtree_index'",
            params![table, column],
        )?;
    }
    Ok(())
}

/// True when the index exists and holds one entry per non-empty geometry.
pub fn check_spatial_index(
    conn: &Connection,
    format: Format,
    table: &str,
    column: &str,
) -> Result<bool, SchemaError> {
    let index = index_table_name(format, table, column);
    if !table_exists(conn, &index)? {
        return Ok(false);
    }
    let indexed: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(&index)),
        [],
        |r| r.get(0),
    )?;
    let geometries: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_ident(table),
            non_empty(&quote_ident(column))
        ),
        [],
        |r| r.get(0),
    )?;
    Ok(indexed == geometries)
}

/// Declared geometry tables present in the file that lack an index.
pub fn get_missing_spatial_indexes(
    conn: &Connection,
    format: Format,
    models: &[ModelDef],
) -> Result<Vec<&'static str>, SchemaError> {
    let mut missing = Vec::new();
    for model in models.iter().filter(|m| m.geometry.is_some()) {
        if !table_exists(conn, model.table)? {
            continue;
        }
        if !table_exists(conn, &index_table_name(format, model.table, GEOMETRY_COLUMN))? {
            missing.push(model.table);
        }
    }
    Ok(missing)
}

/// Creates every missing spatial index of `models`, then compacts the file
/// if anything was created. The first failure aborts the batch.
pub fn ensure_spatial_indexes(db: &SchemaDatabase, models: &[ModelDef]) -> Result<usize, SchemaError> {
    let _tmr = timer!(log::Level::Trace; "ensure_spatial_indexes");
    let conn = db.get_connection()?;
    let format = detect_format(&conn)?;
    let missing = get_missing_spatial_indexes(&conn, format, models)?;
    if missing.is_empty() {
        return Ok(0);
    }

    conn.execute_batch("BEGIN")?;
    for table in &missing {
        if let Err(e) = create_spatial_index(&conn, format, table, GEOMETRY_COLUMN) {
            conn.execute_batch("ROLLBACK")?;
            return Err(e);
        }
    }
    conn.execute_batch("COMMIT")?;
    conn.execute_batch("VACUUM")?;
    info!("Created {} spatial index(es)", missing.len());
    Ok(missing.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::geometry::GeometryKind;
    use crate::spatial::metadata::{add_geometry_column, SpatialiteFileVersion};
    use crate::test_support::{empty_spatialite, spatial_conn};

    fn node_table(conn: &Connection) {
        conn.execute_batch("CREATE TABLE connection_node (id INTEGER PRIMARY KEY, code TEXT)")
            .unwrap();
        add_geometry_column(conn, "connection_node", "geom", 28992, GeometryKind::Point).unwrap();
        conn.execute_batch(
            "INSERT INTO connection_node (id, geom) VALUES
                (1, GeomFromText('POINT(10 20)', 28992)),
                (2, GeomFromText('POINT(30 40)', 28992)),
                (3, NULL);",
        )
        .unwrap();
    }

    #[test]
    fn test_index_tracks_rows() {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        node_table(&conn);
        create_spatial_index(&conn, Format::Spatialite, "connection_node", "geom").unwrap();
        assert!(check_spatial_index(&conn, Format::Spatialite, "connection_node", "geom").unwrap());

        conn.execute_batch(
            "INSERT INTO connection_node (id, geom) VALUES (4, GeomFromText('POINT(1 1)', 28992));
             UPDATE connection_node SET geom = GeomFromText('POINT(5 5)', 28992) WHERE id = 3;
             DELETE FROM connection_node WHERE id = 1;",
        )
        .unwrap();
        assert!(check_spatial_index(&conn, Format::Spatialite, "connection_node", "geom").unwrap());

        let (min_x, max_x): (f64, f64) = conn
            .query_row("SELECT xmin, xmax FROM idx_connection_node_geom WHERE pkid = 3", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!((min_x, max_x), (5.0, 5.0));

        let enabled: i64 = conn
            .query_row("SELECT spatial_index_enabled FROM geometry_columns", [], |r| r.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_existing_index_is_an_error() {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        node_table(&conn);
        create_spatial_index(&conn, Format::Spatialite, "connection_node", "geom").unwrap();
        let err = create_spatial_index(&conn, Format::Spatialite, "connection_node", "geom").unwrap_err();
        match err {
            SchemaError::SpatialIndex { index, .. } => assert_eq!(index, "idx_connection_node_geom"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_disable_spatialite_index() {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        node_table(&conn);
        create_spatial_index(&conn, Format::Spatialite, "connection_node", "geom").unwrap();
        disable_spatialite_index(&conn, "connection_node", "geom").unwrap();
        assert!(!table_exists(&conn, "idx_connection_node_geom").unwrap());
        // triggers are gone, so writes no longer touch the index
        conn.execute_batch("INSERT INTO connection_node (id) VALUES (9)").unwrap();
        assert!(!check_spatial_index(&conn, Format::Spatialite, "connection_node", "geom").unwrap());
    }

    #[test]
    fn test_missing_indexes_listed() {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        node_table(&conn);
        let missing =
            get_missing_spatial_indexes(&conn, Format::Spatialite, crate::models::DECLARED_MODELS).unwrap();
        assert_eq!(missing, vec!["connection_node"]);
    }

    #[test]
    fn test_failed_index_rolls_back_the_batch() {
        let (_dir, db) = empty_spatialite("model.sqlite", SpatialiteFileVersion::V4);
        {
            let conn = db.get_connection().unwrap();
            node_table(&conn);
            conn.execute_batch("CREATE TABLE pipe (id INTEGER PRIMARY KEY, code TEXT)").unwrap();
            add_geometry_column(&conn, "pipe", "geom", 28992, GeometryKind::LineString).unwrap();
            // occupies the name of the insert trigger of the pipe index
            conn.execute_batch(
                "CREATE TRIGGER gii_pipe_geom AFTER INSERT ON pipe BEGIN SELECT 1; END;",
            )
            .unwrap();
        }

        let err = ensure_spatial_indexes(&db, crate::models::DECLARED_MODELS).unwrap_err();
        match err {
            SchemaError::SpatialIndex { index, .. } => assert_eq!(index, "idx_pipe_geom"),
            other => panic!("unexpected error {other:?}"),
        }

        let conn = db.get_connection().unwrap();
        assert!(!table_exists(&conn, "idx_connection_node_geom").unwrap());
        assert!(!table_exists(&conn, "idx_pipe_geom").unwrap());
        let enabled: i64 = conn
            .query_row(
                "SELECT spatial_index_enabled FROM geometry_columns WHERE f_table_name = 'connection_node'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(enabled, 0);
    }

    #[test]
    fn test_index_names() {
        assert_eq!(index_table_name(Format::Spatialite, "pipe", "geom"), "idx_pipe_geom");
        assert_eq!(index_table_name(Format::Geopackage, "pipe", "geom"), "rtree_pipe_geom");
    }
}
