use log::{debug, info, Level};
use logging_timer::timer;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};

use crate::constants::{Format, LEGACY_SRID};
use crate::database::{quote_ident, table_exists};
use crate::error::{SchemaError, SchemaWarning};
use crate::models::{ModelDef, DECLARED_MODELS, GEOMETRY_COLUMN};
use crate::spatial::codec::{decode_blob, encode_spatialite};
use crate::spatial::crs::{transform, validate_model_crs};
use crate::spatial::index::create_spatial_index;
use crate::spatial::metadata::{
    column_exists, discard_geometry_column, ensure_srid, recover_geometry_column,
};
use crate::spatial::{Coord, Geometry, GeometryKind};

use super::ops::drop_column_if_exists;
use super::{Migration, StepContext};

pub const MIGRATION: Migration = Migration::code(
    230,
    Some(229),
    "Reproject geometries to the model CRS",
    migrate_0229_to_0230,
);

/// Shift applied to the end of a line that collapsed to a single point.
const ZERO_LENGTH_NUDGE: f64 = 0.01;

fn geometry_tables(conn: &Connection) -> Result<Vec<&'static ModelDef>, SchemaError> {
    let mut tables = Vec::new();
    for model in DECLARED_MODELS.iter().filter(|m| m.geometry.is_some()) {
        if table_exists(conn, model.table)? && column_exists(conn, model.table, GEOMETRY_COLUMN)? {
            tables.push(model);
        }
    }
    Ok(tables)
}

/// The model CRS as recorded in the settings. `None` when nothing is set.
fn read_model_srid(conn: &Connection) -> Result<Option<i32>, SchemaError> {
    if !table_exists(conn, "model_settings")? || !column_exists(conn, "model_settings", "epsg_code")? {
        return Ok(None);
    }
    let value: Option<Value> = conn
        .query_row("SELECT epsg_code FROM model_settings ORDER BY id LIMIT 1", [], |r| r.get(0))
        .optional()?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Integer(code)) => i32::try_from(code)
            .map(Some)
            .map_err(|_| SchemaError::invalid_srid(code, "the supplied epsg_code is invalid")),
        Some(Value::Text(text)) => text
            .trim()
            .parse::<i32>()
            .map(Some)
            .map_err(|_| SchemaError::invalid_srid(&text, "the epsg_code must be an integer")),
        Some(other) => Err(SchemaError::invalid_srid(
            format!("{:?}", other),
            "the epsg_code must be an integer",
        )),
    }
}

fn all_empty(conn: &Connection, tables: &[&ModelDef]) -> Result<bool, SchemaError> {
    for model in tables {
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {} IS NOT NULL",
                quote_ident(model.table),
                GEOMETRY_COLUMN
            ),
            [],
            |r| r.get(0),
        )?;
        if count > 0 {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Moves the end of a zero-length line so it stays a valid line.
fn nudge_zero_length(geom: Geometry) -> Geometry {
    match geom {
        Geometry::LineString(coords) if coords.len() >= 2 && geom_length(&coords) == 0.0 => {
            let start = coords[0];
            let end = coords[1];
            Geometry::LineString(vec![start, Coord::new(end.x + ZERO_LENGTH_NUDGE, end.y)])
        }
        other => other,
    }
}

fn geom_length(coords: &[Coord]) -> f64 {
    coords.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

fn reproject_table(conn: &Connection, model: &ModelDef, srid: i32) -> Result<usize, SchemaError> {
    let table = quote_ident(model.table);
    let rows: Vec<(i64, Vec<u8>)> = conn
        .prepare(&format!(
            "SELECT id, {col} FROM {table} WHERE {col} IS NOT NULL",
            col = GEOMETRY_COLUMN,
            table = table
        ))?
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<_, _>>()?;

    let mut update = conn.prepare(&format!(
        "UPDATE {} SET {} = ?1 WHERE id = ?2",
        table, GEOMETRY_COLUMN
    ))?;
    for (id, blob) in &rows {
        let decoded = decode_blob(blob)?;
        let source = if decoded.srid > 0 { decoded.srid } else { LEGACY_SRID };
        let projected = nudge_zero_length(transform(&decoded.geometry, source, srid)?);
        update.execute(params![encode_spatialite(&projected, srid), id])?;
    }

    let kind = model.geometry.unwrap_or(GeometryKind::Geometry);
    discard_geometry_column(conn, model.table, GEOMETRY_COLUMN)?;
    recover_geometry_column(conn, model.table, GEOMETRY_COLUMN, srid, kind)?;
    create_spatial_index(conn, Format::Spatialite, model.table, GEOMETRY_COLUMN)?;
    Ok(rows.len())
}

fn migrate_0229_to_0230(conn: &Connection, ctx: &mut StepContext) -> Result<(), SchemaError> {
    // the setting is dropped once the geometries are reprojected
    if table_exists(conn, "model_settings")? && !column_exists(conn, "model_settings", "epsg_code")? {
        debug!("Geometries are already in the model CRS");
        return Ok(());
    }
    let tables = geometry_tables(conn)?;
    let srid = match read_model_srid(conn)? {
        Some(srid) => srid,
        None if all_empty(conn, &tables)? => {
            ctx.warn(SchemaWarning::SridKept { srid: LEGACY_SRID });
            for model in &tables {
                discard_geometry_column(conn, model.table, GEOMETRY_COLUMN)?;
                recover_geometry_column(
                    conn,
                    model.table,
                    GEOMETRY_COLUMN,
                    LEGACY_SRID,
                    model.geometry.unwrap_or(GeometryKind::Geometry),
                )?;
                create_spatial_index(conn, Format::Spatialite, model.table, GEOMETRY_COLUMN)?;
            }
            drop_column_if_exists(conn, "model_settings", "epsg_code")?;
            return Ok(());
        }
        None => return Err(SchemaError::invalid_srid("None", "no epsg_code is defined")),
    };

    let crs = validate_model_crs(srid)?;
    ensure_srid(conn, srid)?;
    info!("Reprojecting geometries to EPSG:{} ({})", srid, crs.name);

    let _tmr = timer!(Level::Debug; "reproject", "EPSG:{}", srid);
    for model in &tables {
        let count = reproject_table(conn, model, srid)?;
        debug!("Reprojected {} rows of {}", count, model.table);
    }
    drop_column_if_exists(conn, "model_settings", "epsg_code")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::ops::{create_geo_table, create_table};
    use crate::spatial::metadata::{geometry_column, SpatialiteFileVersion};
    use crate::test_support::spatial_conn;
    use pretty_assertions::assert_eq;

    fn setup(epsg: Option<&str>) -> Connection {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        create_table(&conn, "model_settings", "id INTEGER PRIMARY KEY, epsg_code INTEGER").unwrap();
        if let Some(code) = epsg {
            conn.execute("INSERT INTO model_settings (id, epsg_code) VALUES (1, ?1)", [code])
                .unwrap();
        }
        create_geo_table(&conn, "channel", "id INTEGER PRIMARY KEY", GeometryKind::LineString).unwrap();
        create_geo_table(&conn, "connection_node", "id INTEGER PRIMARY KEY", GeometryKind::Point).unwrap();
        conn
    }

    fn add_rows(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO connection_node (id, geom) VALUES (1, GeomFromText('POINT(5.387206 52.155174)', 4326));
             INSERT INTO channel (id, geom) VALUES (1, GeomFromText('LINESTRING(5.0 52.0, 5.0 52.0)', 4326));",
        )
        .unwrap();
    }

    #[test]
    fn test_reproject_to_rd() {
        let conn = setup(Some("28992"));
        add_rows(&conn);
        let mut ctx = StepContext::new(28992);
        migrate_0229_to_0230(&conn, &mut ctx).unwrap();

        let blob: Vec<u8> = conn
            .query_row("SELECT geom FROM connection_node WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        let decoded = decode_blob(&blob).unwrap();
        assert_eq!(decoded.srid, 28992);
        let Geometry::Point(Some(c)) = decoded.geometry else {
            panic!("expected a point")
        };
        assert!((c.x - 155_000.0).abs() < 1.0 && (c.y - 463_000.0).abs() < 1.0);

        let blob: Vec<u8> = conn
            .query_row("SELECT geom FROM channel WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        let Geometry::LineString(line) = decode_blob(&blob).unwrap().geometry else {
            panic!("expected a line")
        };
        assert!((line[1].x - line[0].x - ZERO_LENGTH_NUDGE).abs() < 1e-9);

        let col = geometry_column(&conn, "channel", "geom").unwrap().unwrap();
        assert_eq!(col.srid, 28992);
        assert!(col.spatial_index_enabled);
        assert!(!column_exists(&conn, "model_settings", "epsg_code").unwrap());
    }

    #[test]
    fn test_rejects_unusable_crs() {
        for code in ["4326", "2227", "999999", "abc"] {
            let conn = setup(Some(code));
            add_rows(&conn);
            let mut ctx = StepContext::new(28992);
            let err = migrate_0229_to_0230(&conn, &mut ctx).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidSrid, "{}", code);
        }
    }

    #[test]
    fn test_missing_epsg() {
        let conn = setup(None);
        let mut ctx = StepContext::new(28992);
        migrate_0229_to_0230(&conn, &mut ctx).unwrap();
        assert_eq!(ctx.warnings, vec![SchemaWarning::SridKept { srid: LEGACY_SRID }]);

        let conn = setup(None);
        add_rows(&conn);
        let err = migrate_0229_to_0230(&conn, &mut ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSrid);
    }
}
