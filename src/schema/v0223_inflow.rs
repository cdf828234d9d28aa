//! Impervious surfaces and surfaces become `surface` and `dry_weather_flow`
//! objects with explicit map geometries.
//!
//! Which legacy tables are read depends on `use_0d_inflow`. Rows that cannot
//! be carried over are removed with a warning. Legacy geometries may be
//! missing or multi-part: multipolygons are exploded into one row per part,
//! and missing geometries are synthesized around the mapped connection nodes.

use std::collections::{HashMap, HashSet};

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;

use crate::constants::{InflowType, LEGACY_SRID};
use crate::database::{quote_ident, table_exists};
use crate::error::{SchemaError, SchemaWarning};
use crate::spatial::crs;
use crate::spatial::{Coord, Geometry, GeometryKind};

use super::ops::{
    already_applied, column_or_null, copy_columns, create_geo_table, create_table, drop_table_if_exists,
    geometry_from_blob, legacy_blob, read_points,
};
use super::{Migration, StepContext};

pub const MIGRATION: Migration = Migration::code(
    223,
    Some(222),
    "Migrate inflow to surface and dry weather flow",
    migrate_0222_to_0223,
);

const SURFACE_PARAMETERS_JSON: &str = include_str!("data/surface_parameters.json");

const DWF_DISTRIBUTION_DESCRIPTION: &str =
    "Kennisbank Stichting Rioned - https://www.riool.net/huishoudelijk-afvalwater";

/// Hourly share of the daily total, in percent.
const DWF_DISTRIBUTION: [f64; 24] = [
    1.5, 1.5, 1.5, 1.5, 1.5, 3.0, 4.0, 5.0, 6.0, 6.5, 7.5, 8.5, 7.5, 6.5, 6.0, 5.0, 5.0, 5.0, 4.0,
    3.5, 3.0, 2.5, 2.0, 2.0,
];

/// Radius of the polygon drawn for dry weather flow without a geometry.
const DWF_RADIUS: f64 = 1.0;

const LEGACY_TABLES: [&str; 5] = [
    "v2_impervious_surface",
    "v2_impervious_surface_map",
    "v2_surface",
    "v2_surface_map",
    "v2_surface_parameters",
];

#[derive(Debug, Deserialize)]
struct SurfaceParameters {
    id: i64,
    surface_class: String,
    surface_inclination: String,
    description: String,
    outflow_delay: f64,
    surface_layer_thickness: f64,
    infiltration: bool,
    max_infiltration_capacity: f64,
    min_infiltration_capacity: f64,
    infiltration_decay_constant: f64,
    infiltration_recovery_constant: f64,
}

fn surface_parameter_sets() -> Result<Vec<SurfaceParameters>, SchemaError> {
    serde_json::from_str(SURFACE_PARAMETERS_JSON)
        .map_err(|e| SchemaError::Error(format!("Invalid surface parameter data: {}", e)))
}

struct InflowSource {
    table: &'static str,
    map_table: &'static str,
    map_key: &'static str,
}

const IMPERVIOUS_SURFACE: InflowSource = InflowSource {
    table: "v2_impervious_surface",
    map_table: "v2_impervious_surface_map",
    map_key: "impervious_surface_id",
};

const SURFACE: InflowSource = InflowSource {
    table: "v2_surface",
    map_table: "v2_surface_map",
    map_key: "surface_id",
};

#[derive(Debug, Clone)]
struct InflowRow {
    id: i64,
    code: Option<String>,
    display_name: Option<String>,
    area: f64,
    inhabitants: f64,
    dwf: f64,
    surface_class: Option<String>,
    surface_inclination: Option<String>,
    surface_parameters_id: Option<i64>,
    geom: Option<Geometry>,
}

impl InflowRow {
    fn is_surface(&self) -> bool {
        self.area > 0.0
    }

    fn is_dwf(&self) -> bool {
        self.inhabitants > 0.0 && self.dwf > 0.0
    }
}

#[derive(Debug, Clone)]
struct MapRow {
    id: i64,
    inflow_id: i64,
    node_id: i64,
    percentage: Option<f64>,
}

// ========================================
// Target tables
// ========================================

const SURFACE_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    area FLOAT,
    surface_parameters_id INTEGER,
    tags TEXT"#;

const DRY_WEATHER_FLOW_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    multiplier FLOAT,
    dry_weather_flow_distribution_id INTEGER,
    daily_total FLOAT,
    interpolate BOOLEAN,
    tags TEXT"#;

const SURFACE_MAP_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    surface_id INTEGER,
    connection_node_id INTEGER,
    percentage FLOAT,
    code VARCHAR(100),
    display_name VARCHAR(255),
    tags TEXT"#;

const DRY_WEATHER_FLOW_MAP_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    connection_node_id INTEGER,
    dry_weather_flow_id INTEGER,
    percentage FLOAT,
    code VARCHAR(100),
    display_name VARCHAR(255),
    tags TEXT"#;

const DRY_WEATHER_FLOW_DISTRIBUTION_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    description TEXT,
    tags TEXT,
    distribution TEXT"#;

const SURFACE_PARAMETERS_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    outflow_delay FLOAT NOT NULL,
    surface_layer_thickness FLOAT NOT NULL,
    infiltration BOOLEAN NOT NULL,
    max_infiltration_capacity FLOAT NOT NULL,
    min_infiltration_capacity FLOAT NOT NULL,
    infiltration_decay_constant FLOAT NOT NULL,
    infiltration_recovery_constant FLOAT NOT NULL,
    tags TEXT,
    description TEXT"#;

const TAGS_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    description TEXT"#;

fn create_target_tables(conn: &Connection) -> Result<(), SchemaError> {
    create_geo_table(conn, "surface", SURFACE_DDL, GeometryKind::Polygon)?;
    create_geo_table(conn, "dry_weather_flow", DRY_WEATHER_FLOW_DDL, GeometryKind::Polygon)?;
    create_geo_table(conn, "surface_map", SURFACE_MAP_DDL, GeometryKind::LineString)?;
    create_geo_table(
        conn,
        "dry_weather_flow_map",
        DRY_WEATHER_FLOW_MAP_DDL,
        GeometryKind::LineString,
    )?;
    create_table(conn, "dry_weather_flow_distribution", DRY_WEATHER_FLOW_DISTRIBUTION_DDL)?;
    create_table(conn, "surface_parameters", SURFACE_PARAMETERS_DDL)?;
    create_table(conn, "tags", TAGS_DDL)?;
    Ok(())
}

// ========================================
// Migration 0222 -> 0223
// ========================================

fn migrate_0222_to_0223(conn: &Connection, ctx: &mut StepContext) -> Result<(), SchemaError> {
    if already_applied(conn, "v2_impervious_surface", "surface")? {
        return Ok(());
    }
    let inflow = read_inflow_type(conn)?;
    create_target_tables(conn)?;

    let source = match inflow {
        InflowType::ImperviousSurface => Some(&IMPERVIOUS_SURFACE),
        InflowType::Surface => Some(&SURFACE),
        InflowType::NoInflow => None,
    };
    if let Some(source) = source {
        if table_exists(conn, source.table)? {
            info!("Migrating {} to surface and dry weather flow", source.table);
            migrate_inflow(conn, ctx, source, inflow)?;
        }
    }

    if table_exists(conn, "simulation_template_settings")? {
        conn.execute_batch(
            "UPDATE simulation_template_settings SET use_0d_inflow = CASE
                 WHEN (SELECT COUNT(*) FROM surface) + (SELECT COUNT(*) FROM dry_weather_flow) > 0 THEN 1
                 ELSE 0 END",
        )?;
    }

    for table in LEGACY_TABLES {
        drop_table_if_exists(conn, table)?;
    }
    Ok(())
}

fn read_inflow_type(conn: &Connection) -> Result<InflowType, SchemaError> {
    if !table_exists(conn, "simulation_template_settings")? {
        return Ok(InflowType::NoInflow);
    }
    let code: Option<Option<i64>> = conn
        .query_row(
            "SELECT use_0d_inflow FROM simulation_template_settings ORDER BY id LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(InflowType::from_code(code.flatten()))
}

fn migrate_inflow(
    conn: &Connection,
    ctx: &mut StepContext,
    source: &InflowSource,
    inflow: InflowType,
) -> Result<(), SchemaError> {
    let nodes = read_points(conn, "v2_connection_nodes", "the_geom")?;
    let rows = read_rows(conn, source)?;
    let maps = read_maps(conn, source)?;
    // ids for exploded parts never reuse an id that existed in the source
    let next_id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
    let next_map_id = maps.iter().map(|m| m.id).max().unwrap_or(0) + 1;

    let (useless, rows): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .partition(|r| r.area == 0.0 && (r.inhabitants == 0.0 || r.dwf == 0.0));
    report(ctx, source.table, useless.iter().map(|r| r.id), "they have no area and no dry weather flow");

    let row_ids: HashSet<i64> = rows.iter().map(|r| r.id).collect();
    let (orphans, maps): (Vec<_>, Vec<_>) = maps
        .into_iter()
        .partition(|m| !nodes.contains_key(&m.node_id) || !row_ids.contains(&m.inflow_id));
    report(
        ctx,
        source.map_table,
        orphans.iter().map(|m| m.id),
        "they do not connect an existing surface to an existing connection node",
    );

    let mapped: HashSet<i64> = maps.iter().map(|m| m.inflow_id).collect();
    let (unmapped, mut rows): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .partition(|r| r.geom.is_none() && !mapped.contains(&r.id));
    report(
        ctx,
        source.table,
        unmapped.iter().map(|r| r.id),
        "they are not mapped to a connection node and have no geometry",
    );

    let mut maps = maps;
    explode_multipolygons(&mut rows, &mut maps, next_id, next_map_id);

    let metric = metric_srid(conn, ctx)?;
    let parameter_sets = match inflow {
        InflowType::ImperviousSurface => surface_parameter_sets()?,
        _ => Vec::new(),
    };

    let mut surface_geoms = HashMap::new();
    let mut dwf_geoms = HashMap::new();
    for row in &rows {
        let node_coords: Vec<Coord> = maps
            .iter()
            .filter(|m| m.inflow_id == row.id)
            .filter_map(|m| nodes.get(&m.node_id).copied())
            .collect();
        if row.is_surface() {
            let geom = match &row.geom {
                Some(g) => g.clone(),
                None => synthesize(&node_coords, metric, |c| Geometry::square(c, row.area))?,
            };
            let parameters_id = match inflow {
                InflowType::ImperviousSurface => lookup_parameters(&parameter_sets, row),
                _ => row.surface_parameters_id,
            };
            conn.execute(
                "INSERT INTO surface (id, code, display_name, area, surface_parameters_id, geom)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![row.id, row.code, row.display_name, row.area, parameters_id, legacy_blob(&geom)],
            )?;
            surface_geoms.insert(row.id, geom);
        }
        if row.is_dwf() {
            let geom = match &row.geom {
                Some(g) => g.clone(),
                None => synthesize(&node_coords, metric, |c| Geometry::circle(c, DWF_RADIUS))?,
            };
            conn.execute(
                "INSERT INTO dry_weather_flow (id, code, display_name, multiplier, dry_weather_flow_distribution_id,
                     daily_total, interpolate, geom)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, 0, ?6)",
                params![row.id, row.code, row.display_name, row.inhabitants, row.dwf, legacy_blob(&geom)],
            )?;
            dwf_geoms.insert(row.id, geom);
        }
    }

    for map in &maps {
        let Some(node) = nodes.get(&map.node_id) else {
            continue;
        };
        if let Some(line) = surface_geoms.get(&map.inflow_id).and_then(|g| map_line(g, *node)) {
            conn.execute(
                "INSERT INTO surface_map (id, surface_id, connection_node_id, percentage, geom)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![map.id, map.inflow_id, map.node_id, map.percentage, legacy_blob(&line)],
            )?;
        }
        if let Some(line) = dwf_geoms.get(&map.inflow_id).and_then(|g| map_line(g, *node)) {
            conn.execute(
                "INSERT INTO dry_weather_flow_map (id, dry_weather_flow_id, connection_node_id, percentage, geom)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![map.id, map.inflow_id, map.node_id, map.percentage, legacy_blob(&line)],
            )?;
        }
    }

    if !dwf_geoms.is_empty() {
        let distribution = DWF_DISTRIBUTION
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        conn.execute(
            "INSERT INTO dry_weather_flow_distribution (id, description, distribution) VALUES (1, ?1, ?2)",
            params![DWF_DISTRIBUTION_DESCRIPTION, distribution],
        )?;
    }

    match inflow {
        InflowType::ImperviousSurface => insert_parameter_sets(conn, &parameter_sets)?,
        _ => {
            copy_columns(
                conn,
                "v2_surface_parameters",
                "surface_parameters",
                &[
                    ("id", "id"),
                    ("outflow_delay", "outflow_delay"),
                    ("surface_layer_thickness", "surface_layer_thickness"),
                    ("infiltration", "infiltration"),
                    ("max_infiltration_capacity", "max_infiltration_capacity"),
                    ("min_infiltration_capacity", "min_infiltration_capacity"),
                    ("infiltration_decay_constant", "infiltration_decay_constant"),
                    ("infiltration_recovery_constant", "infiltration_recovery_constant"),
                ],
            )?;
        }
    }

    debug!(
        "Migrated {} surfaces and {} dry weather flows",
        surface_geoms.len(),
        dwf_geoms.len()
    );
    Ok(())
}

pub(super) fn report(ctx: &mut StepContext, table: &str, ids: impl Iterator<Item = i64>, reason: &str) {
    let ids: Vec<i64> = ids.collect();
    if !ids.is_empty() {
        ctx.warn(SchemaWarning::RowsRemoved {
            table: table.to_string(),
            ids,
            reason: reason.to_string(),
        });
    }
}

fn read_rows(conn: &Connection, source: &InflowSource) -> Result<Vec<InflowRow>, SchemaError> {
    let t = source.table;
    let sql = format!(
        "SELECT id, {}, {}, {}, {}, {}, {}, {}, {}, {} FROM {} ORDER BY id",
        column_or_null(conn, t, "code")?,
        column_or_null(conn, t, "display_name")?,
        column_or_null(conn, t, "area")?,
        column_or_null(conn, t, "nr_of_inhabitants")?,
        column_or_null(conn, t, "dry_weather_flow")?,
        column_or_null(conn, t, "surface_class")?,
        column_or_null(conn, t, "surface_inclination")?,
        column_or_null(conn, t, "surface_parameters_id")?,
        column_or_null(conn, t, "the_geom")?,
        quote_ident(t)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(InflowRow {
                id: row.get(0)?,
                code: row.get(1)?,
                display_name: row.get(2)?,
                area: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                inhabitants: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                dwf: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                surface_class: row.get(6)?,
                surface_inclination: row.get(7)?,
                surface_parameters_id: row.get(8)?,
                geom: geometry_from_blob(row.get(9)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn read_maps(conn: &Connection, source: &InflowSource) -> Result<Vec<MapRow>, SchemaError> {
    if !table_exists(conn, source.map_table)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT id, {}, connection_node_id, percentage FROM {} ORDER BY id",
        quote_ident(source.map_key),
        quote_ident(source.map_table)
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, Option<i64>>(1)?,
            row.get::<_, Option<i64>>(2)?,
            row.get::<_, Option<f64>>(3)?,
        ))
    })?;
    let mut maps = Vec::new();
    for row in rows {
        let (id, inflow_id, node_id, percentage) = row?;
        // a map row without both ends can never be valid
        maps.push(MapRow {
            id,
            inflow_id: inflow_id.unwrap_or(-1),
            node_id: node_id.unwrap_or(-1),
            percentage,
        });
    }
    Ok(maps)
}

/// Splits multi-part geometries into one row per polygon. Area and
/// inhabitants are divided by the polygon areas; map rows are duplicated.
fn explode_multipolygons(
    rows: &mut Vec<InflowRow>,
    maps: &mut Vec<MapRow>,
    mut next_id: i64,
    mut next_map_id: i64,
) {
    let mut extra_rows = Vec::new();
    let mut extra_maps = Vec::new();

    for row in rows.iter_mut() {
        let parts = match &row.geom {
            Some(g) => g.polygons(),
            None => continue,
        };
        match parts.len() {
            0 => {
                row.geom = None;
                continue;
            }
            1 => {
                row.geom = parts.into_iter().next();
                continue;
            }
            _ => {}
        }
        let total: f64 = parts.iter().map(Geometry::area).sum();
        let count = parts.len() as f64;
        let original = row.clone();
        for (i, part) in parts.into_iter().enumerate() {
            let share = if total > 0.0 {
                part.area() / total
            } else {
                1.0 / count
            };
            if i == 0 {
                row.area = original.area * share;
                row.inhabitants = original.inhabitants * share;
                row.geom = Some(part);
                continue;
            }
            let mut extra = original.clone();
            extra.id = next_id;
            next_id += 1;
            extra.area = original.area * share;
            extra.inhabitants = original.inhabitants * share;
            extra.geom = Some(part);
            for map in maps.iter().filter(|m| m.inflow_id == original.id) {
                extra_maps.push(MapRow {
                    id: next_map_id,
                    inflow_id: extra.id,
                    ..map.clone()
                });
                next_map_id += 1;
            }
            extra_rows.push(extra);
        }
    }
    rows.extend(extra_rows);
    maps.extend(extra_maps);
}

/// CRS geometries are synthesized in: the model CRS when it can be
/// transformed to, otherwise the configured default.
pub(super) fn metric_srid(conn: &Connection, ctx: &StepContext) -> Result<i32, SchemaError> {
    let code: Option<i32> = if table_exists(conn, "model_settings")? {
        conn.query_row(
            &format!(
                "SELECT {} FROM model_settings ORDER BY id LIMIT 1",
                column_or_null(conn, "model_settings", "epsg_code")?
            ),
            [],
            |row| row.get::<_, Option<i32>>(0),
        )
        .optional()?
        .flatten()
    } else {
        None
    };
    let usable = |epsg: i32| {
        crs::lookup(epsg).is_some_and(|c| c.projected)
            && crs::transform(&Geometry::point(5.0, 52.0), LEGACY_SRID, epsg).is_ok()
    };
    Ok(code.filter(|c| usable(*c)).unwrap_or(ctx.default_epsg))
}

fn synthesize(
    node_coords: &[Coord],
    metric: i32,
    build: impl Fn(Coord) -> Geometry,
) -> Result<Geometry, SchemaError> {
    let projected = crs::transform(&Geometry::MultiPoint(node_coords.to_vec()), LEGACY_SRID, metric)?;
    let center = projected
        .centroid()
        .ok_or_else(|| SchemaError::Geometry("no connection node to place a geometry on".into()))?;
    crs::transform(&build(center), metric, LEGACY_SRID)
}

fn map_line(geom: &Geometry, node: Coord) -> Option<Geometry> {
    geom.point_on_surface()
        .map(|start| Geometry::LineString(vec![start, node]))
}

fn lookup_parameters(sets: &[SurfaceParameters], row: &InflowRow) -> Option<i64> {
    let class = row.surface_class.as_deref()?.trim().to_lowercase();
    let inclination = row.surface_inclination.as_deref()?.trim().to_lowercase();
    sets.iter()
        .find(|p| p.surface_class == class && p.surface_inclination == inclination)
        .map(|p| p.id)
}

fn insert_parameter_sets(conn: &Connection, sets: &[SurfaceParameters]) -> Result<(), SchemaError> {
    let mut stmt = conn.prepare(
        "INSERT INTO surface_parameters (id, outflow_delay, surface_layer_thickness, infiltration,
             max_infiltration_capacity, min_infiltration_capacity, infiltration_decay_constant,
             infiltration_recovery_constant, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for p in sets {
        stmt.execute(params![
            p.id,
            p.outflow_delay,
            p.surface_layer_thickness,
            p.infiltration,
            p.max_infiltration_capacity,
            p.min_infiltration_capacity,
            p.infiltration_decay_constant,
            p.infiltration_recovery_constant,
            p.description
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{v0200_initial, v0201_friction_type, v0222_settings};
    use crate::spatial::metadata::SpatialiteFileVersion;
    use crate::test_support::spatial_conn;
    use pretty_assertions::assert_eq;

    fn file_at_0222(inflow: i64) -> Connection {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        let mut ctx = StepContext::new(28992);
        for step in [
            &v0200_initial::MIGRATION,
            &v0201_friction_type::MIGRATION,
            &v0222_settings::MIGRATION,
        ] {
            (step.code_fn.unwrap())(&conn, &mut ctx).unwrap();
        }
        conn.execute(
            "INSERT INTO simulation_template_settings (id, name, use_0d_inflow) VALUES (1, 'default', ?1)",
            [inflow],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO model_settings (id, epsg_code) VALUES (1, 28992)",
            [],
        )
        .unwrap();
        conn.execute_batch(
            "INSERT INTO v2_connection_nodes (id, the_geom) VALUES
                 (1, GeomFromText('POINT(4.90 52.37)', 4326)),
                 (2, GeomFromText('POINT(4.91 52.37)', 4326));",
        )
        .unwrap();
        conn
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_impervious_surfaces() {
        let conn = file_at_0222(1);
        conn.execute_batch(
            "INSERT INTO v2_impervious_surface (id, surface_class, surface_inclination, area, nr_of_inhabitants, dry_weather_flow, the_geom) VALUES
                 (1, 'gesloten verharding', 'vlak', 100.0, 0, 0, GeomFromText('POLYGON((4.9 52.37, 4.9001 52.37, 4.9001 52.3701, 4.9 52.37))', 4326)),
                 (2, 'pand', 'hellend', 50.0, 2, 120.0, NULL),
                 (3, 'pand', 'hellend', 10.0, 0, 0, NULL),
                 (4, 'Onverhard ', 'uitgestrekt', 30.0, 0, 0,
                     GeomFromText('MULTIPOLYGON(((4.9 52.37, 4.9001 52.37, 4.9001 52.3701, 4.9 52.37)),((4.91 52.37, 4.9101 52.37, 4.9101 52.3701, 4.91 52.37)))', 4326)),
                 (5, 'pand', 'vlak', 0, 0, 0, NULL);
             INSERT INTO v2_impervious_surface_map (id, impervious_surface_id, connection_node_id, percentage) VALUES
                 (1, 1, 1, 100.0), (2, 2, 2, 100.0), (3, 4, 1, 100.0), (4, 99, 1, 100.0), (5, 1, 42, 50.0);",
        )
        .unwrap();

        let mut ctx = StepContext::new(28992);
        migrate_0222_to_0223(&conn, &mut ctx).unwrap();

        // 1, 2, 4 and the second part of 4
        assert_eq!(count(&conn, "surface"), 4);
        assert_eq!(count(&conn, "dry_weather_flow"), 1);
        assert_eq!(count(&conn, "surface_map"), 4);
        assert_eq!(count(&conn, "dry_weather_flow_map"), 1);
        assert_eq!(count(&conn, "dry_weather_flow_distribution"), 1);
        assert_eq!(count(&conn, "surface_parameters"), 15);

        let params_id: i64 = conn
            .query_row("SELECT surface_parameters_id FROM surface WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(params_id, 102);
        let params_id: i64 = conn
            .query_row("SELECT surface_parameters_id FROM surface WHERE id = 4", [], |r| r.get(0))
            .unwrap();
        assert_eq!(params_id, 112);

        let split: f64 = conn
            .query_row("SELECT SUM(area) FROM surface WHERE id IN (4, 6)", [], |r| r.get(0))
            .unwrap();
        assert!((split - 30.0).abs() < 1e-9);

        let (multiplier, total): (f64, f64) = conn
            .query_row("SELECT multiplier, daily_total FROM dry_weather_flow WHERE id = 2", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!((multiplier, total), (2.0, 120.0));

        let removed: Vec<String> = ctx.warnings.iter().map(|w| w.to_string()).collect();
        assert_eq!(removed.len(), 3, "{:?}", removed);
        assert!(removed.iter().any(|w| w.contains("[5]")));
        assert!(removed.iter().any(|w| w.contains("[3]")));
        assert!(removed.iter().any(|w| w.contains("[4, 5]")));

        let inflow: i64 = conn
            .query_row("SELECT use_0d_inflow FROM simulation_template_settings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(inflow, 1);
        for table in LEGACY_TABLES {
            assert!(!table_exists(&conn, table).unwrap());
        }
    }

    #[test]
    fn test_synthesized_square_has_requested_area() {
        let node = Coord::new(4.9, 52.37);
        let square = synthesize(&[node], 28992, |c| Geometry::square(c, 10_000.0)).unwrap();
        let back = crs::transform(&square, LEGACY_SRID, 28992).unwrap();
        assert!((back.area() - 10_000.0).abs() < 100.0, "{}", back.area());
    }

    #[test]
    fn test_no_inflow_clears_flag() {
        let conn = file_at_0222(0);
        conn.execute_batch(
            "INSERT INTO v2_surface (id, area, the_geom) VALUES (1, 10.0, NULL);",
        )
        .unwrap();
        let mut ctx = StepContext::new(28992);
        migrate_0222_to_0223(&conn, &mut ctx).unwrap();
        assert_eq!(count(&conn, "surface"), 0);
        let inflow: i64 = conn
            .query_row("SELECT use_0d_inflow FROM simulation_template_settings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(inflow, 0);
        assert!(!table_exists(&conn, "v2_surface").unwrap());
    }

    #[test]
    fn test_parameter_data_is_complete() {
        let sets = surface_parameter_sets().unwrap();
        assert_eq!(sets.len(), 15);
        assert_eq!(sets.first().map(|p| p.id), Some(101));
        assert_eq!(sets.last().map(|p| p.id), Some(115));
        assert!((DWF_DISTRIBUTION.iter().sum::<f64>() - 100.0).abs() < 1e-9);
    }
}
