//! Structure control: measure groups become measure locations on connection
//! nodes, tied to their controls by map lines, and every control gets a
//! point geometry near its target.

use std::collections::HashMap;

use log::info;
use rusqlite::{params, Connection, OptionalExtension};

use crate::constants::LEGACY_SRID;
use crate::database::{quote_ident, table_exists};
use crate::error::SchemaError;
use crate::spatial::crs;
use crate::spatial::{Coord, Geometry, GeometryKind};

use super::ops::{
    add_column_if_missing, already_applied, column_or_null, copy_columns, create_geo_table, drop_column_if_exists,
    drop_table_if_exists, geometry_from_blob, legacy_blob, read_points, remap_values,
    UnknownValuePolicy,
};
use super::v0223_inflow::{metric_srid, report};
use super::{Migration, StepContext};

pub const MIGRATION: Migration = Migration::code(
    224,
    Some(223),
    "Migrate structure control",
    migrate_0223_to_0224,
);

const LEGACY_CONTROL_TABLES: [&str; 9] = [
    "v2_control",
    "v2_control_delta",
    "v2_control_group",
    "v2_control_measure_group",
    "v2_control_measure_map",
    "v2_control_memory",
    "v2_control_pid",
    "v2_control_table",
    "v2_control_timed",
];

const MEASURE_LOCATION_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    connection_node_id INTEGER,
    measure_variable TEXT DEFAULT 'water_level',
    tags TEXT,
    code VARCHAR(100),
    display_name VARCHAR(255)"#;

const MEASURE_MAP_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    weight FLOAT,
    control_measure_location_id INTEGER,
    control_id INTEGER,
    control_type TEXT,
    tags TEXT,
    code VARCHAR(100),
    display_name VARCHAR(255)"#;

const MEMORY_CONTROL_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    measure_variable TEXT,
    upper_threshold FLOAT,
    lower_threshold FLOAT,
    action_type TEXT,
    action_value_1 FLOAT,
    action_value_2 FLOAT,
    target_type TEXT,
    target_id INTEGER,
    is_active BOOLEAN,
    is_inverse BOOLEAN,
    tags TEXT,
    code VARCHAR(100),
    display_name VARCHAR(255)"#;

const TABLE_CONTROL_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    action_table TEXT,
    action_type TEXT,
    measure_variable TEXT,
    measure_operator TEXT,
    target_type TEXT,
    target_id INTEGER,
    tags TEXT,
    code VARCHAR(100),
    display_name VARCHAR(255)"#;

/// Legacy control kind as stored in `v2_control.control_type`, and the table
/// its controls end up in.
const CONTROL_TABLES: [(&str, &str); 2] = [("table", "table_control"), ("memory", "memory_control")];

const MEASURE_VARIABLES: [(&str, &str); 1] = [("waterlevel", "water_level")];

// ========================================
// Migration 0223 -> 0224
// ========================================

fn migrate_0223_to_0224(conn: &Connection, ctx: &mut StepContext) -> Result<(), SchemaError> {
    if already_applied(conn, "v2_control", "table_control")? {
        return Ok(());
    }
    create_geo_table(conn, "control_measure_location", MEASURE_LOCATION_DDL, GeometryKind::Point)?;
    create_geo_table(conn, "control_measure_map", MEASURE_MAP_DDL, GeometryKind::LineString)?;
    create_geo_table(conn, "memory_control", MEMORY_CONTROL_DDL, GeometryKind::Point)?;
    create_geo_table(conn, "table_control", TABLE_CONTROL_DDL, GeometryKind::Point)?;
    add_column_if_missing(conn, "simulation_template_settings", "use_structure_control", "BOOLEAN")?;

    copy_columns(
        conn,
        "v2_control_memory",
        "memory_control",
        &[
            ("id", "id"),
            ("measure_variable", "measure_variable"),
            ("upper_threshold", "upper_threshold"),
            ("lower_threshold", "lower_threshold"),
            ("action_type", "action_type"),
            ("target_type", "target_type"),
            ("target_id", "target_id"),
            ("is_active", "is_active"),
            ("is_inverse", "is_inverse"),
        ],
    )?;
    split_action_values(conn)?;
    copy_columns(
        conn,
        "v2_control_table",
        "table_control",
        &[
            ("id", "id"),
            ("action_table", "action_table"),
            ("action_type", "action_type"),
            ("measure_variable", "measure_variable"),
            ("measure_operator", "measure_operator"),
            ("target_type", "target_type"),
            ("target_id", "target_id"),
        ],
    )?;
    // legacy tables are written as "v;v#v;v"
    conn.execute_batch(
        "UPDATE table_control SET action_table =
             replace(replace(replace(action_table, ';', ','), '#', char(10)), char(9), ' ')
         WHERE action_table IS NOT NULL",
    )?;

    let nodes = read_points(conn, "v2_connection_nodes", "the_geom")?;
    if table_exists(conn, "v2_control_measure_map")? && table_exists(conn, "v2_control")? {
        migrate_measure_maps(conn, ctx, &nodes)?;
    }
    remove_orphan_controls(conn, ctx)?;

    for (_, table) in CONTROL_TABLES {
        remap_values(conn, table, "measure_variable", &MEASURE_VARIABLES, UnknownValuePolicy::PassThrough)?;
        set_control_geometry(conn, table, &nodes)?;
    }
    remap_values(
        conn,
        "control_measure_location",
        "measure_variable",
        &MEASURE_VARIABLES,
        UnknownValuePolicy::PassThrough,
    )?;
    set_map_geometry(conn, ctx)?;
    move_structure_control_flag(conn)?;

    for table in LEGACY_CONTROL_TABLES {
        drop_table_if_exists(conn, table)?;
    }
    Ok(())
}

/// Memory controls hold "on;off" (or "on,off") in a single text column.
fn split_action_values(conn: &Connection) -> Result<(), SchemaError> {
    if !table_exists(conn, "v2_control_memory")? {
        return Ok(());
    }
    let values: Vec<(i64, Option<String>)> = conn
        .prepare(&format!(
            "SELECT id, {} FROM v2_control_memory",
            column_or_null(conn, "v2_control_memory", "action_value")?
        ))?
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<_, _>>()?;
    let mut update =
        conn.prepare("UPDATE memory_control SET action_value_1 = ?1, action_value_2 = ?2 WHERE id = ?3")?;
    for (id, value) in values {
        let (first, second) = parse_action_value(value.as_deref());
        update.execute(params![first, second, id])?;
    }
    Ok(())
}

fn parse_action_value(value: Option<&str>) -> (Option<f64>, Option<f64>) {
    let Some(value) = value else {
        return (None, None);
    };
    let mut parts = value
        .split([',', ';'])
        .map(str::trim)
        .map(|p| p.parse::<f64>().ok());
    (parts.next().flatten(), parts.next().flatten())
}

/// Measure map rows become one location per legacy row, mapped to every
/// control of their measure group.
fn migrate_measure_maps(
    conn: &Connection,
    ctx: &mut StepContext,
    nodes: &HashMap<i64, Coord>,
) -> Result<(), SchemaError> {
    let rows: Vec<(i64, Option<String>, Option<i64>)> = conn
        .prepare("SELECT id, object_type, object_id FROM v2_control_measure_map ORDER BY id")?
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
        .collect::<Result<_, _>>()?;

    let mut dropped = Vec::new();
    for (id, object_type, object_id) in rows {
        let on_node = object_type.as_deref().is_none_or(|t| t == "v2_connection_nodes");
        if !on_node || !object_id.is_some_and(|n| nodes.contains_key(&n)) {
            conn.execute("DELETE FROM v2_control_measure_map WHERE id = ?1", [id])?;
            dropped.push(id);
        }
    }
    report(
        ctx,
        "v2_control_measure_map",
        dropped.into_iter(),
        "they do not measure at a connection node with a geometry",
    );

    conn.execute_batch(
        "INSERT INTO control_measure_map (control_measure_location_id, weight, control_id, control_type)
         SELECT m.id, m.weight, c.control_id, c.control_type
         FROM v2_control_measure_map AS m
         JOIN v2_control AS c ON c.measure_group_id = m.measure_group_id
         ORDER BY c.id, m.id",
    )?;

    let mut insert = conn.prepare(
        "INSERT INTO control_measure_location (id, connection_node_id, geom) VALUES (?1, ?2, ?3)",
    )?;
    let located: Vec<(i64, i64)> = conn
        .prepare("SELECT id, object_id FROM v2_control_measure_map ORDER BY id")?
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<_, _>>()?;
    for (id, node) in located {
        let blob = nodes.get(&node).map(|c| legacy_blob(&Geometry::Point(Some(*c))));
        insert.execute(params![id, node, blob])?;
    }

    // a location measures what its controls measured
    for (kind, table) in CONTROL_TABLES {
        conn.execute(
            &format!(
                "UPDATE control_measure_location SET measure_variable = (
                     SELECT c.measure_variable FROM {table} AS c
                     JOIN control_measure_map AS m ON m.control_id = c.id AND m.control_type = ?1
                     WHERE m.control_measure_location_id = control_measure_location.id
                       AND c.measure_variable IS NOT NULL
                     LIMIT 1)
                 WHERE EXISTS (
                     SELECT 1 FROM {table} AS c
                     JOIN control_measure_map AS m ON m.control_id = c.id AND m.control_type = ?1
                     WHERE m.control_measure_location_id = control_measure_location.id
                       AND c.measure_variable IS NOT NULL)",
                table = quote_ident(table)
            ),
            [kind],
        )?;
    }
    Ok(())
}

/// Controls that no measure map refers to cannot act and are removed.
fn remove_orphan_controls(conn: &Connection, ctx: &mut StepContext) -> Result<(), SchemaError> {
    for (kind, table) in CONTROL_TABLES {
        let orphans: Vec<i64> = conn
            .prepare(&format!(
                "SELECT id FROM {} WHERE id NOT IN
                     (SELECT control_id FROM control_measure_map
                      WHERE control_type = ?1 AND control_id IS NOT NULL)
                 ORDER BY id",
                quote_ident(table)
            ))?
            .query_map([kind], |r| r.get(0))?
            .collect::<Result<_, _>>()?;
        for id in &orphans {
            conn.execute(&format!("DELETE FROM {} WHERE id = ?1", quote_ident(table)), [id])?;
        }
        report(ctx, table, orphans.into_iter(), "no measure location refers to them");
    }
    Ok(())
}

/// Position of a structure that a control acts on, in the legacy CRS.
fn target_position(
    conn: &Connection,
    nodes: &HashMap<i64, Coord>,
    target_type: &str,
    target_id: i64,
) -> Result<Option<Coord>, SchemaError> {
    let table = match target_type {
        "v2_channel" | "v2_pipe" | "v2_orifice" | "v2_weir" | "v2_culvert" | "v2_pumpstation" => target_type,
        _ => return Ok(None),
    };
    if !table_exists(conn, table)? {
        return Ok(None);
    }
    if table == "v2_culvert" {
        let blob: Option<Vec<u8>> = conn
            .query_row("SELECT the_geom FROM v2_culvert WHERE id = ?1", [target_id], |r| r.get(0))
            .optional()?
            .flatten();
        return Ok(geometry_from_blob(blob).and_then(|g| g.centroid()));
    }
    let ends: Option<(Option<i64>, Option<i64>)> = conn
        .query_row(
            &format!(
                "SELECT {}, {} FROM {} WHERE id = ?1",
                column_or_null(conn, table, "connection_node_start_id")?,
                column_or_null(conn, table, "connection_node_end_id")?,
                quote_ident(table)
            ),
            [target_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((start, end)) = ends else {
        return Ok(None);
    };
    let start = start.and_then(|n| nodes.get(&n).copied());
    if table == "v2_pumpstation" {
        return Ok(start);
    }
    let end = end.and_then(|n| nodes.get(&n).copied());
    Ok(match (start, end) {
        (Some(a), Some(b)) => Geometry::LineString(vec![a, b]).centroid(),
        _ => None,
    })
}

fn set_control_geometry(conn: &Connection, table: &str, nodes: &HashMap<i64, Coord>) -> Result<(), SchemaError> {
    let targets: Vec<(i64, Option<String>, Option<i64>)> = conn
        .prepare(&format!("SELECT id, target_type, target_id FROM {}", quote_ident(table)))?
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
        .collect::<Result<_, _>>()?;
    let mut update = conn.prepare(&format!("UPDATE {} SET geom = ?1 WHERE id = ?2", quote_ident(table)))?;
    for (id, target_type, target_id) in targets {
        let (Some(target_type), Some(target_id)) = (target_type, target_id) else {
            continue;
        };
        if let Some(c) = target_position(conn, nodes, &target_type, target_id)? {
            update.execute(params![legacy_blob(&Geometry::Point(Some(c))), id])?;
        }
    }
    Ok(())
}

/// Map lines run from the measure location to the control. A control on
/// the location itself gets a line of one unit northwards in the model CRS.
fn set_map_geometry(conn: &Connection, ctx: &StepContext) -> Result<(), SchemaError> {
    let locations = read_points(conn, "control_measure_location", "geom")?;
    let mut controls: HashMap<&str, HashMap<i64, Coord>> = HashMap::new();
    for (kind, table) in CONTROL_TABLES {
        controls.insert(kind, read_points(conn, table, "geom")?);
    }
    let maps: Vec<(i64, Option<i64>, Option<i64>, Option<String>)> = conn
        .prepare("SELECT id, control_measure_location_id, control_id, control_type FROM control_measure_map")?
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
        .collect::<Result<_, _>>()?;
    if maps.is_empty() {
        return Ok(());
    }

    let metric = metric_srid(conn, ctx)?;
    let mut update = conn.prepare("UPDATE control_measure_map SET geom = ?1 WHERE id = ?2")?;
    for (id, location_id, control_id, control_type) in maps {
        let start = location_id.and_then(|l| locations.get(&l).copied());
        let end = control_type
            .as_deref()
            .and_then(|t| controls.get(t))
            .zip(control_id)
            .and_then(|(points, c)| points.get(&c).copied());
        let (Some(start), Some(end)) = (start, end) else {
            continue;
        };
        let end = if start == end { shift_north(end, metric)? } else { end };
        update.execute(params![legacy_blob(&Geometry::LineString(vec![start, end])), id])?;
    }
    Ok(())
}

fn shift_north(c: Coord, metric: i32) -> Result<Coord, SchemaError> {
    let projected = crs::transform(&Geometry::Point(Some(c)), LEGACY_SRID, metric)?;
    let moved = match projected {
        Geometry::Point(Some(p)) => Geometry::point(p.x, p.y + 1.0),
        other => other,
    };
    match crs::transform(&moved, metric, LEGACY_SRID)? {
        Geometry::Point(Some(p)) => Ok(p),
        _ => Err(SchemaError::Geometry("cannot shift an empty point".into())),
    }
}

/// Structure control becomes a simulation template choice, and is switched
/// off when no control survived.
fn move_structure_control_flag(conn: &Connection) -> Result<(), SchemaError> {
    if !table_exists(conn, "simulation_template_settings")? {
        return Ok(());
    }
    let flag = if table_exists(conn, "model_settings")? {
        column_or_null(conn, "model_settings", "use_structure_control")?
    } else {
        "NULL".to_string()
    };
    let source = if flag == "NULL" {
        "NULL".to_string()
    } else {
        format!("(SELECT {} FROM model_settings ORDER BY id LIMIT 1)", flag)
    };
    conn.execute_batch(&format!(
        "UPDATE simulation_template_settings SET use_structure_control = CASE
             WHEN (SELECT COUNT(*) FROM table_control) + (SELECT COUNT(*) FROM memory_control) = 0 THEN 0
             ELSE coalesce({}, 0) END",
        source
    ))?;
    if drop_column_if_exists(conn, "model_settings", "use_structure_control")? {
        info!("Moved use_structure_control to simulation_template_settings");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{v0200_initial, v0201_friction_type, v0222_settings, v0223_inflow};
    use crate::spatial::codec::decode_blob;
    use crate::spatial::metadata::SpatialiteFileVersion;
    use crate::test_support::spatial_conn;
    use pretty_assertions::assert_eq;

    /// A file at 0223 with two nodes, a weir between them, a pump on node 2
    /// and one table and one memory control measuring at node 1.
    fn file_at_0223() -> Connection {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        let mut ctx = StepContext::new(28992);
        let run = |conn: &Connection, step: &Migration, ctx: &mut StepContext| {
            (step.code_fn.unwrap())(conn, ctx).unwrap();
        };
        run(&conn, &v0200_initial::MIGRATION, &mut ctx);
        run(&conn, &v0201_friction_type::MIGRATION, &mut ctx);
        conn.execute_batch(
            "INSERT INTO v2_global_settings (id, name, epsg_code, use_0d_inflow, control_group_id)
                 VALUES (1, 'default', 28992, 0, 1);
             INSERT INTO v2_control_group (id, name) VALUES (1, 'group');",
        )
        .unwrap();
        run(&conn, &v0222_settings::MIGRATION, &mut ctx);
        run(&conn, &v0223_inflow::MIGRATION, &mut ctx);
        conn.execute_batch(
            "INSERT INTO v2_connection_nodes (id, the_geom) VALUES
                 (1, GeomFromText('POINT(4.90 52.37)', 4326)),
                 (2, GeomFromText('POINT(4.92 52.37)', 4326)),
                 (3, NULL);
             INSERT INTO v2_weir (id, code, connection_node_start_id, connection_node_end_id)
                 VALUES (7, 'weir', 1, 2);
             INSERT INTO v2_pumpstation (id, code, connection_node_start_id) VALUES (3, 'pump', 2);
             INSERT INTO v2_control_measure_group (id) VALUES (1), (2);
             INSERT INTO v2_control_measure_map (id, measure_group_id, object_type, object_id, weight) VALUES
                 (1, 1, 'v2_connection_nodes', 1, 1.0),
                 (2, 2, 'v2_connection_nodes', 3, 1.0);
             INSERT INTO v2_control (id, control_group_id, measure_group_id, control_type, control_id) VALUES
                 (1, 1, 1, 'table', 10),
                 (2, 1, 1, 'memory', 20);
             INSERT INTO v2_control_table (id, action_table, action_type, measure_variable, measure_operator,
                                           target_type, target_id)
                 VALUES (10, '0.0;-1.0#1.0;-0.5', 'set_crest_level', 'waterlevel', '>', 'v2_weir', 7),
                        (11, '0.0;1.0', 'set_crest_level', 'waterlevel', '>', 'v2_weir', 7);
             INSERT INTO v2_control_memory (id, measure_variable, upper_threshold, lower_threshold,
                                            action_type, action_value, target_type, target_id, is_active, is_inverse)
                 VALUES (20, 'waterlevel', 1.0, 0.5, 'set_pump_capacity', '0.5;0.0', 'v2_pumpstation', 3, 1, 0);",
        )
        .unwrap();
        conn
    }

    fn geometry(conn: &Connection, sql: &str) -> Geometry {
        let blob: Vec<u8> = conn.query_row(sql, [], |r| r.get(0)).unwrap();
        decode_blob(&blob).unwrap().geometry
    }

    #[test]
    fn test_parse_action_value() {
        assert_eq!(parse_action_value(Some("0.5;0.0")), (Some(0.5), Some(0.0)));
        assert_eq!(parse_action_value(Some("1.5, 2")), (Some(1.5), Some(2.0)));
        assert_eq!(parse_action_value(Some("3")), (Some(3.0), None));
        assert_eq!(parse_action_value(None), (None, None));
    }

    #[test]
    fn test_structure_control() {
        let conn = file_at_0223();
        let mut ctx = StepContext::new(28992);
        migrate_0223_to_0224(&conn, &mut ctx).unwrap();

        let table: String = conn
            .query_row("SELECT action_table FROM table_control WHERE id = 10", [], |r| r.get(0))
            .unwrap();
        assert_eq!(table, "0.0,-1.0\n1.0,-0.5");
        let variable: String = conn
            .query_row("SELECT measure_variable FROM table_control WHERE id = 10", [], |r| r.get(0))
            .unwrap();
        assert_eq!(variable, "water_level");
        // control 11 is not in any measure group
        let tables: i64 = conn.query_row("SELECT COUNT(*) FROM table_control", [], |r| r.get(0)).unwrap();
        assert_eq!(tables, 1);

        let values: (f64, f64) = conn
            .query_row("SELECT action_value_1, action_value_2 FROM memory_control", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(values, (0.5, 0.0));

        assert_eq!(
            geometry(&conn, "SELECT geom FROM table_control WHERE id = 10"),
            Geometry::LineString(vec![Coord::new(4.90, 52.37), Coord::new(4.92, 52.37)])
                .centroid()
                .map(|c| Geometry::Point(Some(c)))
                .unwrap()
        );
        assert_eq!(
            geometry(&conn, "SELECT geom FROM memory_control WHERE id = 20"),
            Geometry::point(4.92, 52.37)
        );

        let locations: Vec<(i64, i64, String)> = conn
            .prepare("SELECT id, connection_node_id, measure_variable FROM control_measure_location")
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(locations, vec![(1, 1, "water_level".to_string())]);
        let maps: Vec<(i64, i64, String)> = conn
            .prepare(
                "SELECT control_measure_location_id, control_id, control_type FROM control_measure_map
                 WHERE geom IS NOT NULL ORDER BY control_id",
            )
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            maps,
            vec![(1, 10, "table".to_string()), (1, 20, "memory".to_string())]
        );

        let flag: i64 = conn
            .query_row("SELECT use_structure_control FROM simulation_template_settings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(flag, 1);
        assert!(!crate::spatial::metadata::column_exists(&conn, "model_settings", "use_structure_control").unwrap());

        assert!(ctx.warnings.iter().any(|w| w.to_string().contains("v2_control_measure_map")));
        assert!(ctx.warnings.iter().any(|w| w.to_string().contains("table_control")));
        for table in LEGACY_CONTROL_TABLES {
            assert!(!table_exists(&conn, table).unwrap(), "{} remains", table);
        }
    }

    #[test]
    fn test_control_on_its_measure_location_is_shifted() {
        let conn = file_at_0223();
        // a pump on the measured node puts the memory control on the location
        conn.execute_batch("UPDATE v2_pumpstation SET connection_node_start_id = 1").unwrap();
        let mut ctx = StepContext::new(28992);
        migrate_0223_to_0224(&conn, &mut ctx).unwrap();

        let line = geometry(&conn, "SELECT geom FROM control_measure_map WHERE control_type = 'memory'");
        let Geometry::LineString(coords) = line else {
            panic!("expected a line");
        };
        assert_eq!(coords[0], Coord::new(4.90, 52.37));
        assert!(coords[1].y > coords[0].y);
        assert!((coords[1].x - coords[0].x).abs() < 1e-6);
    }

    #[test]
    fn test_no_controls_switches_structure_control_off() {
        let conn = file_at_0223();
        conn.execute_batch("DELETE FROM v2_control").unwrap();
        let mut ctx = StepContext::new(28992);
        migrate_0223_to_0224(&conn, &mut ctx).unwrap();
        let flag: i64 = conn
            .query_row("SELECT use_structure_control FROM simulation_template_settings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(flag, 0);
        let controls: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM table_control) + (SELECT COUNT(*) FROM memory_control)",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(controls, 0);
    }
}
