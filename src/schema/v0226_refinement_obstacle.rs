//! Two-dimensional and 1D2D features lose their `v2_` prefix.

use rusqlite::Connection;

use crate::database::table_exists;
use crate::error::SchemaError;
use crate::spatial::GeometryKind;

use super::ops::{already_applied, copy_columns, create_geo_table, drop_table_if_exists};
use super::{Migration, StepContext};

pub const MIGRATION: Migration = Migration::code(
    226,
    Some(225),
    "Migrate 2D and 1D2D features",
    migrate_0225_to_0226,
);

const GRID_REFINEMENT_AREA_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    grid_level INTEGER,
    tags TEXT"#;

const OBSTACLE_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    crest_level FLOAT,
    tags TEXT"#;

const GRID_REFINEMENT_LINE_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    grid_level INTEGER,
    tags TEXT"#;

const DEM_AVERAGE_AREA_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    tags TEXT"#;

const EXCHANGE_LINE_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    channel_id INTEGER,
    exchange_level FLOAT,
    tags TEXT"#;

const POTENTIAL_BREACH_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    initial_exchange_level FLOAT,
    final_exchange_level FLOAT,
    levee_material INTEGER,
    channel_id INTEGER,
    tags TEXT"#;

fn migrate_0225_to_0226(conn: &Connection, _ctx: &mut StepContext) -> Result<(), SchemaError> {
    if already_applied(conn, "v2_obstacle", "obstacle")? {
        return Ok(());
    }
    create_geo_table(
        conn,
        "grid_refinement_area",
        GRID_REFINEMENT_AREA_DDL,
        GeometryKind::Polygon,
    )?;
    copy_columns(
        conn,
        "v2_grid_refinement_area",
        "grid_refinement_area",
        &[
            ("id", "id"),
            ("code", "code"),
            ("display_name", "display_name"),
            ("grid_level", "refinement_level"),
            ("geom", "the_geom"),
        ],
    )?;
    drop_table_if_exists(conn, "v2_grid_refinement_area")?;

    create_geo_table(conn, "obstacle", OBSTACLE_DDL, GeometryKind::LineString)?;
    copy_columns(
        conn,
        "v2_obstacle",
        "obstacle",
        &[
            ("id", "id"),
            ("code", "code"),
            ("crest_level", "crest_level"),
            ("geom", "the_geom"),
        ],
    )?;
    drop_table_if_exists(conn, "v2_obstacle")?;

    create_geo_table(
        conn,
        "grid_refinement_line",
        GRID_REFINEMENT_LINE_DDL,
        GeometryKind::LineString,
    )?;
    copy_columns(
        conn,
        "v2_grid_refinement",
        "grid_refinement_line",
        &[
            ("id", "id"),
            ("code", "code"),
            ("display_name", "display_name"),
            ("grid_level", "refinement_level"),
            ("geom", "the_geom"),
        ],
    )?;
    drop_table_if_exists(conn, "v2_grid_refinement")?;

    create_geo_table(conn, "dem_average_area", DEM_AVERAGE_AREA_DDL, GeometryKind::Polygon)?;
    copy_columns(
        conn,
        "v2_dem_average_area",
        "dem_average_area",
        &[("id", "id"), ("geom", "the_geom")],
    )?;
    drop_table_if_exists(conn, "v2_dem_average_area")?;

    create_geo_table(conn, "exchange_line", EXCHANGE_LINE_DDL, GeometryKind::LineString)?;
    copy_columns(
        conn,
        "v2_exchange_line",
        "exchange_line",
        &[
            ("id", "id"),
            ("channel_id", "channel_id"),
            ("exchange_level", "exchange_level"),
            ("geom", "the_geom"),
        ],
    )?;
    drop_table_if_exists(conn, "v2_exchange_line")?;

    migrate_potential_breaches(conn)?;
    Ok(())
}

/// A breach is described by the levels before and after it; the old depth
/// is the difference between the two.
fn migrate_potential_breaches(conn: &Connection) -> Result<(), SchemaError> {
    create_geo_table(conn, "potential_breach", POTENTIAL_BREACH_DDL, GeometryKind::LineString)?;
    if !table_exists(conn, "v2_potential_breach")? {
        return Ok(());
    }
    let incomplete: Vec<i64> = conn
        .prepare(
            "SELECT id FROM v2_potential_breach
             WHERE exchange_level IS NOT NULL AND maximum_breach_depth IS NULL ORDER BY id",
        )?
        .query_map([], |r| r.get(0))?
        .collect::<Result<_, _>>()?;
    if !incomplete.is_empty() {
        return Err(SchemaError::UpgradeFailed(format!(
            "cannot migrate potential breaches {:?}: they have an exchange_level but no maximum_breach_depth",
            incomplete
        )));
    }
    copy_columns(
        conn,
        "v2_potential_breach",
        "potential_breach",
        &[
            ("id", "id"),
            ("code", "code"),
            ("display_name", "display_name"),
            ("initial_exchange_level", "exchange_level"),
            ("levee_material", "levee_material"),
            ("channel_id", "channel_id"),
            ("geom", "the_geom"),
        ],
    )?;
    conn.execute_batch(
        "UPDATE potential_breach SET final_exchange_level = initial_exchange_level - (
             SELECT b.maximum_breach_depth FROM v2_potential_breach AS b WHERE b.id = potential_breach.id)
         WHERE initial_exchange_level IS NOT NULL",
    )?;
    drop_table_if_exists(conn, "v2_potential_breach")?;
    Ok(())
}
