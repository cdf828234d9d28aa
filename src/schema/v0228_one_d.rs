use std::collections::HashMap;

use rusqlite::{params, Connection};

use crate::constants::{CrossSectionShape, FrictionType};
use crate::database::{quote_ident, table_exists};
use crate::error::SchemaError;
use crate::spatial::{Coord, Geometry, GeometryKind};

use super::ops::{
    add_column_if_missing, already_applied, copy_columns, create_geo_table, create_table, drop_table_if_exists,
    legacy_blob, null_geometry_ids, read_points, remap_values, UnknownValuePolicy,
};
use super::{Migration, StepContext};

pub const MIGRATION: Migration = Migration::code(
    228,
    Some(227),
    "Migrate the 1D network",
    migrate_0226_to_0228,
);

/// Legacy tables whose rows cannot be carried over without a geometry.
const GEOMETRY_REQUIRED: [&str; 5] = [
    "v2_connection_nodes",
    "v2_cross_section_location",
    "v2_culvert",
    "v2_channel",
    "v2_windshielding",
];

const LEGACY_1D_TABLES: [&str; 12] = [
    "v2_channel",
    "v2_cross_section_location",
    "v2_pipe",
    "v2_culvert",
    "v2_weir",
    "v2_orifice",
    "v2_pumpstation",
    "v2_windshielding",
    "v2_floodfill",
    "v2_cross_section_definition",
    "v2_manhole",
    "v2_connection_nodes",
];

/// Tables whose `material_id` uses the legacy material codes.
const MATERIAL_TABLES: [&str; 4] = ["pipe", "culvert", "weir", "orifice"];

/// Controls refer to their target by table name.
const TARGET_TYPES: [(&str, &str); 7] = [
    ("v2_pumpstation", "pump"),
    ("v2_channel", "channel"),
    ("v2_pipe", "pipe"),
    ("v2_culvert", "culvert"),
    ("v2_weir", "weir"),
    ("v2_orifice", "orifice"),
    ("v2_cross_section_location", "cross_section_location"),
];

/// Legacy material codes that were folded into existing materials.
const MATERIAL_REMAP: [(i64, i64); 2] = [(9, 2), (10, 7)];

/// (id, description, friction_coefficient); every material uses Manning.
const MATERIALS: [(i64, &str, f64); 9] = [
    (0, "Concrete", 0.0145),
    (1, "PVC", 0.011),
    (2, "Gres", 0.0115),
    (3, "Cast iron", 0.0135),
    (4, "Brickwork", 0.016),
    (5, "HPE", 0.011),
    (6, "HDPE", 0.011),
    (7, "Plate iron", 0.0135),
    (8, "Steel", 0.013),
];

const CROSS_SECTION_DDL: &str = r#",
    cross_section_shape INTEGER,
    cross_section_width FLOAT,
    cross_section_height FLOAT,
    cross_section_table TEXT"#;

const CONNECTION_NODE_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    tags TEXT,
    storage_area FLOAT,
    initial_water_level FLOAT,
    visualisation INTEGER DEFAULT -1,
    manhole_surface_level FLOAT,
    bottom_level FLOAT,
    exchange_level FLOAT,
    exchange_type INTEGER"#;

const CROSS_SECTION_LOCATION_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    tags TEXT,
    reference_level FLOAT,
    friction_type INTEGER,
    friction_value FLOAT,
    bank_level FLOAT,
    channel_id INTEGER"#;

const CHANNEL_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    tags TEXT,
    exchange_type INTEGER,
    calculation_point_distance FLOAT,
    connection_node_id_start INTEGER,
    connection_node_id_end INTEGER"#;

const PIPE_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    tags TEXT,
    sewerage_type INTEGER,
    exchange_type INTEGER,
    invert_level_start FLOAT,
    invert_level_end FLOAT,
    friction_value FLOAT,
    friction_type INTEGER,
    calculation_point_distance FLOAT,
    material_id INTEGER,
    connection_node_id_start INTEGER,
    connection_node_id_end INTEGER"#;

const CULVERT_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    tags TEXT,
    exchange_type INTEGER,
    friction_value FLOAT,
    friction_type INTEGER,
    calculation_point_distance FLOAT,
    discharge_coefficient_positive FLOAT,
    discharge_coefficient_negative FLOAT,
    invert_level_start FLOAT,
    invert_level_end FLOAT,
    material_id INTEGER,
    connection_node_id_start INTEGER,
    connection_node_id_end INTEGER"#;

const WEIR_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    tags TEXT,
    crest_level FLOAT,
    crest_type INTEGER,
    friction_value FLOAT,
    friction_type INTEGER,
    discharge_coefficient_positive FLOAT,
    discharge_coefficient_negative FLOAT,
    material_id INTEGER,
    sewerage BOOLEAN,
    external BOOLEAN,
    connection_node_id_start INTEGER,
    connection_node_id_end INTEGER"#;

const ORIFICE_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    tags TEXT,
    crest_level FLOAT,
    crest_type INTEGER,
    friction_value FLOAT,
    friction_type INTEGER,
    discharge_coefficient_positive FLOAT,
    discharge_coefficient_negative FLOAT,
    material_id INTEGER,
    sewerage BOOLEAN,
    connection_node_id_start INTEGER,
    connection_node_id_end INTEGER"#;

const WINDSHIELDING_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    tags TEXT,
    north FLOAT,
    northeast FLOAT,
    east FLOAT,
    southeast FLOAT,
    south FLOAT,
    southwest FLOAT,
    west FLOAT,
    northwest FLOAT,
    channel_id INTEGER"#;

const PUMP_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    start_level FLOAT,
    lower_stop_level FLOAT,
    upper_stop_level FLOAT,
    capacity FLOAT,
    type INTEGER,
    sewerage BOOLEAN,
    connection_node_id INTEGER,
    tags TEXT"#;

const PUMP_MAP_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    pump_id INTEGER,
    connection_node_id_end INTEGER,
    code VARCHAR(100),
    display_name VARCHAR(255),
    tags TEXT"#;

const MATERIAL_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    description TEXT,
    friction_type INTEGER,
    friction_coefficient FLOAT"#;

// ========================================
// Cross sections
// ========================================

/// A legacy cross section definition in its inlined form.
#[derive(Debug, Clone, PartialEq)]
enum CrossSection {
    /// A shape described by a single width and height. The code is kept as
    /// found, including codes without a known shape.
    Dimensions {
        code: Option<i64>,
        width: Option<f64>,
        height: Option<f64>,
    },
    /// A shape described by a profile table.
    Tabulated {
        shape: CrossSectionShape,
        table: Option<String>,
    },
}

impl CrossSection {
    fn from_definition(code: Option<i64>, width: Option<String>, height: Option<String>) -> Self {
        match code.and_then(CrossSectionShape::from_code) {
            Some(shape) if shape.is_tabulated() => {
                let table = match (width.as_deref(), height.as_deref()) {
                    // the profile of a YZ shape is listed as (y, z)
                    (Some(w), Some(h)) if shape == CrossSectionShape::TabulatedYz => make_table(w, h),
                    (Some(w), Some(h)) => make_table(h, w),
                    _ => None,
                };
                CrossSection::Tabulated { shape, table }
            }
            _ => CrossSection::Dimensions {
                code,
                width: parse_dimension(width.as_deref()),
                height: parse_dimension(height.as_deref()),
            },
        }
    }

    fn shape_code(&self) -> Option<i64> {
        match self {
            CrossSection::Dimensions { code, .. } => *code,
            CrossSection::Tabulated { shape, .. } => Some(shape.code()),
        }
    }

    fn width(&self) -> Option<f64> {
        match self {
            CrossSection::Dimensions { width, .. } => *width,
            CrossSection::Tabulated { .. } => None,
        }
    }

    fn height(&self) -> Option<f64> {
        match self {
            CrossSection::Dimensions { height, .. } => *height,
            CrossSection::Tabulated { .. } => None,
        }
    }

    fn table(&self) -> Option<&str> {
        match self {
            CrossSection::Dimensions { .. } => None,
            CrossSection::Tabulated { table, .. } => table.as_deref(),
        }
    }
}

fn parse_dimension(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse::<f64>().ok())
}

/// Zips two whitespace separated series into CSV rows. Series of unequal
/// length give no table.
fn make_table(first: &str, second: &str) -> Option<String> {
    let a: Vec<&str> = first.split_whitespace().collect();
    let b: Vec<&str> = second.split_whitespace().collect();
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    Some(
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| format!("{},{}", x, y))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

fn read_definitions(conn: &Connection) -> Result<HashMap<i64, CrossSection>, SchemaError> {
    if !table_exists(conn, "v2_cross_section_definition")? {
        return Ok(HashMap::new());
    }
    let mut stmt = conn.prepare(
        "SELECT id, shape, CAST(width AS TEXT), CAST(height AS TEXT) FROM v2_cross_section_definition",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, Option<i64>>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;
    let mut defs = HashMap::new();
    for row in rows {
        let (id, code, width, height) = row?;
        defs.insert(id, CrossSection::from_definition(code, width, height));
    }
    Ok(defs)
}

/// Adds the cross section columns of `dst` from the definition each `src`
/// row refers to through `definition_column`.
fn inline_cross_sections(
    conn: &Connection,
    src: &str,
    definition_column: &str,
    dst: &str,
    defs: &HashMap<i64, CrossSection>,
) -> Result<(), SchemaError> {
    if !table_exists(conn, src)? {
        return Ok(());
    }
    let refs: Vec<(i64, Option<i64>)> = conn
        .prepare(&format!(
            "SELECT id, {} FROM {}",
            quote_ident(definition_column),
            quote_ident(src)
        ))?
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;

    let mut update = conn.prepare(&format!(
        "UPDATE {} SET cross_section_shape = ?1, cross_section_width = ?2,
             cross_section_height = ?3, cross_section_table = ?4 WHERE id = ?5",
        quote_ident(dst)
    ))?;
    for (id, def_id) in refs {
        if let Some(def) = def_id.and_then(|d| defs.get(&d)) {
            update.execute(params![def.shape_code(), def.width(), def.height(), def.table(), id])?;
        }
    }
    Ok(())
}

// ========================================
// Geometry from connection nodes
// ========================================

/// Sets `geom` on every row of `table` from its connection nodes. Rows whose
/// node is missing fail the step.
fn geometry_from_nodes(
    conn: &Connection,
    table: &str,
    node_columns: &[&str],
    nodes: &HashMap<i64, Coord>,
) -> Result<(), SchemaError> {
    let rows: Vec<(i64, Vec<Option<i64>>)> = conn
        .prepare(&format!(
            "SELECT id, {} FROM {}",
            node_columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            quote_ident(table)
        ))?
        .query_map([], |row| {
            let mut ids = Vec::with_capacity(node_columns.len());
            for i in 0..node_columns.len() {
                ids.push(row.get::<_, Option<i64>>(i + 1)?);
            }
            Ok((row.get::<_, i64>(0)?, ids))
        })?
        .collect::<Result<_, _>>()?;

    let mut broken = Vec::new();
    let mut update = conn.prepare(&format!("UPDATE {} SET geom = ?1 WHERE id = ?2", quote_ident(table)))?;
    for (id, node_ids) in rows {
        let coords: Option<Vec<Coord>> = node_ids
            .iter()
            .map(|n| n.and_then(|n| nodes.get(&n).copied()))
            .collect();
        let geom = match coords.as_deref() {
            Some([point]) => Geometry::Point(Some(*point)),
            Some(line) if line.len() > 1 => Geometry::LineString(line.to_vec()),
            _ => {
                broken.push(id);
                continue;
            }
        };
        update.execute(params![legacy_blob(&geom), id])?;
    }
    if !broken.is_empty() {
        return Err(SchemaError::UpgradeFailed(format!(
            "cannot build geometries for {} {:?}: their connection nodes are missing",
            table, broken
        )));
    }
    Ok(())
}

// ========================================
// Migration 0226 -> 0228
// ========================================

fn migrate_0226_to_0228(conn: &Connection, _ctx: &mut StepContext) -> Result<(), SchemaError> {
    if already_applied(conn, "v2_connection_nodes", "connection_node")? {
        return Ok(());
    }
    for table in GEOMETRY_REQUIRED {
        let ids = null_geometry_ids(conn, table, "the_geom")?;
        if !ids.is_empty() {
            return Err(SchemaError::UpgradeFailed(format!(
                "cannot migrate because of empty geometries in table {} (ids {:?})",
                table, ids
            )));
        }
    }

    let nodes = read_points(conn, "v2_connection_nodes", "the_geom")?;
    let defs = read_definitions(conn)?;

    migrate_connection_nodes(conn)?;

    create_geo_table(
        conn,
        "cross_section_location",
        &format!("{}{}", CROSS_SECTION_LOCATION_DDL, CROSS_SECTION_DDL),
        GeometryKind::Point,
    )?;
    copy_columns(
        conn,
        "v2_cross_section_location",
        "cross_section_location",
        &[
            ("id", "id"),
            ("code", "code"),
            ("reference_level", "reference_level"),
            ("friction_type", "friction_type"),
            ("friction_value", "friction_value"),
            ("bank_level", "bank_level"),
            ("channel_id", "channel_id"),
            ("geom", "the_geom"),
        ],
    )?;
    inline_cross_sections(
        conn,
        "v2_cross_section_location",
        "definition_id",
        "cross_section_location",
        &defs,
    )?;

    create_geo_table(conn, "channel", CHANNEL_DDL, GeometryKind::LineString)?;
    copy_columns(
        conn,
        "v2_channel",
        "channel",
        &[
            ("id", "id"),
            ("code", "code"),
            ("display_name", "display_name"),
            ("exchange_type", "calculation_type"),
            ("calculation_point_distance", "dist_calc_points"),
            ("connection_node_id_start", "connection_node_start_id"),
            ("connection_node_id_end", "connection_node_end_id"),
            ("geom", "the_geom"),
        ],
    )?;

    create_geo_table(
        conn,
        "pipe",
        &format!("{}{}", PIPE_DDL, CROSS_SECTION_DDL),
        GeometryKind::LineString,
    )?;
    copy_columns(
        conn,
        "v2_pipe",
        "pipe",
        &[
            ("id", "id"),
            ("code", "code"),
            ("display_name", "display_name"),
            ("sewerage_type", "sewerage_type"),
            ("exchange_type", "calculation_type"),
            ("invert_level_start", "invert_level_start_point"),
            ("invert_level_end", "invert_level_end_point"),
            ("friction_value", "friction_value"),
            ("friction_type", "friction_type"),
            ("calculation_point_distance", "dist_calc_points"),
            ("material_id", "material"),
            ("connection_node_id_start", "connection_node_start_id"),
            ("connection_node_id_end", "connection_node_end_id"),
        ],
    )?;
    inline_cross_sections(conn, "v2_pipe", "cross_section_definition_id", "pipe", &defs)?;
    geometry_from_nodes(
        conn,
        "pipe",
        &["connection_node_id_start", "connection_node_id_end"],
        &nodes,
    )?;

    create_geo_table(
        conn,
        "culvert",
        &format!("{}{}", CULVERT_DDL, CROSS_SECTION_DDL),
        GeometryKind::LineString,
    )?;
    copy_columns(
        conn,
        "v2_culvert",
        "culvert",
        &[
            ("id", "id"),
            ("code", "code"),
            ("display_name", "display_name"),
            ("exchange_type", "calculation_type"),
            ("friction_value", "friction_value"),
            ("friction_type", "friction_type"),
            ("calculation_point_distance", "dist_calc_points"),
            ("discharge_coefficient_positive", "discharge_coefficient_positive"),
            ("discharge_coefficient_negative", "discharge_coefficient_negative"),
            ("invert_level_start", "invert_level_start_point"),
            ("invert_level_end", "invert_level_end_point"),
            ("connection_node_id_start", "connection_node_start_id"),
            ("connection_node_id_end", "connection_node_end_id"),
            ("geom", "the_geom"),
        ],
    )?;
    inline_cross_sections(conn, "v2_culvert", "cross_section_definition_id", "culvert", &defs)?;

    migrate_weirs_and_orifices(conn, &nodes, &defs)?;
    migrate_pumps(conn, &nodes)?;
    migrate_windshielding(conn)?;
    create_materials(conn)?;
    for table in MATERIAL_TABLES {
        remap_values(conn, table, "material_id", &MATERIAL_REMAP, UnknownValuePolicy::PassThrough)?;
    }
    for table in ["table_control", "memory_control"] {
        remap_values(conn, table, "target_type", &TARGET_TYPES, UnknownValuePolicy::PassThrough)?;
    }

    add_column_if_missing(conn, "obstacle", "affects_2d", "BOOLEAN DEFAULT 1")?;
    add_column_if_missing(conn, "obstacle", "affects_1d2d_open_water", "BOOLEAN DEFAULT 1")?;
    add_column_if_missing(conn, "obstacle", "affects_1d2d_closed", "BOOLEAN DEFAULT 0")?;
    add_column_if_missing(conn, "model_settings", "node_open_water_detection", "INTEGER DEFAULT 1")?;

    for table in LEGACY_1D_TABLES {
        drop_table_if_exists(conn, table)?;
    }
    Ok(())
}

/// Weirs and orifices get a line between their nodes and inline cross
/// sections.
fn migrate_weirs_and_orifices(
    conn: &Connection,
    nodes: &HashMap<i64, Coord>,
    defs: &HashMap<i64, CrossSection>,
) -> Result<(), SchemaError> {
    let common = [
        ("id", "id"),
        ("code", "code"),
        ("display_name", "display_name"),
        ("crest_level", "crest_level"),
        ("crest_type", "crest_type"),
        ("friction_value", "friction_value"),
        ("friction_type", "friction_type"),
        ("discharge_coefficient_positive", "discharge_coefficient_positive"),
        ("discharge_coefficient_negative", "discharge_coefficient_negative"),
        ("sewerage", "sewerage"),
        ("connection_node_id_start", "connection_node_start_id"),
        ("connection_node_id_end", "connection_node_end_id"),
    ];
    for (src, dst, ddl) in [("v2_weir", "weir", WEIR_DDL), ("v2_orifice", "orifice", ORIFICE_DDL)] {
        create_geo_table(
            conn,
            dst,
            &format!("{}{}", ddl, CROSS_SECTION_DDL),
            GeometryKind::LineString,
        )?;
        let mut mapping = common.to_vec();
        if dst == "weir" {
            mapping.push(("external", "external"));
        }
        copy_columns(conn, src, dst, &mapping)?;
        inline_cross_sections(conn, src, "cross_section_definition_id", dst, defs)?;
        geometry_from_nodes(
            conn,
            dst,
            &["connection_node_id_start", "connection_node_id_end"],
            nodes,
        )?;
    }
    Ok(())
}

fn migrate_windshielding(conn: &Connection) -> Result<(), SchemaError> {
    create_geo_table(conn, "windshielding_1d", WINDSHIELDING_DDL, GeometryKind::Point)?;
    copy_columns(
        conn,
        "v2_windshielding",
        "windshielding_1d",
        &[
            ("id", "id"),
            ("north", "north"),
            ("northeast", "northeast"),
            ("east", "east"),
            ("southeast", "southeast"),
            ("south", "south"),
            ("southwest", "southwest"),
            ("west", "west"),
            ("northwest", "northwest"),
            ("channel_id", "channel_id"),
            ("geom", "the_geom"),
        ],
    )?;
    Ok(())
}

/// Connection nodes absorb the attributes of the manhole on them.
fn migrate_connection_nodes(conn: &Connection) -> Result<(), SchemaError> {
    create_geo_table(conn, "connection_node", CONNECTION_NODE_DDL, GeometryKind::Point)?;
    if !table_exists(conn, "v2_connection_nodes")? {
        return Ok(());
    }
    copy_columns(
        conn,
        "v2_connection_nodes",
        "connection_node",
        &[
            ("id", "id"),
            ("code", "code"),
            ("storage_area", "storage_area"),
            ("initial_water_level", "initial_waterlevel"),
            ("geom", "the_geom"),
        ],
    )?;
    if !table_exists(conn, "v2_manhole")? {
        return Ok(());
    }
    // a node carries at most one manhole; the lowest id wins
    conn.execute_batch(
        "UPDATE connection_node SET
             code = m.code,
             display_name = m.display_name,
             visualisation = m.manhole_indicator,
             manhole_surface_level = m.surface_level,
             bottom_level = m.bottom_level,
             exchange_level = m.drain_level,
             exchange_type = m.calculation_type
         FROM (SELECT * FROM v2_manhole
               WHERE id IN (SELECT MIN(id) FROM v2_manhole GROUP BY connection_node_id)) AS m
         WHERE m.connection_node_id = connection_node.id",
    )?;
    Ok(())
}

fn migrate_pumps(conn: &Connection, nodes: &HashMap<i64, Coord>) -> Result<(), SchemaError> {
    create_geo_table(conn, "pump", PUMP_DDL, GeometryKind::Point)?;
    create_geo_table(conn, "pump_map", PUMP_MAP_DDL, GeometryKind::LineString)?;
    if !table_exists(conn, "v2_pumpstation")? {
        return Ok(());
    }
    copy_columns(
        conn,
        "v2_pumpstation",
        "pump",
        &[
            ("id", "id"),
            ("code", "code"),
            ("display_name", "display_name"),
            ("start_level", "start_level"),
            ("lower_stop_level", "lower_stop_level"),
            ("upper_stop_level", "upper_stop_level"),
            ("capacity", "capacity"),
            ("type", "type"),
            ("sewerage", "sewerage"),
            ("connection_node_id", "connection_node_start_id"),
        ],
    )?;
    geometry_from_nodes(conn, "pump", &["connection_node_id"], nodes)?;

    // pumps that deliver to another node get a map line towards it
    conn.execute_batch(
        "INSERT INTO pump_map (pump_id, connection_node_id_end, code, display_name)
         SELECT id, connection_node_end_id, code, display_name FROM v2_pumpstation
         WHERE connection_node_end_id IS NOT NULL AND connection_node_start_id IS NOT NULL
         ORDER BY id",
    )?;
    let maps: Vec<(i64, i64, i64)> = conn
        .prepare(
            "SELECT pump_map.id, pump.connection_node_id, pump_map.connection_node_id_end
             FROM pump_map JOIN pump ON pump.id = pump_map.pump_id",
        )?
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<_, _>>()?;
    for (id, start, end) in maps {
        match (nodes.get(&start), nodes.get(&end)) {
            (Some(a), Some(b)) => {
                conn.execute(
                    "UPDATE pump_map SET geom = ?1 WHERE id = ?2",
                    params![legacy_blob(&Geometry::LineString(vec![*a, *b])), id],
                )?;
            }
            _ => {
                conn.execute("DELETE FROM pump_map WHERE id = ?1", [id])?;
            }
        }
    }
    Ok(())
}

/// The material list only applies to models that have settings.
fn create_materials(conn: &Connection) -> Result<(), SchemaError> {
    create_table(conn, "material", MATERIAL_DDL)?;
    let has_settings = table_exists(conn, "model_settings")?
        && conn.query_row("SELECT COUNT(*) FROM model_settings", [], |r| r.get::<_, i64>(0))? > 0;
    if !has_settings {
        return Ok(());
    }
    let mut insert = conn.prepare(
        "INSERT INTO material (id, description, friction_type, friction_coefficient) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (id, description, coefficient) in MATERIALS {
        insert.execute(params![
            id,
            description,
            FrictionType::Manning as i64,
            coefficient
        ])?;
    }
    Ok(())
}
