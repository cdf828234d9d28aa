use log::{debug, info};
use rusqlite::Connection;

use crate::constants::{LAST_SOUTH_MIGRATION_ID, LEGACY_SRID};
use crate::database::{quote_ident, table_exists};
use crate::error::SchemaError;
use crate::ledger;
use crate::spatial::metadata::{column_exists, file_version, init_spatial_metadata, SpatialiteFileVersion};

use super::base::{LegacyTable, LEGACY_GEOMETRY_COLUMN, LEGACY_TABLES};
use super::ops::{
    add_column_if_missing, column_or_null, drop_column_if_exists, drop_table_if_exists,
    rename_column_if_exists, TableSet,
};
use super::{Migration, StepContext};

pub const MIGRATION: Migration = Migration::code(200, None, "Initial schema", migrate_to_0200);

/// One schema change of the legacy version scheme.
enum LegacyOp {
    AddColumn {
        table: &'static str,
        column: &'static str,
        decl: &'static str,
    },
    DropColumn {
        table: &'static str,
        column: &'static str,
    },
    RenameColumn {
        table: &'static str,
        from: &'static str,
        to: &'static str,
    },
    DropTable(&'static str),
    /// Creates a legacy table at its final shape when absent.
    CreateTable(&'static str),
    /// Sets every row of a column.
    Fill {
        table: &'static str,
        column: &'static str,
        value: f64,
    },
    /// Replaces NULLs in a column.
    FillNull {
        table: &'static str,
        column: &'static str,
        value: f64,
    },
    Code(fn(&Connection) -> Result<(), SchemaError>),
}

struct LegacyStep {
    id: i64,
    ops: &'static [LegacyOp],
}

const GLOBAL: &str = "v2_global_settings";

const fn add(table: &'static str, column: &'static str, decl: &'static str) -> LegacyOp {
    LegacyOp::AddColumn { table, column, decl }
}

const fn drop(table: &'static str, column: &'static str) -> LegacyOp {
    LegacyOp::DropColumn { table, column }
}

static LEGACY_STEPS: &[LegacyStep] = &[
    LegacyStep {
        id: 160,
        ops: &[
            add("v2_control_pid", "target_upper_limit", "VARCHAR(50)"),
            add("v2_control_pid", "target_lower_limit", "VARCHAR(50)"),
        ],
    },
    LegacyStep {
        id: 161,
        ops: &[drop(GLOBAL, "connected_advise_file")],
    },
    LegacyStep {
        id: 162,
        ops: &[
            add(GLOBAL, "table_step_size_1d", "FLOAT"),
            add(GLOBAL, "table_step_size_volume_2d", "FLOAT"),
        ],
    },
    LegacyStep {
        id: 163,
        ops: &[
            add(GLOBAL, "use_2d_rain", "INTEGER"),
            LegacyOp::Fill {
                table: GLOBAL,
                column: "use_2d_rain",
                value: 1.0,
            },
        ],
    },
    LegacyStep {
        id: 164,
        ops: &[LegacyOp::CreateTable("v2_grid_refinement_area")],
    },
    LegacyStep {
        id: 165,
        ops: &[
            LegacyOp::CreateTable("v2_groundwater"),
            LegacyOp::CreateTable("v2_simple_infiltration"),
            LegacyOp::CreateTable("v2_interflow"),
            add(GLOBAL, "initial_groundwater_level", "FLOAT"),
            add(GLOBAL, "initial_groundwater_level_file", "VARCHAR(255)"),
            add(GLOBAL, "initial_groundwater_level_type", "INTEGER"),
            add(GLOBAL, "groundwater_settings_id", "INTEGER"),
            add(GLOBAL, "simple_infiltration_settings_id", "INTEGER"),
            add(GLOBAL, "interflow_settings_id", "INTEGER"),
        ],
    },
    LegacyStep {
        id: 166,
        ops: &[LegacyOp::Code(move_infiltration_settings)],
    },
    LegacyStep {
        id: 167,
        ops: &[
            drop(GLOBAL, "infiltration_rate_file"),
            drop(GLOBAL, "infiltration_surface_option"),
            drop(GLOBAL, "max_infiltration_capacity_file"),
            drop(GLOBAL, "porosity_layer_thickness"),
            drop(GLOBAL, "porosity_file"),
            drop(GLOBAL, "hydraulic_conductivity_file"),
            drop(GLOBAL, "interflow_type"),
            drop(GLOBAL, "porosity"),
            drop(GLOBAL, "impervious_layer_elevation"),
            drop(GLOBAL, "infiltration_rate"),
            drop(GLOBAL, "hydraulic_conductivity"),
        ],
    },
    LegacyStep {
        id: 168,
        ops: &[
            drop("v2_groundwater", "seepage_file"),
            drop("v2_groundwater", "seepage"),
            add("v2_groundwater", "leakage", "FLOAT"),
            add("v2_groundwater", "leakage_file", "VARCHAR(255)"),
        ],
    },
    // 169 only touched a settings table that no longer exists
    LegacyStep { id: 169, ops: &[] },
    // 170 widened aggregation_method, a no-op in SQLite
    LegacyStep { id: 170, ops: &[] },
    LegacyStep {
        id: 171,
        ops: &[
            LegacyOp::FillNull {
                table: "v2_culvert",
                column: "discharge_coefficient_negative",
                value: 1.0,
            },
            LegacyOp::FillNull {
                table: "v2_culvert",
                column: "discharge_coefficient_positive",
                value: 1.0,
            },
        ],
    },
    LegacyStep {
        id: 172,
        ops: &[
            LegacyOp::RenameColumn {
                table: GLOBAL,
                from: "max_interception_file",
                to: "interception_file",
            },
            LegacyOp::RenameColumn {
                table: GLOBAL,
                from: "max_interception",
                to: "interception_global",
            },
        ],
    },
    LegacyStep {
        id: 173,
        ops: &[
            LegacyOp::DropTable("v2_initial_waterlevel"),
            drop("v2_orifice", "max_capacity"),
            drop("v2_impervious_surface", "function"),
            drop("v2_pipe", "pipe_quality"),
        ],
    },
];

// ========================================
// Root step
// ========================================

fn migrate_to_0200(conn: &Connection, _ctx: &mut StepContext) -> Result<(), SchemaError> {
    if file_version(conn)?.is_none() {
        info!("Initializing spatial metadata");
        init_spatial_metadata(conn, SpatialiteFileVersion::V4)?;
    }

    let legacy_version = ledger::legacy_version(conn)?;
    apply_legacy_steps(conn, legacy_version)?;

    let mut tables = TableSet::read(conn)?;
    create_legacy_tables(conn, &mut tables)?;
    Ok(())
}

fn create_legacy_tables(conn: &Connection, tables: &mut TableSet) -> Result<(), SchemaError> {
    for table in LEGACY_TABLES {
        if tables.contains(table.name) {
            continue;
        }
        create_legacy_table(conn, table)?;
        tables.insert(table.name);
    }
    Ok(())
}

fn create_legacy_table(conn: &Connection, table: &LegacyTable) -> Result<(), SchemaError> {
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({})",
        quote_ident(table.name),
        table.columns
    ))?;
    if let Some(kind) = table.geometry {
        crate::spatial::metadata::add_geometry_column(
            conn,
            table.name,
            LEGACY_GEOMETRY_COLUMN,
            LEGACY_SRID,
            kind,
        )?;
    }
    debug!("Created {}", table.name);
    Ok(())
}

/// Replays the legacy steps from the recorded legacy version onwards.
///
/// The recorded version itself is replayed too; every op tolerates having
/// been applied already.
fn apply_legacy_steps(conn: &Connection, from: Option<i64>) -> Result<(), SchemaError> {
    let Some(from) = from else {
        return Ok(());
    };
    for step in LEGACY_STEPS
        .iter()
        .filter(|s| (from..LAST_SOUTH_MIGRATION_ID).contains(&s.id))
    {
        debug!("Applying legacy step {}", step.id);
        for op in step.ops {
            apply_op(conn, op)?;
        }
    }
    Ok(())
}

fn apply_op(conn: &Connection, op: &LegacyOp) -> Result<(), SchemaError> {
    match op {
        LegacyOp::AddColumn {
            table,
            column,
            decl,
        } => {
            add_column_if_missing(conn, table, column, decl)?;
        }
        LegacyOp::DropColumn { table, column } => {
            drop_column_if_exists(conn, table, column)?;
        }
        LegacyOp::RenameColumn { table, from, to } => {
            rename_column_if_exists(conn, table, from, to)?;
        }
        LegacyOp::DropTable(table) => drop_table_if_exists(conn, table)?,
        LegacyOp::CreateTable(name) => {
            if !table_exists(conn, name)? {
                if let Some(table) = LEGACY_TABLES.iter().find(|t| t.name == *name) {
                    create_legacy_table(conn, table)?;
                }
            }
        }
        LegacyOp::Fill {
            table,
            column,
            value,
        } => {
            if column_exists(conn, table, column)? {
                conn.execute(
                    &format!(
                        "UPDATE {} SET {} = ?1",
                        quote_ident(table),
                        quote_ident(column)
                    ),
                    [value],
                )?;
            }
        }
        LegacyOp::FillNull {
            table,
            column,
            value,
        } => {
            if column_exists(conn, table, column)? {
                conn.execute(
                    &format!(
                        "UPDATE {} SET {col} = ?1 WHERE {col} IS NULL",
                        quote_ident(table),
                        col = quote_ident(column)
                    ),
                    [value],
                )?;
            }
        }
        LegacyOp::Code(f) => f(conn)?,
    }
    Ok(())
}

/// Copies the interflow and infiltration columns of the global settings
/// into their own tables, one row per global settings row.
fn move_infiltration_settings(conn: &Connection) -> Result<(), SchemaError> {
    if !table_exists(conn, GLOBAL)? {
        return Ok(());
    }
    let col = |name: &str| column_or_null(conn, GLOBAL, name);
    if table_exists(conn, "v2_interflow")? {
        conn.execute(
            &format!(
                "INSERT INTO v2_interflow (id, interflow_type, porosity, porosity_file, porosity_layer_thickness,
                                           impervious_layer_elevation, hydraulic_conductivity, hydraulic_conductivity_file)
                 SELECT id, coalesce({}, 0), {}, {}, {}, {}, {}, {}
                 FROM v2_global_settings
                 WHERE id NOT IN (SELECT id FROM v2_interflow)",
                col("interflow_type")?,
                col("porosity")?,
                col("porosity_file")?,
                col("porosity_layer_thickness")?,
                col("impervious_layer_elevation")?,
                col("hydraulic_conductivity")?,
                col("hydraulic_conductivity_file")?,
            ),
            [],
        )?;
    }
    if table_exists(conn, "v2_simple_infiltration")? {
        conn.execute(
            &format!(
                "INSERT INTO v2_simple_infiltration (id, infiltration_rate, infiltration_rate_file,
                                                     infiltration_surface_option, max_infiltration_capacity_file)
                 SELECT id, {}, {}, {}, {}
                 FROM v2_global_settings
                 WHERE id NOT IN (SELECT id FROM v2_simple_infiltration)",
                col("infiltration_rate")?,
                col("infiltration_rate_file")?,
                col("infiltration_surface_option")?,
                col("max_infiltration_capacity_file")?,
            ),
            [],
        )?;
    }
    let mut assignments = Vec::new();
    for column in ["interflow_settings_id", "simple_infiltration_settings_id"] {
        if column_exists(conn, GLOBAL, column)? {
            assignments.push(format!("{} = id", quote_ident(column)));
        }
    }
    if !assignments.is_empty() {
        conn.execute(
            &format!("UPDATE v2_global_settings SET {}", assignments.join(", ")),
            [],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::metadata::geometry_column;
    use crate::test_support::{legacy_history, spatial_conn};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_file_gets_all_legacy_tables() {
        let conn = Connection::open_in_memory().unwrap();
        crate::spatial::functions::register(&conn, crate::constants::Format::Unknown).unwrap();
        let mut ctx = StepContext::new(28992);
        migrate_to_0200(&conn, &mut ctx).unwrap();
        for table in LEGACY_TABLES {
            assert!(table_exists(&conn, table.name).unwrap(), "{}", table.name);
        }
        let nodes = geometry_column(&conn, "v2_connection_nodes", "the_geom").unwrap().unwrap();
        assert_eq!(nodes.srid, 4326);
    }

    fn legacy_file_at(version: i64) -> Connection {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        legacy_history(&conn, version);
        conn.execute_batch(
            "CREATE TABLE v2_global_settings (
                 id INTEGER PRIMARY KEY, dem_file VARCHAR(255), epsg_code INTEGER,
                 connected_advise_file VARCHAR(255), infiltration_rate FLOAT,
                 infiltration_rate_file VARCHAR(255), infiltration_surface_option INTEGER,
                 max_infiltration_capacity_file TEXT, interflow_type INTEGER, porosity FLOAT,
                 porosity_file VARCHAR(255), porosity_layer_thickness FLOAT,
                 impervious_layer_elevation FLOAT, hydraulic_conductivity FLOAT,
                 hydraulic_conductivity_file VARCHAR(255),
                 max_interception FLOAT, max_interception_file VARCHAR(255));
             INSERT INTO v2_global_settings (id, epsg_code, infiltration_rate, interflow_type, porosity, max_interception)
             VALUES (1, 28992, 0.5, 1, 0.3, 3.0);
             CREATE TABLE v2_control_pid (id INTEGER PRIMARY KEY, measure_variable VARCHAR(50));
             CREATE TABLE v2_orifice (id INTEGER PRIMARY KEY, code VARCHAR(100), max_capacity FLOAT);
             CREATE TABLE v2_impervious_surface (id INTEGER PRIMARY KEY, function VARCHAR(64));
             CREATE TABLE v2_culvert (id INTEGER PRIMARY KEY,
                 discharge_coefficient_positive FLOAT, discharge_coefficient_negative FLOAT);
             INSERT INTO v2_culvert (id, discharge_coefficient_positive) VALUES (1, 0.8);
             CREATE TABLE v2_initial_waterlevel (id INTEGER PRIMARY KEY);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_legacy_steps_from_160() {
        let conn = legacy_file_at(160);
        let mut ctx = StepContext::new(28992);
        migrate_to_0200(&conn, &mut ctx).unwrap();

        assert!(column_exists(&conn, "v2_control_pid", "target_upper_limit").unwrap());
        assert!(column_exists(&conn, "v2_control_pid", "target_lower_limit").unwrap());
        for dropped in ["connected_advise_file", "infiltration_rate", "interflow_type", "porosity"] {
            assert!(!column_exists(&conn, GLOBAL, dropped).unwrap(), "{}", dropped);
        }
        assert!(column_exists(&conn, GLOBAL, "table_step_size_volume_2d").unwrap());
        assert!(table_exists(&conn, "v2_grid_refinement_area").unwrap());
        assert!(!table_exists(&conn, "v2_initial_waterlevel").unwrap());
        assert!(!column_exists(&conn, "v2_orifice", "max_capacity").unwrap());
        assert!(!column_exists(&conn, "v2_impervious_surface", "function").unwrap());

        let (interception, rain, interflow_id, infiltration_id): (f64, i64, i64, i64) = conn
            .query_row(
                "SELECT interception_global, use_2d_rain, interflow_settings_id, simple_infiltration_settings_id
                 FROM v2_global_settings",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!((interception, rain, interflow_id, infiltration_id), (3.0, 1, 1, 1));

        let (kind, porosity): (i64, f64) = conn
            .query_row("SELECT interflow_type, porosity FROM v2_interflow WHERE id = 1", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!((kind, porosity), (1, 0.3));
        let rate: f64 = conn
            .query_row("SELECT infiltration_rate FROM v2_simple_infiltration WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rate, 0.5);
        let coefficients: (f64, f64) = conn
            .query_row(
                "SELECT discharge_coefficient_positive, discharge_coefficient_negative FROM v2_culvert",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(coefficients, (0.8, 1.0));
    }

    #[test]
    fn test_recorded_legacy_version_is_replayed() {
        let conn = legacy_file_at(173);
        let mut ctx = StepContext::new(28992);
        migrate_to_0200(&conn, &mut ctx).unwrap();
        // only 173 runs
        assert!(!table_exists(&conn, "v2_initial_waterlevel").unwrap());
        assert!(!column_exists(&conn, "v2_orifice", "max_capacity").unwrap());
        assert!(column_exists(&conn, GLOBAL, "connected_advise_file").unwrap());
        assert!(column_exists(&conn, GLOBAL, "max_interception").unwrap());
    }

    #[test]
    fn test_no_legacy_steps_past_the_last() {
        let conn = legacy_file_at(LAST_SOUTH_MIGRATION_ID);
        let mut ctx = StepContext::new(28992);
        migrate_to_0200(&conn, &mut ctx).unwrap();
        assert!(table_exists(&conn, "v2_initial_waterlevel").unwrap());
        assert!(column_exists(&conn, "v2_orifice", "max_capacity").unwrap());
    }

    #[test]
    fn test_root_step_is_rerunnable() {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        legacy_history(&conn, 173);
        let mut ctx = StepContext::new(28992);
        migrate_to_0200(&conn, &mut ctx).unwrap();
        migrate_to_0200(&conn, &mut ctx).unwrap();
        assert!(table_exists(&conn, "v2_obstacle").unwrap());
    }
}
