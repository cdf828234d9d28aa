use log::debug;
use rusqlite::{params, Connection};

use crate::database::{quote_ident, table_exists};
use crate::error::SchemaError;
use crate::spatial::metadata::column_exists;

use super::ops::{
    already_applied, copy_columns, create_table, drop_table_if_exists, remap_values, UnknownValuePolicy,
};
use super::{Migration, StepContext};

pub const MIGRATION: Migration = Migration::code(
    222,
    Some(201),
    "Split global settings into dedicated settings tables",
    migrate_0201_to_0222,
);

const GLOBAL: &str = "v2_global_settings";

const MODEL_SETTINGS_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    use_2d_flow BOOLEAN,
    use_1d_flow BOOLEAN,
    manhole_aboveground_storage_area FLOAT,
    minimum_cell_size FLOAT,
    calculation_point_distance_1d FLOAT,
    nr_grid_levels INTEGER,
    minimum_table_step_size FLOAT,
    maximum_table_step_size FLOAT,
    dem_file VARCHAR(255),
    friction_type INTEGER,
    friction_coefficient FLOAT,
    friction_coefficient_file VARCHAR(255),
    embedded_cutoff_threshold FLOAT,
    epsg_code INTEGER,
    max_angle_1d_advection FLOAT,
    friction_averaging BOOLEAN,
    table_step_size_1d FLOAT,
    use_2d_rain BOOLEAN,
    use_interflow BOOLEAN,
    use_interception BOOLEAN,
    use_simple_infiltration BOOLEAN,
    use_groundwater_flow BOOLEAN,
    use_groundwater_storage BOOLEAN,
    use_structure_control BOOLEAN,
    use_vegetation_drag_2d BOOLEAN"#;

const MODEL_SETTINGS_MAP: &[(&str, &str)] = &[
    ("id", "id"),
    ("use_2d_flow", "use_2d_flow"),
    ("use_1d_flow", "use_1d_flow"),
    ("manhole_aboveground_storage_area", "manhole_storage_area"),
    ("minimum_cell_size", "grid_space"),
    ("calculation_point_distance_1d", "dist_calc_points"),
    ("nr_grid_levels", "kmax"),
    ("minimum_table_step_size", "table_step_size"),
    ("maximum_table_step_size", "maximum_table_step_size"),
    ("dem_file", "dem_file"),
    ("friction_type", "frict_type"),
    ("friction_coefficient", "frict_coef"),
    ("friction_coefficient_file", "frict_coef_file"),
    ("embedded_cutoff_threshold", "embedded_cutoff_threshold"),
    ("epsg_code", "epsg_code"),
    ("max_angle_1d_advection", "max_angle_1d_advection"),
    ("friction_averaging", "frict_avg"),
    ("table_step_size_1d", "table_step_size_1d"),
    ("use_2d_rain", "use_2d_rain"),
];

const SIMULATION_TEMPLATE_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    name TEXT,
    use_0d_inflow INTEGER"#;

const TIME_STEP_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    time_step FLOAT,
    min_time_step FLOAT,
    max_time_step FLOAT,
    output_time_step FLOAT,
    use_time_step_stretch BOOLEAN"#;

const TIME_STEP_MAP: &[(&str, &str)] = &[
    ("id", "id"),
    ("time_step", "sim_time_step"),
    ("min_time_step", "minimum_sim_time_step"),
    ("max_time_step", "maximum_sim_time_step"),
    ("output_time_step", "output_time_step"),
    ("use_time_step_stretch", "timestep_plus"),
];

const INITIAL_CONDITIONS_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    initial_groundwater_level FLOAT,
    initial_groundwater_level_file VARCHAR(255),
    initial_groundwater_level_aggregation INTEGER,
    initial_water_level FLOAT,
    initial_water_level_aggregation INTEGER,
    initial_water_level_file VARCHAR(255)"#;

const INITIAL_CONDITIONS_MAP: &[(&str, &str)] = &[
    ("id", "id"),
    ("initial_groundwater_level", "initial_groundwater_level"),
    ("initial_groundwater_level_file", "initial_groundwater_level_file"),
    ("initial_groundwater_level_aggregation", "initial_groundwater_level_type"),
    ("initial_water_level", "initial_waterlevel"),
    ("initial_water_level_aggregation", "water_level_ini_type"),
    ("initial_water_level_file", "initial_waterlevel_file"),
];

const PHYSICAL_SETTINGS_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    use_advection_1d INTEGER,
    use_advection_2d INTEGER"#;

const PHYSICAL_SETTINGS_MAP: &[(&str, &str)] = &[
    ("id", "id"),
    ("use_advection_1d", "advection_1d"),
    ("use_advection_2d", "advection_2d"),
];

const INTERCEPTION_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    interception FLOAT,
    interception_file VARCHAR(255)"#;

const AGGREGATION_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    flow_variable VARCHAR(64),
    aggregation_method VARCHAR(64),
    interval INTEGER"#;

const GROUNDWATER_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    groundwater_impervious_layer_level FLOAT,
    groundwater_impervious_layer_level_file VARCHAR(255),
    groundwater_impervious_layer_level_aggregation INTEGER,
    phreatic_storage_capacity FLOAT,
    phreatic_storage_capacity_file VARCHAR(255),
    phreatic_storage_capacity_aggregation INTEGER,
    equilibrium_infiltration_rate FLOAT,
    equilibrium_infiltration_rate_file VARCHAR(255),
    equilibrium_infiltration_rate_aggregation INTEGER,
    initial_infiltration_rate FLOAT,
    initial_infiltration_rate_file VARCHAR(255),
    initial_infiltration_rate_aggregation INTEGER,
    infiltration_decay_period FLOAT,
    infiltration_decay_period_file VARCHAR(255),
    infiltration_decay_period_aggregation INTEGER,
    groundwater_hydraulic_conductivity FLOAT,
    groundwater_hydraulic_conductivity_file VARCHAR(255),
    groundwater_hydraulic_conductivity_aggregation INTEGER,
    leakage FLOAT,
    leakage_file VARCHAR(255)"#;

const GROUNDWATER_MAP: &[(&str, &str)] = &[
    ("id", "id"),
    ("groundwater_impervious_layer_level", "groundwater_impervious_layer_level"),
    ("groundwater_impervious_layer_level_file", "groundwater_impervious_layer_level_file"),
    ("groundwater_impervious_layer_level_aggregation", "groundwater_impervious_layer_level_type"),
    ("phreatic_storage_capacity", "phreatic_storage_capacity"),
    ("phreatic_storage_capacity_file", "phreatic_storage_capacity_file"),
    ("phreatic_storage_capacity_aggregation", "phreatic_storage_capacity_type"),
    ("equilibrium_infiltration_rate", "equilibrium_infiltration_rate"),
    ("equilibrium_infiltration_rate_file", "equilibrium_infiltration_rate_file"),
    ("equilibrium_infiltration_rate_aggregation", "equilibrium_infiltration_rate_type"),
    ("initial_infiltration_rate", "initial_infiltration_rate"),
    ("initial_infiltration_rate_file", "initial_infiltration_rate_file"),
    ("initial_infiltration_rate_aggregation", "initial_infiltration_rate_type"),
    ("infiltration_decay_period", "infiltration_decay_period"),
    ("infiltration_decay_period_file", "infiltration_decay_period_file"),
    ("infiltration_decay_period_aggregation", "infiltration_decay_period_type"),
    ("groundwater_hydraulic_conductivity", "groundwater_hydro_connectivity"),
    ("groundwater_hydraulic_conductivity_file", "groundwater_hydro_connectivity_file"),
    ("groundwater_hydraulic_conductivity_aggregation", "groundwater_hydro_connectivity_type"),
    ("leakage", "leakage"),
    ("leakage_file", "leakage_file"),
];

const SIMPLE_INFILTRATION_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    infiltration_rate FLOAT,
    infiltration_rate_file VARCHAR(255),
    infiltration_surface_option INTEGER,
    max_infiltration_volume FLOAT,
    max_infiltration_volume_file VARCHAR(255)"#;

const SIMPLE_INFILTRATION_MAP: &[(&str, &str)] = &[
    ("id", "id"),
    ("infiltration_rate", "infiltration_rate"),
    ("infiltration_rate_file", "infiltration_rate_file"),
    ("infiltration_surface_option", "infiltration_surface_option"),
    ("max_infiltration_volume", "max_infiltration_capacity"),
    ("max_infiltration_volume_file", "max_infiltration_capacity_file"),
];

const INTERFLOW_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    interflow_type INTEGER,
    porosity FLOAT,
    porosity_file VARCHAR(255),
    porosity_layer_thickness FLOAT,
    impervious_layer_elevation FLOAT,
    hydraulic_conductivity FLOAT,
    hydraulic_conductivity_file VARCHAR(255)"#;

const INTERFLOW_MAP: &[(&str, &str)] = &[
    ("id", "id"),
    ("interflow_type", "interflow_type"),
    ("porosity", "porosity"),
    ("porosity_file", "porosity_file"),
    ("porosity_layer_thickness", "porosity_layer_thickness"),
    ("impervious_layer_elevation", "impervious_layer_elevation"),
    ("hydraulic_conductivity", "hydraulic_conductivity"),
    ("hydraulic_conductivity_file", "hydraulic_conductivity_file"),
];

const NUMERICAL_SETTINGS_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    cfl_strictness_factor_1d FLOAT,
    cfl_strictness_factor_2d FLOAT,
    convergence_cg FLOAT,
    convergence_eps FLOAT,
    flow_direction_threshold FLOAT,
    friction_shallow_water_depth_correction INTEGER,
    general_numerical_threshold FLOAT,
    time_integration_method INTEGER,
    limiter_waterlevel_gradient_1d INTEGER,
    limiter_waterlevel_gradient_2d INTEGER,
    limiter_slope_crossectional_area_2d INTEGER,
    limiter_slope_friction_2d INTEGER,
    max_non_linear_newton_iterations INTEGER,
    max_degree_gauss_seidel INTEGER,
    min_friction_velocity FLOAT,
    min_surface_area FLOAT,
    use_preconditioner_cg INTEGER,
    preissmann_slot FLOAT,
    pump_implicit_ratio FLOAT,
    limiter_slope_thin_water_layer FLOAT,
    use_of_cg INTEGER,
    use_nested_newton INTEGER,
    flooding_threshold FLOAT"#;

const NUMERICAL_SETTINGS_MAP: &[(&str, &str)] = &[
    ("id", "id"),
    ("cfl_strictness_factor_1d", "cfl_strictness_factor_1d"),
    ("cfl_strictness_factor_2d", "cfl_strictness_factor_2d"),
    ("convergence_cg", "convergence_cg"),
    ("convergence_eps", "convergence_eps"),
    ("flow_direction_threshold", "flow_direction_threshold"),
    ("friction_shallow_water_depth_correction", "frict_shallow_water_correction"),
    ("general_numerical_threshold", "general_numerical_threshold"),
    ("time_integration_method", "integration_method"),
    ("limiter_waterlevel_gradient_1d", "limiter_grad_1d"),
    ("limiter_waterlevel_gradient_2d", "limiter_grad_2d"),
    ("limiter_slope_crossectional_area_2d", "limiter_slope_crossectional_area_2d"),
    ("limiter_slope_friction_2d", "limiter_slope_friction_2d"),
    ("max_non_linear_newton_iterations", "max_nonlin_iterations"),
    ("max_degree_gauss_seidel", "max_degree"),
    ("min_friction_velocity", "minimum_friction_velocity"),
    ("min_surface_area", "minimum_surface_area"),
    ("use_preconditioner_cg", "precon_cg"),
    ("preissmann_slot", "preissmann_slot"),
    ("pump_implicit_ratio", "pump_implicit_ratio"),
    ("limiter_slope_thin_water_layer", "thin_water_layer_definition"),
    ("use_of_cg", "use_of_cg"),
    ("use_nested_newton", "use_of_nested_newton"),
];

const VEGETATION_DRAG_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    vegetation_height FLOAT,
    vegetation_height_file VARCHAR(255),
    vegetation_stem_count FLOAT,
    vegetation_stem_count_file VARCHAR(255),
    vegetation_stem_diameter FLOAT,
    vegetation_stem_diameter_file VARCHAR(255),
    vegetation_drag_coefficient FLOAT,
    vegetation_drag_coefficient_file VARCHAR(255)"#;

const VEGETATION_DRAG_MAP: &[(&str, &str)] = &[
    ("id", "id"),
    ("vegetation_height", "vegetation_height"),
    ("vegetation_height_file", "vegetation_height_file"),
    ("vegetation_stem_count", "vegetation_stem_count"),
    ("vegetation_stem_count_file", "vegetation_stem_count_file"),
    ("vegetation_stem_diameter", "vegetation_stem_diameter"),
    ("vegetation_stem_diameter_file", "vegetation_stem_diameter_file"),
    ("vegetation_drag_coefficient", "vegetation_drag_coefficient"),
    ("vegetation_drag_coefficient_file", "vegetation_drag_coefficient_file"),
];

/// A `use_*` flag set when the global settings reference a row of a
/// settings table: (flag, reference column, settings table).
const SETTINGS_REFERENCES: [(&str, &str, &str); 5] = [
    ("use_groundwater_storage", "groundwater_settings_id", "groundwater"),
    ("use_interflow", "interflow_settings_id", "interflow"),
    ("use_structure_control", "control_group_id", "v2_control_group"),
    ("use_simple_infiltration", "simple_infiltration_settings_id", "simple_infiltration"),
    ("use_vegetation_drag_2d", "vegetation_drag_settings_id", "vegetation_drag_2d"),
];

/// Legacy aggregation variable names that were renamed.
const FLOW_VARIABLES: [(&str, &str); 2] = [
    ("waterlevel", "water_level"),
    ("wet_cross-section", "wet_cross_section"),
];

/// Raster references that lose their directory component.
const RASTER_COLUMNS: &[(&str, &str)] = &[
    ("model_settings", "dem_file"),
    ("model_settings", "friction_coefficient_file"),
    ("initial_conditions", "initial_groundwater_level_file"),
    ("initial_conditions", "initial_water_level_file"),
    ("interception", "interception_file"),
    ("simple_infiltration", "infiltration_rate_file"),
    ("simple_infiltration", "max_infiltration_volume_file"),
    ("interflow", "porosity_file"),
    ("interflow", "hydraulic_conductivity_file"),
    ("groundwater", "leakage_file"),
    ("groundwater", "groundwater_impervious_layer_level_file"),
    ("groundwater", "phreatic_storage_capacity_file"),
    ("groundwater", "initial_infiltration_rate_file"),
    ("groundwater", "equilibrium_infiltration_rate_file"),
    ("groundwater", "infiltration_decay_period_file"),
    ("groundwater", "groundwater_hydraulic_conductivity_file"),
    ("vegetation_drag_2d", "vegetation_height_file"),
    ("vegetation_drag_2d", "vegetation_stem_count_file"),
    ("vegetation_drag_2d", "vegetation_stem_diameter_file"),
    ("vegetation_drag_2d", "vegetation_drag_coefficient_file"),
];

// ========================================
// Migration 0201 -> 0222
// ========================================

fn migrate_0201_to_0222(conn: &Connection, _ctx: &mut StepContext) -> Result<(), SchemaError> {
    if already_applied(conn, GLOBAL, "model_settings")? {
        return Ok(());
    }
    if table_exists(conn, GLOBAL)? {
        // only the first global settings row is carried over
        conn.execute_batch(
            "DELETE FROM v2_global_settings
             WHERE id NOT IN (SELECT id FROM v2_global_settings ORDER BY id LIMIT 1)",
        )?;
    }

    create_table(conn, "model_settings", MODEL_SETTINGS_DDL)?;
    copy_columns(conn, GLOBAL, "model_settings", MODEL_SETTINGS_MAP)?;

    create_table(conn, "simulation_template_settings", SIMULATION_TEMPLATE_DDL)?;
    copy_columns(
        conn,
        GLOBAL,
        "simulation_template_settings",
        &[("id", "id"), ("name", "name"), ("use_0d_inflow", "use_0d_inflow")],
    )?;

    create_table(conn, "time_step_settings", TIME_STEP_DDL)?;
    copy_columns(conn, GLOBAL, "time_step_settings", TIME_STEP_MAP)?;

    create_table(conn, "initial_conditions", INITIAL_CONDITIONS_DDL)?;
    copy_columns(conn, GLOBAL, "initial_conditions", INITIAL_CONDITIONS_MAP)?;

    create_table(conn, "physical_settings", PHYSICAL_SETTINGS_DDL)?;
    copy_columns(conn, GLOBAL, "physical_settings", PHYSICAL_SETTINGS_MAP)?;

    create_table(conn, "interception", INTERCEPTION_DDL)?;
    if column_exists(conn, GLOBAL, "interception_global")? {
        conn.execute_batch(
            "INSERT INTO interception (id, interception, interception_file)
             SELECT id, interception_global, interception_file FROM v2_global_settings
             WHERE interception_global IS NOT NULL
                OR (interception_file IS NOT NULL AND interception_file != '')",
        )?;
    }

    create_table(conn, "aggregation_settings", AGGREGATION_DDL)?;
    copy_columns(
        conn,
        "v2_aggregation_settings",
        "aggregation_settings",
        &[
            ("id", "id"),
            ("flow_variable", "flow_variable"),
            ("aggregation_method", "aggregation_method"),
            ("interval", "timestep"),
        ],
    )?;
    remap_values(
        conn,
        "aggregation_settings",
        "flow_variable",
        &FLOW_VARIABLES,
        UnknownValuePolicy::PassThrough,
    )?;

    create_table(conn, "groundwater", GROUNDWATER_DDL)?;
    copy_columns(conn, "v2_groundwater", "groundwater", GROUNDWATER_MAP)?;
    create_table(conn, "simple_infiltration", SIMPLE_INFILTRATION_DDL)?;
    copy_columns(conn, "v2_simple_infiltration", "simple_infiltration", SIMPLE_INFILTRATION_MAP)?;
    create_table(conn, "interflow", INTERFLOW_DDL)?;
    copy_columns(conn, "v2_interflow", "interflow", INTERFLOW_MAP)?;
    create_table(conn, "vegetation_drag_2d", VEGETATION_DRAG_DDL)?;
    copy_columns(conn, "v2_vegetation_drag", "vegetation_drag_2d", VEGETATION_DRAG_MAP)?;

    create_table(conn, "numerical_settings", NUMERICAL_SETTINGS_DDL)?;
    copy_columns(conn, "v2_numerical_settings", "numerical_settings", NUMERICAL_SETTINGS_MAP)?;
    if column_exists(conn, GLOBAL, "flooding_threshold")? {
        conn.execute_batch(
            "UPDATE numerical_settings SET flooding_threshold =
                 (SELECT flooding_threshold FROM v2_global_settings ORDER BY id LIMIT 1)",
        )?;
    }
    // numerical settings without a reference are all kept
    if column_exists(conn, GLOBAL, "numerical_settings_id")? {
        conn.execute_batch(
            "DELETE FROM numerical_settings
             WHERE id != (SELECT numerical_settings_id FROM v2_global_settings ORDER BY id LIMIT 1)",
        )?;
    }

    set_settings_flags(conn)?;

    strip_raster_paths(conn)?;

    for table in [
        GLOBAL,
        "v2_aggregation_settings",
        "v2_groundwater",
        "v2_simple_infiltration",
        "v2_interflow",
        "v2_numerical_settings",
        "v2_vegetation_drag",
    ] {
        drop_table_if_exists(conn, table)?;
    }
    Ok(())
}

/// Settings-id references become boolean flags. A settings table keeps only
/// the row its reference points at.
fn set_settings_flags(conn: &Connection) -> Result<(), SchemaError> {
    let has_global = table_exists(conn, GLOBAL)?;
    for (flag, reference, table) in SETTINGS_REFERENCES {
        let referenced = has_global && column_exists(conn, GLOBAL, reference)?;
        let reference_expr = if referenced {
            format!("(SELECT {} FROM v2_global_settings ORDER BY id LIMIT 1)", quote_ident(reference))
        } else {
            "NULL".to_string()
        };
        conn.execute_batch(&format!(
            "UPDATE model_settings SET {} = {} IS NOT NULL",
            quote_ident(flag),
            reference_expr
        ))?;
        if table_exists(conn, table)? {
            conn.execute_batch(&format!(
                "DELETE FROM {} WHERE id IS NOT {}",
                quote_ident(table),
                reference_expr
            ))?;
        }
    }

    conn.execute_batch(
        "UPDATE model_settings SET use_groundwater_flow = EXISTS(
             SELECT 1 FROM groundwater
             WHERE groundwater_hydraulic_conductivity IS NOT NULL
                OR groundwater_hydraulic_conductivity_file IS NOT NULL)",
    )?;
    conn.execute_batch(
        "UPDATE model_settings SET use_interception = EXISTS(SELECT 1 FROM interception)",
    )?;
    Ok(())
}

fn strip_raster_paths(conn: &Connection) -> Result<(), SchemaError> {
    for (table, column) in RASTER_COLUMNS {
        if !table_exists(conn, table)? || !column_exists(conn, table, column)? {
            continue;
        }
        let rows: Vec<(i64, String)> = conn
            .prepare(&format!(
                "SELECT id, {col} FROM {} WHERE {col} IS NOT NULL",
                quote_ident(table),
                col = quote_ident(column)
            ))?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;
        for (id, path) in rows {
            let normalized = path.replace('\\', "/");
            let basename = normalized.rsplit('/').next().unwrap_or(&normalized);
            if basename != path {
                debug!("{}.{}: {} -> {}", table, column, path, basename);
                conn.execute(
                    &format!(
                        "UPDATE {} SET {} = ?1 WHERE id = ?2",
                        quote_ident(table),
                        quote_ident(column)
                    ),
                    params![basename, id],
                )?;
            }
        }
    }
    Ok(())
}
