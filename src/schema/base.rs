use crate::spatial::GeometryKind;

/// Geometry column name of the legacy tables.
pub const LEGACY_GEOMETRY_COLUMN: &str = "the_geom";

/// A legacy table at the shape of the last legacy version.
pub struct LegacyTable {
    pub name: &'static str,
    pub columns: &'static str,
    pub geometry: Option<GeometryKind>,
}

const fn plain(name: &'static str, columns: &'static str) -> LegacyTable {
    LegacyTable {
        name,
        columns,
        geometry: None,
    }
}

const fn spatial(name: &'static str, columns: &'static str, kind: GeometryKind) -> LegacyTable {
    LegacyTable {
        name,
        columns,
        geometry: Some(kind),
    }
}

// ========================================
// Legacy tables, created by the root step when absent
// ========================================

pub static LEGACY_TABLES: &[LegacyTable] = &[
    spatial(
        "v2_connection_nodes",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    storage_area FLOAT,
    initial_waterlevel FLOAT,
    code VARCHAR(100)"#,
        GeometryKind::Point,
    ),
    plain(
        "v2_manhole",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    display_name VARCHAR(255),
    code VARCHAR(100),
    connection_node_id INTEGER NOT NULL,
    shape VARCHAR(4),
    width FLOAT,
    length FLOAT,
    manhole_indicator INTEGER,
    calculation_type INTEGER,
    bottom_level FLOAT,
    surface_level FLOAT,
    drain_level FLOAT,
    zoom_category INTEGER"#,
    ),
    plain(
        "v2_cross_section_definition",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    shape INTEGER,
    width VARCHAR(255),
    height VARCHAR(255),
    code VARCHAR(100)"#,
    ),
    spatial(
        "v2_cross_section_location",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    channel_id INTEGER NOT NULL,
    definition_id INTEGER,
    reference_level FLOAT,
    friction_type INTEGER,
    friction_value FLOAT,
    bank_level FLOAT,
    code VARCHAR(100)"#,
        GeometryKind::Point,
    ),
    spatial(
        "v2_channel",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    display_name VARCHAR(255),
    code VARCHAR(100),
    calculation_type INTEGER,
    dist_calc_points FLOAT,
    zoom_category INTEGER,
    connection_node_start_id INTEGER NOT NULL,
    connection_node_end_id INTEGER NOT NULL"#,
        GeometryKind::LineString,
    ),
    plain(
        "v2_pipe",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    display_name VARCHAR(255),
    code VARCHAR(100),
    profile_num INTEGER,
    sewerage_type INTEGER,
    calculation_type INTEGER,
    invert_level_start_point FLOAT,
    invert_level_end_point FLOAT,
    cross_section_definition_id INTEGER,
    friction_value FLOAT,
    friction_type INTEGER,
    dist_calc_points FLOAT,
    material INTEGER,
    original_length FLOAT,
    zoom_category INTEGER,
    connection_node_start_id INTEGER NOT NULL,
    connection_node_end_id INTEGER NOT NULL"#,
    ),
    spatial(
        "v2_culvert",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    display_name VARCHAR(255),
    code VARCHAR(100),
    calculation_type INTEGER,
    friction_value FLOAT,
    friction_type INTEGER,
    dist_calc_points FLOAT,
    zoom_category INTEGER,
    cross_section_definition_id INTEGER,
    discharge_coefficient_positive FLOAT,
    discharge_coefficient_negative FLOAT,
    invert_level_start_point FLOAT,
    invert_level_end_point FLOAT,
    connection_node_start_id INTEGER NOT NULL,
    connection_node_end_id INTEGER NOT NULL"#,
        GeometryKind::LineString,
    ),
    plain(
        "v2_pumpstation",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    display_name VARCHAR(255),
    code VARCHAR(100),
    classification INTEGER,
    sewerage BOOLEAN,
    type INTEGER,
    start_level FLOAT,
    lower_stop_level FLOAT,
    upper_stop_level FLOAT,
    capacity FLOAT,
    zoom_category INTEGER,
    connection_node_start_id INTEGER NOT NULL,
    connection_node_end_id INTEGER"#,
    ),
    plain(
        "v2_1d_boundary_conditions",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    connection_node_id INTEGER NOT NULL,
    boundary_type INTEGER,
    timeseries TEXT"#,
    ),
    spatial(
        "v2_2d_boundary_conditions",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    display_name VARCHAR(255),
    timeseries TEXT,
    boundary_type INTEGER"#,
        GeometryKind::LineString,
    ),
    plain(
        "v2_1d_lateral",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    connection_node_id INTEGER NOT NULL,
    timeseries TEXT"#,
    ),
    spatial(
        "v2_2d_lateral",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    type INTEGER,
    timeseries TEXT"#,
        GeometryKind::Point,
    ),
    spatial(
        "v2_impervious_surface",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    surface_inclination VARCHAR(64),
    surface_class VARCHAR(128),
    surface_sub_class VARCHAR(128),
    zoom_category INTEGER,
    nr_of_inhabitants FLOAT,
    area FLOAT,
    dry_weather_flow FLOAT,
    function VARCHAR(64)"#,
        GeometryKind::Geometry,
    ),
    plain(
        "v2_impervious_surface_map",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    impervious_surface_id INTEGER,
    connection_node_id INTEGER,
    percentage FLOAT"#,
    ),
    spatial(
        "v2_surface",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    zoom_category INTEGER,
    nr_of_inhabitants FLOAT,
    dry_weather_flow FLOAT,
    function VARCHAR(64),
    area FLOAT,
    surface_parameters_id INTEGER"#,
        GeometryKind::Geometry,
    ),
    plain(
        "v2_surface_map",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    surface_id INTEGER,
    connection_node_id INTEGER,
    percentage FLOAT"#,
    ),
    plain(
        "v2_surface_parameters",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    outflow_delay FLOAT NOT NULL,
    surface_layer_thickness FLOAT NOT NULL,
    infiltration BOOLEAN NOT NULL,
    max_infiltration_capacity FLOAT NOT NULL,
    min_infiltration_capacity FLOAT NOT NULL,
    infiltration_decay_constant FLOAT NOT NULL,
    infiltration_recovery_constant FLOAT NOT NULL"#,
    ),
    spatial(
        "v2_grid_refinement_area",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    display_name VARCHAR(255),
    refinement_level INTEGER,
    code VARCHAR(100)"#,
        GeometryKind::Polygon,
    ),
    spatial(
        "v2_obstacle",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    crest_level FLOAT"#,
        GeometryKind::LineString,
    ),
    plain(
        "v2_global_settings",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    use_2d_flow BOOLEAN,
    use_1d_flow BOOLEAN,
    manhole_storage_area FLOAT,
    name VARCHAR(128),
    sim_time_step FLOAT,
    output_time_step FLOAT,
    nr_timesteps INTEGER,
    start_time DATETIME,
    start_date DATE,
    grid_space FLOAT,
    dist_calc_points FLOAT,
    kmax INTEGER,
    guess_dams INTEGER,
    table_step_size FLOAT,
    flooding_threshold FLOAT,
    advection_1d INTEGER,
    advection_2d INTEGER,
    dem_file VARCHAR(255),
    frict_type INTEGER,
    frict_coef FLOAT,
    frict_coef_file VARCHAR(255),
    water_level_ini_type INTEGER,
    initial_waterlevel FLOAT,
    initial_waterlevel_file VARCHAR(255),
    interception_global FLOAT,
    interception_file VARCHAR(255),
    dem_obstacle_detection BOOLEAN,
    embedded_cutoff_threshold FLOAT,
    epsg_code INTEGER,
    timestep_plus BOOLEAN,
    max_angle_1d_advection FLOAT,
    minimum_sim_time_step FLOAT,
    maximum_sim_time_step FLOAT,
    frict_avg INTEGER,
    wind_shielding_file VARCHAR(255),
    use_0d_inflow INTEGER,
    table_step_size_1d FLOAT,
    use_2d_rain INTEGER NOT NULL DEFAULT 1,
    initial_groundwater_level FLOAT,
    initial_groundwater_level_file VARCHAR(255),
    initial_groundwater_level_type INTEGER,
    control_group_id INTEGER,
    simple_infiltration_settings_id INTEGER,
    groundwater_settings_id INTEGER,
    interflow_settings_id INTEGER,
    numerical_settings_id INTEGER,
    vegetation_drag_settings_id INTEGER,
    maximum_table_step_size FLOAT"#,
    ),
    plain(
        "v2_aggregation_settings",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    global_settings_id INTEGER,
    var_name VARCHAR(100),
    flow_variable VARCHAR(100),
    aggregation_method VARCHAR(100),
    timestep INTEGER"#,
    ),
    plain(
        "v2_groundwater",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    groundwater_impervious_layer_level FLOAT,
    groundwater_impervious_layer_level_file VARCHAR(255),
    groundwater_impervious_layer_level_type INTEGER,
    phreatic_storage_capacity FLOAT,
    phreatic_storage_capacity_file VARCHAR(255),
    phreatic_storage_capacity_type INTEGER,
    equilibrium_infiltration_rate FLOAT,
    equilibrium_infiltration_rate_file VARCHAR(255),
    equilibrium_infiltration_rate_type INTEGER,
    initial_infiltration_rate FLOAT,
    initial_infiltration_rate_file VARCHAR(255),
    initial_infiltration_rate_type INTEGER,
    infiltration_decay_period FLOAT,
    infiltration_decay_period_file VARCHAR(255),
    infiltration_decay_period_type INTEGER,
    groundwater_hydro_connectivity FLOAT,
    groundwater_hydro_connectivity_file VARCHAR(255),
    groundwater_hydro_connectivity_type INTEGER,
    leakage FLOAT,
    leakage_file VARCHAR(255),
    display_name VARCHAR(255)"#,
    ),
    plain(
        "v2_simple_infiltration",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    infiltration_rate FLOAT,
    infiltration_rate_file VARCHAR(255),
    infiltration_surface_option INTEGER,
    max_infiltration_capacity FLOAT,
    max_infiltration_capacity_file VARCHAR(255),
    display_name VARCHAR(255)"#,
    ),
    plain(
        "v2_interflow",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    interflow_type INTEGER NOT NULL,
    porosity FLOAT,
    porosity_file VARCHAR(255),
    porosity_layer_thickness FLOAT,
    impervious_layer_elevation FLOAT,
    hydraulic_conductivity FLOAT,
    hydraulic_conductivity_file VARCHAR(255),
    display_name VARCHAR(255)"#,
    ),
    plain(
        "v2_numerical_settings",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    cfl_strictness_factor_1d FLOAT,
    cfl_strictness_factor_2d FLOAT,
    convergence_cg FLOAT,
    convergence_eps FLOAT,
    flow_direction_threshold FLOAT,
    frict_shallow_water_correction INTEGER,
    general_numerical_threshold FLOAT,
    integration_method INTEGER,
    limiter_grad_1d INTEGER,
    limiter_grad_2d INTEGER,
    limiter_slope_crossectional_area_2d INTEGER,
    limiter_slope_friction_2d INTEGER,
    max_nonlin_iterations INTEGER,
    max_degree INTEGER,
    minimum_friction_velocity FLOAT,
    minimum_surface_area FLOAT,
    precon_cg INTEGER,
    preissmann_slot FLOAT,
    pump_implicit_ratio FLOAT,
    thin_water_layer_definition FLOAT,
    use_of_cg INTEGER,
    use_of_nested_newton INTEGER"#,
    ),
    plain(
        "v2_vegetation_drag",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    display_name VARCHAR(255),
    vegetation_height FLOAT,
    vegetation_height_file VARCHAR(255),
    vegetation_stem_count FLOAT,
    vegetation_stem_count_file VARCHAR(255),
    vegetation_stem_diameter FLOAT,
    vegetation_stem_diameter_file VARCHAR(255),
    vegetation_drag_coefficient FLOAT,
    vegetation_drag_coefficient_file VARCHAR(255)"#,
    ),
    // structure control
    plain(
        "v2_control",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    control_group_id INTEGER,
    measure_group_id INTEGER,
    control_type VARCHAR(15),
    control_id INTEGER,
    start VARCHAR(50),
    "end" VARCHAR(50),
    measure_frequency INTEGER"#,
    ),
    plain(
        "v2_control_delta",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    measure_variable VARCHAR(50),
    measure_delta VARCHAR(50),
    measure_dt FLOAT,
    action_type VARCHAR(50),
    action_value VARCHAR(50),
    action_time FLOAT,
    target_type VARCHAR(100),
    target_id INTEGER"#,
    ),
    plain(
        "v2_control_group",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    name VARCHAR(100),
    description TEXT"#,
    ),
    plain(
        "v2_control_measure_group",
        r#"
    id INTEGER PRIMARY KEY NOT NULL"#,
    ),
    plain(
        "v2_control_measure_map",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    measure_group_id INTEGER,
    object_type VARCHAR(100),
    object_id INTEGER,
    weight FLOAT"#,
    ),
    plain(
        "v2_control_memory",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    measure_variable VARCHAR(50),
    upper_threshold FLOAT,
    lower_threshold FLOAT,
    action_type VARCHAR(50),
    action_value VARCHAR(50),
    target_type VARCHAR(100),
    target_id INTEGER,
    is_active BOOLEAN,
    is_inverse BOOLEAN"#,
    ),
    plain(
        "v2_control_pid",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    measure_variable VARCHAR(50),
    setpoint FLOAT,
    kp FLOAT,
    ki FLOAT,
    kd FLOAT,
    action_type VARCHAR(50),
    target_type VARCHAR(100),
    target_upper_limit VARCHAR(50),
    target_lower_limit VARCHAR(50)"#,
    ),
    plain(
        "v2_control_table",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    action_table TEXT,
    action_type VARCHAR(50),
    measure_variable VARCHAR(50),
    measure_operator VARCHAR(2),
    target_type VARCHAR(100),
    target_id INTEGER"#,
    ),
    plain(
        "v2_control_timed",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    action_type VARCHAR(50),
    action_table TEXT,
    target_type VARCHAR(100),
    target_id INTEGER"#,
    ),
    // 1D structures without a geometry of their own
    plain(
        "v2_weir",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    crest_level FLOAT,
    crest_type INTEGER,
    friction_value FLOAT,
    friction_type INTEGER,
    discharge_coefficient_positive FLOAT,
    discharge_coefficient_negative FLOAT,
    sewerage BOOLEAN,
    external BOOLEAN,
    zoom_category INTEGER,
    connection_node_start_id INTEGER,
    connection_node_end_id INTEGER,
    cross_section_definition_id INTEGER"#,
    ),
    plain(
        "v2_orifice",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    zoom_category INTEGER,
    crest_type INTEGER,
    crest_level FLOAT,
    friction_value FLOAT,
    friction_type INTEGER,
    discharge_coefficient_positive FLOAT,
    discharge_coefficient_negative FLOAT,
    sewerage BOOLEAN,
    connection_node_start_id INTEGER,
    connection_node_end_id INTEGER,
    cross_section_definition_id INTEGER"#,
    ),
    spatial(
        "v2_windshielding",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    north FLOAT,
    northeast FLOAT,
    east FLOAT,
    southeast FLOAT,
    south FLOAT,
    southwest FLOAT,
    west FLOAT,
    northwest FLOAT,
    channel_id INTEGER"#,
        GeometryKind::Point,
    ),
    // 1D2D and 2D features
    spatial(
        "v2_potential_breach",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    exchange_level FLOAT,
    maximum_breach_depth FLOAT,
    levee_material INTEGER,
    channel_id INTEGER"#,
        GeometryKind::LineString,
    ),
    spatial(
        "v2_exchange_line",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    channel_id INTEGER,
    exchange_level FLOAT"#,
        GeometryKind::LineString,
    ),
    spatial(
        "v2_dem_average_area",
        r#"
    id INTEGER PRIMARY KEY NOT NULL"#,
        GeometryKind::Polygon,
    ),
    spatial(
        "v2_grid_refinement",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    display_name VARCHAR(255),
    refinement_level INTEGER,
    code VARCHAR(100)"#,
        GeometryKind::LineString,
    ),
    spatial(
        "v2_floodfill",
        r#"
    id INTEGER PRIMARY KEY NOT NULL,
    waterlevel FLOAT"#,
        GeometryKind::Point,
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_legacy_tables_unique() {
        let mut seen = HashSet::new();
        for table in LEGACY_TABLES {
            assert!(table.name.starts_with("v2_"));
            assert!(seen.insert(table.name), "duplicate {}", table.name);
            assert!(!table.columns.contains(LEGACY_GEOMETRY_COLUMN));
        }
    }
}
