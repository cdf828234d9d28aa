//! Tables the head revision is expected to contain.
//!
//! Migrations never consult this list; it only reflects the latest shape and
//! drives index maintenance, row copy and SRID discovery.

use crate::spatial::GeometryKind;

/// Name of the geometry column of every head table that has one.
pub const GEOMETRY_COLUMN: &str = "geom";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDef {
    pub table: &'static str,
    /// Attribute columns, geometry excluded.
    pub columns: &'static [&'static str],
    pub geometry: Option<GeometryKind>,
}

impl ModelDef {
    const fn plain(table: &'static str, columns: &'static [&'static str]) -> Self {
        ModelDef {
            table,
            columns,
            geometry: None,
        }
    }

    const fn spatial(
        table: &'static str,
        columns: &'static [&'static str],
        kind: GeometryKind,
    ) -> Self {
        ModelDef {
            table,
            columns,
            geometry: Some(kind),
        }
    }

    pub fn all_columns(&self) -> Vec<&'static str> {
        let mut cols = self.columns.to_vec();
        if self.geometry.is_some() {
            cols.push(GEOMETRY_COLUMN);
        }
        cols
    }
}

pub fn find_model(table: &str) -> Option<&'static ModelDef> {
    DECLARED_MODELS.iter().find(|m| m.table == table)
}

pub static DECLARED_MODELS: &[ModelDef] = &[
    ModelDef::plain(
        "aggregation_settings",
        &["id", "flow_variable", "aggregation_method", "interval"],
    ),
    ModelDef::spatial(
        "boundary_condition_1d",
        &[
            "id",
            "code",
            "display_name",
            "type",
            "timeseries",
            "time_units",
            "interpolate",
            "tags",
            "connection_node_id",
        ],
        GeometryKind::Point,
    ),
    ModelDef::spatial(
        "boundary_condition_2d",
        &[
            "id",
            "code",
            "display_name",
            "type",
            "timeseries",
            "time_units",
            "interpolate",
            "tags",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::spatial(
        "channel",
        &[
            "id",
            "code",
            "display_name",
            "tags",
            "exchange_type",
            "calculation_point_distance",
            "connection_node_id_start",
            "connection_node_id_end",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::spatial(
        "connection_node",
        &[
            "id",
            "code",
            "display_name",
            "tags",
            "storage_area",
            "initial_water_level",
            "visualisation",
            "manhole_surface_level",
            "bottom_level",
            "exchange_level",
            "exchange_type",
        ],
        GeometryKind::Point,
    ),
    ModelDef::spatial(
        "cross_section_location",
        &[
            "id",
            "code",
            "display_name",
            "tags",
            "reference_level",
            "friction_type",
            "friction_value",
            "bank_level",
            "cross_section_shape",
            "cross_section_width",
            "cross_section_height",
            "cross_section_table",
            "channel_id",
        ],
        GeometryKind::Point,
    ),
    ModelDef::spatial(
        "culvert",
        &[
            "id",
            "code",
            "display_name",
            "tags",
            "exchange_type",
            "friction_value",
            "friction_type",
            "calculation_point_distance",
            "discharge_coefficient_positive",
            "discharge_coefficient_negative",
            "invert_level_start",
            "invert_level_end",
            "material_id",
            "connection_node_id_start",
            "connection_node_id_end",
            "cross_section_shape",
            "cross_section_width",
            "cross_section_height",
            "cross_section_table",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::spatial(
        "dem_average_area",
        &[
            "id",
            "code",
            "display_name",
            "tags",
        ],
        GeometryKind::Polygon,
    ),
    ModelDef::spatial(
        "dry_weather_flow",
        &[
            "id",
            "code",
            "display_name",
            "multiplier",
            "dry_weather_flow_distribution_id",
            "daily_total",
            "interpolate",
            "tags",
        ],
        GeometryKind::Polygon,
    ),
    ModelDef::plain(
        "dry_weather_flow_distribution",
        &["id", "description", "tags", "distribution"],
    ),
    ModelDef::spatial(
        "dry_weather_flow_map",
        &[
            "id",
            "connection_node_id",
            "dry_weather_flow_id",
            "percentage",
            "code",
            "display_name",
            "tags",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::spatial(
        "exchange_line",
        &[
            "id",
            "code",
            "display_name",
            "channel_id",
            "exchange_level",
            "tags",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::spatial(
        "grid_refinement_area",
        &["id", "code", "display_name", "grid_level", "tags"],
        GeometryKind::Polygon,
    ),
    ModelDef::spatial(
        "grid_refinement_line",
        &[
            "id",
            "code",
            "display_name",
            "grid_level",
            "tags",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::plain(
        "groundwater",
        &[
            "id",
            "groundwater_impervious_layer_level",
            "groundwater_impervious_layer_level_file",
            "groundwater_impervious_layer_level_aggregation",
            "phreatic_storage_capacity",
            "phreatic_storage_capacity_file",
            "phreatic_storage_capacity_aggregation",
            "equilibrium_infiltration_rate",
            "equilibrium_infiltration_rate_file",
            "equilibrium_infiltration_rate_aggregation",
            "initial_infiltration_rate",
            "initial_infiltration_rate_file",
            "initial_infiltration_rate_aggregation",
            "infiltration_decay_period",
            "infiltration_decay_period_file",
            "infiltration_decay_period_aggregation",
            "groundwater_hydraulic_conductivity",
            "groundwater_hydraulic_conductivity_file",
            "groundwater_hydraulic_conductivity_aggregation",
            "leakage",
            "leakage_file",
        ],
    ),
    ModelDef::plain(
        "initial_conditions",
        &[
            "id",
            "initial_groundwater_level",
            "initial_groundwater_level_file",
            "initial_groundwater_level_aggregation",
            "initial_water_level",
            "initial_water_level_aggregation",
            "initial_water_level_file",
        ],
    ),
    ModelDef::plain("interception", &["id", "interception", "interception_file"]),
    ModelDef::plain(
        "interflow",
        &[
            "id",
            "interflow_type",
            "porosity",
            "porosity_file",
            "porosity_layer_thickness",
            "impervious_layer_elevation",
            "hydraulic_conductivity",
            "hydraulic_conductivity_file",
        ],
    ),
    ModelDef::spatial(
        "lateral_1d",
        &[
            "id",
            "code",
            "display_name",
            "timeseries",
            "time_units",
            "interpolate",
            "offset",
            "units",
            "tags",
            "connection_node_id",
        ],
        GeometryKind::Point,
    ),
    ModelDef::spatial(
        "lateral_2d",
        &[
            "id",
            "code",
            "display_name",
            "type",
            "timeseries",
            "time_units",
            "interpolate",
            "offset",
            "units",
            "tags",
        ],
        GeometryKind::Point,
    ),
    ModelDef::plain(
        "material",
        &["id", "description", "friction_type", "friction_coefficient"],
    ),
    ModelDef::spatial(
        "measure_location",
        &[
            "id",
            "connection_node_id",
            "measure_variable",
            "tags",
            "code",
            "display_name",
        ],
        GeometryKind::Point,
    ),
    ModelDef::spatial(
        "measure_map",
        &[
            "id",
            "weight",
            "measure_location_id",
            "control_id",
            "control_type",
            "tags",
            "code",
            "display_name",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::spatial(
        "memory_control",
        &[
            "id",
            "upper_threshold",
            "lower_threshold",
            "action_type",
            "action_value_1",
            "action_value_2",
            "target_type",
            "target_id",
            "is_active",
            "is_inverse",
            "tags",
            "code",
            "display_name",
        ],
        GeometryKind::Point,
    ),
    ModelDef::plain(
        "model_settings",
        &[
            "id",
            "use_2d_flow",
            "use_1d_flow",
            "manhole_aboveground_storage_area",
            "minimum_cell_size",
            "calculation_point_distance_1d",
            "nr_grid_levels",
            "minimum_table_step_size",
            "maximum_table_step_size",
            "dem_file",
            "friction_type",
            "friction_coefficient",
            "friction_coefficient_file",
            "embedded_cutoff_threshold",
            "max_angle_1d_advection",
            "friction_averaging",
            "table_step_size_1d",
            "use_2d_rain",
            "use_interflow",
            "use_interception",
            "use_simple_infiltration",
            "use_groundwater_flow",
            "use_groundwater_storage",
            "node_open_water_detection",
            "use_vegetation_drag_2d",
        ],
    ),
    ModelDef::plain(
        "numerical_settings",
        &[
            "id",
            "cfl_strictness_factor_1d",
            "cfl_strictness_factor_2d",
            "convergence_cg",
            "convergence_eps",
            "flow_direction_threshold",
            "friction_shallow_water_depth_correction",
            "general_numerical_threshold",
            "time_integration_method",
            "limiter_waterlevel_gradient_1d",
            "limiter_waterlevel_gradient_2d",
            "limiter_slope_crossectional_area_2d",
            "limiter_slope_friction_2d",
            "max_non_linear_newton_iterations",
            "max_degree_gauss_seidel",
            "min_friction_velocity",
            "min_surface_area",
            "use_preconditioner_cg",
            "preissmann_slot",
            "pump_implicit_ratio",
            "limiter_slope_thin_water_layer",
            "use_of_cg",
            "use_nested_newton",
            "flooding_threshold",
        ],
    ),
    ModelDef::spatial(
        "obstacle",
        &[
            "id",
            "code",
            "display_name",
            "crest_level",
            "tags",
            "affects_2d",
            "affects_1d2d_open_water",
            "affects_1d2d_closed",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::spatial(
        "orifice",
        &[
            "id",
            "code",
            "display_name",
            "tags",
            "crest_level",
            "crest_type",
            "friction_value",
            "friction_type",
            "discharge_coefficient_positive",
            "discharge_coefficient_negative",
            "material_id",
            "sewerage",
            "connection_node_id_start",
            "connection_node_id_end",
            "cross_section_shape",
            "cross_section_width",
            "cross_section_height",
            "cross_section_table",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::plain(
        "physical_settings",
        &["id", "use_advection_1d", "use_advection_2d"],
    ),
    ModelDef::spatial(
        "pipe",
        &[
            "id",
            "code",
            "display_name",
            "tags",
            "sewerage_type",
            "exchange_type",
            "invert_level_start",
            "invert_level_end",
            "friction_value",
            "friction_type",
            "calculation_point_distance",
            "material_id",
            "connection_node_id_start",
            "connection_node_id_end",
            "cross_section_shape",
            "cross_section_width",
            "cross_section_height",
            "cross_section_table",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::spatial(
        "potential_breach",
        &[
            "id",
            "code",
            "display_name",
            "initial_exchange_level",
            "final_exchange_level",
            "levee_material",
            "channel_id",
            "tags",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::spatial(
        "pump",
        &[
            "id",
            "code",
            "display_name",
            "start_level",
            "lower_stop_level",
            "upper_stop_level",
            "capacity",
            "type",
            "sewerage",
            "connection_node_id",
            "tags",
        ],
        GeometryKind::Point,
    ),
    ModelDef::spatial(
        "pump_map",
        &[
            "id",
            "pump_id",
            "connection_node_id_end",
            "code",
            "display_name",
            "tags",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::plain(
        "simple_infiltration",
        &[
            "id",
            "infiltration_rate",
            "infiltration_rate_file",
            "infiltration_surface_option",
            "max_infiltration_volume",
            "max_infiltration_volume_file",
        ],
    ),
    ModelDef::plain(
        "simulation_template_settings",
        &["id", "name", "use_0d_inflow", "use_structure_control"],
    ),
    ModelDef::spatial(
        "surface",
        &[
            "id",
            "code",
            "display_name",
            "area",
            "surface_parameters_id",
            "tags",
        ],
        GeometryKind::Polygon,
    ),
    ModelDef::spatial(
        "surface_map",
        &[
            "id",
            "surface_id",
            "connection_node_id",
            "percentage",
            "code",
            "display_name",
            "tags",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::plain(
        "surface_parameters",
        &[
            "id",
            "outflow_delay",
            "surface_layer_thickness",
            "infiltration",
            "max_infiltration_capacity",
            "min_infiltration_capacity",
            "infiltration_decay_constant",
            "infiltration_recovery_constant",
            "tags",
            "description",
        ],
    ),
    ModelDef::spatial(
        "table_control",
        &[
            "id",
            "action_table",
            "action_type",
            "measure_operator",
            "target_type",
            "target_id",
            "tags",
            "code",
            "display_name",
        ],
        GeometryKind::Point,
    ),
    ModelDef::plain("tags", &["id", "description"]),
    ModelDef::plain(
        "time_step_settings",
        &[
            "id",
            "time_step",
            "min_time_step",
            "max_time_step",
            "output_time_step",
            "use_time_step_stretch",
        ],
    ),
    ModelDef::plain(
        "vegetation_drag_2d",
        &[
            "id",
            "vegetation_height",
            "vegetation_height_file",
            "vegetation_stem_count",
            "vegetation_stem_count_file",
            "vegetation_stem_diameter",
            "vegetation_stem_diameter_file",
            "vegetation_drag_coefficient",
            "vegetation_drag_coefficient_file",
        ],
    ),
    ModelDef::spatial(
        "weir",
        &[
            "id",
            "code",
            "display_name",
            "tags",
            "crest_level",
            "crest_type",
            "friction_value",
            "friction_type",
            "discharge_coefficient_positive",
            "discharge_coefficient_negative",
            "material_id",
            "sewerage",
            "external",
            "connection_node_id_start",
            "connection_node_id_end",
            "cross_section_shape",
            "cross_section_width",
            "cross_section_height",
            "cross_section_table",
        ],
        GeometryKind::LineString,
    ),
    ModelDef::spatial(
        "windshielding_1d",
        &[
            "id",
            "code",
            "display_name",
            "tags",
            "north",
            "northeast",
            "east",
            "southeast",
            "south",
            "southwest",
            "west",
            "northwest",
            "channel_id",
        ],
        GeometryKind::Point,
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tables_unique_and_keyed() {
        let mut seen = HashSet::new();
        for model in DECLARED_MODELS {
            assert!(seen.insert(model.table), "duplicate {}", model.table);
            assert_eq!(model.columns.first(), Some(&"id"), "{} lacks id", model.table);
            assert!(!model.columns.contains(&GEOMETRY_COLUMN));
        }
        assert_eq!(DECLARED_MODELS.len(), 43);
    }

    #[test]
    fn test_all_columns_appends_geometry() {
        let pump = find_model("pump").unwrap();
        assert_eq!(pump.all_columns().last(), Some(&"geom"));
        let material = find_model("material").unwrap();
        assert_eq!(material.all_columns().len(), 4);
    }
}
