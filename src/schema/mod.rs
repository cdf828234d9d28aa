mod base;
pub mod ops;
mod v0200_initial;
mod v0201_friction_type;
mod v0222_settings;
mod v0223_inflow;
mod v0224_structure_control;
mod v0225_boundary_lateral;
mod v0226_refinement_obstacle;
mod v0227_structure_control_fixups;
mod v0228_one_d;
mod v0229_clean_up;
mod v0230_reproject;
mod v0300_geopackage;

use log::{error, info, Level};
use logging_timer::timer;
use rusqlite::Connection;

use crate::error::{SchemaError, SchemaWarning};
use crate::ledger;

/// Function type for migration code that transforms data during a step.
pub type MigrationFn = fn(&Connection, &mut StepContext) -> Result<(), SchemaError>;

/// State shared by the steps of one upgrade run.
#[derive(Debug)]
pub struct StepContext {
    /// Metric CRS assumed when a step needs one and the file has none.
    pub default_epsg: i32,
    pub warnings: Vec<SchemaWarning>,
}

impl StepContext {
    pub fn new(default_epsg: i32) -> Self {
        StepContext {
            default_epsg,
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, warning: SchemaWarning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }
}

/// Migration descriptor supporting 3-phase steps:
/// - pre_sql: SQL batch to run before Rust code (optional)
/// - code_fn: Rust function for data transformations (optional)
/// - post_sql: SQL batch to run after Rust code (optional)
///
/// Steps form a single chain through `down_revision`; the root has none.
pub struct Migration {
    pub revision: i64,
    pub down_revision: Option<i64>,
    pub message: &'static str,
    pub pre_sql: Option<&'static str>,
    pub code_fn: Option<MigrationFn>,
    pub post_sql: Option<&'static str>,
}

impl Migration {
    /// A step that only runs Rust code.
    pub const fn code(
        revision: i64,
        down_revision: Option<i64>,
        message: &'static str,
        code_fn: MigrationFn,
    ) -> Self {
        Self {
            revision,
            down_revision,
            message,
            pre_sql: None,
            code_fn: Some(code_fn),
            post_sql: None,
        }
    }

    /// A step that only bumps the revision.
    pub const fn marker(revision: i64, down_revision: Option<i64>, message: &'static str) -> Self {
        Self {
            revision,
            down_revision,
            message,
            pre_sql: None,
            code_fn: None,
            post_sql: None,
        }
    }

    pub fn label(&self) -> String {
        ledger::format_revision(self.revision)
    }
}

/// Every known step, root first.
pub static MIGRATIONS: &[Migration] = &[
    v0200_initial::MIGRATION,
    v0201_friction_type::MIGRATION,
    v0222_settings::MIGRATION,
    v0223_inflow::MIGRATION,
    v0224_structure_control::MIGRATION,
    v0225_boundary_lateral::MIGRATION,
    v0226_refinement_obstacle::MIGRATION,
    v0227_structure_control_fixups::MIGRATION,
    v0228_one_d::MIGRATION,
    v0229_clean_up::MIGRATION,
    v0230_reproject::MIGRATION,
    v0300_geopackage::MIGRATION,
];

/// Revision of the newest step.
pub fn head() -> i64 {
    MIGRATIONS.last().map(|m| m.revision).unwrap_or(0)
}

pub fn find(revision: i64) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.revision == revision)
}

/// Steps that bring a file at `current` to `target`, in order.
///
/// A file without a revision, or one still on a legacy version, starts at
/// the root. A revision between two known steps continues at the next known
/// step. Nothing is returned when `target` is not ahead of `current`.
pub fn walk(current: Option<i64>, target: i64) -> Vec<&'static Migration> {
    if matches!(current, Some(c) if target <= c) {
        return Vec::new();
    }
    let from = current.unwrap_or(i64::MIN);
    MIGRATIONS
        .iter()
        .filter(|m| m.revision > from && m.revision <= target)
        .collect()
}

pub fn get_upgrade_steps_count(current: Option<i64>, target: i64) -> usize {
    walk(current, target).len()
}

/// Applies the pending steps up to `target`.
///
/// Each step runs in its own transaction together with the revision update,
/// so a failing step leaves the file at the previous step's revision.
/// `on_step` is called as every step starts.
pub fn run_upgrade(
    conn: &Connection,
    target: i64,
    ctx: &mut StepContext,
    on_step: &mut dyn FnMut(&Migration),
) -> Result<usize, SchemaError> {
    let _tmr = timer!(Level::Debug; "run_upgrade", "{}", target);
    let current = ledger::read_version(conn)?;
    let steps = walk(current, target);
    if steps.is_empty() {
        info!("Schema is up to date");
        return Ok(0);
    }
    for step in &steps {
        on_step(step);
        run_step(conn, step, ctx)?;
    }
    Ok(steps.len())
}

fn run_step(conn: &Connection, step: &Migration, ctx: &mut StepContext) -> Result<(), SchemaError> {
    info!(
        "Running upgrade {} -> {}, {}",
        step.down_revision
            .map(ledger::format_revision)
            .unwrap_or_else(|| "<base>".to_string()),
        step.label(),
        step.message
    );

    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = (|| -> Result<(), SchemaError> {
        if let Some(sql) = step.pre_sql {
            conn.execute_batch(sql)?;
        }
        if let Some(code_fn) = step.code_fn {
            code_fn(conn, ctx)?;
        }
        if let Some(sql) = step.post_sql {
            conn.execute_batch(sql)?;
        }
        ledger::write_version(conn, step.revision)
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(e) => {
            error!("Upgrade to {} failed: {}", step.label(), e);
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                error!("Rollback failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{LAST_SPTL_SCHEMA_VERSION, MIN_SCHEMA_VERSION};
    use crate::test_support::spatial_conn;
    use crate::spatial::metadata::SpatialiteFileVersion;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_chain_is_linear() {
        let root = &MIGRATIONS[0];
        assert_eq!(root.revision, MIN_SCHEMA_VERSION);
        assert_eq!(root.down_revision, None);
        for pair in MIGRATIONS.windows(2) {
            assert_eq!(pair[1].down_revision, Some(pair[0].revision));
            assert!(pair[1].revision > pair[0].revision);
        }
        assert_eq!(head(), 300);
        assert!(find(LAST_SPTL_SCHEMA_VERSION).is_some());
        assert!(find(224).is_some());
        assert!(find(227).is_some());
        assert!(find(202).is_none());
    }

    #[test]
    fn test_walk() {
        let labels = |steps: Vec<&Migration>| steps.iter().map(|m| m.revision).collect::<Vec<_>>();
        assert_eq!(labels(walk(None, 201)), vec![200, 201]);
        assert_eq!(labels(walk(Some(173), 222)), vec![200, 201, 222]);
        assert_eq!(labels(walk(Some(223), 228)), vec![224, 225, 226, 227, 228]);
        assert_eq!(labels(walk(Some(210), 222)), vec![222]);
        assert_eq!(labels(walk(Some(229), head())), vec![230, 300]);
        assert!(walk(Some(300), 300).is_empty());
        assert!(walk(Some(300), 229).is_empty());
    }

    #[test]
    fn test_steps_count() {
        assert_eq!(get_upgrade_steps_count(None, head()), MIGRATIONS.len());
        assert_eq!(get_upgrade_steps_count(Some(230), 230), 0);
        assert_eq!(get_upgrade_steps_count(Some(228), 230), 2);
        assert_eq!(get_upgrade_steps_count(Some(223), 230), 7);
        assert_eq!(get_upgrade_steps_count(Some(230), 300), 1);
    }

    #[test]
    fn test_failing_step_rolls_back() {
        fn boom(conn: &Connection, _ctx: &mut StepContext) -> Result<(), SchemaError> {
            conn.execute_batch("CREATE TABLE half_done (id INTEGER)")?;
            Err(SchemaError::UpgradeFailed("boom".into()))
        }
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        ledger::write_version(&conn, 229).unwrap();
        let step = Migration::code(230, Some(229), "failing", boom);
        let mut ctx = StepContext::new(28992);
        let err = run_step(&conn, &step, &mut ctx).unwrap_err();
        assert!(matches!(err, SchemaError::UpgradeFailed(_)));
        assert_eq!(ledger::read_version(&conn).unwrap(), Some(229));
        assert!(!crate::database::table_exists(&conn, "half_done").unwrap());
    }

    #[test]
    fn test_marker_step_bumps_revision() {
        let conn = Connection::open_in_memory().unwrap();
        let step = Migration::marker(300, Some(230), "marker");
        let mut ctx = StepContext::new(28992);
        run_step(&conn, &step, &mut ctx).unwrap();
        assert_eq!(ledger::read_version(&conn).unwrap(), Some(300));
        assert!(ctx.warnings.is_empty());
    }

    type Snapshot = Vec<(String, Vec<String>, i64)>;

    /// Columns and row counts of the schema and legacy tables.
    fn snapshot(conn: &Connection) -> Snapshot {
        let mut tables: Vec<String> = crate::database::table_names(conn)
            .unwrap()
            .into_iter()
            .filter(|t| t.starts_with("v2_") || crate::models::DECLARED_MODELS.iter().any(|m| m.table == t.as_str()))
            .collect();
        tables.sort();
        tables
            .into_iter()
            .map(|t| {
                let columns = crate::database::table_columns(conn, &t).unwrap();
                let rows: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", crate::database::quote_ident(&t)), [], |r| {
                        r.get(0)
                    })
                    .unwrap();
                (t, columns, rows)
            })
            .collect()
    }

    #[test]
    fn test_steps_rerun_on_migrated_data() {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        let mut ctx = StepContext::new(28992);
        run_upgrade(&conn, 201, &mut ctx, &mut |_| {}).unwrap();
        conn.execute_batch(
            "INSERT INTO v2_global_settings (id, name, epsg_code, use_0d_inflow, control_group_id)
                 VALUES (1, 'default', 28992, 0, 1);
             INSERT INTO v2_control_group (id, name) VALUES (1, 'group');
             INSERT INTO v2_connection_nodes (id, the_geom) VALUES
                 (1, GeomFromText('POINT(5.3872 52.1551)', 4326)),
                 (2, GeomFromText('POINT(5.3882 52.1551)', 4326));
             INSERT INTO v2_cross_section_definition (id, shape, width) VALUES (1, 1, '2.0');
             INSERT INTO v2_weir (id, code, crest_level, crest_type, connection_node_start_id,
                                  connection_node_end_id, cross_section_definition_id)
                 VALUES (1, 'weir', 1.0, 4, 1, 2, 1);
             INSERT INTO v2_control_measure_group (id) VALUES (1);
             INSERT INTO v2_control_measure_map (id, measure_group_id, object_type, object_id, weight)
                 VALUES (1, 1, 'v2_connection_nodes', 1, 1.0);
             INSERT INTO v2_control (id, control_group_id, measure_group_id, control_type, control_id)
                 VALUES (1, 1, 1, 'table', 1);
             INSERT INTO v2_control_table (id, action_table, action_type, measure_variable,
                                           measure_operator, target_type, target_id)
                 VALUES (1, '0.0;1.0', 'set_crest_level', 'waterlevel', '>', 'v2_weir', 1);
             INSERT INTO v2_obstacle (id, code, crest_level, the_geom)
                 VALUES (1, 'dike', 2.5, GeomFromText('LINESTRING(5.38 52.15, 5.39 52.15)', 4326));",
        )
        .unwrap();

        for step in walk(Some(201), head()) {
            run_step(&conn, step, &mut ctx).unwrap();
            let before = snapshot(&conn);
            // a step replayed on top of itself changes nothing
            run_step(&conn, step, &mut ctx)
                .unwrap_or_else(|e| panic!("replaying {} failed: {}", step.label(), e));
            assert_eq!(snapshot(&conn), before, "replaying {}", step.label());
        }

        assert_eq!(ledger::read_version(&conn).unwrap(), Some(300));
        for table in ["connection_node", "weir", "table_control", "measure_map", "obstacle", "model_settings"] {
            let rows: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
                .unwrap();
            assert_eq!(rows, if table == "connection_node" { 2 } else { 1 }, "{}", table);
        }
    }
}
