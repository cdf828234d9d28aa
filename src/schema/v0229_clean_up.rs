use log::debug;
use rusqlite::Connection;

use crate::database::{quote_ident, table_exists};
use crate::error::SchemaError;
use crate::spatial::metadata::column_exists;

use super::{Migration, StepContext};

pub const MIGRATION: Migration = Migration::code(
    229,
    Some(228),
    "Clean up leftovers of the legacy tables",
    migrate_0228_to_0229,
);

/// A `use_*` flag and the table that must hold data for it to be set.
const USE_SETTINGS: [(&str, &str); 6] = [
    ("use_groundwater_storage", "groundwater"),
    ("use_groundwater_flow", "groundwater"),
    ("use_interflow", "interflow"),
    ("use_simple_infiltration", "simple_infiltration"),
    ("use_interception", "interception"),
    ("use_vegetation_drag_2d", "vegetation_drag_2d"),
];

const BOOLEAN_SETTINGS: [&str; 2] = ["use_2d_rain", "friction_averaging"];

fn migrate_0228_to_0229(conn: &Connection, _ctx: &mut StepContext) -> Result<(), SchemaError> {
    remove_old_index_tables(conn)?;
    remove_stale_catalog_rows(conn)?;
    drop_legacy_objects(conn, "trigger")?;
    drop_legacy_objects(conn, "view")?;
    update_use_settings(conn)?;
    retype_booleans(conn, "model_settings", &BOOLEAN_SETTINGS)?;
    Ok(())
}

fn names_like(conn: &Connection, kind: &str, pattern: &str) -> Result<Vec<String>, SchemaError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = ?1 AND name LIKE ?2 ORDER BY name",
    )?;
    let names = stmt
        .query_map([kind, pattern], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

/// Index tables left behind by the legacy geometry columns.
fn remove_old_index_tables(conn: &Connection) -> Result<(), SchemaError> {
    // dropping an rtree drops its shadow tables, so drop the virtual tables first
    let virtual_tables: Vec<String> = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND (name LIKE 'idx_v2_%' OR name LIKE '%_alembic_%_the_geom')
             AND sql LIKE 'CREATE VIRTUAL TABLE%'",
        )?
        .query_map([], |r| r.get(0))?
        .collect::<Result<_, _>>()?;
    for table in virtual_tables {
        debug!("Dropping legacy index {}", table);
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(&table)))?;
    }
    let mut rest = names_like(conn, "table", "idx_v2_%")?;
    rest.extend(names_like(conn, "table", "%_alembic_%_the_geom")?);
    for table in rest {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(&table)))?;
    }
    Ok(())
}

fn remove_stale_catalog_rows(conn: &Connection) -> Result<(), SchemaError> {
    if !table_exists(conn, "geometry_columns")? {
        return Ok(());
    }
    let removed = conn.execute(
        "DELETE FROM geometry_columns WHERE lower(f_table_name) NOT IN
             (SELECT lower(name) FROM sqlite_master WHERE type = 'table')",
        [],
    )?;
    if removed > 0 {
        debug!("Removed {} stale geometry_columns rows", removed);
    }
    Ok(())
}

fn drop_legacy_objects(conn: &Connection, kind: &str) -> Result<(), SchemaError> {
    let names: Vec<String> = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = ?1 AND tbl_name LIKE '%v2%'")?
        .query_map([kind], |r| r.get(0))?
        .collect::<Result<_, _>>()?;
    for name in names {
        conn.execute_batch(&format!("DROP {} IF EXISTS {}", kind.to_uppercase(), quote_ident(&name)))?;
    }
    Ok(())
}

/// True when `table` has a row with at least one value besides its id.
fn has_data(conn: &Connection, table: &str) -> Result<bool, SchemaError> {
    if !table_exists(conn, table)? {
        return Ok(false);
    }
    let columns: Vec<String> = crate::database::table_columns(conn, table)?
        .into_iter()
        .filter(|c| c != "id")
        .collect();
    if columns.is_empty() {
        return Ok(false);
    }
    let condition = columns
        .iter()
        .map(|c| format!("({q} IS NOT NULL AND {q} != '')", q = quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" OR ");
    let found: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE {})", quote_ident(table), condition),
        [],
        |r| r.get(0),
    )?;
    Ok(found == 1)
}

fn update_use_settings(conn: &Connection) -> Result<(), SchemaError> {
    if !table_exists(conn, "model_settings")? {
        return Ok(());
    }
    for (setting, table) in USE_SETTINGS {
        if !column_exists(conn, "model_settings", setting)? {
            continue;
        }
        if !has_data(conn, table)? {
            conn.execute_batch(&format!(
                "UPDATE model_settings SET {} = 0",
                quote_ident(setting)
            ))?;
        }
    }
    Ok(())
}

/// Rebuilds `table` with `columns` declared BOOLEAN and their values folded
/// to 0 or 1.
fn retype_booleans(conn: &Connection, table: &str, columns: &[&str]) -> Result<(), SchemaError> {
    if !table_exists(conn, table)? {
        return Ok(());
    }
    let info: Vec<(String, String, bool)> = conn
        .prepare(&format!("SELECT name, type, pk FROM pragma_table_info({})", quote_ident(table)))?
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get::<_, i64>(2)? > 0)))?
        .collect::<Result<_, _>>()?;

    let mut defs = Vec::with_capacity(info.len());
    let mut names = Vec::with_capacity(info.len());
    let mut exprs = Vec::with_capacity(info.len());
    for (name, decl, pk) in &info {
        let q = quote_ident(name);
        if *pk {
            defs.push(format!("{} INTEGER PRIMARY KEY NOT NULL", q));
            exprs.push(q.clone());
        } else if columns.contains(&name.as_str()) {
            defs.push(format!("{} BOOLEAN", q));
            exprs.push(format!("CASE WHEN {q} IS NULL THEN NULL WHEN {q} THEN 1 ELSE 0 END"));
        } else {
            defs.push(format!("{} {}", q, decl));
            exprs.push(q.clone());
        }
        names.push(q);
    }
    let temp = format!("_temp_229_{}", table);
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {tmp};
         CREATE TABLE {tmp} ({defs});
         INSERT INTO {tmp} ({names}) SELECT {exprs} FROM {t};
         DROP TABLE {t};
         ALTER TABLE {tmp} RENAME TO {t};",
        tmp = quote_ident(&temp),
        t = quote_ident(table),
        defs = defs.join(", "),
        names = names.join(", "),
        exprs = exprs.join(", "),
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::metadata::SpatialiteFileVersion;
    use crate::test_support::spatial_conn;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_up() {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        conn.execute_batch(
            "CREATE TABLE model_settings (id INTEGER PRIMARY KEY, use_2d_rain INTEGER, friction_averaging TEXT,
                                          use_interflow BOOLEAN, use_groundwater_flow BOOLEAN,
                                          use_vegetation_drag_2d BOOLEAN);
             INSERT INTO model_settings VALUES (1, 5, '0', 1, 1, 1);
             CREATE TABLE vegetation_drag_2d (id INTEGER PRIMARY KEY, vegetation_height FLOAT);
             INSERT INTO vegetation_drag_2d VALUES (1, NULL);
             CREATE TABLE interflow (id INTEGER PRIMARY KEY, porosity FLOAT);
             INSERT INTO interflow VALUES (1, NULL);
             CREATE TABLE groundwater (id INTEGER PRIMARY KEY, leakage FLOAT);
             INSERT INTO groundwater VALUES (1, 0.1);
             CREATE TABLE idx_v2_channel_the_geom (pkid INTEGER PRIMARY KEY);
             CREATE TABLE v2_leftover (id INTEGER PRIMARY KEY);
             CREATE VIEW v2_leftover_view AS SELECT id FROM v2_leftover;
             CREATE TRIGGER v2_leftover_trigger AFTER INSERT ON v2_leftover BEGIN SELECT 1; END;
             INSERT INTO geometry_columns (f_table_name, f_geometry_column, geometry_type, coord_dimension, srid, spatial_index_enabled)
                 VALUES ('v2_gone', 'the_geom', 1, 2, 4326, 0);",
        )
        .unwrap();

        let mut ctx = StepContext::new(28992);
        migrate_0228_to_0229(&conn, &mut ctx).unwrap();

        let flags: (i64, i64, i64, i64) = conn
            .query_row(
                "SELECT use_2d_rain, friction_averaging, use_interflow, use_groundwater_flow FROM model_settings",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(flags, (1, 0, 0, 1));
        let drag: i64 = conn
            .query_row("SELECT use_vegetation_drag_2d FROM model_settings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(drag, 0);
        let decl: String = conn
            .query_row(
                "SELECT type FROM pragma_table_info('model_settings') WHERE name = 'use_2d_rain'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(decl, "BOOLEAN");

        assert!(!table_exists(&conn, "idx_v2_channel_the_geom").unwrap());
        let leftovers: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('view', 'trigger') AND tbl_name LIKE '%v2%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(leftovers, 0);
        let stale: i64 = conn
            .query_row("SELECT COUNT(*) FROM geometry_columns WHERE f_table_name = 'v2_gone'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stale, 0);
    }
}
