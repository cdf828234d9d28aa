//! Copies the rows of the declared models from one file into another.
//!
//! Geometries travel as EWKT so they are re-encoded for the destination's
//! storage flavour on insert.

use log::{debug, info};
use logging_timer::timer;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::database::{quote_ident, table_columns, table_exists, SchemaDatabase};
use crate::error::SchemaError;
use crate::models::{ModelDef, GEOMETRY_COLUMN};
use crate::spatial::metadata::file_version;

/// Major versions of the spatial library and of the file's catalog layout.
pub fn get_spatialite_version(db: &SchemaDatabase) -> Result<(u32, u32), SchemaError> {
    let conn = db.get_connection()?;
    let lib_version: String = conn.query_row("SELECT spatialite_version()", [], |r| r.get(0))?;
    let lib_major = lib_version
        .split('.')
        .next()
        .and_then(|major| major.parse::<u32>().ok())
        .ok_or_else(|| SchemaError::Error(format!("Unexpected spatial library version '{}'", lib_version)))?;
    let file = file_version(&conn)?
        .ok_or_else(|| SchemaError::Error("Not a spatialite file".to_string()))?;
    Ok((lib_major, file.major()))
}

fn model_count(conn: &Connection, table: &str) -> Result<i64, SchemaError> {
    if !table_exists(conn, table)? {
        return Ok(0);
    }
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), [], |r| r.get(0))?)
}

/// Declared columns present on both sides.
fn shared_columns(
    src: &Connection,
    dst: &Connection,
    model: &ModelDef,
) -> Result<Vec<&'static str>, SchemaError> {
    let src_cols = table_columns(src, model.table)?;
    let dst_cols = table_columns(dst, model.table)?;
    Ok(model
        .all_columns()
        .into_iter()
        .filter(|c| src_cols.iter().any(|s| s == c) && dst_cols.iter().any(|d| d == c))
        .collect())
}

fn copy_model(src: &Connection, dst: &Connection, model: &ModelDef) -> Result<usize, SchemaError> {
    if model_count(src, model.table)? == 0 {
        return Ok(0);
    }
    let columns = shared_columns(src, dst, model)?;
    if columns.is_empty() {
        return Ok(0);
    }
    let is_geom = |c: &str| model.geometry.is_some() && c == GEOMETRY_COLUMN;

    let select_list = columns
        .iter()
        .map(|c| {
            if is_geom(c) {
                format!("AsEWKT({})", quote_ident(c))
            } else {
                quote_ident(c)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let rows: Vec<Vec<Value>> = src
        .prepare(&format!("SELECT {} FROM {}", select_list, quote_ident(model.table)))?
        .query_map([], |row| (0..columns.len()).map(|i| row.get::<_, Value>(i)).collect())?
        .collect::<Result<_, _>>()?;

    let insert_list = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
    let placeholders = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if is_geom(c) {
                format!("GeomFromEWKT(?{})", i + 1)
            } else {
                format!("?{}", i + 1)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    dst.execute_batch("BEGIN")?;
    let result = (|| -> Result<(), SchemaError> {
        let mut insert = dst.prepare(&format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(model.table),
            insert_list,
            placeholders
        ))?;
        for values in &rows {
            insert.execute(params_from_iter(values.iter()))?;
        }
        Ok(())
    })();
    match result {
        Ok(()) => dst.execute_batch("COMMIT")?,
        Err(e) => {
            dst.execute_batch("ROLLBACK")?;
            return Err(e);
        }
    }
    debug!("Copied {} rows of {}", rows.len(), model.table);
    Ok(rows.len())
}

/// Copies every model that has rows in `src` into `dst`. An integrity
/// violation aborts the copy of that model and is returned as is.
pub fn copy_models(
    src: &SchemaDatabase,
    dst: &SchemaDatabase,
    models: &[ModelDef],
) -> Result<usize, SchemaError> {
    let _tmr = timer!(log::Level::Trace; "copy_models");
    let src_conn = src.get_connection()?;
    let dst_conn = dst.get_connection()?;
    let mut total = 0;
    for model in models {
        total += copy_model(&src_conn, &dst_conn, model)?;
    }
    info!("Copied {} rows", total);
    Ok(total)
}
