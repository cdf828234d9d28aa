use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::constants::Format;
use crate::error::SchemaError;

use super::codec::{decode_blob, encode_blob, SpatialBlob};
use super::crs;
use super::geometry::Geometry;

/// Version reported by `spatialite_version()`.
pub const SPATIAL_LIB_VERSION: &str = "5.1.0";

fn user_error(e: SchemaError) -> rusqlite::Error {
    rusqlite::Error::UserFunctionError(Box::new(e))
}

/// Geometry argument; NULL and undecodable blobs both read as absent,
/// the way the SpatiaLite functions treat them.
fn geom_arg(ctx: &Context<'_>, idx: usize) -> Option<SpatialBlob> {
    match ctx.get_raw(idx) {
        ValueRef::Blob(bytes) => decode_blob(bytes).ok(),
        _ => None,
    }
}

fn flags() -> FunctionFlags {
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC | FunctionFlags::SQLITE_INNOCUOUS
}

fn register_envelope_fn(
    conn: &Connection,
    names: &[&str],
    pick: fn(&super::geometry::Envelope) -> f64,
) -> rusqlite::Result<()> {
    for name in names {
        conn.create_scalar_function(*name, 1, flags(), move |ctx| {
            Ok(geom_arg(ctx, 0)
                .and_then(|b| b.geometry.envelope())
                .map(|env| pick(&env)))
        })?;
    }
    Ok(())
}

/// Registers the spatial SQL dialect on `conn`. Constructors encode in the
/// blob flavour of `format`.
pub fn register(conn: &Connection, format: Format) -> rusqlite::Result<()> {
    conn.create_scalar_function("spatialite_version", 0, flags(), |_| {
        Ok(SPATIAL_LIB_VERSION.to_string())
    })?;

    let from_text = move |ctx: &Context<'_>| -> rusqlite::Result<Option<Vec<u8>>> {
        let Some(text) = ctx.get::<Option<String>>(0)? else {
            return Ok(None);
        };
        let srid = if ctx.len() > 1 {
            ctx.get::<Option<i32>>(1)?.unwrap_or(0)
        } else {
            0
        };
        let geom = Geometry::from_wkt(&text).map_err(user_error)?;
        Ok(Some(encode_blob(format, &geom, srid)))
    };
    for name in ["GeomFromText", "ST_GeomFromText"] {
        conn.create_scalar_function(name, 1, flags(), from_text)?;
        conn.create_scalar_function(name, 2, flags(), from_text)?;
    }

    conn.create_scalar_function("GeomFromEWKT", 1, flags(), move |ctx| {
        let Some(text) = ctx.get::<Option<String>>(0)? else {
            return Ok(None);
        };
        let (srid, geom) = Geometry::from_ewkt(&text).map_err(user_error)?;
        Ok(Some(encode_blob(format, &geom, srid.unwrap_or(0))))
    })?;

    for name in ["AsText", "ST_AsText"] {
        conn.create_scalar_function(name, 1, flags(), |ctx| {
            Ok(geom_arg(ctx, 0).map(|b| b.geometry.to_wkt()))
        })?;
    }

    conn.create_scalar_function("AsEWKT", 1, flags(), |ctx| {
        Ok(geom_arg(ctx, 0).map(|b| b.geometry.to_ewkt(b.srid)))
    })?;

    for name in ["ST_SRID", "SRID"] {
        conn.create_scalar_function(name, 1, flags(), |ctx| {
            Ok(geom_arg(ctx, 0).map(|b| b.srid))
        })?;
    }

    conn.create_scalar_function("GeometryType", 1, flags(), |ctx| {
        Ok(geom_arg(ctx, 0).map(|b| b.geometry.kind().name().to_string()))
    })?;

    conn.create_scalar_function("ST_IsEmpty", 1, flags(), |ctx| {
        Ok(geom_arg(ctx, 0).map(|b| b.geometry.is_empty()))
    })?;

    conn.create_scalar_function("NumGeometries", 1, flags(), |ctx| {
        Ok(geom_arg(ctx, 0).map(|b| b.geometry.num_geometries() as i64))
    })?;

    conn.create_scalar_function("ST_GeometryN", 2, flags(), move |ctx| {
        let n: i64 = ctx.get(1)?;
        Ok(geom_arg(ctx, 0).and_then(|b| {
            usize::try_from(n)
                .ok()
                .and_then(|n| b.geometry.geometry_n(n))
                .map(|g| encode_blob(format, &g, b.srid))
        }))
    })?;

    conn.create_scalar_function("ST_Transform", 2, flags(), move |ctx| {
        let target: i32 = ctx.get(1)?;
        match geom_arg(ctx, 0) {
            Some(b) => {
                let geom = crs::transform(&b.geometry, b.srid, target).map_err(user_error)?;
                Ok(Some(encode_blob(format, &geom, target)))
            }
            None => Ok(None),
        }
    })?;

    register_envelope_fn(conn, &["ST_MinX", "MbrMinX"], |e| e.min_x)?;
    register_envelope_fn(conn, &["ST_MaxX", "MbrMaxX"], |e| e.max_x)?;
    register_envelope_fn(conn, &["ST_MinY", "MbrMinY"], |e| e.min_y)?;
    register_envelope_fn(conn, &["ST_MaxY", "MbrMaxY"], |e| e.max_y)?;

    Ok(())
}
