use rusqlite::{params, Connection};

use crate::database::{quote_ident, table_exists};
use crate::error::{SchemaError, SchemaWarning};
use crate::spatial::{Geometry, GeometryKind};

use super::ops::{already_applied, copy_columns, create_geo_table, drop_table_if_exists, legacy_blob, read_points};
use super::{Migration, StepContext};

pub const MIGRATION: Migration = Migration::code(
    225,
    Some(224),
    "Migrate boundary conditions and laterals",
    migrate_0223_to_0225,
);

const BOUNDARY_1D_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    type INTEGER,
    timeseries TEXT,
    time_units VARCHAR(32),
    interpolate BOOLEAN,
    tags TEXT,
    connection_node_id INTEGER"#;

const BOUNDARY_2D_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    type INTEGER,
    timeseries TEXT,
    time_units VARCHAR(32),
    interpolate BOOLEAN,
    tags TEXT"#;

const LATERAL_1D_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    timeseries TEXT,
    time_units VARCHAR(32),
    interpolate BOOLEAN,
    "offset" INTEGER,
    units VARCHAR(32),
    tags TEXT,
    connection_node_id INTEGER"#;

const LATERAL_2D_DDL: &str = r#"
    id INTEGER PRIMARY KEY NOT NULL,
    code VARCHAR(100),
    display_name VARCHAR(255),
    type INTEGER,
    timeseries TEXT,
    time_units VARCHAR(32),
    interpolate BOOLEAN,
    "offset" INTEGER,
    units VARCHAR(32),
    tags TEXT"#;

struct Rename {
    from: &'static str,
    to: &'static str,
    ddl: &'static str,
    kind: GeometryKind,
    columns: &'static [(&'static str, &'static str)],
    /// Point geometry is taken from the connection node.
    on_node: bool,
    is_lateral: bool,
}

const RENAMES: [Rename; 4] = [
    Rename {
        from: "v2_1d_boundary_conditions",
        to: "boundary_condition_1d",
        ddl: BOUNDARY_1D_DDL,
        kind: GeometryKind::Point,
        columns: &[
            ("id", "id"),
            ("type", "boundary_type"),
            ("timeseries", "timeseries"),
            ("connection_node_id", "connection_node_id"),
        ],
        on_node: true,
        is_lateral: false,
    },
    Rename {
        from: "v2_2d_boundary_conditions",
        to: "boundary_condition_2d",
        ddl: BOUNDARY_2D_DDL,
        kind: GeometryKind::LineString,
        columns: &[
            ("id", "id"),
            ("display_name", "display_name"),
            ("type", "boundary_type"),
            ("timeseries", "timeseries"),
            ("geom", "the_geom"),
        ],
        on_node: false,
        is_lateral: false,
    },
    Rename {
        from: "v2_1d_lateral",
        to: "lateral_1d",
        ddl: LATERAL_1D_DDL,
        kind: GeometryKind::Point,
        columns: &[
            ("id", "id"),
            ("timeseries", "timeseries"),
            ("connection_node_id", "connection_node_id"),
        ],
        on_node: true,
        is_lateral: true,
    },
    Rename {
        from: "v2_2d_lateral",
        to: "lateral_2d",
        ddl: LATERAL_2D_DDL,
        kind: GeometryKind::Point,
        columns: &[
            ("id", "id"),
            ("type", "type"),
            ("timeseries", "timeseries"),
            ("geom", "the_geom"),
        ],
        on_node: false,
        is_lateral: true,
    },
];

// ========================================
// Migration 0223 -> 0225
// ========================================

fn migrate_0223_to_0225(conn: &Connection, ctx: &mut StepContext) -> Result<(), SchemaError> {
    let nodes = read_points(conn, "v2_connection_nodes", "the_geom")?;

    for rename in &RENAMES {
        if already_applied(conn, rename.from, rename.to)? {
            continue;
        }
        create_geo_table(conn, rename.to, rename.ddl, rename.kind)?;
        if !table_exists(conn, rename.from)? {
            continue;
        }
        copy_columns(conn, rename.from, rename.to, rename.columns)?;

        let table = quote_ident(rename.to);
        if rename.is_lateral {
            conn.execute_batch(&format!(
                "UPDATE {} SET time_units = 'minutes', interpolate = 1, \"offset\" = 0, units = 'm3/s'",
                table
            ))?;
        } else {
            conn.execute_batch(&format!(
                "UPDATE {} SET time_units = 'minutes', interpolate = 1",
                table
            ))?;
        }

        if rename.on_node {
            let rows: Vec<(i64, Option<i64>)> = conn
                .prepare(&format!("SELECT id, connection_node_id FROM {} ORDER BY id", table))?
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<_, _>>()?;
            let mut orphans = Vec::new();
            for (id, node_id) in rows {
                match node_id.and_then(|n| nodes.get(&n)) {
                    Some(coord) => {
                        conn.execute(
                            &format!("UPDATE {} SET geom = ?1 WHERE id = ?2", table),
                            params![legacy_blob(&Geometry::Point(Some(*coord))), id],
                        )?;
                    }
                    None => orphans.push(id),
                }
            }
            if !orphans.is_empty() {
                for id in &orphans {
                    conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table), [id])?;
                }
                ctx.warn(SchemaWarning::RowsRemoved {
                    table: rename.from.to_string(),
                    ids: orphans,
                    reason: "they do not refer to an existing connection node".to_string(),
                });
            }
        }
        drop_table_if_exists(conn, rename.from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::codec::decode_blob;
    use crate::spatial::metadata::{geometry_column, SpatialiteFileVersion};
    use crate::test_support::spatial_conn;
    use pretty_assertions::assert_eq;

    fn setup() -> Connection {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        let mut ctx = StepContext::new(28992);
        (crate::schema::v0200_initial::MIGRATION.code_fn.unwrap())(&conn, &mut ctx).unwrap();
        conn.execute_batch(
            "INSERT INTO v2_connection_nodes (id, the_geom) VALUES (1, GeomFromText('POINT(4.9 52.37)', 4326));
             INSERT INTO v2_1d_boundary_conditions (id, connection_node_id, boundary_type, timeseries)
                 VALUES (1, 1, 2, '0,1.0'), (2, 7, 1, '0,0.5');
             INSERT INTO v2_2d_boundary_conditions (id, display_name, timeseries, boundary_type, the_geom)
                 VALUES (1, 'edge', '0,1.0', 1, GeomFromText('LINESTRING(4.9 52.3, 4.9 52.4)', 4326));
             INSERT INTO v2_1d_lateral (id, connection_node_id, timeseries) VALUES (3, 1, '0,0.1');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_boundaries_and_laterals() {
        let conn = setup();
        let mut ctx = StepContext::new(28992);
        migrate_0223_to_0225(&conn, &mut ctx).unwrap();

        let (kind, blob): (i64, Vec<u8>) = conn
            .query_row("SELECT type, geom FROM boundary_condition_1d WHERE id = 1", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(kind, 2);
        assert_eq!(decode_blob(&blob).unwrap().geometry, Geometry::point(4.9, 52.37));

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM boundary_condition_1d", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
        assert_eq!(ctx.warnings.len(), 1);

        let (units, time_units): (String, String) = conn
            .query_row("SELECT units, time_units FROM lateral_1d WHERE id = 3", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!((units.as_str(), time_units.as_str()), ("m3/s", "minutes"));

        let name: String = conn
            .query_row("SELECT display_name FROM boundary_condition_2d", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "edge");
        assert!(geometry_column(&conn, "lateral_2d", "geom").unwrap().is_some());
        for rename in &RENAMES {
            assert!(!table_exists(&conn, rename.from).unwrap());
        }
    }
}
