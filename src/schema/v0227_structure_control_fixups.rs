use rusqlite::Connection;

use crate::database::table_exists;
use crate::error::SchemaError;
use crate::spatial::metadata::rename_geo_table;

use super::ops::{drop_column_if_exists, rename_column_if_exists};
use super::{Migration, StepContext};

pub const MIGRATION: Migration = Migration::code(
    227,
    Some(226),
    "Rename the structure control measure tables",
    migrate_0226_to_0227,
);

const RENAMES: [(&str, &str); 2] = [
    ("control_measure_location", "measure_location"),
    ("control_measure_map", "measure_map"),
];

/// The measured variable lives on the measure location only.
fn migrate_0226_to_0227(conn: &Connection, _ctx: &mut StepContext) -> Result<(), SchemaError> {
    for table in ["memory_control", "table_control"] {
        drop_column_if_exists(conn, table, "measure_variable")?;
    }
    rename_column_if_exists(
        conn,
        "control_measure_map",
        "control_measure_location_id",
        "measure_location_id",
    )?;
    for (from, to) in RENAMES {
        if table_exists(conn, from)? && !table_exists(conn, to)? {
            rename_geo_table(conn, from, to)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ops::create_geo_table;
    use crate::spatial::metadata::{column_exists, geometry_column, SpatialiteFileVersion};
    use crate::spatial::GeometryKind;
    use crate::test_support::spatial_conn;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_measure_tables_renamed() {
        let conn = spatial_conn(SpatialiteFileVersion::V4);
        create_geo_table(
            &conn,
            "control_measure_location",
            "id INTEGER PRIMARY KEY, connection_node_id INTEGER, measure_variable TEXT",
            GeometryKind::Point,
        )
        .unwrap();
        create_geo_table(
            &conn,
            "control_measure_map",
            "id INTEGER PRIMARY KEY, control_measure_location_id INTEGER, control_id INTEGER",
            GeometryKind::LineString,
        )
        .unwrap();
        create_geo_table(
            &conn,
            "table_control",
            "id INTEGER PRIMARY KEY, measure_variable TEXT, action_table TEXT",
            GeometryKind::Point,
        )
        .unwrap();
        conn.execute_batch(
            "INSERT INTO control_measure_location (id, connection_node_id, measure_variable, geom)
                 VALUES (1, 4, 'water_level', GeomFromText('POINT(4 52)', 4326));
             INSERT INTO control_measure_map (id, control_measure_location_id, control_id) VALUES (1, 1, 10);",
        )
        .unwrap();

        let mut ctx = StepContext::new(28992);
        migrate_0226_to_0227(&conn, &mut ctx).unwrap();
        // a second run finds nothing left to do
        migrate_0226_to_0227(&conn, &mut ctx).unwrap();

        assert!(!table_exists(&conn, "control_measure_location").unwrap());
        assert!(!column_exists(&conn, "table_control", "measure_variable").unwrap());
        let location: i64 = conn
            .query_row("SELECT measure_location_id FROM measure_map", [], |r| r.get(0))
            .unwrap();
        assert_eq!(location, 1);
        let variable: String = conn
            .query_row("SELECT measure_variable FROM measure_location WHERE geom IS NOT NULL", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(variable, "water_level");
        let col = geometry_column(&conn, "measure_location", "geom").unwrap().unwrap();
        assert_eq!(col.kind, GeometryKind::Point);
    }
}
