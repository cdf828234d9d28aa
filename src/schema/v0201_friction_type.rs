use rusqlite::Connection;

use crate::constants::FrictionType;
use crate::error::SchemaError;

use super::ops::{remap_values, UnknownValuePolicy};
use super::{Migration, StepContext};

pub const MIGRATION: Migration = Migration::code(
    201,
    Some(200),
    "Replace friction type 4 with 2",
    migrate_0200_to_0201,
);

const FRICTION_TABLES: [&str; 3] = ["v2_cross_section_location", "v2_pipe", "v2_culvert"];

/// Manning with conveyance is not supported on these objects anymore.
fn migrate_0200_to_0201(conn: &Connection, _ctx: &mut StepContext) -> Result<(), SchemaError> {
    let map = [(
        FrictionType::ManningConveyance as i64,
        FrictionType::Manning as i64,
    )];
    for table in FRICTION_TABLES {
        remap_values(conn, table, "friction_type", &map, UnknownValuePolicy::PassThrough)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friction_type_4_becomes_2() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE v2_pipe (id INTEGER PRIMARY KEY, friction_type INTEGER);
             INSERT INTO v2_pipe VALUES (1, 4), (2, 1), (3, NULL);",
        )
        .unwrap();
        let mut ctx = StepContext::new(28992);
        migrate_0200_to_0201(&conn, &mut ctx).unwrap();
        let types: Vec<Option<i64>> = conn
            .prepare("SELECT friction_type FROM v2_pipe ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(types, vec![Some(2), Some(1), None]);
    }
}
