use rusqlite::Error as RusqliteError;
use std::fmt;
use std::io;
use thiserror::Error;

use crate::constants::Format;

/// Coarse classification callers dispatch on when they only care about the
/// recovery path, not the exact failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file is behind what the operation needs; running an upgrade fixes it.
    MigrationMissing,
    /// A structural precondition failed or a conversion aborted.
    UpgradeFailed,
    /// The coordinate reference system could not be determined or is unusable.
    InvalidSrid,
    /// The revision argument could not be parsed.
    BadRevision,
    /// Anything raised by SQLite, the pool or the filesystem.
    Driver,
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error(
        "This tool cannot update versions below {floor}. Please consult the 3Di documentation on how to update legacy databases (found version {version})."
    )]
    LegacyBlocked { version: i64, floor: i64 },

    #[error("{0}")]
    MigrationMissing(String),

    #[error("The schematisation is at version {version} but is not a {expected} file.")]
    FormatMismatch { version: i64, expected: Format },

    #[error("GeoPackage conversion failed: {0}")]
    ConversionFailed(String),

    #[error("{0}")]
    UpgradeFailed(String),

    #[error("Cannot migrate schematisation with model_settings.epsg_code={code}; {issue}")]
    SridIndeterminate { code: String, issue: String },

    #[error("Incorrect version format: {0}. Expected 'head' or a numeric value.")]
    BadRevisionArgument(String),

    #[error("Spatial index creation for {index} failed with error {message}")]
    SpatialIndex { index: String, message: String },

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Error: {0}")]
    Error(String),
}

impl SchemaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchemaError::LegacyBlocked { .. } | SchemaError::MigrationMissing(_) => {
                ErrorKind::MigrationMissing
            }
            SchemaError::FormatMismatch { .. }
            | SchemaError::ConversionFailed(_)
            | SchemaError::UpgradeFailed(_) => ErrorKind::UpgradeFailed,
            SchemaError::SridIndeterminate { .. } => ErrorKind::InvalidSrid,
            SchemaError::BadRevisionArgument(_) => ErrorKind::BadRevision,
            SchemaError::SpatialIndex { .. }
            | SchemaError::Geometry(_)
            | SchemaError::IoError(_)
            | SchemaError::DatabaseError(_)
            | SchemaError::PoolError(_)
            | SchemaError::Error(_) => ErrorKind::Driver,
        }
    }

    pub fn invalid_srid(code: impl ToString, issue: impl Into<String>) -> Self {
        SchemaError::SridIndeterminate {
            code: code.to_string(),
            issue: issue.into(),
        }
    }

    /// True when the underlying SQLite error is a constraint violation.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            SchemaError::DatabaseError(RusqliteError::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

/// Non-fatal conditions raised while upgrading.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaWarning {
    /// An EPSG override was supplied outside the window where it applies.
    EpsgOverrideIgnored(String),
    VersionAhead { version: i64, schema_version: i64 },
    /// Per-layer issues collected during GeoPackage conversion.
    ConversionIssues(Vec<String>),
    /// Rows a migration could not carry over.
    RowsRemoved { table: String, ids: Vec<i64>, reason: String },
    /// Geometry tables are empty and no model CRS is known.
    SridKept { srid: i32 },
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaWarning::EpsgOverrideIgnored(msg) => f.write_str(msg),
            SchemaWarning::VersionAhead {
                version,
                schema_version,
            } => write!(
                f,
                "The database version is higher than the threedi-schema version ({} > {}). This may lead to unexpected results.",
                version, schema_version
            ),
            SchemaWarning::ConversionIssues(issues) => {
                f.write_str("GeoPackage conversion didn't finish as expected:")?;
                for issue in issues {
                    write!(f, "\n{}", issue)?;
                }
                Ok(())
            }
            SchemaWarning::RowsRemoved { table, ids, reason } => write!(
                f,
                "Could not migrate the following rows from {} because {}: {:?}",
                table, reason, ids
            ),
            SchemaWarning::SridKept { srid } => write!(
                f,
                "No epsg_code is defined and all geometry tables are empty; keeping EPSG:{}",
                srid
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let legacy = SchemaError::LegacyBlocked {
            version: 150,
            floor: 160,
        };
        assert_eq!(legacy.kind(), ErrorKind::MigrationMissing);
        assert!(legacy.to_string().contains("below 160"));

        let mismatch = SchemaError::FormatMismatch {
            version: 229,
            expected: Format::Spatialite,
        };
        assert_eq!(mismatch.kind(), ErrorKind::UpgradeFailed);

        let srid = SchemaError::invalid_srid(4979, "not a projected CRS");
        assert_eq!(srid.kind(), ErrorKind::InvalidSrid);
        assert_eq!(
            srid.to_string(),
            "Cannot migrate schematisation with model_settings.epsg_code=4979; not a projected CRS"
        );

        let bad = SchemaError::BadRevisionArgument("foo".into());
        assert_eq!(bad.kind(), ErrorKind::BadRevision);
        assert_eq!(
            bad.to_string(),
            "Incorrect version format: foo. Expected 'head' or a numeric value."
        );
    }

    #[test]
    fn test_warning_text() {
        let issues = SchemaWarning::ConversionIssues(vec!["a".into(), "b".into()]);
        assert_eq!(
            issues.to_string(),
            "GeoPackage conversion didn't finish as expected:\na\nb"
        );
        let removed = SchemaWarning::RowsRemoved {
            table: "v2_surface".into(),
            ids: vec![3, 4],
            reason: "they are not mapped to a connection node".into(),
        };
        assert!(removed.to_string().ends_with("[3, 4]"));
    }

    #[test]
    fn test_integrity_error_detection() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t VALUES (1);")
            .unwrap();
        let err: SchemaError = conn
            .execute("INSERT INTO t VALUES (1)", [])
            .unwrap_err()
            .into();
        assert!(err.is_integrity_error());
        assert_eq!(err.kind(), ErrorKind::Driver);
    }
}
