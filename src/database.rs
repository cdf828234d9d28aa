use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use logging_timer::timer;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::config::DbConfig;
use rusqlite::{Connection, OptionalExtension};

use crate::constants::Format;
use crate::error::SchemaError;
use crate::spatial::functions;

pub type Pool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const FILE_POOL_SIZE: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Quotes an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Detects the physical flavour of the database behind `conn`.
pub fn detect_format(conn: &Connection) -> Result<Format, rusqlite::Error> {
    let tables: Vec<String> = conn
        .prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table'
             AND name IN ('gpkg_contents', 'spatial_ref_sys')",
        )?
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    Ok(if tables.iter().any(|t| t == "gpkg_contents") {
        Format::Geopackage
    } else if tables.iter().any(|t| t == "spatial_ref_sys") {
        Format::Spatialite
    } else {
        Format::Unknown
    })
}

pub fn table_exists(conn: &Connection, name: &str) -> Result<bool, rusqlite::Error> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

pub fn table_names(conn: &Connection) -> Result<BTreeSet<String>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(names)
}

/// Column names of `table` in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Name of the single-column integer primary key, `rowid` when there is none.
pub fn primary_key_column(conn: &Connection, table: &str) -> Result<String, rusqlite::Error> {
    let pk: Option<String> = conn
        .query_row(
            "SELECT name FROM pragma_table_info(?1) WHERE pk = 1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(pk.unwrap_or_else(|| "rowid".to_string()))
}

/// Connection setup applied to every pooled connection.
///
/// Migrations rename tables that triggers and views still point at, which the
/// modern ALTER TABLE semantics refuse, so the legacy behaviour is switched on.
fn init_connection(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "PRAGMA legacy_alter_table = ON;
         PRAGMA foreign_keys = OFF;
         PRAGMA cell_size_check = ON;
         PRAGMA mmap_size = 0;",
    )?;
    // spatial index triggers call the registered geometry functions
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_TRUSTED_SCHEMA, true)?;
    let format = detect_format(conn)?;
    functions::register(conn, format)
}

/// Handle on a schematisation file.
///
/// Owns at most one connection pool, created lazily. Re-pointing the handle
/// at another path drops the pool so no connection to the old file survives.
/// An empty path means a private in-memory database; its pool holds exactly
/// one connection that never expires.
pub struct SchemaDatabase {
    path: RefCell<PathBuf>,
    pool: RefCell<Option<Pool>>,
    scratch_dir: RefCell<Option<PathBuf>>,
}

impl SchemaDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SchemaDatabase {
            path: RefCell::new(path.into()),
            pool: RefCell::new(None),
            scratch_dir: RefCell::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(PathBuf::new())
    }

    pub fn path(&self) -> PathBuf {
        self.path.borrow().clone()
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.borrow().as_os_str().is_empty()
    }

    pub fn set_path(&self, path: impl Into<PathBuf>) {
        *self.path.borrow_mut() = path.into();
        self.reset_pool();
    }

    /// Directory `file_transaction` creates its working copies in.
    pub fn set_scratch_dir(&self, dir: Option<PathBuf>) {
        *self.scratch_dir.borrow_mut() = dir;
    }

    pub fn reset_pool(&self) {
        if self.pool.borrow_mut().take().is_some() {
            debug!("Connection pool for '{}' released", self.path().display());
        }
    }

    fn pool(&self) -> Result<Pool, SchemaError> {
        if let Some(pool) = self.pool.borrow().as_ref() {
            return Ok(pool.clone());
        }

        let pool = if self.is_in_memory() {
            let manager = SqliteConnectionManager::memory().with_init(init_connection);
            r2d2::Pool::builder()
                .max_size(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .build(manager)?
        } else {
            let manager = SqliteConnectionManager::file(self.path()).with_init(init_connection);
            r2d2::Pool::builder()
                .max_size(FILE_POOL_SIZE)
                .min_idle(Some(0))
                .build(manager)?
        };

        *self.pool.borrow_mut() = Some(pool.clone());
        Ok(pool)
    }

    pub fn get_connection(&self) -> Result<PooledConnection, SchemaError> {
        Ok(self.pool()?.get()?)
    }

    pub fn has_table(&self, name: &str) -> Result<bool, SchemaError> {
        let conn = self.get_connection()?;
        Ok(table_exists(&conn, name)?)
    }

    pub fn table_names(&self) -> Result<BTreeSet<String>, SchemaError> {
        let conn = self.get_connection()?;
        Ok(table_names(&conn)?)
    }

    pub fn format(&self) -> Result<Format, SchemaError> {
        let conn = self.get_connection()?;
        Ok(detect_format(&conn)?)
    }

    pub fn check_connection(&self) -> Result<(), SchemaError> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    pub fn check_integrity(&self) -> Result<(), SchemaError> {
        let conn = self.get_connection()?;
        let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if result != "ok" {
            return Err(SchemaError::Error(format!(
                "Integrity check failed for '{}': {}",
                self.path().display(),
                result
            )));
        }
        Ok(())
    }

    /// Runs `f` against an isolated working copy of this database.
    ///
    /// The copy lives in a scratch directory that is removed afterwards. When
    /// `f` succeeds and `copy_results` is set, the working copy replaces the
    /// original file in a single copy; on failure the original is never
    /// touched. With `start_empty` the working copy starts as a new, empty file.
    /// In-memory databases cannot be copied, so `f` runs directly on them.
    pub fn file_transaction<T, F>(
        &self,
        start_empty: bool,
        copy_results: bool,
        f: F,
    ) -> Result<T, SchemaError>
    where
        F: FnOnce(&SchemaDatabase) -> Result<T, SchemaError>,
    {
        if self.is_in_memory() {
            return f(self);
        }

        let _tmr = timer!(log::Level::Trace; "SchemaDatabase::file_transaction");
        let original = self.path();
        let file_name = original.file_name().ok_or_else(|| {
            SchemaError::Error(format!("'{}' is not a file path", original.display()))
        })?;

        let scratch = self.scratch_dir.borrow().clone();
        let builder_prefix = format!(
            "threedi-schema-{}-",
            chrono::Utc::now().format("%Y%m%dT%H%M%S")
        );
        let mut builder = tempfile::Builder::new();
        builder.prefix(&builder_prefix);
        let tmp_dir = match scratch {
            Some(dir) => builder.tempdir_in(dir)?,
            None => builder.tempdir()?,
        };
        let work_path = tmp_dir.path().join(file_name);

        if !start_empty {
            // flush our own connections so the copy sees committed pages only
            self.reset_pool();
            fs::copy(&original, &work_path)?;
        }

        let work_db = SchemaDatabase::new(&work_path);
        work_db.set_scratch_dir(self.scratch_dir.borrow().clone());
        let result = f(&work_db);
        work_db.reset_pool();
        let value = result?;

        if copy_results {
            self.reset_pool();
            copy_back(&work_path, &original)?;
            info!("Committed working copy to '{}'", original.display());
        }

        if let Err(e) = tmp_dir.close() {
            warn!("Could not remove scratch directory: {}", e);
        }
        Ok(value)
    }
}

fn copy_back(work_path: &Path, original: &Path) -> Result<(), SchemaError> {
    fs::copy(work_path, original)?;
    Ok(())
}
