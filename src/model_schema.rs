//! Entry point for upgrading, validating and inspecting a schematisation.

use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

use log::{error, info, warn, Level};
use logging_timer::timer;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};

use crate::config::Config;
use crate::constants::{
    Format, EPSG_BOUNDARY_VERSION, EPSG_OVERRIDE_SETTINGS_ID, LAST_SPTL_SCHEMA_VERSION,
    LATEST_SOUTH_MIGRATION_ID,
};
use crate::convert;
use crate::copy::{copy_models, get_spatialite_version};
use crate::database::{quote_ident, table_exists, SchemaDatabase};
use crate::error::{ErrorKind, SchemaError, SchemaWarning};
use crate::ledger;
use crate::models::{ModelDef, DECLARED_MODELS, GEOMETRY_COLUMN};
use crate::progress::{ProgressFn, ProgressHandler};
use crate::schema::{self, Migration, StepContext};
use crate::spatial::geopackage::layer_srs;
use crate::spatial::index::ensure_spatial_indexes;
use crate::spatial::metadata::geometry_columns;
use crate::spatial::raster::{raster_epsg, resolve_raster_path};

/// Last revision that still keeps an explicit `epsg_code` setting.
const LAST_EXPLICIT_EPSG_VERSION: i64 = EPSG_BOUNDARY_VERSION - 1;

/// First revision with the `model_settings` table.
const MODEL_SETTINGS_VERSION: i64 = 222;

// ============================================================================
// Revision argument
// ============================================================================

/// Requested target of an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Revision {
    #[default]
    Head,
    Number(i64),
}

impl Revision {
    pub fn resolve(self) -> i64 {
        match self {
            Revision::Head => schema::head(),
            Revision::Number(n) => n,
        }
    }
}

impl FromStr for Revision {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "head" {
            return Ok(Revision::Head);
        }
        trimmed
            .parse::<i64>()
            .map(Revision::Number)
            .map_err(|_| SchemaError::BadRevisionArgument(s.to_string()))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Head => f.write_str("head"),
            Revision::Number(n) => f.write_str(&ledger::format_revision(*n)),
        }
    }
}

// ============================================================================
// Upgrade options
// ============================================================================

pub struct UpgradeOptions {
    pub revision: Revision,
    /// Work on a copy and only replace the file when every step succeeded.
    pub backup: bool,
    /// Rebuild SpatiaLite 3 files with the current catalog layout.
    pub upgrade_spatialite_version: bool,
    pub progress_func: Option<ProgressFn>,
    /// Model CRS used by the reprojection step when the file has none.
    pub epsg_code_override: Option<i32>,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        UpgradeOptions {
            revision: Revision::Head,
            backup: true,
            upgrade_spatialite_version: false,
            progress_func: None,
            epsg_code_override: None,
        }
    }
}

// ============================================================================
// ModelSchema
// ============================================================================

pub struct ModelSchema {
    db: SchemaDatabase,
    declared_models: &'static [ModelDef],
    default_epsg: i32,
    warnings: RefCell<Vec<SchemaWarning>>,
}

impl ModelSchema {
    pub fn new(db: SchemaDatabase) -> Self {
        Self::with_models(db, DECLARED_MODELS)
    }

    pub fn with_models(db: SchemaDatabase, declared_models: &'static [ModelDef]) -> Self {
        ModelSchema {
            db,
            declared_models,
            default_epsg: Config::default_epsg(),
            warnings: RefCell::new(Vec::new()),
        }
    }

    pub fn db(&self) -> &SchemaDatabase {
        &self.db
    }

    fn warn(&self, warning: SchemaWarning) {
        warn!("{}", warning);
        self.warnings.borrow_mut().push(warning);
    }

    /// Warnings raised since the last call.
    pub fn take_warnings(&self) -> Vec<SchemaWarning> {
        self.warnings.take()
    }

    pub fn get_version(&self) -> Result<Option<i64>, SchemaError> {
        let conn = self.db.get_connection()?;
        ledger::read_version(&conn)
    }

    /// Head revision known to this library.
    pub fn get_schema_version(&self) -> i64 {
        schema::head()
    }

    pub fn get_upgrade_steps_count(&self, current: Option<i64>, target: Revision) -> usize {
        schema::get_upgrade_steps_count(current, target.resolve())
    }

    pub fn is_spatialite(&self) -> Result<bool, SchemaError> {
        self.db.has_table("spatial_ref_sys")
    }

    pub fn is_geopackage(&self) -> Result<bool, SchemaError> {
        self.db.has_table("gpkg_contents")
    }

    // ========================================================================
    // Upgrade
    // ========================================================================

    /// Brings the file to `options.revision`.
    ///
    /// Files still on a legacy version below 160 are refused, as are files
    /// whose storage flavour does not match their revision. Steps up to the
    /// last SpatiaLite revision run on the SpatiaLite file; a target beyond
    /// it converts the file to GeoPackage first.
    pub fn upgrade(&self, options: UpgradeOptions) -> Result<(), SchemaError> {
        let UpgradeOptions {
            revision,
            backup,
            upgrade_spatialite_version,
            progress_func,
            epsg_code_override,
        } = options;
        let rev_nr = revision.resolve();
        let version = self.get_version()?;
        self.check_upgrade_allowed(version)?;

        let _tmr = timer!(Level::Debug; "ModelSchema::upgrade", "{:?} -> {}", version, revision);
        let mut progress = progress_func.map(|func| {
            ProgressHandler::new(func, schema::get_upgrade_steps_count(version, rev_nr))
        });

        if let Some(epsg) = epsg_code_override {
            self.upgrade_with_epsg(epsg, version, rev_nr, backup, &mut progress)?;
        }

        self.run_upgrade(rev_nr.min(LAST_SPTL_SCHEMA_VERSION), backup, &mut progress)?;
        if rev_nr <= LAST_SPTL_SCHEMA_VERSION {
            if upgrade_spatialite_version {
                self.upgrade_spatialite_version()?;
            }
        } else {
            self.convert_to_geopackage()?;
            self.run_upgrade(rev_nr, backup, &mut progress)?;
        }

        if let Some(handler) = progress.as_mut() {
            handler.finish();
        }
        Ok(())
    }

    fn check_upgrade_allowed(&self, version: Option<i64>) -> Result<(), SchemaError> {
        let Some(v) = version else {
            return Ok(());
        };
        if v < LATEST_SOUTH_MIGRATION_ID {
            return Err(SchemaError::LegacyBlocked {
                version: v,
                floor: LATEST_SOUTH_MIGRATION_ID,
            });
        }
        if v <= LAST_SPTL_SCHEMA_VERSION && !self.is_spatialite()? {
            return Err(SchemaError::FormatMismatch {
                version: v,
                expected: Format::Spatialite,
            });
        }
        if v > LAST_SPTL_SCHEMA_VERSION && !self.is_geopackage()? {
            return Err(SchemaError::FormatMismatch {
                version: v,
                expected: Format::Geopackage,
            });
        }
        Ok(())
    }

    /// Runs the steps up to `target`, on a working copy when `backup` is set.
    fn run_upgrade(
        &self,
        target: i64,
        backup: bool,
        progress: &mut Option<ProgressHandler>,
    ) -> Result<(), SchemaError> {
        self.run_steps(target, backup, progress, None)
    }

    /// Runs the steps up to `target`. With `epsg_override` the code is
    /// written into the settings first and taken out again afterwards, in
    /// the same working copy as the steps themselves.
    fn run_steps(
        &self,
        target: i64,
        backup: bool,
        progress: &mut Option<ProgressHandler>,
        epsg_override: Option<i32>,
    ) -> Result<(), SchemaError> {
        let mut ctx = StepContext::new(self.default_epsg);
        let mut on_step = |step: &Migration| {
            if let Some(handler) = progress.as_mut() {
                handler.step_started(step);
            }
        };
        let mut run = |db: &SchemaDatabase| -> Result<usize, SchemaError> {
            let conn = db.get_connection()?;
            let Some(epsg) = epsg_override else {
                return schema::run_upgrade(&conn, target, &mut ctx, &mut on_step);
            };
            let applied = set_custom_epsg_code(&conn, epsg)?;
            match schema::run_upgrade(&conn, target, &mut ctx, &mut on_step) {
                Ok(steps) => {
                    applied.finish(&conn)?;
                    Ok(steps)
                }
                Err(e) => {
                    if let Err(undo_err) = applied.undo(&conn) {
                        error!("Could not undo the epsg_code override: {}", undo_err);
                    }
                    Err(e)
                }
            }
        };
        let steps = if backup {
            self.db.file_transaction(false, true, run)?
        } else {
            run(&self.db)?
        };
        if steps > 0 {
            info!("Applied {} upgrade step(s), now at {}", steps, ledger::format_revision(target));
        }
        self.warnings.borrow_mut().extend(ctx.warnings);
        Ok(())
    }

    /// Carries an explicit EPSG code across the reprojection step.
    ///
    /// Only applies when the file is at or below the last revision with an
    /// explicit code and the target is at or beyond the reprojection step.
    fn upgrade_with_epsg(
        &self,
        epsg: i32,
        version: Option<i64>,
        rev_nr: i64,
        backup: bool,
        progress: &mut Option<ProgressHandler>,
    ) -> Result<(), SchemaError> {
        if matches!(version, Some(v) if v > LAST_EXPLICIT_EPSG_VERSION) {
            self.warn(SchemaWarning::EpsgOverrideIgnored(
                "Cannot set epsg_code_override when upgrading from 230 or newer".to_string(),
            ));
            return Ok(());
        }
        if rev_nr < EPSG_BOUNDARY_VERSION {
            self.warn(SchemaWarning::EpsgOverrideIgnored(
                "Cannot set epsg_code_override when upgrading to 229 or older".to_string(),
            ));
            return Ok(());
        }
        if version.is_none_or(|v| v < LAST_EXPLICIT_EPSG_VERSION) {
            self.run_upgrade(LAST_EXPLICIT_EPSG_VERSION, backup, progress)?;
        }
        self.run_steps(EPSG_BOUNDARY_VERSION, backup, progress, Some(epsg))
    }

    // ========================================================================
    // Validation and indexes
    // ========================================================================

    /// True when the file is at the head revision. A newer file is accepted
    /// with a warning.
    pub fn validate_schema(&self) -> Result<bool, SchemaError> {
        let version = self.get_version()?;
        let schema_version = self.get_schema_version();
        match version {
            Some(v) if v >= schema_version => {
                if v > schema_version {
                    self.warn(SchemaWarning::VersionAhead {
                        version: v,
                        schema_version,
                    });
                }
                Ok(true)
            }
            _ => Err(SchemaError::MigrationMissing(format!(
                "This tool requires at least schema version {}. Current version: {}.",
                schema_version,
                display_version(version)
            ))),
        }
    }

    /// Re-creates missing spatial indexes. The file must be exactly at head.
    pub fn set_spatial_indexes(&self) -> Result<usize, SchemaError> {
        let version = self.get_version()?;
        let schema_version = self.get_schema_version();
        if version != Some(schema_version) {
            return Err(SchemaError::MigrationMissing(format!(
                "This tool requires schema version {}. Current version: {}.",
                schema_version,
                display_version(version)
            )));
        }
        ensure_spatial_indexes(&self.db, self.declared_models)
    }

    // ========================================================================
    // Storage flavour
    // ========================================================================

    /// Converts a SpatiaLite file to GeoPackage, upgrading it to the last
    /// SpatiaLite revision first. Nothing happens for a GeoPackage.
    pub fn convert_to_geopackage(&self) -> Result<(), SchemaError> {
        if self.is_geopackage()? {
            return Ok(());
        }
        let version = self.get_version()?;
        match version {
            Some(v) if v > LAST_SPTL_SCHEMA_VERSION => {
                return Err(SchemaError::UpgradeFailed(format!(
                    "Cannot convert schema version {} to geopackage",
                    v
                )));
            }
            Some(v) if v == LAST_SPTL_SCHEMA_VERSION => {}
            _ => self.upgrade(UpgradeOptions {
                revision: Revision::Number(LAST_SPTL_SCHEMA_VERSION),
                backup: false,
                ..UpgradeOptions::default()
            })?,
        }
        if let Some(warning) = convert::convert_to_geopackage(&self.db, self.declared_models)? {
            self.warnings.borrow_mut().push(warning);
        }
        Ok(())
    }

    /// Rebuilds a SpatiaLite 3 file with the current catalog layout.
    ///
    /// The file must be at the last SpatiaLite revision. Its rows are copied
    /// into a freshly built file, so constraint violations fail the rebuild.
    pub fn upgrade_spatialite_version(&self) -> Result<(), SchemaError> {
        let (lib_version, file_version) = get_spatialite_version(&self.db)?;
        if file_version != 3 || !matches!(lib_version, 4 | 5) {
            return Ok(());
        }
        let version = self.get_version()?;
        if version != Some(LAST_SPTL_SCHEMA_VERSION) {
            return Err(SchemaError::MigrationMissing(format!(
                "This tool requires schema version {}. Current version: {}.",
                LAST_SPTL_SCHEMA_VERSION,
                display_version(version)
            )));
        }

        let _tmr = timer!(Level::Debug; "upgrade_spatialite_version");
        self.db.file_transaction(true, true, |work| {
            let mut ctx = StepContext::new(self.default_epsg);
            let srid = self.source_srid()?;
            {
                let conn = work.get_connection()?;
                let first = schema::head().min(LAST_EXPLICIT_EPSG_VERSION);
                schema::run_upgrade(&conn, first, &mut ctx, &mut |_| {})?;
                conn.execute("INSERT INTO model_settings (epsg_code) VALUES (?1)", [srid])?;
                if schema::head() > LAST_EXPLICIT_EPSG_VERSION {
                    schema::run_upgrade(&conn, LAST_SPTL_SCHEMA_VERSION, &mut ctx, &mut |_| {})?;
                }
                conn.execute("DELETE FROM model_settings", [])?;
            }
            copy_models(&self.db, work, self.declared_models).map_err(|e| {
                if e.is_integrity_error() {
                    SchemaError::UpgradeFailed(e.to_string())
                } else {
                    e
                }
            })?;
            self.warnings.borrow_mut().extend(ctx.warnings);
            Ok(())
        })?;
        info!("Rebuilt '{}' with the current spatial catalogs", self.db.path().display());
        Ok(())
    }

    /// SRID of the first `geom` column registered in the file.
    fn source_srid(&self) -> Result<i32, SchemaError> {
        let conn = self.db.get_connection()?;
        geometry_columns(&conn)?
            .into_iter()
            .find(|g| g.column.eq_ignore_ascii_case(GEOMETRY_COLUMN))
            .map(|g| g.srid)
            .ok_or_else(|| {
                SchemaError::UpgradeFailed("Cannot determine the SRID: no geometry columns found".to_string())
            })
    }

    // ========================================================================
    // Reference systems
    // ========================================================================

    /// Model CRS and where it was found.
    ///
    /// Before the reprojection step the code is read from the settings, at
    /// the reprojection step from the first stored geometry, and afterwards
    /// from the node layer of the GeoPackage. `None` means no code could be
    /// found.
    pub fn get_epsg_data(&self) -> Result<(Option<i32>, String), SchemaError> {
        let version = self.get_version()?;
        let conn = self.db.get_connection()?;
        match version {
            None => Ok((None, String::new())),
            Some(v) if v < EPSG_BOUNDARY_VERSION => {
                let table = if v < MODEL_SETTINGS_VERSION {
                    "v2_global_settings"
                } else {
                    "model_settings"
                };
                match model_srid(&conn, table) {
                    Ok(code) => Ok((Some(code), format!("{}.epsg_code", table))),
                    Err(e) if e.kind() == ErrorKind::InvalidSrid => Ok((None, String::new())),
                    Err(e) => Err(e),
                }
            }
            Some(v) if v == LAST_SPTL_SCHEMA_VERSION => {
                for model in self.declared_models.iter().filter(|m| m.geometry.is_some()) {
                    if let Some(srid) = first_geometry_srid(&conn, model.table)? {
                        return Ok((Some(srid), format!("{}.{}", model.table, GEOMETRY_COLUMN)));
                    }
                }
                Ok((None, String::new()))
            }
            Some(_) => match layer_srs(&conn, "connection_node")? {
                Some(srid) if srid > 0 => Ok((Some(srid), String::new())),
                other => Err(SchemaError::invalid_srid(
                    display_version(other.map(i64::from)),
                    "the epsg_code must be an integer",
                )),
            },
        }
    }

    pub fn epsg_code(&self) -> Result<Option<i32>, SchemaError> {
        Ok(self.get_epsg_data()?.0)
    }

    pub fn epsg_source(&self) -> Result<String, SchemaError> {
        Ok(self.get_epsg_data()?.1)
    }

    /// EPSG code of the DEM, either `raster_path` or the one in the settings.
    /// Rasters are looked up in the `rasters` directory next to the file.
    pub fn get_dem_epsg(&self, raster_path: Option<&str>) -> Result<i32, SchemaError> {
        let raster = match raster_path.filter(|p| !p.trim().is_empty()) {
            Some(path) => path.to_string(),
            None => self
                .dem_file()?
                .ok_or_else(|| SchemaError::invalid_srid("None", "no DEM is provided"))?,
        };
        let path = resolve_raster_path(&self.db.path(), &raster);
        raster_epsg(&path)
    }

    fn dem_file(&self) -> Result<Option<String>, SchemaError> {
        let table = match self.get_version()? {
            Some(v) if v < MODEL_SETTINGS_VERSION => "v2_global_settings",
            _ => "model_settings",
        };
        let conn = self.db.get_connection()?;
        if !table_exists(&conn, table)? {
            return Ok(None);
        }
        let dem: Option<Option<String>> = conn
            .query_row(&format!("SELECT dem_file FROM {} LIMIT 1", table), [], |r| r.get(0))
            .optional()?;
        Ok(dem.flatten().filter(|d| !d.trim().is_empty()))
    }
}

fn display_version(version: Option<i64>) -> String {
    version.map_or_else(|| "None".to_string(), |v| v.to_string())
}

/// The `epsg_code` stored in the first row of `table`.
fn model_srid(conn: &Connection, table: &str) -> Result<i32, SchemaError> {
    let value: Option<Value> = conn
        .query_row(&format!("SELECT epsg_code FROM {}", quote_ident(table)), [], |r| r.get(0))
        .optional()?;
    match value {
        None | Some(Value::Null) => Err(SchemaError::invalid_srid("None", "no epsg_code is defined")),
        Some(Value::Integer(code)) => i32::try_from(code)
            .map_err(|_| SchemaError::invalid_srid(code, "the epsg_code must be an integer")),
        Some(Value::Text(text)) => text
            .trim()
            .parse::<i32>()
            .map_err(|_| SchemaError::invalid_srid(&text, "the epsg_code must be an integer")),
        Some(other) => Err(SchemaError::invalid_srid(
            format!("{:?}", other),
            "the epsg_code must be an integer",
        )),
    }
}

fn first_geometry_srid(conn: &Connection, table: &str) -> Result<Option<i32>, SchemaError> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }
    let srid: Option<Option<i32>> = conn
        .query_row(
            &format!(
                "SELECT ST_SRID({col}) FROM {table} WHERE {col} IS NOT NULL LIMIT 1",
                col = GEOMETRY_COLUMN,
                table = quote_ident(table)
            ),
            [],
            |r| r.get(0),
        )
        .optional()?;
    Ok(srid.flatten())
}

/// Settings rows touched by an EPSG override, kept so the change can be
/// reverted.
#[derive(Debug)]
enum EpsgOverride {
    /// A temporary settings row was added to an empty model.
    Inserted,
    /// Existing rows got the code; their previous values by id.
    Updated(Vec<(i64, Value)>),
}

impl EpsgOverride {
    /// Removes the temporary row once the reprojection step is done.
    fn finish(&self, conn: &Connection) -> Result<(), SchemaError> {
        if matches!(self, EpsgOverride::Inserted) && table_exists(conn, "model_settings")? {
            conn.execute(
                "DELETE FROM model_settings WHERE id = ?1",
                [EPSG_OVERRIDE_SETTINGS_ID],
            )?;
        }
        Ok(())
    }

    /// Puts the settings back the way they were before the override.
    fn undo(&self, conn: &Connection) -> Result<(), SchemaError> {
        match self {
            EpsgOverride::Inserted => self.finish(conn),
            EpsgOverride::Updated(previous) => {
                let mut restore = conn.prepare("UPDATE model_settings SET epsg_code = ?1 WHERE id = ?2")?;
                for (id, value) in previous {
                    restore.execute(rusqlite::params![value, id])?;
                }
                Ok(())
            }
        }
    }
}

fn set_custom_epsg_code(conn: &Connection, epsg: i32) -> Result<EpsgOverride, SchemaError> {
    let version = ledger::read_version(conn)?;
    if !matches!(version, Some(v) if (MODEL_SETTINGS_VERSION..=LAST_EXPLICIT_EPSG_VERSION).contains(&v)) {
        return Err(SchemaError::UpgradeFailed(format!(
            "Cannot set epsg code for revision {:?}",
            version
        )));
    }
    let previous: Vec<(i64, Value)> = conn
        .prepare("SELECT id, epsg_code FROM model_settings ORDER BY id")?
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<_, _>>()?;
    let applied = if previous.is_empty() {
        // an empty model needs a settings row to carry the code
        conn.execute(
            "INSERT INTO model_settings (id, epsg_code) VALUES (?1, ?2)",
            [EPSG_OVERRIDE_SETTINGS_ID, i64::from(epsg)],
        )?;
        EpsgOverride::Inserted
    } else {
        conn.execute("UPDATE model_settings SET epsg_code = ?1", [epsg])?;
        EpsgOverride::Updated(previous)
    };
    info!("Using EPSG:{} for the reprojection step", epsg);
    Ok(applied)
}
