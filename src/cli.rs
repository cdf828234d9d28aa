use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{debug, info};
use serde::Serialize;

use crate::config::Config;
use crate::database::SchemaDatabase;
use crate::error::SchemaError;
use crate::model_schema::{ModelSchema, Revision, UpgradeOptions};

#[derive(Parser)]
#[command(
    name = "threedi-schema",
    version,
    about = "Upgrade and inspect 3Di schematisation files"
)]
pub struct Cli {
    /// Path to the schematisation (.sqlite or .gpkg)
    #[arg(long = "sqlite", short = 's')]
    pub sqlite: PathBuf,

    /// Print the result as JSON
    #[arg(long = "json", global = true, default_value_t = false)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Upgrade the schematisation to a newer revision
    Migrate {
        /// Target revision, 'head' or a number
        #[arg(long = "revision", short = 'r', default_value = "head", value_parser = parse_revision)]
        revision: Revision,

        /// Upgrade a working copy and only replace the file on success (default from config)
        #[arg(long = "backup", overrides_with = "no_backup", default_value_t = false)]
        backup: bool,

        /// Upgrade the file in place
        #[arg(long = "no-backup", default_value_t = false)]
        no_backup: bool,

        /// Rebuild SpatiaLite 3 files with the current catalog layout
        #[arg(long = "upgrade-spatialite-version", default_value_t = false)]
        upgrade_spatialite_version: bool,

        /// Convert to GeoPackage after upgrading
        #[arg(long = "convert-to-geopackage", default_value_t = false)]
        convert_to_geopackage: bool,

        /// EPSG code to assume when the file does not carry one
        #[arg(long = "epsg")]
        epsg: Option<i32>,
    },

    /// Re-create missing spatial indexes
    Index,

    /// Check that the schematisation is at the latest revision
    Validate,

    /// Print the stored and the latest revision
    Version,

    /// Print the model CRS, or the CRS of a DEM
    Epsg {
        /// DEM raster to inspect instead of the model
        #[arg(long = "dem", num_args = 0..=1, default_missing_value = "")]
        dem: Option<String>,
    },
}

fn parse_revision(s: &str) -> Result<Revision, String> {
    s.parse::<Revision>().map_err(|e| e.to_string())
}

/// Result of a command, printed as text or JSON.
#[derive(Serialize, Debug, Default, PartialEq)]
pub struct CommandReport {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub schema_version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexes_created: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epsg_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epsg_source: Option<String>,
    pub warnings: Vec<String>,
}

impl CommandReport {
    fn print_text(&self) {
        println!("File: {}", self.path);
        match self.version {
            Some(v) => println!("Version: {} (latest {})", v, self.schema_version),
            None => println!("Version: none (latest {})", self.schema_version),
        }
        if let Some(valid) = self.valid {
            println!("Valid: {}", valid);
        }
        if let Some(count) = self.indexes_created {
            println!("Spatial indexes created: {}", count);
        }
        if let Some(code) = self.epsg_code {
            match self.epsg_source.as_deref() {
                Some(source) if !source.is_empty() => println!("EPSG: {} ({})", code, source),
                _ => println!("EPSG: {}", code),
            }
        }
        for warning in &self.warnings {
            println!("Warning: {}", warning);
        }
    }
}

impl Cli {
    pub fn handle_command_line() -> Result<(), SchemaError> {
        let args = Cli::parse();
        let json = args.json;
        let report = args.execute()?;

        if json {
            let out = serde_json::to_string_pretty(&report)
                .map_err(|e| SchemaError::Error(format!("Failed to serialize report: {}", e)))?;
            println!("{}", out);
        } else {
            report.print_text();
        }
        Ok(())
    }

    pub fn execute(self) -> Result<CommandReport, SchemaError> {
        let config = Config::current();
        let db = SchemaDatabase::new(&self.sqlite);
        db.set_scratch_dir(config.upgrade.temp_dir());
        db.check_connection()?;
        let schema = ModelSchema::new(db);
        debug!("Opened '{}'", self.sqlite.display());

        let mut report = CommandReport {
            schema_version: schema.get_schema_version(),
            ..CommandReport::default()
        };

        match self.command {
            Command::Migrate {
                revision,
                backup,
                no_backup,
                upgrade_spatialite_version,
                convert_to_geopackage,
                epsg,
            } => {
                let backup = if no_backup {
                    false
                } else {
                    backup || config.upgrade.backup
                };
                let options = UpgradeOptions {
                    revision,
                    backup,
                    upgrade_spatialite_version: upgrade_spatialite_version
                        || config.upgrade.upgrade_spatialite_version,
                    progress_func: Some(Box::new(|percentage, message| {
                        info!("{:5.1}% {}", percentage, message);
                    })),
                    epsg_code_override: epsg,
                };
                schema.upgrade(options)?;
                if convert_to_geopackage {
                    schema.convert_to_geopackage()?;
                }
            }
            Command::Index => {
                report.indexes_created = Some(schema.set_spatial_indexes()?);
            }
            Command::Validate => {
                report.valid = Some(schema.validate_schema()?);
            }
            Command::Version => {}
            Command::Epsg { dem: Some(dem) } => {
                let raster = (!dem.is_empty()).then_some(dem.as_str());
                report.epsg_code = Some(schema.get_dem_epsg(raster)?);
                report.epsg_source = Some(raster.map_or_else(|| "dem_file".to_string(), str::to_string));
            }
            Command::Epsg { dem: None } => {
                let (code, source) = schema.get_epsg_data()?;
                report.epsg_code = code;
                report.epsg_source = Some(source);
            }
        }

        report.path = schema.db().path().display().to_string();
        report.version = schema.get_version()?;
        report.warnings = schema
            .take_warnings()
            .iter()
            .map(|w| w.to_string())
            .collect();
        Ok(report)
    }
}
