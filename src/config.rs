use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::spatial::crs;

pub static CONFIG: OnceCell<Config> = OnceCell::new();

const ENV_PREFIX: &str = "THREEDI_SCHEMA_";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub threedi_schema: String,
    /// Directory for log files; logging goes to stderr when unset.
    pub directory: Option<String>,
    pub keep_files: usize,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const THREEDI_SCHEMA_LEVEL: &str = "info";
    const KEEP_FILES: usize = 5;

    fn default() -> Self {
        LoggingConfig {
            threedi_schema: Self::THREEDI_SCHEMA_LEVEL.to_string(),
            directory: None,
            keep_files: Self::KEEP_FILES,
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.threedi_schema.clone();
        self.threedi_schema = self.threedi_schema.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.threedi_schema.as_str()) {
            eprintln!(
                "Config error: threedi_schema log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::THREEDI_SCHEMA_LEVEL
            );
            self.threedi_schema = Self::THREEDI_SCHEMA_LEVEL.to_owned();
        }

        if self.keep_files == 0 {
            eprintln!(
                "Config error: keep_files must be at least 1 - using default of {}",
                Self::KEEP_FILES
            );
            self.keep_files = Self::KEEP_FILES;
        }

        if matches!(&self.directory, Some(dir) if dir.trim().is_empty()) {
            self.directory = None;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UpgradeConfig {
    pub backup: bool,
    pub upgrade_spatialite_version: bool,
    /// Where working copies are made; empty means the system temp dir.
    pub temp_dir: String,
}

impl UpgradeConfig {
    fn default() -> Self {
        UpgradeConfig {
            backup: true,
            upgrade_spatialite_version: false,
            temp_dir: String::new(),
        }
    }

    pub fn temp_dir(&self) -> Option<PathBuf> {
        let trimmed = self.temp_dir.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }

    fn ensure_valid(&mut self) {
        if let Some(dir) = self.temp_dir() {
            if !dir.is_dir() {
                eprintln!(
                    "Config error: temp_dir '{}' is not a directory - using the system temp dir",
                    dir.display()
                );
                self.temp_dir = String::new();
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpatialConfig {
    /// Metric CRS assumed when a legacy model carries no EPSG code.
    pub default_epsg: i32,
}

impl SpatialConfig {
    const DEFAULT_EPSG: i32 = 28992;

    fn default() -> Self {
        SpatialConfig {
            default_epsg: Self::DEFAULT_EPSG,
        }
    }

    fn ensure_valid(&mut self) {
        if let Err(e) = crs::validate_model_crs(self.default_epsg) {
            eprintln!(
                "Config error: default_epsg of {} is unusable ({}) - using default of {}",
                self.default_epsg,
                e,
                Self::DEFAULT_EPSG
            );
            self.default_epsg = Self::DEFAULT_EPSG;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub logging: LoggingConfig,
    pub upgrade: UpgradeConfig,
    pub spatial: SpatialConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            logging: LoggingConfig::default(),
            upgrade: UpgradeConfig::default(),
            spatial: SpatialConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file located in the app's data directory.
    /// If the file is missing or fails to parse, defaults are used.
    /// Additionally, writes the default config to disk if no file exists.
    pub fn load_config(project_dirs: &ProjectDirs) -> Self {
        let config_path = project_dirs.data_local_dir().join("config.toml");

        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!(
                        "Failed to create configuration directory {}: {}",
                        parent.display(),
                        e
                    );
                }
            }
            if let Ok(toml_string) = toml::to_string_pretty(&Config::default()) {
                if let Err(e) = fs::write(&config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            } else {
                eprintln!("Failed to serialize default config.");
            }
        }

        Self::load_from(&config_path)
    }

    /// Defaults, then the TOML file at `config_path`, then the environment.
    pub fn load_from(config_path: &Path) -> Self {
        let default_config = Config::default();
        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    /// The loaded configuration, or the defaults when none was loaded.
    pub fn current() -> Config {
        CONFIG.get().cloned().unwrap_or_default()
    }

    pub fn default_epsg() -> i32 {
        CONFIG
            .get()
            .map_or(SpatialConfig::DEFAULT_EPSG, |c| c.spatial.default_epsg)
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.upgrade.ensure_valid();
        self.spatial.ensure_valid();
    }
}
