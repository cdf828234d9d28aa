//! Schema migration engine for 3Di schematisation files.
//!
//! A schematisation is a SQLite file holding a hydraulic model. Older files
//! use SpatiaLite storage, newer ones are GeoPackages. [`ModelSchema`] brings
//! a file of any supported revision forward to the latest one, converting
//! the storage flavour on the way when needed.

pub mod cli;
pub mod config;
pub mod constants;
pub mod convert;
pub mod copy;
pub mod database;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model_schema;
pub mod models;
pub mod progress;
pub mod schema;
pub mod spatial;

#[cfg(test)]
mod test_support;

pub use constants::Format;
pub use database::SchemaDatabase;
pub use error::{ErrorKind, SchemaError, SchemaWarning};
pub use model_schema::{ModelSchema, Revision, UpgradeOptions};
pub use models::{ModelDef, DECLARED_MODELS};
