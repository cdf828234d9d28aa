use super::Migration;

/// First revision stored as GeoPackage. The conversion itself is done by the
/// orchestrator between 0230 and this step, so the step only moves the ledger.
pub const MIGRATION: Migration = Migration::marker(300, Some(230), "Convert to GeoPackage");
