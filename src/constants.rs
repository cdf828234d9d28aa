use strum::{Display, EnumString};

/// Table holding the single current revision row.
pub const VERSION_TABLE_NAME: &str = "schema_version";

/// History table written by the pre-revision-ledger tooling.
pub const LEGACY_HISTORY_TABLE_NAME: &str = "south_migrationhistory";

/// Oldest legacy version the root step can still bring forward.
pub const LATEST_SOUTH_MIGRATION_ID: i64 = 160;

/// Legacy version at which the root step's own legacy steps end.
pub const LAST_SOUTH_MIGRATION_ID: i64 = 174;

/// Revision of the root step.
pub const MIN_SCHEMA_VERSION: i64 = 200;

/// Last revision stored as SpatiaLite; everything above is GeoPackage.
pub const LAST_SPTL_SCHEMA_VERSION: i64 = 230;

/// Revision whose step reprojects geometries into the model CRS.
pub const EPSG_BOUNDARY_VERSION: i64 = 230;

/// Settings row id that carries a temporary EPSG override.
pub const EPSG_OVERRIDE_SETTINGS_ID: i64 = 99999;

/// CRS the legacy tables store their geometries in.
pub const LEGACY_SRID: i32 = 4326;

/// Physical flavour of a SQLite file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum Format {
    #[strum(serialize = "SpatiaLite")]
    Spatialite,
    #[strum(serialize = "GeoPackage")]
    Geopackage,
    #[strum(serialize = "unknown")]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum FrictionType {
    Chezy = 1,
    Manning = 2,
    ChezyConveyance = 3,
    ManningConveyance = 4,
}

/// Cross section shapes. Tabulated shapes carry a profile table instead of a
/// width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossSectionShape {
    ClosedRectangle,
    Rectangle,
    Circle,
    Egg,
    TabulatedRectangle,
    TabulatedTrapezium,
    TabulatedYz,
    InvertedEgg,
}

impl CrossSectionShape {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::ClosedRectangle),
            1 => Some(Self::Rectangle),
            2 => Some(Self::Circle),
            3 => Some(Self::Egg),
            5 => Some(Self::TabulatedRectangle),
            6 => Some(Self::TabulatedTrapezium),
            7 => Some(Self::TabulatedYz),
            8 => Some(Self::InvertedEgg),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::ClosedRectangle => 0,
            Self::Rectangle => 1,
            Self::Circle => 2,
            Self::Egg => 3,
            Self::TabulatedRectangle => 5,
            Self::TabulatedTrapezium => 6,
            Self::TabulatedYz => 7,
            Self::InvertedEgg => 8,
        }
    }

    pub fn is_tabulated(self) -> bool {
        matches!(
            self,
            Self::TabulatedRectangle | Self::TabulatedTrapezium | Self::TabulatedYz
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflowType {
    NoInflow = 0,
    ImperviousSurface = 1,
    Surface = 2,
}

impl InflowType {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => Self::ImperviousSurface,
            Some(2) => Self::Surface,
            _ => Self::NoInflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_shape_codes_round_trip() {
        for code in [0, 1, 2, 3, 5, 6, 7, 8] {
            let shape = CrossSectionShape::from_code(code).unwrap();
            assert_eq!(shape.code(), code);
        }
        assert!(CrossSectionShape::from_code(4).is_none());
        assert!(CrossSectionShape::TabulatedYz.is_tabulated());
        assert!(!CrossSectionShape::Circle.is_tabulated());
    }

    #[test]
    fn test_format_display() {
        assert_eq!(Format::Geopackage.to_string(), "GeoPackage");
        assert_eq!(Format::from_str("SpatiaLite").unwrap(), Format::Spatialite);
    }
}
