//! Spatial support: geometry model, blob codecs, reference systems, SQL
//! functions, catalogs and indexes for both storage flavours.

pub mod codec;
pub mod crs;
pub mod functions;
pub mod geometry;
pub mod geopackage;
pub mod index;
pub mod metadata;
pub mod raster;

pub use geometry::{Coord, Geometry, GeometryKind};
