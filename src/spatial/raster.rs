//! EPSG detection for DEM rasters stored next to a schematisation.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use tiff::decoder::Decoder;
use tiff::tags::Tag;

use crate::error::SchemaError;

const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const USER_DEFINED: u16 = 32767;

/// Resolves a raster reference stored in the settings table.
///
/// Old files store `rasters/dem.tif`, newer ones just `dem.tif`, sometimes
/// with Windows separators. Both resolve to `<db dir>/rasters/<basename>`;
/// when that does not exist the reference is tried relative to the db dir.
pub fn resolve_raster_path(db_path: &Path, raster: &str) -> PathBuf {
    let normalized = raster.replace('\\', "/");
    let directory = db_path.parent().unwrap_or_else(|| Path::new(""));
    let basename = normalized.rsplit('/').next().unwrap_or(&normalized);
    let candidate = directory.join("rasters").join(basename);
    if candidate.exists() {
        return candidate;
    }
    let relative = directory.join(&normalized);
    if relative.exists() {
        relative
    } else {
        candidate
    }
}

fn not_a_geotiff(e: impl std::fmt::Display) -> SchemaError {
    SchemaError::invalid_srid("None", format!("the DEM is not a GeoTIFF: {}", e))
}

/// Reads the EPSG code from the GeoKey directory of a (Big)TIFF.
///
/// Only the first directory is read; pixel data is never touched.
pub fn geotiff_epsg<R: Read + Seek>(reader: R) -> Result<Option<i32>, SchemaError> {
    let mut decoder = Decoder::new(reader).map_err(not_a_geotiff)?;
    let Some(value) = decoder
        .find_tag(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY))
        .map_err(not_a_geotiff)?
    else {
        return Ok(None);
    };
    let keys = value.into_u16_vec().map_err(not_a_geotiff)?;
    let Some(&count) = keys.get(3) else {
        return Ok(None);
    };
    let lookup = |wanted: u16| -> Option<u16> {
        (0..count as usize).find_map(|i| {
            let entry = keys.get(4 + i * 4..8 + i * 4)?;
            // location 0 means the value is stored inline
            (entry[0] == wanted && entry[1] == 0).then_some(entry[3])
        })
    };
    Ok([KEY_PROJECTED_CS_TYPE, KEY_GEOGRAPHIC_TYPE]
        .into_iter()
        .filter_map(lookup)
        .find(|code| *code != USER_DEFINED && *code != 0)
        .map(i32::from))
}

pub fn raster_epsg(path: &Path) -> Result<i32, SchemaError> {
    let file = File::open(path).map_err(|e| {
        SchemaError::invalid_srid(
            "None",
            format!("cannot open filepath {}: {}", path.display(), e),
        )
    })?;
    geotiff_epsg(BufReader::new(file))?
        .ok_or_else(|| SchemaError::invalid_srid("None", "the DEM has no EPSG code"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;
    use tiff::encoder::{colortype, TiffEncoder};

    /// A 1x1 grayscale GeoTIFF carrying only a GeoKey directory.
    pub(crate) fn geotiff_with_keys(keys: &[(u16, u16)]) -> Vec<u8> {
        let mut dir: Vec<u16> = vec![1, 1, 0, keys.len() as u16];
        for (key, value) in keys {
            dir.extend_from_slice(&[*key, 0, 1, *value]);
        }
        let mut out = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut out).unwrap();
            let mut image = encoder.new_image::<colortype::Gray8>(1, 1).unwrap();
            image
                .encoder()
                .write_tag(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY), &dir[..])
                .unwrap();
            image.write_data(&[0u8]).unwrap();
        }
        out.into_inner()
    }

    #[test]
    fn test_projected_key_wins() {
        let tiff = geotiff_with_keys(&[(KEY_GEOGRAPHIC_TYPE, 4326), (KEY_PROJECTED_CS_TYPE, 28992)]);
        assert_eq!(geotiff_epsg(Cursor::new(tiff)).unwrap(), Some(28992));
    }

    #[test]
    fn test_geographic_fallback() {
        let tiff = geotiff_with_keys(&[(KEY_GEOGRAPHIC_TYPE, 4326), (KEY_PROJECTED_CS_TYPE, USER_DEFINED)]);
        assert_eq!(geotiff_epsg(Cursor::new(tiff)).unwrap(), Some(4326));
    }

    #[test]
    fn test_not_a_tiff() {
        assert!(geotiff_epsg(Cursor::new(b"PK\x03\x04".to_vec())).is_err());
    }

    #[test]
    fn test_tiff_without_geokeys() {
        let mut out = Cursor::new(Vec::new());
        TiffEncoder::new(&mut out)
            .unwrap()
            .write_image::<colortype::Gray8>(1, 1, &[0u8])
            .unwrap();
        out.set_position(0);
        assert_eq!(geotiff_epsg(out).unwrap(), None);
    }

    #[test]
    fn test_raster_epsg_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dem.tif");
        fs::write(&path, geotiff_with_keys(&[(KEY_PROJECTED_CS_TYPE, 2154)])).unwrap();
        assert_eq!(raster_epsg(&path).unwrap(), 2154);
        let missing = raster_epsg(&dir.path().join("missing.tif")).unwrap_err();
        assert!(missing.to_string().contains("cannot open filepath"));
    }

    #[test]
    fn test_resolve_raster_path() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("model.sqlite");
        fs::create_dir(dir.path().join("rasters")).unwrap();
        fs::write(dir.path().join("rasters").join("dem.tif"), b"").unwrap();

        assert_eq!(resolve_raster_path(&db, "rasters\\dem.tif"), dir.path().join("rasters/dem.tif"));
        assert_eq!(resolve_raster_path(&db, "dem.tif"), dir.path().join("rasters/dem.tif"));

        fs::create_dir(dir.path().join("other")).unwrap();
        fs::write(dir.path().join("other").join("x.tif"), b"").unwrap();
        assert_eq!(resolve_raster_path(&db, "other/x.tif"), dir.path().join("other/x.tif"));
    }
}
