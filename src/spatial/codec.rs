//! Binary geometry encodings.
//!
//! Three layouts are understood:
//! - standard WKB (ISO and EWKB dimension flags are accepted on read),
//! - the SpatiaLite internal blob, used by the pre-conversion file format,
//! - the GeoPackage binary header followed by WKB.
//!
//! Writers always produce little endian, 2D output.

use crate::constants::Format;
use crate::error::SchemaError;

use super::geometry::{Coord, Geometry, GeometryKind, Ring};

const SPATIALITE_START: u8 = 0x00;
const SPATIALITE_MBR_END: u8 = 0x7C;
const SPATIALITE_ENTITY: u8 = 0x69;
const SPATIALITE_END: u8 = 0xFE;

const GPKG_MAGIC: &[u8; 2] = b"GP";

/// Decoded blob with the SRID it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialBlob {
    pub srid: i32,
    pub geometry: Geometry,
}

fn err(msg: impl Into<String>) -> SchemaError {
    SchemaError::Geometry(msg.into())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    little: bool,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], little: bool) -> Self {
        Reader {
            bytes,
            pos: 0,
            little,
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], SchemaError> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| err(format!("unexpected end of geometry blob at byte {}", self.pos)))?;
        self.pos = end;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8, SchemaError> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, SchemaError> {
        let b = self.take::<4>()?;
        Ok(if self.little {
            u32::from_le_bytes(b)
        } else {
            u32::from_be_bytes(b)
        })
    }

    fn i32(&mut self) -> Result<i32, SchemaError> {
        Ok(self.u32()? as i32)
    }

    fn f64(&mut self) -> Result<f64, SchemaError> {
        let b = self.take::<8>()?;
        Ok(if self.little {
            f64::from_le_bytes(b)
        } else {
            f64::from_be_bytes(b)
        })
    }

    fn count(&mut self) -> Result<usize, SchemaError> {
        let n = self.u32()? as usize;
        // every element needs at least 8 bytes, reject absurd counts early
        if n > self.bytes.len() {
            return Err(err(format!("invalid element count {}", n)));
        }
        Ok(n)
    }

    fn coord(&mut self, extra_dims: usize) -> Result<Coord, SchemaError> {
        let x = self.f64()?;
        let y = self.f64()?;
        for _ in 0..extra_dims {
            self.f64()?;
        }
        Ok(Coord::new(x, y))
    }

    fn seq(&mut self, extra_dims: usize) -> Result<Vec<Coord>, SchemaError> {
        let n = self.count()?;
        (0..n).map(|_| self.coord(extra_dims)).collect()
    }

    fn rings(&mut self, extra_dims: usize) -> Result<Vec<Ring>, SchemaError> {
        let n = self.count()?;
        (0..n).map(|_| self.seq(extra_dims)).collect()
    }
}

/// Splits a type code into its base kind and the number of ordinates beyond XY.
fn split_type_code(code: u32) -> Result<(GeometryKind, usize), SchemaError> {
    // EWKB high bit flags
    let ewkb_z = code & 0x8000_0000 != 0;
    let ewkb_m = code & 0x4000_0000 != 0;
    let iso = code & 0x0FFF_FFFF;
    let kind = GeometryKind::from_code(iso)
        .ok_or_else(|| err(format!("unsupported geometry type code {}", code)))?;
    let extra = match iso / 1000 {
        0 => usize::from(ewkb_z) + usize::from(ewkb_m),
        1 | 2 => 1,
        3 => 2,
        _ => return Err(err(format!("unsupported geometry type code {}", code))),
    };
    Ok((kind, extra))
}

// ---- WKB ----

pub fn read_wkb(bytes: &[u8]) -> Result<Geometry, SchemaError> {
    let mut pos = 0;
    let geom = read_wkb_at(bytes, &mut pos)?;
    Ok(geom)
}

fn read_wkb_at(bytes: &[u8], pos: &mut usize) -> Result<Geometry, SchemaError> {
    let order = *bytes
        .get(*pos)
        .ok_or_else(|| err("empty WKB"))?;
    let mut r = Reader::new(bytes, order == 1);
    r.pos = *pos + 1;
    let code = r.u32()?;
    if code & 0x2000_0000 != 0 {
        // EWKB embedded SRID, ignored here
        r.i32()?;
    }
    let (kind, extra) = split_type_code(code)?;
    let geom = match kind {
        GeometryKind::Point => {
            let c = r.coord(extra)?;
            if c.x.is_nan() && c.y.is_nan() {
                Geometry::Point(None)
            } else {
                Geometry::Point(Some(c))
            }
        }
        GeometryKind::LineString => Geometry::LineString(r.seq(extra)?),
        GeometryKind::Polygon => Geometry::Polygon(r.rings(extra)?),
        GeometryKind::MultiPoint
        | GeometryKind::MultiLineString
        | GeometryKind::MultiPolygon
        | GeometryKind::GeometryCollection => {
            let n = r.count()?;
            let mut next = r.pos;
            let mut parts = Vec::with_capacity(n);
            for _ in 0..n {
                parts.push(read_wkb_at(bytes, &mut next)?);
            }
            r.pos = next;
            collect_parts(kind, parts)?
        }
        GeometryKind::Geometry => return Err(err("WKB geometry without a concrete type")),
    };
    *pos = r.pos;
    Ok(geom)
}

fn collect_parts(kind: GeometryKind, parts: Vec<Geometry>) -> Result<Geometry, SchemaError> {
    let mismatch = |g: &Geometry| err(format!("{} cannot contain {}", kind, g.kind()));
    Ok(match kind {
        GeometryKind::MultiPoint => Geometry::MultiPoint(
            parts
                .into_iter()
                .map(|g| match g {
                    Geometry::Point(Some(c)) => Ok(c),
                    other => Err(mismatch(&other)),
                })
                .collect::<Result<_, _>>()?,
        ),
        GeometryKind::MultiLineString => Geometry::MultiLineString(
            parts
                .into_iter()
                .map(|g| match g {
                    Geometry::LineString(v) => Ok(v),
                    other => Err(mismatch(&other)),
                })
                .collect::<Result<_, _>>()?,
        ),
        GeometryKind::MultiPolygon => Geometry::MultiPolygon(
            parts
                .into_iter()
                .map(|g| match g {
                    Geometry::Polygon(v) => Ok(v),
                    other => Err(mismatch(&other)),
                })
                .collect::<Result<_, _>>()?,
        ),
        _ => Geometry::GeometryCollection(parts),
    })
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_f64(out: &mut Vec<u8>, v: f64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_coord(out: &mut Vec<u8>, c: &Coord) {
    put_f64(out, c.x);
    put_f64(out, c.y);
}

fn put_seq(out: &mut Vec<u8>, seq: &[Coord]) {
    put_u32(out, seq.len() as u32);
    seq.iter().for_each(|c| put_coord(out, c));
}

fn put_rings(out: &mut Vec<u8>, rings: &[Ring]) {
    put_u32(out, rings.len() as u32);
    rings.iter().for_each(|r| put_seq(out, r));
}

pub fn write_wkb(geom: &Geometry) -> Vec<u8> {
    let mut out = Vec::new();
    write_wkb_into(geom, &mut out);
    out
}

fn write_wkb_into(geom: &Geometry, out: &mut Vec<u8>) {
    out.push(1);
    put_u32(out, geom.kind().code());
    match geom {
        Geometry::Point(Some(c)) => put_coord(out, c),
        Geometry::Point(None) => {
            put_f64(out, f64::NAN);
            put_f64(out, f64::NAN);
        }
        Geometry::LineString(v) => put_seq(out, v),
        Geometry::Polygon(rings) => put_rings(out, rings),
        Geometry::MultiPoint(v) => {
            put_u32(out, v.len() as u32);
            v.iter()
                .for_each(|c| write_wkb_into(&Geometry::Point(Some(*c)), out));
        }
        Geometry::MultiLineString(lines) => {
            put_u32(out, lines.len() as u32);
            lines
                .iter()
                .for_each(|l| write_wkb_into(&Geometry::LineString(l.clone()), out));
        }
        Geometry::MultiPolygon(polys) => {
            put_u32(out, polys.len() as u32);
            polys
                .iter()
                .for_each(|p| write_wkb_into(&Geometry::Polygon(p.clone()), out));
        }
        Geometry::GeometryCollection(parts) => {
            put_u32(out, parts.len() as u32);
            parts.iter().for_each(|g| write_wkb_into(g, out));
        }
    }
}

// ---- SpatiaLite blob ----

fn read_spatialite_body(
    r: &mut Reader<'_>,
    kind: GeometryKind,
    extra: usize,
) -> Result<Geometry, SchemaError> {
    Ok(match kind {
        GeometryKind::Point => Geometry::Point(Some(r.coord(extra)?)),
        GeometryKind::LineString => Geometry::LineString(r.seq(extra)?),
        GeometryKind::Polygon => Geometry::Polygon(r.rings(extra)?),
        GeometryKind::MultiPoint
        | GeometryKind::MultiLineString
        | GeometryKind::MultiPolygon
        | GeometryKind::GeometryCollection => {
            let n = r.count()?;
            let mut parts = Vec::with_capacity(n);
            for _ in 0..n {
                if r.u8()? != SPATIALITE_ENTITY {
                    return Err(err("missing SpatiaLite entity marker"));
                }
                let (part_kind, part_extra) = split_type_code(r.u32()?)?;
                parts.push(read_spatialite_body(r, part_kind, part_extra)?);
            }
            collect_parts(kind, parts)?
        }
        GeometryKind::Geometry => return Err(err("SpatiaLite blob without a concrete type")),
    })
}

fn decode_spatialite(bytes: &[u8]) -> Result<SpatialBlob, SchemaError> {
    if bytes.len() < 44 || bytes[0] != SPATIALITE_START || bytes[38] != SPATIALITE_MBR_END {
        return Err(err("not a SpatiaLite geometry blob"));
    }
    if bytes[bytes.len() - 1] != SPATIALITE_END {
        return Err(err("truncated SpatiaLite geometry blob"));
    }
    let little = match bytes[1] {
        0x01 => true,
        0x00 => false,
        other => return Err(err(format!("invalid SpatiaLite byte order {:#x}", other))),
    };
    let mut r = Reader::new(bytes, little);
    r.pos = 2;
    let srid = r.i32()?;
    r.pos = 39;
    let class = r.u32()?;
    if class >= 1_000_000 {
        return Err(err(format!("compressed SpatiaLite geometry class {} is not supported", class)));
    }
    let (kind, extra) = split_type_code(class)?;
    let geometry = read_spatialite_body(&mut r, kind, extra)?;
    Ok(SpatialBlob { srid, geometry })
}

fn write_spatialite_body(geom: &Geometry, out: &mut Vec<u8>) {
    match geom {
        Geometry::Point(c) => put_coord(out, &c.unwrap_or(Coord::new(0.0, 0.0))),
        Geometry::LineString(v) => put_seq(out, v),
        Geometry::Polygon(rings) => put_rings(out, rings),
        other => {
            let count = other.num_geometries();
            put_u32(out, count as u32);
            for n in 1..=count {
                if let Some(part) = other.geometry_n(n) {
                    out.push(SPATIALITE_ENTITY);
                    put_u32(out, part.kind().code());
                    write_spatialite_body(&part, out);
                }
            }
        }
    }
}

pub fn encode_spatialite(geom: &Geometry, srid: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.push(SPATIALITE_START);
    out.push(0x01);
    put_i32(&mut out, srid);
    let env = geom.envelope();
    for v in env
        .map(|e| [e.min_x, e.min_y, e.max_x, e.max_y])
        .unwrap_or([0.0; 4])
    {
        put_f64(&mut out, v);
    }
    out.push(SPATIALITE_MBR_END);
    put_u32(&mut out, geom.kind().code());
    write_spatialite_body(geom, &mut out);
    out.push(SPATIALITE_END);
    out
}

// ---- GeoPackage blob ----

fn decode_gpkg(bytes: &[u8]) -> Result<SpatialBlob, SchemaError> {
    if bytes.len() < 8 || &bytes[0..2] != GPKG_MAGIC {
        return Err(err("not a GeoPackage geometry blob"));
    }
    let flags = bytes[3];
    let little = flags & 0x01 == 1;
    let envelope_len = match (flags >> 1) & 0x07 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => return Err(err(format!("invalid GeoPackage envelope indicator {}", other))),
    };
    let mut r = Reader::new(bytes, little);
    r.pos = 4;
    let srid = r.i32()?;
    let start = 8 + envelope_len;
    let wkb = bytes
        .get(start..)
        .ok_or_else(|| err("truncated GeoPackage geometry blob"))?;
    let geometry = if wkb.is_empty() && flags & 0x10 != 0 {
        Geometry::GeometryCollection(Vec::new())
    } else {
        read_wkb(wkb)?
    };
    Ok(SpatialBlob { srid, geometry })
}

pub fn encode_gpkg(geom: &Geometry, srid: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(GPKG_MAGIC);
    out.push(0);
    match geom.envelope() {
        Some(env) if !geom.is_empty() => {
            // little endian header, xy envelope
            out.push(0b0000_0011);
            put_i32(&mut out, srid);
            for v in [env.min_x, env.max_x, env.min_y, env.max_y] {
                put_f64(&mut out, v);
            }
        }
        _ => {
            out.push(0b0001_0001);
            put_i32(&mut out, srid);
        }
    }
    out.extend_from_slice(&write_wkb(geom));
    out
}

/// Decodes either blob flavour, sniffing the header.
pub fn decode_blob(bytes: &[u8]) -> Result<SpatialBlob, SchemaError> {
    if bytes.starts_with(GPKG_MAGIC) {
        decode_gpkg(bytes)
    } else if bytes.first() == Some(&SPATIALITE_START) {
        decode_spatialite(bytes)
    } else {
        Err(err("unrecognized geometry blob"))
    }
}

pub fn encode_blob(format: Format, geom: &Geometry, srid: i32) -> Vec<u8> {
    match format {
        Format::Geopackage => encode_gpkg(geom, srid),
        Format::Spatialite | Format::Unknown => encode_spatialite(geom, srid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn wkt(s: &str) -> Geometry {
        Geometry::from_wkt(s).unwrap()
    }

    #[test]
    fn test_spatialite_point_layout() {
        let blob = encode_spatialite(&wkt("POINT(1 2)"), 4326);
        // start, endian, srid, mbr, mbr end, class, x, y, end
        assert_eq!(blob.len(), 1 + 1 + 4 + 32 + 1 + 4 + 16 + 1);
        assert_eq!(blob[0], 0x00);
        assert_eq!(blob[1], 0x01);
        assert_eq!(i32::from_le_bytes(blob[2..6].try_into().unwrap()), 4326);
        assert_eq!(blob[38], 0x7C);
        assert_eq!(u32::from_le_bytes(blob[39..43].try_into().unwrap()), 1);
        assert_eq!(*blob.last().unwrap(), 0xFE);
    }

    #[test]
    fn test_decode_both_flavours() {
        let geoms = [
            "POINT(1 2)",
            "LINESTRING(0 0, 10 10)",
            "POLYGON((0 0, 4 0, 4 4, 0 0))",
            "MULTIPOLYGON(((0 0, 1 0, 1 1, 0 0)), ((5 5, 6 5, 6 6, 5 5)))",
            "GEOMETRYCOLLECTION(POINT(1 1), LINESTRING(0 0, 1 1))",
        ];
        for text in geoms {
            let g = wkt(text);
            let sl = decode_blob(&encode_spatialite(&g, 28992)).unwrap();
            assert_eq!(sl, SpatialBlob { srid: 28992, geometry: g.clone() }, "{}", text);
            let gp = decode_blob(&encode_gpkg(&g, 28992)).unwrap();
            assert_eq!(gp, SpatialBlob { srid: 28992, geometry: g.clone() }, "{}", text);
        }
    }

    #[test]
    fn test_gpkg_header() {
        let blob = encode_gpkg(&wkt("LINESTRING(0 0, 3 4)"), 28992);
        assert_eq!(&blob[0..2], b"GP");
        assert_eq!(blob[2], 0);
        assert_eq!(blob[3], 0b0000_0011);
        assert_eq!(i32::from_le_bytes(blob[4..8].try_into().unwrap()), 28992);
        // envelope is minx, maxx, miny, maxy
        assert_eq!(f64::from_le_bytes(blob[16..24].try_into().unwrap()), 3.0);
    }

    #[test]
    fn test_big_endian_wkb() {
        // POINT(1 2) in big endian WKB
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&1.0f64.to_be_bytes());
        bytes.extend_from_slice(&2.0f64.to_be_bytes());
        assert_eq!(read_wkb(&bytes).unwrap(), Geometry::point(1.0, 2.0));
    }

    #[test]
    fn test_iso_z_wkb_drops_z() {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&1001u32.to_le_bytes());
        for v in [1.0f64, 2.0, 3.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(read_wkb(&bytes).unwrap(), Geometry::point(1.0, 2.0));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decode_blob(b"").is_err());
        assert!(decode_blob(b"hello world").is_err());
        assert!(decode_blob(&[0u8; 10]).is_err());
        let mut blob = encode_spatialite(&wkt("POINT(1 2)"), 4326);
        blob.pop();
        assert!(decode_blob(&blob).is_err());
    }

    proptest! {
        #[test]
        fn prop_linestring_survives_both_blobs(
            coords in prop::collection::vec((-1e6f64..1e6, -1e6f64..1e6), 2..20),
            srid in 0i32..100_000,
        ) {
            let g = Geometry::LineString(coords.iter().map(|(x, y)| Coord::new(*x, *y)).collect());
            prop_assert_eq!(&decode_blob(&encode_spatialite(&g, srid)).unwrap().geometry, &g);
            prop_assert_eq!(&decode_blob(&encode_gpkg(&g, srid)).unwrap().geometry, &g);
        }
    }
}
