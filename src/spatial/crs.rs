//! Coordinate reference systems.
//!
//! The systems 3Di schematisations are usually stored in have built-in
//! transforms. Every other EPSG code is resolved from the bundled EPSG
//! definitions and transformed with proj4rs. Every transform goes through
//! WGS84 geographic coordinates. The RD New transform uses the published
//! polynomial approximation, which is accurate to roughly a metre across the
//! Netherlands.

use proj4rs::proj::Proj;

use crate::error::SchemaError;

use super::geometry::{Coord, Geometry};

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const WGS84_PROJ4: &str = "+proj=longlat +datum=WGS84 +no_defs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Degree,
    Metre,
    Foot,
    UsSurveyFoot,
    /// A `+units` or `+to_meter` value as written in the definition.
    Other(&'static str),
}

impl Unit {
    pub fn name(self) -> &'static str {
        match self {
            Unit::Degree => "degree",
            Unit::Metre => "metre",
            Unit::Foot => "foot",
            Unit::UsSurveyFoot => "US survey foot",
            Unit::Other(name) => name,
        }
    }

    fn to_metre(self) -> &'static str {
        match self {
            Unit::Foot => "0.3048",
            Unit::UsSurveyFoot => "0.304800609601219",
            _ => "1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Projection {
    Geographic,
    /// Dutch RD grid with the given false origin.
    Rd { x0: f64, y0: f64 },
    TransverseMercator { lon0: f64, k0: f64, fe: f64, fnorth: f64 },
    WebMercator,
    /// Any other EPSG definition, transformed by proj4rs.
    Defined { proj4: &'static str, wkt: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    pub epsg: i32,
    pub name: String,
    pub unit: Unit,
    pub projected: bool,
    projection: Projection,
}

/// Looks up a CRS by EPSG code.
pub fn lookup(epsg: i32) -> Option<Crs> {
    let crs = |name: &str, unit, projected, projection| Crs {
        epsg,
        name: name.to_string(),
        unit,
        projected,
        projection,
    };
    let found = match epsg {
        4326 => crs("WGS 84", Unit::Degree, false, Projection::Geographic),
        4258 => crs("ETRS89", Unit::Degree, false, Projection::Geographic),
        4979 => crs("WGS 84 (3D)", Unit::Degree, false, Projection::Geographic),
        28992 => crs(
            "Amersfoort / RD New",
            Unit::Metre,
            true,
            Projection::Rd {
                x0: 155_000.0,
                y0: 463_000.0,
            },
        ),
        28991 => crs(
            "Amersfoort / RD Old",
            Unit::Metre,
            true,
            Projection::Rd { x0: 0.0, y0: 0.0 },
        ),
        3857 => crs(
            "WGS 84 / Pseudo-Mercator",
            Unit::Metre,
            true,
            Projection::WebMercator,
        ),
        32601..=32660 => {
            let zone = epsg - 32600;
            return Some(utm(epsg, format!("WGS 84 / UTM zone {}N", zone), zone, false));
        }
        32701..=32760 => {
            let zone = epsg - 32700;
            return Some(utm(epsg, format!("WGS 84 / UTM zone {}S", zone), zone, true));
        }
        25828..=25838 => {
            let zone = epsg - 25800;
            return Some(utm(epsg, format!("ETRS89 / UTM zone {}N", zone), zone, false));
        }
        _ => return defined(epsg),
    };
    Some(found)
}

fn utm(epsg: i32, name: String, zone: i32, south: bool) -> Crs {
    Crs {
        epsg,
        name,
        unit: Unit::Metre,
        projected: true,
        projection: Projection::TransverseMercator {
            lon0: (zone * 6 - 183) as f64,
            k0: 0.9996,
            fe: 500_000.0,
            fnorth: if south { 10_000_000.0 } else { 0.0 },
        },
    }
}

fn proj4_param(proj4: &'static str, key: &str) -> Option<&'static str> {
    proj4
        .split_whitespace()
        .filter_map(|token| token.strip_prefix('+')?.split_once('='))
        .find_map(|(k, v)| (k == key).then_some(v))
}

fn defined(epsg: i32) -> Option<Crs> {
    let def = crs_definitions::from_code(u16::try_from(epsg).ok()?)?;
    let projected = !matches!(proj4_param(def.proj4, "proj"), Some("longlat" | "latlong" | "geocent"));
    let unit = if !projected {
        Unit::Degree
    } else {
        match (proj4_param(def.proj4, "units"), proj4_param(def.proj4, "to_meter")) {
            (Some("m"), _) => Unit::Metre,
            (Some("ft"), _) => Unit::Foot,
            (Some("us-ft"), _) => Unit::UsSurveyFoot,
            (Some(other), _) => Unit::Other(other),
            (None, Some(factor)) if factor.parse::<f64>().is_ok_and(|f| f == 1.0) => Unit::Metre,
            (None, Some(factor)) => Unit::Other(factor),
            (None, None) => Unit::Metre,
        }
    };
    let name = def
        .wkt
        .split('"')
        .nth(1)
        .map_or_else(|| format!("EPSG:{}", epsg), str::to_string);
    Some(Crs {
        epsg,
        name,
        unit,
        projected,
        projection: Projection::Defined {
            proj4: def.proj4,
            wkt: def.wkt,
        },
    })
}

/// Checks that geometries can be stored in this CRS: projected and metric.
pub fn validate_model_crs(epsg: i32) -> Result<Crs, SchemaError> {
    let crs = lookup(epsg)
        .ok_or_else(|| SchemaError::invalid_srid(epsg, "the supplied epsg_code is invalid"))?;
    if !crs.projected {
        return Err(SchemaError::invalid_srid(epsg, "the CRS is not projected"));
    }
    if crs.unit != Unit::Metre {
        return Err(SchemaError::invalid_srid(
            epsg,
            format!("the CRS unit is {}, not metre", crs.unit.name()),
        ));
    }
    // refuse up front what cannot be reprojected later
    crs.prepare()
        .map_err(|e| SchemaError::invalid_srid(epsg, e.to_string()))?;
    Ok(crs)
}

/// A CRS ready to transform coordinates to and from WGS84.
pub struct Prepared<'a> {
    crs: &'a Crs,
    /// The CRS itself and WGS84, for definitions transformed by proj4rs.
    proj: Option<(Proj, Proj)>,
}

fn parse_proj(epsg: i32, proj4: &str) -> Result<Proj, SchemaError> {
    Proj::from_proj_string(proj4).map_err(|e| {
        SchemaError::Geometry(format!("cannot use the definition of EPSG:{}: {}", epsg, e))
    })
}

impl Crs {
    /// OGC WKT style definition stored in the spatial reference catalogs.
    pub fn definition(&self) -> String {
        match self.projection {
            Projection::Defined { wkt, .. } => wkt.to_string(),
            Projection::Geographic => format!(
                "GEOGCS[\"{}\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563]],UNIT[\"degree\",0.0174532925199433],AUTHORITY[\"EPSG\",\"{}\"]]",
                self.name, self.epsg
            ),
            _ => format!(
                "PROJCS[\"{}\",UNIT[\"{}\",{}],AUTHORITY[\"EPSG\",\"{}\"]]",
                self.name,
                self.unit.name(),
                self.unit.to_metre(),
                self.epsg
            ),
        }
    }

    pub fn proj4(&self) -> String {
        match self.projection {
            Projection::Geographic => WGS84_PROJ4.to_string(),
            Projection::Rd { x0, y0 } => format!(
                "+proj=sterea +lat_0=52.15616055555555 +lon_0=5.38763888888889 +k=0.9999079 +x_0={} +y_0={} +ellps=bessel +units=m +no_defs",
                x0, y0
            ),
            Projection::TransverseMercator { lon0, k0, fe, fnorth } => format!(
                "+proj=tmerc +lat_0=0 +lon_0={} +k={} +x_0={} +y_0={} +datum=WGS84 +units=m +no_defs",
                lon0, k0, fe, fnorth
            ),
            Projection::WebMercator => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs".to_string(),
            Projection::Defined { proj4, .. } => proj4.to_string(),
        }
    }

    pub fn prepare(&self) -> Result<Prepared<'_>, SchemaError> {
        let proj = match self.projection {
            Projection::Defined { proj4, .. } => Some((
                parse_proj(self.epsg, proj4)?,
                parse_proj(4326, WGS84_PROJ4)?,
            )),
            _ => None,
        };
        Ok(Prepared { crs: self, proj })
    }

    /// Projected (or geographic) coordinate to WGS84 longitude/latitude.
    pub fn to_wgs84(&self, c: Coord) -> Result<Coord, SchemaError> {
        self.prepare()?.to_wgs84(c)
    }

    /// WGS84 longitude/latitude to this CRS.
    pub fn from_wgs84(&self, c: Coord) -> Result<Coord, SchemaError> {
        self.prepare()?.from_wgs84(c)
    }
}

impl Prepared<'_> {
    fn run_proj(&self, src: &Proj, dst: &Proj, c: Coord, from_wgs84: bool) -> Result<Coord, SchemaError> {
        let geographic_in = from_wgs84 || !self.crs.projected;
        let geographic_out = !from_wgs84 || !self.crs.projected;
        let mut point = if geographic_in {
            (c.x.to_radians(), c.y.to_radians(), 0.0)
        } else {
            (c.x, c.y, 0.0)
        };
        proj4rs::transform::transform(src, dst, &mut point).map_err(|e| {
            SchemaError::Geometry(format!(
                "cannot transform ({}, {}) for EPSG:{}: {}",
                c.x, c.y, self.crs.epsg, e
            ))
        })?;
        Ok(if geographic_out {
            Coord::new(point.0.to_degrees(), point.1.to_degrees())
        } else {
            Coord::new(point.0, point.1)
        })
    }

    pub fn to_wgs84(&self, c: Coord) -> Result<Coord, SchemaError> {
        if let Some((own, wgs84)) = &self.proj {
            return self.run_proj(own, wgs84, c, false);
        }
        Ok(match self.crs.projection {
            Projection::Rd { x0, y0 } => rd_to_wgs84(c.x - x0 + 155_000.0, c.y - y0 + 463_000.0),
            Projection::TransverseMercator { lon0, k0, fe, fnorth } => tm_inverse(c, lon0, k0, fe, fnorth),
            Projection::WebMercator => Coord::new(
                (c.x / WGS84_A).to_degrees(),
                (2.0 * (c.y / WGS84_A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees(),
            ),
            Projection::Geographic | Projection::Defined { .. } => c,
        })
    }

    pub fn from_wgs84(&self, c: Coord) -> Result<Coord, SchemaError> {
        if let Some((own, wgs84)) = &self.proj {
            return self.run_proj(wgs84, own, c, true);
        }
        Ok(match self.crs.projection {
            Projection::Rd { x0, y0 } => {
                let rd = wgs84_to_rd(c.x, c.y);
                Coord::new(rd.x - 155_000.0 + x0, rd.y - 463_000.0 + y0)
            }
            Projection::TransverseMercator { lon0, k0, fe, fnorth } => tm_forward(c, lon0, k0, fe, fnorth),
            Projection::WebMercator => Coord::new(
                WGS84_A * c.x.to_radians(),
                WGS84_A * (std::f64::consts::FRAC_PI_4 + c.y.to_radians() / 2.0).tan().ln(),
            ),
            Projection::Geographic | Projection::Defined { .. } => c,
        })
    }
}

pub fn transform_coord(c: Coord, from: &Prepared, to: &Prepared) -> Result<Coord, SchemaError> {
    if from.crs.epsg == to.crs.epsg {
        return Ok(c);
    }
    to.from_wgs84(from.to_wgs84(c)?)
}

/// Reprojects a geometry between two EPSG codes.
pub fn transform(geom: &Geometry, from: i32, to: i32) -> Result<Geometry, SchemaError> {
    if from == to {
        return Ok(geom.clone());
    }
    let src = lookup(from).ok_or_else(|| SchemaError::invalid_srid(from, "unknown CRS"))?;
    let dst = lookup(to).ok_or_else(|| SchemaError::invalid_srid(to, "unknown CRS"))?;
    let (src, dst) = (src.prepare()?, dst.prepare()?);
    geom.try_map_coords(&mut |c| transform_coord(c, &src, &dst))
}

// ---- RD New polynomial approximation ----

const RD_PHI0: f64 = 52.155_174_40;
const RD_LAM0: f64 = 5.387_206_21;
const RD_X0: f64 = 155_000.0;
const RD_Y0: f64 = 463_000.0;

// (p, q, coefficient) for dphi^p * dlam^q
const RD_R: [(i32, i32, f64); 9] = [
    (0, 1, 190_094.945),
    (1, 1, -11_832.228),
    (2, 1, -114.221),
    (0, 3, -32.391),
    (1, 0, -0.705),
    (3, 1, -2.340),
    (1, 3, -0.608),
    (0, 2, -0.008),
    (2, 3, 0.148),
];

const RD_S: [(i32, i32, f64); 10] = [
    (1, 0, 309_056.544),
    (0, 2, 3_638.893),
    (2, 0, 73.077),
    (1, 2, -157.984),
    (3, 0, 59.788),
    (0, 1, 0.433),
    (2, 2, -6.439),
    (1, 1, -0.032),
    (0, 4, 0.092),
    (1, 4, -0.054),
];

// (p, q, coefficient) for dx^p * dy^q
const RD_K: [(i32, i32, f64); 11] = [
    (0, 1, 3_235.653_89),
    (2, 0, -32.582_97),
    (0, 2, -0.247_50),
    (2, 1, -0.849_78),
    (0, 3, -0.065_50),
    (2, 2, -0.017_09),
    (1, 0, -0.007_38),
    (4, 0, 0.005_30),
    (2, 3, -0.000_39),
    (4, 1, 0.000_33),
    (1, 1, -0.000_12),
];

const RD_L: [(i32, i32, f64); 12] = [
    (1, 0, 5_260.529_16),
    (1, 1, 105.946_84),
    (1, 2, 2.456_56),
    (3, 0, -0.818_85),
    (1, 3, 0.055_94),
    (3, 1, -0.056_07),
    (0, 1, 0.011_99),
    (3, 2, -0.002_56),
    (1, 4, 0.001_28),
    (0, 2, 0.000_22),
    (2, 0, -0.000_22),
    (5, 0, 0.000_26),
];

fn poly(terms: &[(i32, i32, f64)], a: f64, b: f64) -> f64 {
    terms
        .iter()
        .map(|(p, q, coef)| coef * a.powi(*p) * b.powi(*q))
        .sum()
}

fn wgs84_to_rd(lon: f64, lat: f64) -> Coord {
    let dphi = 0.36 * (lat - RD_PHI0);
    let dlam = 0.36 * (lon - RD_LAM0);
    Coord::new(
        RD_X0 + poly(&RD_R, dphi, dlam),
        RD_Y0 + poly(&RD_S, dphi, dlam),
    )
}

fn rd_to_wgs84(x: f64, y: f64) -> Coord {
    let dx = (x - RD_X0) * 1e-5;
    let dy = (y - RD_Y0) * 1e-5;
    Coord::new(
        RD_LAM0 + poly(&RD_L, dx, dy) / 3600.0,
        RD_PHI0 + poly(&RD_K, dx, dy) / 3600.0,
    )
}

// ---- Transverse Mercator (Snyder series) ----

fn ellipsoid() -> (f64, f64) {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    (e2, e2 / (1.0 - e2))
}

fn meridian_arc(phi: f64, e2: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    WGS84_A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

fn tm_forward(c: Coord, lon0: f64, k0: f64, fe: f64, fnorth: f64) -> Coord {
    let (e2, ep2) = ellipsoid();
    let phi = c.y.to_radians();
    let lam = (c.x - lon0).to_radians();
    let n = WGS84_A / (1.0 - e2 * phi.sin().powi(2)).sqrt();
    let t = phi.tan().powi(2);
    let cc = ep2 * phi.cos().powi(2);
    let a = lam * phi.cos();
    let m = meridian_arc(phi, e2);

    let x = k0
        * n
        * (a + (1.0 - t + cc) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * cc - 58.0 * ep2) * a.powi(5) / 120.0);
    let y = k0
        * (m + n
            * phi.tan()
            * (a * a / 2.0
                + (5.0 - t + 9.0 * cc + 4.0 * cc * cc) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * cc - 330.0 * ep2) * a.powi(6) / 720.0));
    Coord::new(x + fe, y + fnorth)
}

fn tm_inverse(c: Coord, lon0: f64, k0: f64, fe: f64, fnorth: f64) -> Coord {
    let (e2, ep2) = ellipsoid();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let m = (c.y - fnorth) / k0;
    let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let c1 = ep2 * phi1.cos().powi(2);
    let t1 = phi1.tan().powi(2);
    let n1 = WGS84_A / (1.0 - e2 * phi1.sin().powi(2)).sqrt();
    let r1 = WGS84_A * (1.0 - e2) / (1.0 - e2 * phi1.sin().powi(2)).powf(1.5);
    let d = (c.x - fe) / (n1 * k0);

    let phi = phi1
        - (n1 * phi1.tan() / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lam = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d.powi(5)
            / 120.0)
        / phi1.cos();
    Coord::new(lon0 + lam.to_degrees(), phi.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rd_origin() {
        let rd = lookup(28992).unwrap();
        let c = rd.from_wgs84(Coord::new(RD_LAM0, RD_PHI0)).unwrap();
        assert!((c.x - 155_000.0).abs() < 1e-6);
        assert!((c.y - 463_000.0).abs() < 1e-6);

        let old = lookup(28991).unwrap();
        let c = old.from_wgs84(Coord::new(RD_LAM0, RD_PHI0)).unwrap();
        assert!(c.x.abs() < 1e-6 && c.y.abs() < 1e-6);
    }

    #[test]
    fn test_rd_scale_near_origin() {
        // 0.01 degree of latitude is about 1113 m, of longitude about 684 m here
        let rd = lookup(28992).unwrap();
        let north = rd.from_wgs84(Coord::new(RD_LAM0, RD_PHI0 + 0.01)).unwrap();
        assert!((north.y - 463_000.0 - 1112.6).abs() < 2.0, "{:?}", north);
        let east = rd.from_wgs84(Coord::new(RD_LAM0 + 0.01, RD_PHI0)).unwrap();
        assert!((east.x - 155_000.0 - 684.3).abs() < 2.0, "{:?}", east);
    }

    #[test]
    fn test_utm_known_point() {
        // lon 3, lat 0 is the origin of zone 31N shifted by the false easting
        let utm = lookup(32631).unwrap();
        let c = utm.from_wgs84(Coord::new(3.0, 0.0)).unwrap();
        assert!((c.x - 500_000.0).abs() < 1e-6);
        assert!(c.y.abs() < 1e-6);
        assert_eq!(utm.name, "WGS 84 / UTM zone 31N");
    }

    #[test]
    fn test_model_crs_validation() {
        assert!(validate_model_crs(28992).is_ok());
        assert!(validate_model_crs(32631).is_ok());
        let not_projected = validate_model_crs(4979).unwrap_err();
        assert!(not_projected.to_string().contains("not projected"));
        let feet = validate_model_crs(2227).unwrap_err();
        assert!(feet.to_string().contains("US survey foot"));
        let unknown = validate_model_crs(999_999).unwrap_err();
        assert!(unknown.to_string().contains("epsg_code=999999"));
    }

    #[test]
    fn test_defined_metric_crs_accepted() {
        for epsg in [2154, 3035, 31467, 31370, 27700] {
            let crs = validate_model_crs(epsg).unwrap_or_else(|e| panic!("EPSG:{}: {}", epsg, e));
            assert!(crs.projected);
            assert_eq!(crs.unit, Unit::Metre);
            assert!(crs.proj4().contains("+proj="), "{}", crs.proj4());
            assert!(crs.definition().contains("PROJCS"), "{}", crs.definition());
        }
        assert!(lookup(2154).unwrap().name.contains("Lambert-93"));
        assert!(!lookup(4258).unwrap().projected);
    }

    #[test]
    fn test_lambert_transforms() {
        // Paris in Lambert-93 and Brussels in Belgian Lambert 72
        let paris = transform(&Geometry::point(2.3522, 48.8566), 4326, 2154).unwrap();
        let Geometry::Point(Some(p)) = paris else { panic!("{:?}", paris) };
        assert!((640_000.0..665_000.0).contains(&p.x), "{:?}", p);
        assert!((6_850_000.0..6_875_000.0).contains(&p.y), "{:?}", p);

        let brussels = transform(&Geometry::point(4.3517, 50.8466), 4326, 31370).unwrap();
        let Geometry::Point(Some(b)) = brussels else { panic!("{:?}", brussels) };
        assert!((140_000.0..160_000.0).contains(&b.x), "{:?}", b);
        assert!((160_000.0..180_000.0).contains(&b.y), "{:?}", b);

        let back = lookup(31370).unwrap().to_wgs84(b).unwrap();
        assert!((back.x - 4.3517).abs() < 1e-6 && (back.y - 50.8466).abs() < 1e-6, "{:?}", back);
    }

    proptest! {
        #[test]
        fn prop_rd_round_trip(lon in 4.0f64..6.8, lat in 51.0f64..53.3) {
            let rd = lookup(28992).unwrap();
            let back = rd.to_wgs84(rd.from_wgs84(Coord::new(lon, lat)).unwrap()).unwrap();
            // about a metre at these latitudes
            prop_assert!((back.x - lon).abs() < 5e-5);
            prop_assert!((back.y - lat).abs() < 5e-5);
        }

        #[test]
        fn prop_utm_round_trip(lon in 0.5f64..5.5, lat in 40.0f64..60.0) {
            let utm = lookup(32631).unwrap();
            let back = utm.to_wgs84(utm.from_wgs84(Coord::new(lon, lat)).unwrap()).unwrap();
            prop_assert!((back.x - lon).abs() < 1e-6);
            prop_assert!((back.y - lat).abs() < 1e-6);
        }

        #[test]
        fn prop_web_mercator_round_trip(lon in -179.0f64..179.0, lat in -80.0f64..80.0) {
            let merc = lookup(3857).unwrap();
            let back = merc.to_wgs84(merc.from_wgs84(Coord::new(lon, lat)).unwrap()).unwrap();
            prop_assert!((back.x - lon).abs() < 1e-9);
            prop_assert!((back.y - lat).abs() < 1e-9);
        }
    }
}
