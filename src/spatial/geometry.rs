use std::fmt;

use crate::error::SchemaError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub const fn new(x: f64, y: f64) -> Self {
        Coord { x, y }
    }

    pub fn distance(&self, other: &Coord) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

pub type Ring = Vec<Coord>;

/// Geometry class codes shared by the WKB, SpatiaLite and GeoPackage encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Geometry,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryKind {
    pub fn code(self) -> u32 {
        match self {
            GeometryKind::Geometry => 0,
            GeometryKind::Point => 1,
            GeometryKind::LineString => 2,
            GeometryKind::Polygon => 3,
            GeometryKind::MultiPoint => 4,
            GeometryKind::MultiLineString => 5,
            GeometryKind::MultiPolygon => 6,
            GeometryKind::GeometryCollection => 7,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        // ISO Z/M variants share the base class modulo 1000
        match code % 1000 {
            0 => Some(GeometryKind::Geometry),
            1 => Some(GeometryKind::Point),
            2 => Some(GeometryKind::LineString),
            3 => Some(GeometryKind::Polygon),
            4 => Some(GeometryKind::MultiPoint),
            5 => Some(GeometryKind::MultiLineString),
            6 => Some(GeometryKind::MultiPolygon),
            7 => Some(GeometryKind::GeometryCollection),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GeometryKind::Geometry => "GEOMETRY",
            GeometryKind::Point => "POINT",
            GeometryKind::LineString => "LINESTRING",
            GeometryKind::Polygon => "POLYGON",
            GeometryKind::MultiPoint => "MULTIPOINT",
            GeometryKind::MultiLineString => "MULTILINESTRING",
            GeometryKind::MultiPolygon => "MULTIPOLYGON",
            GeometryKind::GeometryCollection => "GEOMETRYCOLLECTION",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "GEOMETRY" => Some(GeometryKind::Geometry),
            "POINT" => Some(GeometryKind::Point),
            "LINESTRING" => Some(GeometryKind::LineString),
            "POLYGON" => Some(GeometryKind::Polygon),
            "MULTIPOINT" => Some(GeometryKind::MultiPoint),
            "MULTILINESTRING" => Some(GeometryKind::MultiLineString),
            "MULTIPOLYGON" => Some(GeometryKind::MultiPolygon),
            "GEOMETRYCOLLECTION" => Some(GeometryKind::GeometryCollection),
            _ => None,
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    fn from_coords<'a>(coords: impl IntoIterator<Item = &'a Coord>) -> Option<Self> {
        let mut env: Option<Envelope> = None;
        for c in coords {
            env = Some(match env {
                None => Envelope {
                    min_x: c.x,
                    min_y: c.y,
                    max_x: c.x,
                    max_y: c.y,
                },
                Some(e) => Envelope {
                    min_x: e.min_x.min(c.x),
                    min_y: e.min_y.min(c.y),
                    max_x: e.max_x.max(c.x),
                    max_y: e.max_y.max(c.y),
                },
            });
        }
        env
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Option<Coord>),
    LineString(Vec<Coord>),
    Polygon(Vec<Ring>),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Ring>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Some(Coord::new(x, y)))
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
            Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
            Geometry::GeometryCollection(_) => GeometryKind::GeometryCollection,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Point(c) => c.is_none(),
            Geometry::LineString(v) | Geometry::MultiPoint(v) => v.is_empty(),
            Geometry::Polygon(v) | Geometry::MultiLineString(v) => v.is_empty(),
            Geometry::MultiPolygon(v) => v.is_empty(),
            Geometry::GeometryCollection(v) => v.iter().all(Geometry::is_empty),
        }
    }

    fn coords(&self) -> Vec<&Coord> {
        match self {
            Geometry::Point(c) => c.iter().collect(),
            Geometry::LineString(v) | Geometry::MultiPoint(v) => v.iter().collect(),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter().flatten().collect()
            }
            Geometry::MultiPolygon(polys) => polys.iter().flatten().flatten().collect(),
            Geometry::GeometryCollection(parts) => parts.iter().flat_map(|g| g.coords()).collect(),
        }
    }

    pub fn envelope(&self) -> Option<Envelope> {
        Envelope::from_coords(self.coords())
    }

    pub fn num_geometries(&self) -> usize {
        match self {
            Geometry::MultiPoint(v) => v.len(),
            Geometry::MultiLineString(v) => v.len(),
            Geometry::MultiPolygon(v) => v.len(),
            Geometry::GeometryCollection(v) => v.len(),
            _ => 1,
        }
    }

    /// 1-based access to the parts of a collection; a single geometry is its own part 1.
    pub fn geometry_n(&self, n: usize) -> Option<Geometry> {
        if n == 0 {
            return None;
        }
        match self {
            Geometry::MultiPoint(v) => v.get(n - 1).map(|c| Geometry::Point(Some(*c))),
            Geometry::MultiLineString(v) => v.get(n - 1).cloned().map(Geometry::LineString),
            Geometry::MultiPolygon(v) => v.get(n - 1).cloned().map(Geometry::Polygon),
            Geometry::GeometryCollection(v) => v.get(n - 1).cloned(),
            single if n == 1 => Some(single.clone()),
            _ => None,
        }
    }

    /// Polygon parts of a polygonal geometry, in order.
    pub fn polygons(&self) -> Vec<Geometry> {
        match self {
            Geometry::Polygon(_) => vec![self.clone()],
            Geometry::MultiPolygon(polys) => polys.iter().cloned().map(Geometry::Polygon).collect(),
            Geometry::GeometryCollection(parts) => parts.iter().flat_map(|g| g.polygons()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn try_map_coords<E>(
        &self,
        f: &mut impl FnMut(Coord) -> Result<Coord, E>,
    ) -> Result<Geometry, E> {
        fn map_seq<E>(
            seq: &[Coord],
            f: &mut impl FnMut(Coord) -> Result<Coord, E>,
        ) -> Result<Vec<Coord>, E> {
            seq.iter().map(|c| f(*c)).collect()
        }
        fn map_rings<E>(
            rings: &[Ring],
            f: &mut impl FnMut(Coord) -> Result<Coord, E>,
        ) -> Result<Vec<Ring>, E> {
            rings.iter().map(|r| map_seq(r, f)).collect()
        }

        Ok(match self {
            Geometry::Point(c) => Geometry::Point((*c).map(|pt| f(pt)).transpose()?),
            Geometry::LineString(v) => Geometry::LineString(map_seq(v, f)?),
            Geometry::MultiPoint(v) => Geometry::MultiPoint(map_seq(v, f)?),
            Geometry::Polygon(rings) => Geometry::Polygon(map_rings(rings, f)?),
            Geometry::MultiLineString(lines) => Geometry::MultiLineString(map_rings(lines, f)?),
            Geometry::MultiPolygon(polys) => Geometry::MultiPolygon(
                polys
                    .iter()
                    .map(|p| map_rings(p, f))
                    .collect::<Result<_, _>>()?,
            ),
            Geometry::GeometryCollection(parts) => Geometry::GeometryCollection(
                parts
                    .iter()
                    .map(|g| g.try_map_coords(f))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Planar area; zero for non-polygonal geometries.
    pub fn area(&self) -> f64 {
        match self {
            Geometry::Polygon(rings) => polygon_area(rings),
            Geometry::MultiPolygon(polys) => polys.iter().map(|p| polygon_area(p)).sum(),
            Geometry::GeometryCollection(parts) => parts.iter().map(Geometry::area).sum(),
            _ => 0.0,
        }
    }

    pub fn length(&self) -> f64 {
        match self {
            Geometry::LineString(v) => line_length(v),
            Geometry::MultiLineString(lines) => lines.iter().map(|l| line_length(l)).sum(),
            Geometry::GeometryCollection(parts) => parts.iter().map(Geometry::length).sum(),
            _ => 0.0,
        }
    }

    pub fn centroid(&self) -> Option<Coord> {
        match self {
            Geometry::Point(c) => *c,
            Geometry::MultiPoint(v) => mean(v.iter()),
            Geometry::LineString(v) => line_centroid(v),
            Geometry::MultiLineString(lines) => mean(lines.iter().filter_map(|l| line_centroid(l)).collect::<Vec<_>>().iter()),
            Geometry::Polygon(rings) => polygon_centroid(rings),
            Geometry::MultiPolygon(polys) => {
                let mut sum_a = 0.0;
                let (mut cx, mut cy) = (0.0, 0.0);
                for p in polys {
                    let a = polygon_area(p);
                    if let Some(c) = polygon_centroid(p) {
                        cx += c.x * a;
                        cy += c.y * a;
                        sum_a += a;
                    }
                }
                if sum_a > 0.0 {
                    Some(Coord::new(cx / sum_a, cy / sum_a))
                } else {
                    polys.first().and_then(|p| polygon_centroid(p))
                }
            }
            Geometry::GeometryCollection(parts) => mean(
                parts
                    .iter()
                    .filter_map(Geometry::centroid)
                    .collect::<Vec<_>>()
                    .iter(),
            ),
        }
    }

    /// A point guaranteed to lie on the geometry.
    pub fn point_on_surface(&self) -> Option<Coord> {
        match self {
            Geometry::Point(c) => *c,
            Geometry::MultiPoint(v) => v.first().copied(),
            Geometry::LineString(v) => v.get(v.len() / 2).copied(),
            Geometry::MultiLineString(lines) => lines.first().and_then(|l| l.get(l.len() / 2)).copied(),
            Geometry::Polygon(rings) => polygon_interior_point(rings),
            Geometry::MultiPolygon(polys) => polys
                .iter()
                .max_by(|a, b| polygon_area(a).total_cmp(&polygon_area(b)))
                .and_then(|p| polygon_interior_point(p)),
            Geometry::GeometryCollection(parts) => parts.iter().find_map(Geometry::point_on_surface),
        }
    }

    /// Axis aligned square with the given area centred on `center`.
    pub fn square(center: Coord, area: f64) -> Geometry {
        let half = area.abs().sqrt() / 2.0;
        let ring = vec![
            Coord::new(center.x - half, center.y - half),
            Coord::new(center.x + half, center.y - half),
            Coord::new(center.x + half, center.y + half),
            Coord::new(center.x - half, center.y + half),
            Coord::new(center.x - half, center.y - half),
        ];
        Geometry::Polygon(vec![ring])
    }

    /// Polygonal approximation of a circle, 8 segments per quadrant.
    pub fn circle(center: Coord, radius: f64) -> Geometry {
        const SEGMENTS: usize = 32;
        let mut ring: Ring = (0..SEGMENTS)
            .map(|i| {
                let angle = 2.0 * std::f64::consts::PI * (i as f64) / (SEGMENTS as f64);
                Coord::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
            })
            .collect();
        ring.push(ring[0]);
        Geometry::Polygon(vec![ring])
    }

    pub fn to_wkt(&self) -> String {
        let mut out = String::new();
        write_wkt(self, &mut out);
        out
    }

    pub fn to_ewkt(&self, srid: i32) -> String {
        format!("SRID={};{}", srid, self.to_wkt())
    }

    pub fn from_wkt(text: &str) -> Result<Geometry, SchemaError> {
        let mut parser = WktParser::new(text);
        let geom = parser.geometry()?;
        parser.skip_ws();
        if parser.pos < parser.bytes.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(geom)
    }

    /// Parses `SRID=n;WKT`. Plain WKT yields no SRID.
    pub fn from_ewkt(text: &str) -> Result<(Option<i32>, Geometry), SchemaError> {
        let trimmed = text.trim();
        if let Some(rest) = trimmed
            .strip_prefix("SRID=")
            .or_else(|| trimmed.strip_prefix("srid="))
        {
            let (srid, wkt) = rest
                .split_once(';')
                .ok_or_else(|| SchemaError::Geometry(format!("invalid EWKT: {}", text)))?;
            let srid = srid
                .trim()
                .parse::<i32>()
                .map_err(|_| SchemaError::Geometry(format!("invalid EWKT SRID: {}", srid)))?;
            return Ok((Some(srid), Geometry::from_wkt(wkt)?));
        }
        Ok((None, Geometry::from_wkt(trimmed)?))
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wkt())
    }
}

fn mean<'a>(coords: impl Iterator<Item = &'a Coord>) -> Option<Coord> {
    let (mut sx, mut sy, mut n) = (0.0, 0.0, 0usize);
    for c in coords {
        sx += c.x;
        sy += c.y;
        n += 1;
    }
    (n > 0).then(|| Coord::new(sx / n as f64, sy / n as f64))
}

fn line_length(coords: &[Coord]) -> f64 {
    coords.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

fn line_centroid(coords: &[Coord]) -> Option<Coord> {
    let total = line_length(coords);
    if total == 0.0 {
        return coords.first().copied();
    }
    let (mut cx, mut cy) = (0.0, 0.0);
    for w in coords.windows(2) {
        let len = w[0].distance(&w[1]);
        cx += (w[0].x + w[1].x) / 2.0 * len;
        cy += (w[0].y + w[1].y) / 2.0 * len;
    }
    Some(Coord::new(cx / total, cy / total))
}

fn ring_signed_area(ring: &[Coord]) -> f64 {
    ring.windows(2)
        .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
        .sum::<f64>()
        / 2.0
}

fn polygon_area(rings: &[Ring]) -> f64 {
    let mut iter = rings.iter();
    let Some(exterior) = iter.next() else {
        return 0.0;
    };
    let holes: f64 = iter.map(|r| ring_signed_area(r).abs()).sum();
    (ring_signed_area(exterior).abs() - holes).max(0.0)
}

fn polygon_centroid(rings: &[Ring]) -> Option<Coord> {
    let exterior = rings.first()?;
    let a = ring_signed_area(exterior);
    if a == 0.0 {
        return mean(exterior.iter());
    }
    let (mut cx, mut cy) = (0.0, 0.0);
    for w in exterior.windows(2) {
        let cross = w[0].x * w[1].y - w[1].x * w[0].y;
        cx += (w[0].x + w[1].x) * cross;
        cy += (w[0].y + w[1].y) * cross;
    }
    Some(Coord::new(cx / (6.0 * a), cy / (6.0 * a)))
}

fn point_in_ring(p: &Coord, ring: &[Coord]) -> bool {
    let mut inside = false;
    for w in ring.windows(2) {
        let (a, b) = (w[0], w[1]);
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x {
                inside = !inside;
            }
        }
    }
    inside
}

fn polygon_contains(rings: &[Ring], p: &Coord) -> bool {
    match rings.split_first() {
        Some((exterior, holes)) => {
            point_in_ring(p, exterior) && !holes.iter().any(|h| point_in_ring(p, h))
        }
        None => false,
    }
}

fn polygon_interior_point(rings: &[Ring]) -> Option<Coord> {
    if let Some(c) = polygon_centroid(rings) {
        if polygon_contains(rings, &c) {
            return Some(c);
        }
    }
    // scanline through the middle of the envelope, widest inside interval
    let env = Envelope::from_coords(rings.iter().flatten())?;
    let y = (env.min_y + env.max_y) / 2.0;
    let mut xs: Vec<f64> = Vec::new();
    for ring in rings {
        for w in ring.windows(2) {
            let (a, b) = (w[0], w[1]);
            if (a.y > y) != (b.y > y) {
                xs.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
            }
        }
    }
    xs.sort_by(f64::total_cmp);
    xs.chunks_exact(2)
        .max_by(|a, b| (a[1] - a[0]).total_cmp(&(b[1] - b[0])))
        .map(|pair| Coord::new((pair[0] + pair[1]) / 2.0, y))
        .or_else(|| rings.first().and_then(|r| r.first()).copied())
}

// ---- WKT writer ----

fn write_coord(c: &Coord, out: &mut String) {
    out.push_str(&format!("{} {}", c.x, c.y));
}

fn write_seq(seq: &[Coord], out: &mut String) {
    out.push('(');
    for (i, c) in seq.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_coord(c, out);
    }
    out.push(')');
}

fn write_rings(rings: &[Ring], out: &mut String) {
    out.push('(');
    for (i, r) in rings.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_seq(r, out);
    }
    out.push(')');
}

fn write_wkt(geom: &Geometry, out: &mut String) {
    out.push_str(geom.kind().name());
    if geom.is_empty() {
        out.push_str(" EMPTY");
        return;
    }
    match geom {
        Geometry::Point(Some(c)) => {
            out.push('(');
            write_coord(c, out);
            out.push(')');
        }
        Geometry::Point(None) => {}
        Geometry::LineString(v) | Geometry::MultiPoint(v) => write_seq(v, out),
        Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => write_rings(rings, out),
        Geometry::MultiPolygon(polys) => {
            out.push('(');
            for (i, p) in polys.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_rings(p, out);
            }
            out.push(')');
        }
        Geometry::GeometryCollection(parts) => {
            out.push('(');
            for (i, g) in parts.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_wkt(g, out);
            }
            out.push(')');
        }
    }
}

// ---- WKT parser ----

struct WktParser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WktParser<'a> {
    fn new(text: &'a str) -> Self {
        WktParser {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, what: &str) -> SchemaError {
        SchemaError::Geometry(format!("invalid WKT at {}: {} in '{}'", self.pos, what, self.text))
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, ch: u8) -> Result<(), SchemaError> {
        if self.peek() == Some(ch) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", ch as char)))
        }
    }

    fn word(&mut self) -> String {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_alphabetic() {
            self.pos += 1;
        }
        self.text[start..self.pos].to_ascii_uppercase()
    }

    fn number(&mut self) -> Result<f64, SchemaError> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.bytes.len()
            && matches!(self.bytes[self.pos], b'0'..=b'9' | b'.' | b'-' | b'+' | b'e' | b'E')
        {
            self.pos += 1;
        }
        self.text[start..self.pos]
            .parse::<f64>()
            .map_err(|_| self.error("expected number"))
    }

    fn coord(&mut self) -> Result<Coord, SchemaError> {
        let x = self.number()?;
        let y = self.number()?;
        // drop any Z/M ordinates
        while matches!(self.peek(), Some(b'0'..=b'9' | b'-' | b'+' | b'.')) {
            self.number()?;
        }
        Ok(Coord::new(x, y))
    }

    fn empty_or_open(&mut self) -> Result<bool, SchemaError> {
        if self.peek() == Some(b'(') {
            self.pos += 1;
            return Ok(true);
        }
        let save = self.pos;
        if self.word() == "EMPTY" {
            return Ok(false);
        }
        self.pos = save;
        Err(self.error("expected '(' or EMPTY"))
    }

    fn seq(&mut self) -> Result<Vec<Coord>, SchemaError> {
        self.expect(b'(')?;
        let mut coords = vec![self.coord()?];
        while self.peek() == Some(b',') {
            self.pos += 1;
            coords.push(self.coord()?);
        }
        self.expect(b')')?;
        Ok(coords)
    }

    fn list<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T, SchemaError>,
    ) -> Result<Vec<T>, SchemaError> {
        let mut items = vec![item(self)?];
        while self.peek() == Some(b',') {
            self.pos += 1;
            items.push(item(self)?);
        }
        self.expect(b')')?;
        Ok(items)
    }

    fn geometry(&mut self) -> Result<Geometry, SchemaError> {
        let tag = self.word();
        let kind = GeometryKind::from_name(&tag).ok_or_else(|| self.error("unknown geometry type"))?;
        // tolerate Z, M and ZM dimension markers
        let save = self.pos;
        if !matches!(self.word().as_str(), "Z" | "M" | "ZM") {
            self.pos = save;
        }
        let open = self.empty_or_open()?;
        let geom = match kind {
            GeometryKind::Point => {
                if open {
                    let c = self.coord()?;
                    self.expect(b')')?;
                    Geometry::Point(Some(c))
                } else {
                    Geometry::Point(None)
                }
            }
            GeometryKind::LineString if open => Geometry::LineString(self.list(Self::coord)?),
            GeometryKind::LineString => Geometry::LineString(Vec::new()),
            GeometryKind::Polygon if open => Geometry::Polygon(self.list(Self::seq)?),
            GeometryKind::Polygon => Geometry::Polygon(Vec::new()),
            GeometryKind::MultiPoint if open => Geometry::MultiPoint(self.list(|p| {
                if p.peek() == Some(b'(') {
                    p.pos += 1;
                    let c = p.coord()?;
                    p.expect(b')')?;
                    Ok(c)
                } else {
                    p.coord()
                }
            })?),
            GeometryKind::MultiPoint => Geometry::MultiPoint(Vec::new()),
            GeometryKind::MultiLineString if open => Geometry::MultiLineString(self.list(Self::seq)?),
            GeometryKind::MultiLineString => Geometry::MultiLineString(Vec::new()),
            GeometryKind::MultiPolygon if open => Geometry::MultiPolygon(self.list(|p| {
                p.expect(b'(')?;
                p.list(Self::seq)
            })?),
            GeometryKind::MultiPolygon => Geometry::MultiPolygon(Vec::new()),
            GeometryKind::GeometryCollection if open => {
                Geometry::GeometryCollection(self.list(Self::geometry)?)
            }
            GeometryKind::GeometryCollection => Geometry::GeometryCollection(Vec::new()),
            GeometryKind::Geometry => return Err(self.error("GEOMETRY is not a concrete type")),
        };
        Ok(geom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_and_format_wkt() {
        let cases = [
            ("POINT(1 2)", "POINT(1 2)"),
            ("point (1.5 -2)", "POINT(1.5 -2)"),
            ("LINESTRING(0 0, 1 1, 2 0)", "LINESTRING(0 0, 1 1, 2 0)"),
            (
                "POLYGON((0 0,4 0,4 4,0 4,0 0),(1 1,2 1,2 2,1 1))",
                "POLYGON((0 0, 4 0, 4 4, 0 4, 0 0), (1 1, 2 1, 2 2, 1 1))",
            ),
            ("MULTIPOINT((1 2),(3 4))", "MULTIPOINT(1 2, 3 4)"),
            (
                "MULTIPOLYGON(((0 0,1 0,1 1,0 0)),((5 5,6 5,6 6,5 5)))",
                "MULTIPOLYGON(((0 0, 1 0, 1 1, 0 0)), ((5 5, 6 5, 6 6, 5 5)))",
            ),
            (
                "GEOMETRYCOLLECTION(POINT(1 1),LINESTRING(0 0,1 1))",
                "GEOMETRYCOLLECTION(POINT(1 1), LINESTRING(0 0, 1 1))",
            ),
            ("POINT Z (1 2 3)", "POINT(1 2)"),
            ("POINT EMPTY", "POINT EMPTY"),
        ];
        for (input, expected) in cases {
            let geom = Geometry::from_wkt(input).unwrap();
            assert_eq!(geom.to_wkt(), expected, "input {}", input);
        }
    }

    #[test]
    fn test_invalid_wkt() {
        for input in ["", "POINT", "POINT(1)", "CIRCLE(1 2)", "POINT(1 2) junk"] {
            assert!(Geometry::from_wkt(input).is_err(), "input {}", input);
        }
    }

    #[test]
    fn test_ewkt() {
        let (srid, geom) = Geometry::from_ewkt("SRID=28992;POINT(155000 463000)").unwrap();
        assert_eq!(srid, Some(28992));
        assert_eq!(geom, Geometry::point(155000.0, 463000.0));
        assert_eq!(geom.to_ewkt(28992), "SRID=28992;POINT(155000 463000)");

        let (srid, _) = Geometry::from_ewkt("POINT(1 2)").unwrap();
        assert_eq!(srid, None);
        assert!(Geometry::from_ewkt("SRID=abc;POINT(1 2)").is_err());
    }

    #[test]
    fn test_area_and_centroid() {
        let square = Geometry::square(Coord::new(10.0, 20.0), 16.0);
        assert!((square.area() - 16.0).abs() < 1e-9);
        let c = square.centroid().unwrap();
        assert!((c.x - 10.0).abs() < 1e-9 && (c.y - 20.0).abs() < 1e-9);

        let holed = Geometry::from_wkt("POLYGON((0 0,4 0,4 4,0 4,0 0),(1 1,3 1,3 3,1 3,1 1))").unwrap();
        assert!((holed.area() - 12.0).abs() < 1e-9);

        let circle = Geometry::circle(Coord::new(0.0, 0.0), 1.0);
        assert!((circle.area() - std::f64::consts::PI).abs() < 0.05);
    }

    #[test]
    fn test_point_on_surface_inside_concave() {
        // U shape whose centroid lies in the notch
        let u = Geometry::from_wkt("POLYGON((0 0,3 0,3 3,2 3,2 1,1 1,1 3,0 3,0 0))").unwrap();
        let p = u.point_on_surface().unwrap();
        let Geometry::Polygon(rings) = &u else { unreachable!() };
        assert!(polygon_contains(rings, &p), "{:?}", p);
    }

    #[test]
    fn test_geometry_n_and_polygons() {
        let multi = Geometry::from_wkt("MULTIPOLYGON(((0 0,1 0,1 1,0 0)),((5 5,6 5,6 6,5 5)))").unwrap();
        assert_eq!(multi.num_geometries(), 2);
        assert_eq!(multi.geometry_n(2).unwrap().kind(), GeometryKind::Polygon);
        assert!(multi.geometry_n(3).is_none());
        assert_eq!(multi.polygons().len(), 2);

        let env = multi.envelope().unwrap();
        assert_eq!((env.min_x, env.min_y, env.max_x, env.max_y), (0.0, 0.0, 6.0, 6.0));
    }

    #[test]
    fn test_kind_codes() {
        for code in 0..=7 {
            let kind = GeometryKind::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
            assert_eq!(GeometryKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(GeometryKind::from_code(1003), Some(GeometryKind::Polygon));
        assert_eq!(GeometryKind::from_code(9), None);
    }
}
