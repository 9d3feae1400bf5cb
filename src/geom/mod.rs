//! In-memory geometry values and their text/binary encodings.
//!
//! `Geometry` is a closed enum over the seven simple-feature variants. Every
//! node carries its own `Dimension` and an optional SRID; those are set when
//! the value is built or parsed and are never recomputed from the children.
//!
//! Encodings live in the submodules:
//!
//! - WKT / EWKT: `Geometry::parse_wkt`, `Geometry::to_wkt`, `Geometry::to_ewkt`
//! - WKB / EWKB: `Geometry::parse_wkb`, `Geometry::to_wkb`, `Geometry::to_ewkb`
//! - TWKB: `Geometry::parse_twkb`, `Geometry::to_twkb`, `Geometry::to_twkb_with`
//! - GeoJSON: `Geometry::parse_geojson`, `Geometry::to_geojson`
//! - geo-traits: `Geometry::from_geo_traits`

mod bytes;
mod geojson;
mod traits;
mod twkb;
mod varint;
mod wkb;
mod wkt;

use crate::error::{GpkgError, Result};

pub use geojson::{CrsStyle, GEOJSON_DEFAULT_SRID};
pub use twkb::TwkbPrecision;
pub(crate) use bytes::ByteReader;
pub(crate) use wkb::write_wkb;

/// Deepest collection nesting the decoders accept. The top-level geometry is depth 0.
pub(crate) const MAX_NESTING_DEPTH: usize = 128;

/// Fails once a decoder recurses past [`MAX_NESTING_DEPTH`].
pub(crate) fn check_nesting(depth: usize, position: usize) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(GpkgError::Parse {
            expected: "geometry nested at most 128 levels deep",
            position,
        });
    }
    Ok(())
}

/// The seven geometry types and their WKB codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum GeometryType {
    Point = 1,
    LineString = 2,
    Polygon = 3,
    MultiPoint = 4,
    MultiLineString = 5,
    MultiPolygon = 6,
    GeometryCollection = 7,
}

impl GeometryType {
    pub const ALL: [Self; 7] = [
        Self::Point,
        Self::LineString,
        Self::Polygon,
        Self::MultiPoint,
        Self::MultiLineString,
        Self::MultiPolygon,
        Self::GeometryCollection,
    ];

    /// The base WKB type code (1-7).
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            1 => Ok(Self::Point),
            2 => Ok(Self::LineString),
            3 => Ok(Self::Polygon),
            4 => Ok(Self::MultiPoint),
            5 => Ok(Self::MultiLineString),
            6 => Ok(Self::MultiPolygon),
            7 => Ok(Self::GeometryCollection),
            _ => Err(GpkgError::UnsupportedGeometryType(code)),
        }
    }

    /// Upper-case WKT keyword, also used for `gpkg_geometry_columns.geometry_type_name`.
    pub fn wkt_name(self) -> &'static str {
        match self {
            Self::Point => "POINT",
            Self::LineString => "LINESTRING",
            Self::Polygon => "POLYGON",
            Self::MultiPoint => "MULTIPOINT",
            Self::MultiLineString => "MULTILINESTRING",
            Self::MultiPolygon => "MULTIPOLYGON",
            Self::GeometryCollection => "GEOMETRYCOLLECTION",
        }
    }

    pub fn geojson_name(self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::LineString => "LineString",
            Self::Polygon => "Polygon",
            Self::MultiPoint => "MultiPoint",
            Self::MultiLineString => "MultiLineString",
            Self::MultiPolygon => "MultiPolygon",
            Self::GeometryCollection => "GeometryCollection",
        }
    }

    pub(crate) fn from_wkt_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.wkt_name().eq_ignore_ascii_case(name))
    }
}

/// Coordinate dimensionality of a geometry node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Dimension {
    #[default]
    Xy,
    Xyz,
    Xym,
    Xyzm,
}

impl Dimension {
    pub fn from_zm(has_z: bool, has_m: bool) -> Self {
        match (has_z, has_m) {
            (false, false) => Self::Xy,
            (true, false) => Self::Xyz,
            (false, true) => Self::Xym,
            (true, true) => Self::Xyzm,
        }
    }

    pub fn has_z(self) -> bool {
        matches!(self, Self::Xyz | Self::Xyzm)
    }

    pub fn has_m(self) -> bool {
        matches!(self, Self::Xym | Self::Xyzm)
    }

    /// Number of ordinates per coordinate.
    pub fn size(self) -> usize {
        2 + usize::from(self.has_z()) + usize::from(self.has_m())
    }
}

/// A single position. `z` / `m` are present when the owning geometry declares them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: Option<f64>,
}

impl Coord {
    pub fn xy(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            m: None,
        }
    }

    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z: Some(z),
            m: None,
        }
    }

    pub fn xym(x: f64, y: f64, m: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            m: Some(m),
        }
    }

    pub fn xyzm(x: f64, y: f64, z: f64, m: f64) -> Self {
        Self {
            x,
            y,
            z: Some(z),
            m: Some(m),
        }
    }

    /// The dimension implied by which ordinates are present.
    pub fn dim(&self) -> Dimension {
        Dimension::from_zm(self.z.is_some(), self.m.is_some())
    }
}

fn dim_of_first(coords: &[Coord]) -> Dimension {
    coords.first().map(Coord::dim).unwrap_or_default()
}

#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    /// `None` for an empty point.
    pub coord: Option<Coord>,
    pub dim: Dimension,
    pub srid: Option<u32>,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self::from_coord(Coord::xy(x, y))
    }

    pub fn from_coord(coord: Coord) -> Self {
        Self {
            dim: coord.dim(),
            coord: Some(coord),
            srid: None,
        }
    }

    pub fn empty(dim: Dimension) -> Self {
        Self {
            coord: None,
            dim,
            srid: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LineString {
    pub points: Vec<Coord>,
    pub dim: Dimension,
    pub srid: Option<u32>,
}

impl LineString {
    /// Build a line string whose dimension follows its first coordinate.
    pub fn new(points: Vec<Coord>) -> Self {
        Self {
            dim: dim_of_first(&points),
            points,
            srid: None,
        }
    }

    pub fn empty(dim: Dimension) -> Self {
        Self {
            points: Vec::new(),
            dim,
            srid: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
    pub interiors: Vec<Vec<Coord>>,
    pub dim: Dimension,
    pub srid: Option<u32>,
}

impl Polygon {
    pub fn new(exterior: Vec<Coord>, interiors: Vec<Vec<Coord>>) -> Self {
        Self {
            dim: dim_of_first(&exterior),
            exterior,
            interiors,
            srid: None,
        }
    }

    pub fn empty(dim: Dimension) -> Self {
        Self {
            exterior: Vec::new(),
            interiors: Vec::new(),
            dim,
            srid: None,
        }
    }

    /// Exterior ring followed by the interior rings.
    pub fn rings(&self) -> impl Iterator<Item = &Vec<Coord>> {
        std::iter::once(&self.exterior).chain(self.interiors.iter())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MultiPoint {
    pub points: Vec<Point>,
    pub dim: Dimension,
    pub srid: Option<u32>,
}

impl MultiPoint {
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            dim: points.first().map(|p| p.dim).unwrap_or_default(),
            points,
            srid: None,
        }
    }

    pub fn empty(dim: Dimension) -> Self {
        Self {
            points: Vec::new(),
            dim,
            srid: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MultiLineString {
    pub line_strings: Vec<LineString>,
    pub dim: Dimension,
    pub srid: Option<u32>,
}

impl MultiLineString {
    pub fn new(line_strings: Vec<LineString>) -> Self {
        Self {
            dim: line_strings.first().map(|l| l.dim).unwrap_or_default(),
            line_strings,
            srid: None,
        }
    }

    pub fn empty(dim: Dimension) -> Self {
        Self {
            line_strings: Vec::new(),
            dim,
            srid: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MultiPolygon {
    pub polygons: Vec<Polygon>,
    pub dim: Dimension,
    pub srid: Option<u32>,
}

impl MultiPolygon {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self {
            dim: polygons.first().map(|p| p.dim).unwrap_or_default(),
            polygons,
            srid: None,
        }
    }

    pub fn empty(dim: Dimension) -> Self {
        Self {
            polygons: Vec::new(),
            dim,
            srid: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeometryCollection {
    pub geometries: Vec<Geometry>,
    pub dim: Dimension,
    pub srid: Option<u32>,
}

impl GeometryCollection {
    pub fn new(geometries: Vec<Geometry>) -> Self {
        Self {
            dim: geometries.first().map(Geometry::dim).unwrap_or_default(),
            geometries,
            srid: None,
        }
    }

    pub fn empty(dim: Dimension) -> Self {
        Self {
            geometries: Vec::new(),
            dim,
            srid: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point(Point),
    LineString(LineString),
    Polygon(Polygon),
    MultiPoint(MultiPoint),
    MultiLineString(MultiLineString),
    MultiPolygon(MultiPolygon),
    GeometryCollection(GeometryCollection),
}

impl Geometry {
    /// An empty geometry of the given type.
    pub fn empty(geometry_type: GeometryType, dim: Dimension) -> Self {
        match geometry_type {
            GeometryType::Point => Self::Point(Point::empty(dim)),
            GeometryType::LineString => Self::LineString(LineString::empty(dim)),
            GeometryType::Polygon => Self::Polygon(Polygon::empty(dim)),
            GeometryType::MultiPoint => Self::MultiPoint(MultiPoint::empty(dim)),
            GeometryType::MultiLineString => Self::MultiLineString(MultiLineString::empty(dim)),
            GeometryType::MultiPolygon => Self::MultiPolygon(MultiPolygon::empty(dim)),
            GeometryType::GeometryCollection => {
                Self::GeometryCollection(GeometryCollection::empty(dim))
            }
        }
    }

    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Self::Point(_) => GeometryType::Point,
            Self::LineString(_) => GeometryType::LineString,
            Self::Polygon(_) => GeometryType::Polygon,
            Self::MultiPoint(_) => GeometryType::MultiPoint,
            Self::MultiLineString(_) => GeometryType::MultiLineString,
            Self::MultiPolygon(_) => GeometryType::MultiPolygon,
            Self::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }

    pub fn dim(&self) -> Dimension {
        match self {
            Self::Point(g) => g.dim,
            Self::LineString(g) => g.dim,
            Self::Polygon(g) => g.dim,
            Self::MultiPoint(g) => g.dim,
            Self::MultiLineString(g) => g.dim,
            Self::MultiPolygon(g) => g.dim,
            Self::GeometryCollection(g) => g.dim,
        }
    }

    pub fn has_z(&self) -> bool {
        self.dim().has_z()
    }

    pub fn has_m(&self) -> bool {
        self.dim().has_m()
    }

    pub fn srid(&self) -> Option<u32> {
        match self {
            Self::Point(g) => g.srid,
            Self::LineString(g) => g.srid,
            Self::Polygon(g) => g.srid,
            Self::MultiPoint(g) => g.srid,
            Self::MultiLineString(g) => g.srid,
            Self::MultiPolygon(g) => g.srid,
            Self::GeometryCollection(g) => g.srid,
        }
    }

    pub fn set_srid(&mut self, srid: Option<u32>) {
        match self {
            Self::Point(g) => g.srid = srid,
            Self::LineString(g) => g.srid = srid,
            Self::Polygon(g) => g.srid = srid,
            Self::MultiPoint(g) => g.srid = srid,
            Self::MultiLineString(g) => g.srid = srid,
            Self::MultiPolygon(g) => g.srid = srid,
            Self::GeometryCollection(g) => g.srid = srid,
        }
    }

    pub fn with_srid(mut self, srid: u32) -> Self {
        self.set_srid(Some(srid));
        self
    }

    /// True when this node holds no coordinate data of its own.
    ///
    /// A multi geometry holding only empty members is not itself empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Point(g) => g.coord.is_none(),
            Self::LineString(g) => g.points.is_empty(),
            Self::Polygon(g) => g.exterior.is_empty(),
            Self::MultiPoint(g) => g.points.is_empty(),
            Self::MultiLineString(g) => g.line_strings.is_empty(),
            Self::MultiPolygon(g) => g.polygons.is_empty(),
            Self::GeometryCollection(g) => g.geometries.is_empty(),
        }
    }

    /// Visit every coordinate depth-first, in storage order.
    pub fn for_each_coord<F: FnMut(&Coord)>(&self, f: &mut F) {
        match self {
            Self::Point(g) => {
                if let Some(coord) = &g.coord {
                    f(coord);
                }
            }
            Self::LineString(g) => g.points.iter().for_each(&mut *f),
            Self::Polygon(g) => {
                for ring in g.rings() {
                    ring.iter().for_each(&mut *f);
                }
            }
            Self::MultiPoint(g) => {
                for coord in g.points.iter().filter_map(|p| p.coord.as_ref()) {
                    f(coord);
                }
            }
            Self::MultiLineString(g) => {
                for line in &g.line_strings {
                    line.points.iter().for_each(&mut *f);
                }
            }
            Self::MultiPolygon(g) => {
                for ring in g.polygons.iter().flat_map(Polygon::rings) {
                    ring.iter().for_each(&mut *f);
                }
            }
            Self::GeometryCollection(g) => {
                for geometry in &g.geometries {
                    geometry.for_each_coord(f);
                }
            }
        }
    }
}

impl From<Point> for Geometry {
    fn from(value: Point) -> Self {
        Self::Point(value)
    }
}

impl From<LineString> for Geometry {
    fn from(value: LineString) -> Self {
        Self::LineString(value)
    }
}

impl From<Polygon> for Geometry {
    fn from(value: Polygon) -> Self {
        Self::Polygon(value)
    }
}

impl From<MultiPoint> for Geometry {
    fn from(value: MultiPoint) -> Self {
        Self::MultiPoint(value)
    }
}

impl From<MultiLineString> for Geometry {
    fn from(value: MultiLineString) -> Self {
        Self::MultiLineString(value)
    }
}

impl From<MultiPolygon> for Geometry {
    fn from(value: MultiPolygon) -> Self {
        Self::MultiPolygon(value)
    }
}

impl From<GeometryCollection> for Geometry {
    fn from(value: GeometryCollection) -> Self {
        Self::GeometryCollection(value)
    }
}
