//! Tiny WKB: precision-scaled integer coordinates, delta-encoded as zigzag varints.
//!
//! Header: one byte `(zigzag(xy precision) << 4) | type`, one metadata byte
//! (bbox, size, id list, extended precision, empty), then the optional
//! extended-precision byte, size varint and bounding box. Coordinates of one
//! geometry share a single delta accumulator starting at the origin; each
//! member of a collection starts over with its own header.

use crate::error::{GpkgError, Result};

use super::bytes::ByteReader;
use super::varint::{encode_varint, zigzag_decode, zigzag_encode};
use super::{
    Coord, Dimension, Geometry, GeometryCollection, GeometryType, LineString, MultiLineString,
    MultiPoint, MultiPolygon, Point, Polygon, check_nesting,
};

const FLAG_BBOX: u8 = 0x01;
const FLAG_SIZE: u8 = 0x02;
const FLAG_ID_LIST: u8 = 0x04;
const FLAG_EXTENDED: u8 = 0x08;
const FLAG_EMPTY: u8 = 0x10;

/// Decimal digits kept per axis when writing TWKB.
///
/// `xy` must fit a 4-bit zigzag (-8..=7), `z` and `m` a 3-bit zigzag (-4..=3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TwkbPrecision {
    xy: i8,
    z: i8,
    m: i8,
}

impl Default for TwkbPrecision {
    fn default() -> Self {
        Self { xy: 5, z: 0, m: 0 }
    }
}

impl TwkbPrecision {
    pub fn new(xy: i8, z: i8, m: i8) -> Result<Self> {
        if !(-8..=7).contains(&xy) || !(-4..=3).contains(&z) || !(-4..=3).contains(&m) {
            return Err(GpkgError::Message(format!(
                "TWKB precision out of range: xy={xy}, z={z}, m={m}"
            )));
        }
        Ok(Self { xy, z, m })
    }

    pub fn xy(&self) -> i8 {
        self.xy
    }

    pub fn z(&self) -> i8 {
        self.z
    }

    pub fn m(&self) -> i8 {
        self.m
    }
}

impl Geometry {
    pub fn parse_twkb(buf: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(buf);
        read_geometry(&mut reader, 0)
    }

    /// Encode with the default precision (5 decimal digits for x/y, 0 for z/m).
    ///
    /// TWKB cannot hold an empty point inside a multipoint: such members are
    /// dropped, and a multipoint with no non-empty member is written as
    /// `MULTIPOINT EMPTY`.
    pub fn to_twkb(&self) -> Vec<u8> {
        self.to_twkb_with(TwkbPrecision::default())
    }

    pub fn to_twkb_with(&self, precision: TwkbPrecision) -> Vec<u8> {
        let mut buf = Vec::new();
        write_geometry(&mut buf, self, precision);
        buf
    }
}

/// Scale factors per ordinate, in x, y, z, m order.
struct Scale {
    factors: [f64; 4],
    dim: Dimension,
}

impl Scale {
    fn new(precision: TwkbPrecision, dim: Dimension) -> Self {
        let xy = 10f64.powi(i32::from(precision.xy));
        Self {
            factors: [
                xy,
                xy,
                10f64.powi(i32::from(precision.z)),
                10f64.powi(i32::from(precision.m)),
            ],
            dim,
        }
    }
}

fn read_geometry(reader: &mut ByteReader<'_>, depth: usize) -> Result<Geometry> {
    check_nesting(depth, reader.position())?;
    let type_byte = reader.read_u8()?;
    let metadata = reader.read_u8()?;

    let type_code = u32::from(type_byte & 0x0F);
    let xy_precision = zigzag_decode(u64::from(type_byte >> 4)) as i8;

    let (dim, z_precision, m_precision) = if metadata & FLAG_EXTENDED != 0 {
        let extended = reader.read_u8()?;
        (
            Dimension::from_zm(extended & 0x01 != 0, extended & 0x02 != 0),
            zigzag_decode(u64::from((extended & 0x1C) >> 2)) as i8,
            zigzag_decode(u64::from((extended & 0xE0) >> 5)) as i8,
        )
    } else {
        (Dimension::Xy, 0, 0)
    };

    if metadata & FLAG_SIZE != 0 {
        reader.read_varint()?;
    }
    if metadata & FLAG_BBOX != 0 {
        for _ in 0..dim.size() {
            reader.read_varint()?;
            reader.read_varint()?;
        }
    }

    let geometry_type = GeometryType::from_code(type_code)?;
    if metadata & FLAG_EMPTY != 0 {
        return Ok(Geometry::empty(geometry_type, dim));
    }

    let scale = Scale::new(
        TwkbPrecision {
            xy: xy_precision,
            z: z_precision,
            m: m_precision,
        },
        dim,
    );
    let has_id_list = metadata & FLAG_ID_LIST != 0;
    let mut prev = [0i64; 4];

    let geometry = match geometry_type {
        GeometryType::Point => Geometry::Point(Point {
            coord: Some(read_coord(reader, &scale, &mut prev)?),
            dim,
            srid: None,
        }),
        GeometryType::LineString => Geometry::LineString(LineString {
            points: read_coords(reader, &scale, &mut prev)?,
            dim,
            srid: None,
        }),
        GeometryType::Polygon => Geometry::Polygon(read_polygon(reader, &scale, &mut prev)?),
        GeometryType::MultiPoint => {
            let count = read_count(reader, has_id_list)?;
            let mut points = Vec::new();
            for _ in 0..count {
                points.push(Point {
                    coord: Some(read_coord(reader, &scale, &mut prev)?),
                    dim,
                    srid: None,
                });
            }
            Geometry::MultiPoint(MultiPoint {
                points,
                dim,
                srid: None,
            })
        }
        GeometryType::MultiLineString => {
            let count = read_count(reader, has_id_list)?;
            let mut line_strings = Vec::new();
            for _ in 0..count {
                line_strings.push(LineString {
                    points: read_coords(reader, &scale, &mut prev)?,
                    dim,
                    srid: None,
                });
            }
            Geometry::MultiLineString(MultiLineString {
                line_strings,
                dim,
                srid: None,
            })
        }
        GeometryType::MultiPolygon => {
            let count = read_count(reader, has_id_list)?;
            let mut polygons = Vec::new();
            for _ in 0..count {
                polygons.push(read_polygon(reader, &scale, &mut prev)?);
            }
            Geometry::MultiPolygon(MultiPolygon {
                polygons,
                dim,
                srid: None,
            })
        }
        GeometryType::GeometryCollection => {
            let count = read_count(reader, has_id_list)?;
            let mut geometries = Vec::new();
            for _ in 0..count {
                geometries.push(read_geometry(reader, depth + 1)?);
            }
            Geometry::GeometryCollection(GeometryCollection {
                geometries,
                dim,
                srid: None,
            })
        }
    };
    Ok(geometry)
}

/// Member count of a multi geometry, skipping the id list when present.
fn read_count(reader: &mut ByteReader<'_>, has_id_list: bool) -> Result<u64> {
    let count = reader.read_varint()?;
    if has_id_list {
        for _ in 0..count {
            reader.read_varint()?;
        }
    }
    Ok(count)
}

fn read_delta(reader: &mut ByteReader<'_>, prev: &mut i64) -> Result<i64> {
    *prev = prev.wrapping_add(zigzag_decode(reader.read_varint()?));
    Ok(*prev)
}

fn read_coord(reader: &mut ByteReader<'_>, scale: &Scale, prev: &mut [i64; 4]) -> Result<Coord> {
    let [fx, fy, fz, fm] = scale.factors;
    let x = read_delta(reader, &mut prev[0])? as f64 / fx;
    let y = read_delta(reader, &mut prev[1])? as f64 / fy;
    let z = if scale.dim.has_z() {
        Some(read_delta(reader, &mut prev[2])? as f64 / fz)
    } else {
        None
    };
    let m = if scale.dim.has_m() {
        Some(read_delta(reader, &mut prev[3])? as f64 / fm)
    } else {
        None
    };
    Ok(Coord { x, y, z, m })
}

fn read_coords(reader: &mut ByteReader<'_>, scale: &Scale, prev: &mut [i64; 4]) -> Result<Vec<Coord>> {
    let count = reader.read_varint()?;
    let mut coords = Vec::new();
    for _ in 0..count {
        coords.push(read_coord(reader, scale, prev)?);
    }
    Ok(coords)
}

fn read_polygon(reader: &mut ByteReader<'_>, scale: &Scale, prev: &mut [i64; 4]) -> Result<Polygon> {
    let ring_count = reader.read_varint()?;
    let mut exterior = Vec::new();
    let mut interiors = Vec::new();
    for i in 0..ring_count {
        let ring = read_coords(reader, scale, prev)?;
        if i == 0 {
            exterior = ring;
        } else {
            interiors.push(ring);
        }
    }
    Ok(Polygon {
        exterior,
        interiors,
        dim: scale.dim,
        srid: None,
    })
}

fn write_header(buf: &mut Vec<u8>, geometry: &Geometry, precision: TwkbPrecision) {
    let dim = geometry.dim();
    let zigzag_xy = zigzag_encode(i64::from(precision.xy)) as u8;
    buf.push((zigzag_xy << 4) | geometry.geometry_type().code() as u8);

    let mut metadata = 0u8;
    if dim.has_z() || dim.has_m() {
        metadata |= FLAG_EXTENDED;
    }
    if is_empty_in_twkb(geometry) {
        metadata |= FLAG_EMPTY;
    }
    buf.push(metadata);

    if metadata & FLAG_EXTENDED != 0 {
        let mut extended = 0u8;
        if dim.has_z() {
            extended |= 0x01;
        }
        if dim.has_m() {
            extended |= 0x02;
        }
        extended |= (zigzag_encode(i64::from(precision.z)) as u8 & 0x07) << 2;
        extended |= (zigzag_encode(i64::from(precision.m)) as u8 & 0x07) << 5;
        buf.push(extended);
    }
}

fn is_empty_in_twkb(geometry: &Geometry) -> bool {
    match geometry {
        Geometry::MultiPoint(multi) => multi.points.iter().all(|p| p.coord.is_none()),
        _ => geometry.is_empty(),
    }
}

fn write_geometry(buf: &mut Vec<u8>, geometry: &Geometry, precision: TwkbPrecision) {
    write_header(buf, geometry, precision);
    if is_empty_in_twkb(geometry) {
        return;
    }

    let scale = Scale::new(precision, geometry.dim());
    let mut prev = [0i64; 4];
    match geometry {
        Geometry::Point(point) => {
            if let Some(coord) = &point.coord {
                write_coord(buf, coord, &scale, &mut prev);
            }
        }
        Geometry::LineString(line) => write_coords(buf, &line.points, &scale, &mut prev),
        Geometry::Polygon(polygon) => write_polygon(buf, polygon, &scale, &mut prev),
        Geometry::MultiPoint(multi) => {
            let coords: Vec<&Coord> = multi.points.iter().filter_map(|p| p.coord.as_ref()).collect();
            encode_varint(coords.len() as u64, buf);
            for coord in coords {
                write_coord(buf, coord, &scale, &mut prev);
            }
        }
        Geometry::MultiLineString(multi) => {
            encode_varint(multi.line_strings.len() as u64, buf);
            for line in &multi.line_strings {
                write_coords(buf, &line.points, &scale, &mut prev);
            }
        }
        Geometry::MultiPolygon(multi) => {
            encode_varint(multi.polygons.len() as u64, buf);
            for polygon in &multi.polygons {
                write_polygon(buf, polygon, &scale, &mut prev);
            }
        }
        Geometry::GeometryCollection(collection) => {
            encode_varint(collection.geometries.len() as u64, buf);
            for member in &collection.geometries {
                write_geometry(buf, member, precision);
            }
        }
    }
}

fn write_delta(buf: &mut Vec<u8>, value: f64, factor: f64, prev: &mut i64) {
    let scaled = (value * factor).round() as i64;
    encode_varint(zigzag_encode(scaled.wrapping_sub(*prev)), buf);
    *prev = scaled;
}

fn write_coord(buf: &mut Vec<u8>, coord: &Coord, scale: &Scale, prev: &mut [i64; 4]) {
    let [fx, fy, fz, fm] = scale.factors;
    write_delta(buf, coord.x, fx, &mut prev[0]);
    write_delta(buf, coord.y, fy, &mut prev[1]);
    if scale.dim.has_z() {
        write_delta(buf, coord.z.unwrap_or(0.0), fz, &mut prev[2]);
    }
    if scale.dim.has_m() {
        write_delta(buf, coord.m.unwrap_or(0.0), fm, &mut prev[3]);
    }
}

fn write_coords(buf: &mut Vec<u8>, coords: &[Coord], scale: &Scale, prev: &mut [i64; 4]) {
    encode_varint(coords.len() as u64, buf);
    for coord in coords {
        write_coord(buf, coord, scale, prev);
    }
}

fn write_polygon(buf: &mut Vec<u8>, polygon: &Polygon, scale: &Scale, prev: &mut [i64; 4]) {
    if polygon.exterior.is_empty() {
        encode_varint(0, buf);
        return;
    }
    encode_varint(1 + polygon.interiors.len() as u64, buf);
    for ring in polygon.rings() {
        write_coords(buf, ring, scale, prev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(dim: Dimension, x: f64, y: f64, z: f64, m: f64) -> Coord {
        Coord {
            x,
            y,
            z: dim.has_z().then_some(z),
            m: dim.has_m().then_some(m),
        }
    }

    #[test]
    fn point_bytes_match_reference() -> crate::Result<()> {
        // POINT(1 2) at precision 0: type 0x01, no flags, zigzag(1)=2, zigzag(2)=4.
        let point = Geometry::Point(Point::new(1.0, 2.0));
        let bytes = point.to_twkb_with(TwkbPrecision::new(0, 0, 0)?);
        assert_eq!(bytes, vec![0x01, 0x00, 0x02, 0x04]);
        assert_eq!(Geometry::parse_twkb(&bytes)?, point);
        Ok(())
    }

    #[test]
    fn linestring_is_delta_encoded() -> crate::Result<()> {
        // LINESTRING(10 10,11 12) at precision 0: 10,10 then deltas 1,2.
        let line = Geometry::LineString(LineString::new(vec![
            Coord::xy(10.0, 10.0),
            Coord::xy(11.0, 12.0),
        ]));
        let bytes = line.to_twkb_with(TwkbPrecision::new(0, 0, 0)?);
        assert_eq!(bytes, vec![0x02, 0x00, 0x02, 0x14, 0x14, 0x02, 0x04]);
        assert_eq!(Geometry::parse_twkb(&bytes)?, line);
        Ok(())
    }

    #[test]
    fn default_precision_keeps_five_digits() -> crate::Result<()> {
        let point = Geometry::Point(Point::new(-122.41942, 37.77493));
        let bytes = point.to_twkb();
        // zigzag(5) = 10 in the high nibble.
        assert_eq!(bytes[0], 0xA1);
        assert_eq!(Geometry::parse_twkb(&bytes)?, point);
        Ok(())
    }

    #[test]
    fn roundtrip_every_type_and_dimension() -> crate::Result<()> {
        for dim in [Dimension::Xy, Dimension::Xyz, Dimension::Xym, Dimension::Xyzm] {
            let point = Point {
                coord: Some(c(dim, 1.5, 2.25, 3.0, 4.0)),
                dim,
                srid: None,
            };
            let line = LineString {
                points: vec![c(dim, 0.0, 0.0, 1.0, 0.0), c(dim, 10.5, -3.25, 2.0, 7.0)],
                dim,
                srid: None,
            };
            let polygon = Polygon {
                exterior: vec![
                    c(dim, 0.0, 0.0, 0.0, 0.0),
                    c(dim, 4.0, 0.0, 1.0, 1.0),
                    c(dim, 4.0, 4.0, 2.0, 2.0),
                    c(dim, 0.0, 0.0, 0.0, 0.0),
                ],
                interiors: vec![vec![
                    c(dim, 1.0, 1.0, 5.0, 5.0),
                    c(dim, 2.0, 1.0, 5.0, 5.0),
                    c(dim, 1.0, 1.0, 5.0, 5.0),
                ]],
                dim,
                srid: None,
            };
            let geometries = vec![
                Geometry::Point(point.clone()),
                Geometry::LineString(line.clone()),
                Geometry::Polygon(polygon.clone()),
                Geometry::MultiPoint(MultiPoint {
                    points: vec![point.clone(), point.clone()],
                    dim,
                    srid: None,
                }),
                Geometry::MultiLineString(MultiLineString {
                    line_strings: vec![line.clone(), line.clone()],
                    dim,
                    srid: None,
                }),
                Geometry::MultiPolygon(MultiPolygon {
                    polygons: vec![polygon.clone(), polygon.clone()],
                    dim,
                    srid: None,
                }),
                Geometry::GeometryCollection(GeometryCollection {
                    geometries: vec![
                        Geometry::Point(point),
                        Geometry::LineString(line),
                        Geometry::Polygon(polygon),
                    ],
                    dim,
                    srid: None,
                }),
            ];
            for geometry in geometries {
                assert_eq!(Geometry::parse_twkb(&geometry.to_twkb())?, geometry);
                let empty = Geometry::empty(geometry.geometry_type(), dim);
                assert_eq!(Geometry::parse_twkb(&empty.to_twkb())?, empty);
            }
        }
        Ok(())
    }

    #[test]
    fn skips_size_bbox_and_id_list() -> crate::Result<()> {
        // MULTIPOINT(1 2,3 4) at precision 0 with size, bbox and id list present.
        let mut buf = vec![0x04, FLAG_SIZE | FLAG_BBOX | FLAG_ID_LIST];
        let mut body = Vec::new();
        // bbox: xmin 1, delta 2, ymin 2, delta 2
        for v in [1i64, 2, 2, 2] {
            encode_varint(zigzag_encode(v), &mut body);
        }
        encode_varint(2, &mut body);
        encode_varint(7, &mut body);
        encode_varint(8, &mut body);
        for v in [1i64, 2, 2, 2] {
            encode_varint(zigzag_encode(v), &mut body);
        }
        encode_varint(body.len() as u64, &mut buf);
        buf.extend_from_slice(&body);

        let parsed = Geometry::parse_twkb(&buf)?;
        assert_eq!(
            parsed,
            Geometry::MultiPoint(MultiPoint::new(vec![
                Point::new(1.0, 2.0),
                Point::new(3.0, 4.0)
            ]))
        );
        Ok(())
    }

    #[test]
    fn precision_out_of_range() {
        assert!(TwkbPrecision::new(8, 0, 0).is_err());
        assert!(TwkbPrecision::new(0, 4, 0).is_err());
        assert!(TwkbPrecision::new(-8, -4, 3).is_ok());
    }

    #[test]
    fn truncated_input() {
        let bytes = Geometry::LineString(LineString::new(vec![
            Coord::xy(1.0, 1.0),
            Coord::xy(2.0, 2.0),
        ]))
        .to_twkb();
        assert!(matches!(
            Geometry::parse_twkb(&bytes[..bytes.len() - 1]),
            Err(GpkgError::BufferUnderrun { .. })
        ));
    }

    fn nested_collection_twkb(depth: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for _ in 0..depth {
            bytes.extend_from_slice(&[0x07, 0x00, 0x01]);
        }
        // POINT(1 2) at precision 0
        bytes.extend_from_slice(&[0x01, 0x00, 0x02, 0x04]);
        bytes
    }

    #[test]
    fn rejects_collections_nested_too_deep() -> crate::Result<()> {
        let deepest = Geometry::parse_twkb(&nested_collection_twkb(crate::geom::MAX_NESTING_DEPTH))?;
        assert_eq!(deepest.geometry_type(), GeometryType::GeometryCollection);

        for depth in [crate::geom::MAX_NESTING_DEPTH + 1, 600] {
            assert!(matches!(
                Geometry::parse_twkb(&nested_collection_twkb(depth)),
                Err(GpkgError::Parse { .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn multipoint_drops_empty_members() -> crate::Result<()> {
        let mixed = Geometry::parse_wkt("MULTIPOINT(1 2,EMPTY)")?;
        assert_eq!(Geometry::parse_twkb(&mixed.to_twkb())?.to_wkt(), "MULTIPOINT(1 2)");

        let only_empty = Geometry::MultiPoint(MultiPoint::new(vec![Point::empty(Dimension::Xy)]));
        let bytes = only_empty.to_twkb();
        assert_eq!(bytes, vec![0xA4, FLAG_EMPTY]);
        assert_eq!(Geometry::parse_twkb(&bytes)?.to_wkt(), "MULTIPOINT EMPTY");
        Ok(())
    }
}
