//! WKB and EWKB encoding.
//!
//! Reading accepts both byte orders, ISO dimension codes (1000 / 2000 / 3000
//! offsets) and the EWKB flag scheme. Once a geometry header uses a flag bit,
//! every member nested under it is decoded with the flag scheme as well.
//!
//! Writing is always little-endian. A geometry without SRID is written with
//! ISO codes; with an SRID the whole tree switches to flag codes and the SRID
//! is embedded once, in the outermost header.

use crate::error::{GpkgError, Result};

use super::bytes::ByteReader;
use super::{
    Coord, Dimension, Geometry, GeometryCollection, GeometryType, LineString, MultiLineString,
    MultiPoint, MultiPolygon, Point, Polygon, check_nesting,
};

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;
const EWKB_FLAGS: u32 = EWKB_Z | EWKB_M | EWKB_SRID;

const WKB_LITTLE_ENDIAN: u8 = 1;

impl Geometry {
    /// Decode a WKB or EWKB buffer.
    ///
    /// Trailing bytes after the first complete geometry are ignored.
    pub fn parse_wkb(buf: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(buf);
        read_geometry(&mut reader, false, 0)
    }

    /// Encode as WKB. The output is EWKB when this geometry carries an SRID.
    pub fn to_wkb(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_wkb(&mut buf, self, self.srid());
        buf
    }

    /// Encode with the EWKB flag scheme even when no SRID is set.
    pub fn to_ewkb(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_geometry(&mut buf, self, true, self.srid());
        buf
    }
}

struct Header {
    geometry_type: GeometryType,
    dim: Dimension,
    srid: Option<u32>,
    flag_mode: bool,
}

fn read_header(reader: &mut ByteReader<'_>, parent_flag_mode: bool) -> Result<Header> {
    let byte_order = reader.read_u8()?;
    reader.set_big_endian(byte_order == 0);

    let type_code = reader.read_u32()?;
    let flag_mode = parent_flag_mode || type_code & EWKB_FLAGS != 0;
    let srid = if type_code & EWKB_SRID != 0 {
        Some(reader.read_u32()?)
    } else {
        None
    };

    let (base, dim) = if flag_mode {
        (
            type_code & 0x0F,
            Dimension::from_zm(type_code & EWKB_Z != 0, type_code & EWKB_M != 0),
        )
    } else {
        match type_code {
            1000..2000 => (type_code - 1000, Dimension::Xyz),
            2000..3000 => (type_code - 2000, Dimension::Xym),
            3000..4000 => (type_code - 3000, Dimension::Xyzm),
            _ => (type_code, Dimension::Xy),
        }
    };

    let geometry_type = GeometryType::from_code(base)
        .map_err(|_| GpkgError::UnsupportedGeometryType(type_code))?;

    Ok(Header {
        geometry_type,
        dim,
        srid,
        flag_mode,
    })
}

fn read_geometry(
    reader: &mut ByteReader<'_>,
    parent_flag_mode: bool,
    depth: usize,
) -> Result<Geometry> {
    check_nesting(depth, reader.position())?;
    let Header {
        geometry_type,
        dim,
        srid,
        flag_mode,
    } = read_header(reader, parent_flag_mode)?;

    let geometry = match geometry_type {
        GeometryType::Point => Geometry::Point(Point {
            coord: read_point_coord(reader, dim)?,
            dim,
            srid,
        }),
        GeometryType::LineString => Geometry::LineString(LineString {
            points: read_coords(reader, dim)?,
            dim,
            srid,
        }),
        GeometryType::Polygon => {
            let (exterior, interiors) = read_rings(reader, dim)?;
            Geometry::Polygon(Polygon {
                exterior,
                interiors,
                dim,
                srid,
            })
        }
        GeometryType::MultiPoint => {
            let count = reader.read_u32()?;
            let mut points = Vec::new();
            for _ in 0..count {
                match read_geometry(reader, flag_mode, depth + 1)? {
                    Geometry::Point(point) => points.push(point),
                    _ => return Err(member_error(reader, "point member")),
                }
            }
            Geometry::MultiPoint(MultiPoint { points, dim, srid })
        }
        GeometryType::MultiLineString => {
            let count = reader.read_u32()?;
            let mut line_strings = Vec::new();
            for _ in 0..count {
                match read_geometry(reader, flag_mode, depth + 1)? {
                    Geometry::LineString(line) => line_strings.push(line),
                    _ => return Err(member_error(reader, "linestring member")),
                }
            }
            Geometry::MultiLineString(MultiLineString {
                line_strings,
                dim,
                srid,
            })
        }
        GeometryType::MultiPolygon => {
            let count = reader.read_u32()?;
            let mut polygons = Vec::new();
            for _ in 0..count {
                match read_geometry(reader, flag_mode, depth + 1)? {
                    Geometry::Polygon(polygon) => polygons.push(polygon),
                    _ => return Err(member_error(reader, "polygon member")),
                }
            }
            Geometry::MultiPolygon(MultiPolygon {
                polygons,
                dim,
                srid,
            })
        }
        GeometryType::GeometryCollection => {
            let count = reader.read_u32()?;
            let mut geometries = Vec::new();
            for _ in 0..count {
                geometries.push(read_geometry(reader, flag_mode, depth + 1)?);
            }
            Geometry::GeometryCollection(GeometryCollection {
                geometries,
                dim,
                srid,
            })
        }
    };
    Ok(geometry)
}

fn member_error(reader: &ByteReader<'_>, expected: &'static str) -> GpkgError {
    GpkgError::Parse {
        expected,
        position: reader.position(),
    }
}

fn read_coord(reader: &mut ByteReader<'_>, dim: Dimension) -> Result<Coord> {
    let x = reader.read_f64()?;
    let y = reader.read_f64()?;
    let z = if dim.has_z() {
        Some(reader.read_f64()?)
    } else {
        None
    };
    let m = if dim.has_m() {
        Some(reader.read_f64()?)
    } else {
        None
    };
    Ok(Coord { x, y, z, m })
}

/// An empty point is stored as NaN ordinates.
fn read_point_coord(reader: &mut ByteReader<'_>, dim: Dimension) -> Result<Option<Coord>> {
    let coord = read_coord(reader, dim)?;
    if coord.x.is_nan() && coord.y.is_nan() {
        Ok(None)
    } else {
        Ok(Some(coord))
    }
}

fn read_coords(reader: &mut ByteReader<'_>, dim: Dimension) -> Result<Vec<Coord>> {
    let count = reader.read_u32()?;
    let mut coords = Vec::new();
    for _ in 0..count {
        coords.push(read_coord(reader, dim)?);
    }
    Ok(coords)
}

fn read_rings(reader: &mut ByteReader<'_>, dim: Dimension) -> Result<(Vec<Coord>, Vec<Vec<Coord>>)> {
    let ring_count = reader.read_u32()?;
    if ring_count == 0 {
        return Ok((Vec::new(), Vec::new()));
    }
    let exterior = read_coords(reader, dim)?;
    let mut interiors = Vec::new();
    for _ in 1..ring_count {
        interiors.push(read_coords(reader, dim)?);
    }
    Ok((exterior, interiors))
}

/// Append the WKB of `geometry`; `srid` selects the flag scheme and is embedded at the top.
pub(crate) fn write_wkb(buf: &mut Vec<u8>, geometry: &Geometry, srid: Option<u32>) {
    write_geometry(buf, geometry, srid.is_some(), srid);
}

fn type_code(geometry_type: GeometryType, dim: Dimension, flag_mode: bool, with_srid: bool) -> u32 {
    let base = geometry_type.code();
    if flag_mode {
        let mut code = base;
        if dim.has_z() {
            code |= EWKB_Z;
        }
        if dim.has_m() {
            code |= EWKB_M;
        }
        if with_srid {
            code |= EWKB_SRID;
        }
        code
    } else {
        match dim {
            Dimension::Xy => base,
            Dimension::Xyz => base + 1000,
            Dimension::Xym => base + 2000,
            Dimension::Xyzm => base + 3000,
        }
    }
}

fn write_geometry(buf: &mut Vec<u8>, geometry: &Geometry, flag_mode: bool, srid: Option<u32>) {
    let dim = geometry.dim();
    buf.push(WKB_LITTLE_ENDIAN);
    let code = type_code(geometry.geometry_type(), dim, flag_mode, srid.is_some());
    buf.extend_from_slice(&code.to_le_bytes());
    if let Some(srid) = srid {
        buf.extend_from_slice(&srid.to_le_bytes());
    }

    match geometry {
        Geometry::Point(point) => write_point_body(buf, point, dim),
        Geometry::LineString(line) => write_coords(buf, &line.points, dim),
        Geometry::Polygon(polygon) => write_polygon_body(buf, polygon, dim),
        Geometry::MultiPoint(multi) => {
            write_count(buf, multi.points.len());
            for point in &multi.points {
                write_member_header(buf, GeometryType::Point, point.dim, flag_mode);
                write_point_body(buf, point, point.dim);
            }
        }
        Geometry::MultiLineString(multi) => {
            write_count(buf, multi.line_strings.len());
            for line in &multi.line_strings {
                write_member_header(buf, GeometryType::LineString, line.dim, flag_mode);
                write_coords(buf, &line.points, line.dim);
            }
        }
        Geometry::MultiPolygon(multi) => {
            write_count(buf, multi.polygons.len());
            for polygon in &multi.polygons {
                write_member_header(buf, GeometryType::Polygon, polygon.dim, flag_mode);
                write_polygon_body(buf, polygon, polygon.dim);
            }
        }
        Geometry::GeometryCollection(collection) => {
            write_count(buf, collection.geometries.len());
            for member in &collection.geometries {
                write_geometry(buf, member, flag_mode, None);
            }
        }
    }
}

fn write_member_header(buf: &mut Vec<u8>, geometry_type: GeometryType, dim: Dimension, flag_mode: bool) {
    buf.push(WKB_LITTLE_ENDIAN);
    buf.extend_from_slice(&type_code(geometry_type, dim, flag_mode, false).to_le_bytes());
}

fn write_count(buf: &mut Vec<u8>, count: usize) {
    buf.extend_from_slice(&(count as u32).to_le_bytes());
}

fn write_coord(buf: &mut Vec<u8>, coord: &Coord, dim: Dimension) {
    buf.extend_from_slice(&coord.x.to_le_bytes());
    buf.extend_from_slice(&coord.y.to_le_bytes());
    if dim.has_z() {
        buf.extend_from_slice(&coord.z.unwrap_or(f64::NAN).to_le_bytes());
    }
    if dim.has_m() {
        buf.extend_from_slice(&coord.m.unwrap_or(f64::NAN).to_le_bytes());
    }
}

fn write_point_body(buf: &mut Vec<u8>, point: &Point, dim: Dimension) {
    match &point.coord {
        Some(coord) => write_coord(buf, coord, dim),
        None => {
            for _ in 0..dim.size() {
                buf.extend_from_slice(&f64::NAN.to_le_bytes());
            }
        }
    }
}

fn write_coords(buf: &mut Vec<u8>, coords: &[Coord], dim: Dimension) {
    write_count(buf, coords.len());
    for coord in coords {
        write_coord(buf, coord, dim);
    }
}

fn write_polygon_body(buf: &mut Vec<u8>, polygon: &Polygon, dim: Dimension) {
    if polygon.exterior.is_empty() {
        write_count(buf, 0);
        return;
    }
    write_count(buf, 1 + polygon.interiors.len());
    for ring in polygon.rings() {
        write_coords(buf, ring, dim);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_geometries(dim: Dimension) -> Vec<Geometry> {
        let c = |x: f64, y: f64| Coord {
            x,
            y,
            z: dim.has_z().then_some(x + y),
            m: dim.has_m().then_some(x * 2.0),
        };
        let point = Point {
            coord: Some(c(1.0, 2.0)),
            dim,
            srid: None,
        };
        let line = LineString {
            points: vec![c(0.0, 0.0), c(1.0, 1.0), c(2.0, 0.5)],
            dim,
            srid: None,
        };
        let polygon = Polygon {
            exterior: vec![c(0.0, 0.0), c(4.0, 0.0), c(4.0, 4.0), c(0.0, 0.0)],
            interiors: vec![vec![c(1.0, 1.0), c(2.0, 1.0), c(2.0, 2.0), c(1.0, 1.0)]],
            dim,
            srid: None,
        };
        vec![
            Geometry::Point(point.clone()),
            Geometry::Point(Point::empty(dim)),
            Geometry::LineString(line.clone()),
            Geometry::LineString(LineString::empty(dim)),
            Geometry::Polygon(polygon.clone()),
            Geometry::Polygon(Polygon::empty(dim)),
            Geometry::MultiPoint(MultiPoint {
                points: vec![point.clone(), Point::empty(dim)],
                dim,
                srid: None,
            }),
            Geometry::MultiLineString(MultiLineString {
                line_strings: vec![line.clone(), line.clone()],
                dim,
                srid: None,
            }),
            Geometry::MultiPolygon(MultiPolygon {
                polygons: vec![polygon.clone()],
                dim,
                srid: None,
            }),
            Geometry::GeometryCollection(GeometryCollection {
                geometries: vec![
                    Geometry::Point(point),
                    Geometry::LineString(line),
                    Geometry::GeometryCollection(GeometryCollection::empty(dim)),
                ],
                dim,
                srid: None,
            }),
            Geometry::MultiPoint(MultiPoint::empty(dim)),
        ]
    }

    #[test]
    fn roundtrip_every_type_and_dimension() -> crate::Result<()> {
        for dim in [Dimension::Xy, Dimension::Xyz, Dimension::Xym, Dimension::Xyzm] {
            for geometry in sample_geometries(dim) {
                assert_eq!(Geometry::parse_wkb(&geometry.to_wkb())?, geometry);
                // Flag-scheme output decodes to the same value.
                assert_eq!(Geometry::parse_wkb(&geometry.to_ewkb())?, geometry);
            }
        }
        Ok(())
    }

    #[test]
    fn srid_is_embedded_once_at_the_top() -> crate::Result<()> {
        let geometry = Geometry::MultiPoint(MultiPoint::new(vec![
            Point::from_coord(Coord::xyz(1.0, 2.0, 3.0)),
            Point::from_coord(Coord::xyz(4.0, 5.0, 6.0)),
        ]))
        .with_srid(4326);
        let wkb = geometry.to_wkb();

        assert_eq!(wkb[0], 1);
        let code = u32::from_le_bytes([wkb[1], wkb[2], wkb[3], wkb[4]]);
        assert_eq!(code, 4 | EWKB_Z | EWKB_SRID);
        assert_eq!(u32::from_le_bytes([wkb[5], wkb[6], wkb[7], wkb[8]]), 4326);

        // First member: flag scheme, no srid.
        let member_code = u32::from_le_bytes([wkb[14], wkb[15], wkb[16], wkb[17]]);
        assert_eq!(member_code, 1 | EWKB_Z);

        let parsed = Geometry::parse_wkb(&wkb)?;
        assert_eq!(parsed.srid(), Some(4326));
        let Geometry::MultiPoint(multi) = &parsed else {
            panic!("expected multipoint");
        };
        assert!(multi.points.iter().all(|p| p.srid.is_none()));
        assert_eq!(parsed, geometry);
        Ok(())
    }

    #[test]
    fn iso_codes_without_srid() {
        let point = Geometry::Point(Point::from_coord(Coord::xyzm(1.0, 2.0, 3.0, 4.0)));
        let wkb = point.to_wkb();
        assert_eq!(u32::from_le_bytes([wkb[1], wkb[2], wkb[3], wkb[4]]), 3001);
        assert_eq!(wkb.len(), 1 + 4 + 4 * 8);
    }

    #[test]
    fn reads_big_endian_point() -> crate::Result<()> {
        let mut buf = vec![0u8];
        buf.extend_from_slice(&1001u32.to_be_bytes());
        for v in [1.0f64, 2.0, 3.0] {
            buf.extend_from_slice(&v.to_be_bytes());
        }
        let parsed = Geometry::parse_wkb(&buf)?;
        assert_eq!(
            parsed,
            Geometry::Point(Point::from_coord(Coord::xyz(1.0, 2.0, 3.0)))
        );
        Ok(())
    }

    #[test]
    fn flag_mode_is_inherited_by_members() -> crate::Result<()> {
        // Collection header carries the Z flag; its member uses a bare flag code
        // (1 | Z) that must be read as a flagged point, not as ISO code.
        let mut buf = vec![1u8];
        buf.extend_from_slice(&(7 | EWKB_Z).to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.push(1);
        buf.extend_from_slice(&(1 | EWKB_Z).to_le_bytes());
        for v in [1.0f64, 2.0, 3.0] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        let parsed = Geometry::parse_wkb(&buf)?;
        let Geometry::GeometryCollection(collection) = parsed else {
            panic!("expected collection");
        };
        assert_eq!(collection.dim, Dimension::Xyz);
        assert_eq!(
            collection.geometries,
            vec![Geometry::Point(Point::from_coord(Coord::xyz(1.0, 2.0, 3.0)))]
        );
        Ok(())
    }

    #[test]
    fn unsupported_type_code() {
        let mut buf = vec![1u8];
        buf.extend_from_slice(&17u32.to_le_bytes());
        assert!(matches!(
            Geometry::parse_wkb(&buf),
            Err(GpkgError::UnsupportedGeometryType(17))
        ));

        let mut buf = vec![1u8];
        buf.extend_from_slice(&4001u32.to_le_bytes());
        assert!(matches!(
            Geometry::parse_wkb(&buf),
            Err(GpkgError::UnsupportedGeometryType(4001))
        ));
    }

    #[test]
    fn truncated_input_is_buffer_underrun() {
        let wkb = Geometry::LineString(LineString::new(vec![
            Coord::xy(0.0, 0.0),
            Coord::xy(1.0, 1.0),
        ]))
        .to_wkb();
        for len in [0, 3, 8, wkb.len() - 1] {
            assert!(
                matches!(
                    Geometry::parse_wkb(&wkb[..len]),
                    Err(GpkgError::BufferUnderrun { .. })
                ),
                "prefix of {len} bytes"
            );
        }
    }

    #[test]
    fn wrong_member_type_is_rejected() {
        // MULTIPOINT holding a LINESTRING member.
        let line = Geometry::LineString(LineString::new(vec![Coord::xy(0.0, 0.0)])).to_wkb();
        let mut buf = vec![1u8];
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&line);
        assert!(matches!(
            Geometry::parse_wkb(&buf),
            Err(GpkgError::Parse { .. })
        ));
    }

    #[test]
    fn interop_with_wkb_crate() -> crate::Result<()> {
        use geo_traits::{Dimensions, GeometryTrait};

        let geometry = Geometry::Polygon(Polygon::new(
            vec![
                Coord::xyz(0.0, 0.0, 1.0),
                Coord::xyz(1.0, 0.0, 1.0),
                Coord::xyz(1.0, 1.0, 1.0),
                Coord::xyz(0.0, 0.0, 1.0),
            ],
            vec![],
        ));
        let bytes = geometry.to_wkb();
        let wkb = wkb::reader::Wkb::try_new(&bytes).expect("valid wkb");
        assert_eq!(wkb.dim(), Dimensions::Xyz);

        let from_traits = Geometry::from_geo_traits(&wkb)?;
        assert_eq!(from_traits, geometry);
        Ok(())
    }

    fn nested_collection_wkb(depth: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for _ in 0..depth {
            bytes.extend_from_slice(&[1, 7, 0, 0, 0, 1, 0, 0, 0]);
        }
        bytes.extend_from_slice(&[1, 7, 0, 0, 0, 0, 0, 0, 0]);
        bytes
    }

    #[test]
    fn rejects_collections_nested_too_deep() -> crate::Result<()> {
        let deepest = Geometry::parse_wkb(&nested_collection_wkb(crate::geom::MAX_NESTING_DEPTH))?;
        assert_eq!(deepest.geometry_type(), GeometryType::GeometryCollection);

        for depth in [crate::geom::MAX_NESTING_DEPTH + 1, 600] {
            assert!(matches!(
                Geometry::parse_wkb(&nested_collection_wkb(depth)),
                Err(GpkgError::Parse { .. })
            ));
        }
        Ok(())
    }
}
