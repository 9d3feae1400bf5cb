//! WKT and EWKT text encoding.
//!
//! Grammar: `[SRID=<n>;]<TYPE>[ Z| M| ZM] (<body>) | EMPTY`, keywords are
//! case-insensitive. The dimension keyword decides how many numbers every
//! coordinate in the body carries.

use std::fmt;
use std::str::FromStr;

use crate::error::{GpkgError, Result};

use super::{
    Coord, Dimension, Geometry, GeometryCollection, GeometryType, LineString, MultiLineString,
    MultiPoint, MultiPolygon, Point, Polygon, check_nesting,
};

impl Geometry {
    /// Parse WKT or EWKT. Any non-whitespace input after the geometry is an error.
    pub fn parse_wkt(input: &str) -> Result<Self> {
        let mut parser = WktParser::new(input);
        let geometry = parser.parse_geometry(0)?;
        parser.skip_whitespace();
        if parser.pos != parser.bytes.len() {
            return Err(parser.error("end of input"));
        }
        Ok(geometry)
    }

    /// Plain WKT; the SRID, if any, is not written.
    pub fn to_wkt(&self) -> String {
        let mut out = String::new();
        write_geometry(&mut out, self);
        out
    }

    /// WKT prefixed with `SRID=<n>;` when an SRID is set.
    pub fn to_ewkt(&self) -> String {
        match self.srid() {
            Some(srid) => format!("SRID={srid};{}", self.to_wkt()),
            None => self.to_wkt(),
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wkt())
    }
}

impl FromStr for Geometry {
    type Err = GpkgError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_wkt(s)
    }
}

struct WktParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WktParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, expected: &'static str) -> GpkgError {
        GpkgError::Parse {
            expected,
            position: self.pos,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    /// Consume `keyword` if it appears next as a whole word.
    fn match_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        let rest = &self.bytes[self.pos..];
        let len = keyword.len();
        if rest.len() >= len
            && rest[..len].eq_ignore_ascii_case(keyword.as_bytes())
            && !rest.get(len).is_some_and(u8::is_ascii_alphanumeric)
        {
            self.pos += len;
            true
        } else {
            false
        }
    }

    fn match_char(&mut self, c: u8) -> bool {
        self.skip_whitespace();
        if self.bytes.get(self.pos) == Some(&c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_char(&mut self, c: u8, expected: &'static str) -> Result<()> {
        if self.match_char(c) {
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn open(&mut self) -> Result<()> {
        self.expect_char(b'(', "'('")
    }

    fn close(&mut self) -> Result<()> {
        self.expect_char(b')', "')'")
    }

    fn match_srid(&mut self) -> Result<Option<u32>> {
        if !self.match_keyword("SRID") {
            return Ok(None);
        }
        self.expect_char(b'=', "'=' after SRID")?;
        self.skip_whitespace();
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let srid = std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|digits| digits.parse::<u32>().ok())
            .ok_or(GpkgError::Parse {
                expected: "SRID value",
                position: start,
            })?;
        self.expect_char(b';', "';' after SRID")?;
        Ok(Some(srid))
    }

    fn match_type(&mut self) -> Result<GeometryType> {
        self.skip_whitespace();
        let start = self.pos;
        let mut end = start;
        while end < self.bytes.len() && self.bytes[end].is_ascii_alphabetic() {
            end += 1;
        }
        let word = std::str::from_utf8(&self.bytes[start..end]).unwrap_or_default();
        match GeometryType::from_wkt_name(word) {
            Some(geometry_type) => {
                self.pos = end;
                Ok(geometry_type)
            }
            None => Err(self.error("geometry type")),
        }
    }

    /// `ZM` is tried before `Z` and `M` so it is never split.
    fn match_dimension(&mut self) -> Dimension {
        if self.match_keyword("ZM") {
            Dimension::Xyzm
        } else if self.match_keyword("Z") {
            Dimension::Xyz
        } else if self.match_keyword("M") {
            Dimension::Xym
        } else {
            Dimension::Xy
        }
    }

    fn match_number(&mut self) -> Result<f64> {
        self.skip_whitespace();
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b.is_ascii_whitespace() || matches!(b, b',' | b'(' | b')') {
                break;
            }
            self.pos += 1;
        }
        let bytes = self.bytes;
        match std::str::from_utf8(&bytes[start..self.pos])
            .ok()
            .and_then(|token| token.parse::<f64>().ok())
        {
            Some(value) => Ok(value),
            None => {
                self.pos = start;
                Err(self.error("number"))
            }
        }
    }

    fn match_coord(&mut self, dim: Dimension) -> Result<Coord> {
        let x = self.match_number()?;
        let y = self.match_number()?;
        let z = if dim.has_z() {
            Some(self.match_number()?)
        } else {
            None
        };
        let m = if dim.has_m() {
            Some(self.match_number()?)
        } else {
            None
        };
        Ok(Coord { x, y, z, m })
    }

    /// Comma separated coordinates; each may be wrapped in its own parentheses.
    fn match_coords(&mut self, dim: Dimension) -> Result<Vec<Coord>> {
        let mut coords = Vec::new();
        loop {
            let wrapped = self.match_char(b'(');
            coords.push(self.match_coord(dim)?);
            if wrapped {
                self.close()?;
            }
            if !self.match_char(b',') {
                break;
            }
        }
        Ok(coords)
    }

    fn match_ring(&mut self, dim: Dimension) -> Result<Vec<Coord>> {
        self.open()?;
        let ring = self.match_coords(dim)?;
        self.close()?;
        Ok(ring)
    }

    /// Body of a polygon, starting at its opening parenthesis.
    fn match_polygon_body(&mut self, dim: Dimension) -> Result<Polygon> {
        if self.match_keyword("EMPTY") {
            return Ok(Polygon::empty(dim));
        }
        self.open()?;
        let exterior = self.match_ring(dim)?;
        let mut interiors = Vec::new();
        while self.match_char(b',') {
            interiors.push(self.match_ring(dim)?);
        }
        self.close()?;
        Ok(Polygon {
            exterior,
            interiors,
            dim,
            srid: None,
        })
    }

    fn match_multi_point_member(&mut self, dim: Dimension) -> Result<Point> {
        if self.match_keyword("EMPTY") {
            return Ok(Point::empty(dim));
        }
        let wrapped = self.match_char(b'(');
        let coord = self.match_coord(dim)?;
        if wrapped {
            self.close()?;
        }
        Ok(Point {
            coord: Some(coord),
            dim,
            srid: None,
        })
    }

    fn match_line_string_member(&mut self, dim: Dimension) -> Result<LineString> {
        if self.match_keyword("EMPTY") {
            return Ok(LineString::empty(dim));
        }
        Ok(LineString {
            points: self.match_ring(dim)?,
            dim,
            srid: None,
        })
    }

    fn parse_geometry(&mut self, depth: usize) -> Result<Geometry> {
        check_nesting(depth, self.pos)?;
        let srid = self.match_srid()?;
        let geometry_type = self.match_type()?;
        let dim = self.match_dimension();

        let mut geometry = if self.match_keyword("EMPTY") {
            Geometry::empty(geometry_type, dim)
        } else {
            self.parse_body(geometry_type, dim, depth)?
        };
        geometry.set_srid(srid);
        Ok(geometry)
    }

    fn parse_body(
        &mut self,
        geometry_type: GeometryType,
        dim: Dimension,
        depth: usize,
    ) -> Result<Geometry> {
        let geometry = match geometry_type {
            GeometryType::Point => {
                self.open()?;
                let coord = self.match_coord(dim)?;
                self.close()?;
                Geometry::Point(Point {
                    coord: Some(coord),
                    dim,
                    srid: None,
                })
            }
            GeometryType::LineString => Geometry::LineString(LineString {
                points: self.match_ring(dim)?,
                dim,
                srid: None,
            }),
            GeometryType::Polygon => Geometry::Polygon(self.match_polygon_body(dim)?),
            GeometryType::MultiPoint => {
                self.open()?;
                let mut points = vec![self.match_multi_point_member(dim)?];
                while self.match_char(b',') {
                    points.push(self.match_multi_point_member(dim)?);
                }
                self.close()?;
                Geometry::MultiPoint(MultiPoint {
                    points,
                    dim,
                    srid: None,
                })
            }
            GeometryType::MultiLineString => {
                self.open()?;
                let mut line_strings = vec![self.match_line_string_member(dim)?];
                while self.match_char(b',') {
                    line_strings.push(self.match_line_string_member(dim)?);
                }
                self.close()?;
                Geometry::MultiLineString(MultiLineString {
                    line_strings,
                    dim,
                    srid: None,
                })
            }
            GeometryType::MultiPolygon => {
                self.open()?;
                let mut polygons = vec![self.match_polygon_body(dim)?];
                while self.match_char(b',') {
                    polygons.push(self.match_polygon_body(dim)?);
                }
                self.close()?;
                Geometry::MultiPolygon(MultiPolygon {
                    polygons,
                    dim,
                    srid: None,
                })
            }
            GeometryType::GeometryCollection => {
                self.open()?;
                let mut geometries = vec![self.parse_geometry(depth + 1)?];
                while self.match_char(b',') {
                    geometries.push(self.parse_geometry(depth + 1)?);
                }
                self.close()?;
                Geometry::GeometryCollection(GeometryCollection {
                    geometries,
                    dim,
                    srid: None,
                })
            }
        };
        Ok(geometry)
    }
}

fn write_number(out: &mut String, value: f64) {
    out.push_str(&value.to_string());
}

fn write_coord(out: &mut String, coord: &Coord, dim: Dimension) {
    write_number(out, coord.x);
    out.push(' ');
    write_number(out, coord.y);
    if dim.has_z() {
        out.push(' ');
        write_number(out, coord.z.unwrap_or(f64::NAN));
    }
    if dim.has_m() {
        out.push(' ');
        write_number(out, coord.m.unwrap_or(f64::NAN));
    }
}

fn write_coords(out: &mut String, coords: &[Coord], dim: Dimension) {
    out.push('(');
    for (i, coord) in coords.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_coord(out, coord, dim);
    }
    out.push(')');
}

fn write_polygon_body(out: &mut String, polygon: &Polygon) {
    if polygon.exterior.is_empty() {
        out.push_str("EMPTY");
        return;
    }
    out.push('(');
    for (i, ring) in polygon.rings().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_coords(out, ring, polygon.dim);
    }
    out.push(')');
}

/// `TYPE`, `TYPE Z `, `TYPE EMPTY` or `TYPE Z EMPTY`.
fn write_prefix(out: &mut String, geometry: &Geometry) {
    out.push_str(geometry.geometry_type().wkt_name());
    let dim = geometry.dim();
    match dim {
        Dimension::Xy => {}
        Dimension::Xyz => out.push_str(" Z "),
        Dimension::Xym => out.push_str(" M "),
        Dimension::Xyzm => out.push_str(" ZM "),
    }
    if geometry.is_empty() {
        if dim == Dimension::Xy {
            out.push(' ');
        }
        out.push_str("EMPTY");
    }
}

fn write_geometry(out: &mut String, geometry: &Geometry) {
    write_prefix(out, geometry);
    if geometry.is_empty() {
        return;
    }
    match geometry {
        Geometry::Point(point) => {
            if let Some(coord) = &point.coord {
                out.push('(');
                write_coord(out, coord, point.dim);
                out.push(')');
            }
        }
        Geometry::LineString(line) => write_coords(out, &line.points, line.dim),
        Geometry::Polygon(polygon) => write_polygon_body(out, polygon),
        Geometry::MultiPoint(multi) => {
            out.push('(');
            for (i, point) in multi.points.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                match &point.coord {
                    Some(coord) => write_coord(out, coord, point.dim),
                    None => out.push_str("EMPTY"),
                }
            }
            out.push(')');
        }
        Geometry::MultiLineString(multi) => {
            out.push('(');
            for (i, line) in multi.line_strings.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                if line.points.is_empty() {
                    out.push_str("EMPTY");
                } else {
                    write_coords(out, &line.points, line.dim);
                }
            }
            out.push(')');
        }
        Geometry::MultiPolygon(multi) => {
            out.push('(');
            for (i, polygon) in multi.polygons.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_polygon_body(out, polygon);
            }
            out.push(')');
        }
        Geometry::GeometryCollection(collection) => {
            out.push('(');
            for (i, member) in collection.geometries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_geometry(out, member);
            }
            out.push(')');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_canonical_forms() {
        let point = Geometry::Point(Point::new(1.0, 2.0));
        assert_eq!(point.to_wkt(), "POINT(1 2)");

        let point_z = Geometry::Point(Point::from_coord(Coord::xyz(1.0, 2.0, 3.0)));
        assert_eq!(point_z.to_wkt(), "POINT Z (1 2 3)");

        assert_eq!(
            Geometry::Point(Point::empty(Dimension::Xy)).to_wkt(),
            "POINT EMPTY"
        );
        assert_eq!(
            Geometry::Point(Point::empty(Dimension::Xyz)).to_wkt(),
            "POINT Z EMPTY"
        );

        let polygon = Geometry::Polygon(Polygon::new(
            vec![
                Coord::xy(0.0, 0.0),
                Coord::xy(1.0, 0.0),
                Coord::xy(1.0, 1.0),
                Coord::xy(0.0, 0.0),
            ],
            vec![],
        ));
        assert_eq!(polygon.to_wkt(), "POLYGON((0 0,1 0,1 1,0 0))");

        let multi = Geometry::MultiPoint(MultiPoint::new(vec![
            Point::new(1.0, 2.0),
            Point::new(3.0, 4.0),
        ]));
        assert_eq!(multi.to_wkt(), "MULTIPOINT(1 2,3 4)");

        let collection = Geometry::GeometryCollection(GeometryCollection::new(vec![
            Geometry::Point(Point::new(1.0, 2.0)),
            Geometry::LineString(LineString::new(vec![Coord::xy(0.0, 0.0), Coord::xy(1.5, -2.0)])),
        ]));
        assert_eq!(
            collection.to_wkt(),
            "GEOMETRYCOLLECTION(POINT(1 2),LINESTRING(0 0,1.5 -2))"
        );
    }

    #[test]
    fn parses_dimension_keywords() -> crate::Result<()> {
        let zm = Geometry::parse_wkt("POINT ZM (1 2 3 4)")?;
        assert_eq!(
            zm,
            Geometry::Point(Point::from_coord(Coord::xyzm(1.0, 2.0, 3.0, 4.0)))
        );

        let m = Geometry::parse_wkt("linestring m (0 0 5, 1 1 6)")?;
        assert_eq!(
            m,
            Geometry::LineString(LineString::new(vec![
                Coord::xym(0.0, 0.0, 5.0),
                Coord::xym(1.0, 1.0, 6.0)
            ]))
        );

        let empty = Geometry::parse_wkt("MULTIPOLYGON Z EMPTY")?;
        assert!(empty.is_empty());
        assert_eq!(empty.dim(), Dimension::Xyz);
        Ok(())
    }

    #[test]
    fn parses_ewkt_srid() -> crate::Result<()> {
        let geometry = Geometry::parse_wkt("SRID=4326;POINT(-122.5 37.25)")?;
        assert_eq!(geometry.srid(), Some(4326));
        assert_eq!(geometry.to_wkt(), "POINT(-122.5 37.25)");
        assert_eq!(geometry.to_ewkt(), "SRID=4326;POINT(-122.5 37.25)");
        Ok(())
    }

    #[test]
    fn multipoint_accepts_wrapped_members() -> crate::Result<()> {
        let bare = Geometry::parse_wkt("MULTIPOINT(1 2, 3 4)")?;
        let wrapped = Geometry::parse_wkt("MULTIPOINT((1 2),(3 4))")?;
        assert_eq!(bare, wrapped);
        Ok(())
    }

    #[test]
    fn roundtrip_nested() -> crate::Result<()> {
        for wkt in [
            "POLYGON Z ((0 0 1,4 0 1,4 4 1,0 0 1),(1 1 2,2 1 2,2 2 2,1 1 2))",
            "MULTILINESTRING((0 0,1 1),EMPTY,(2 2,3 3))",
            "MULTIPOLYGON(((0 0,1 0,1 1,0 0)),EMPTY)",
            "MULTIPOINT M (1 2 3,EMPTY)",
            "GEOMETRYCOLLECTION(POINT(1 2),GEOMETRYCOLLECTION EMPTY,MULTIPOINT(0 0))",
            "LINESTRING ZM (0 0 0 0,1 1 1 1)",
        ] {
            let parsed = Geometry::parse_wkt(wkt)?;
            assert_eq!(parsed.to_wkt(), wkt);
            assert_eq!(Geometry::parse_wkt(&parsed.to_wkt())?, parsed);
        }
        Ok(())
    }

    #[test]
    fn rejects_malformed_input() {
        for (input, position) in [
            ("POINT(1)", 7),
            ("CIRCLE(1 2)", 0),
            ("POINT(1 2) garbage", 11),
            ("POINT 1 2", 6),
            ("SRID=x;POINT(1 2)", 5),
        ] {
            match Geometry::parse_wkt(input) {
                Err(GpkgError::Parse { position: p, .. }) => {
                    assert_eq!(p, position, "input {input:?}")
                }
                other => panic!("unexpected result for {input:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn display_and_from_str() -> crate::Result<()> {
        let geometry: Geometry = "POINT(3 4)".parse()?;
        assert_eq!(geometry.to_string(), "POINT(3 4)");
        Ok(())
    }

    #[test]
    fn agrees_with_wkt_crate() -> crate::Result<()> {
        use std::str::FromStr;

        let text = "MULTILINESTRING((0 0,1 1),(2 2,3 3))";
        let theirs = wkt::Wkt::<f64>::from_str(text).expect("valid wkt");
        let from_traits = Geometry::from_geo_traits(&theirs)?;
        assert_eq!(from_traits, Geometry::parse_wkt(text)?);
        Ok(())
    }

    fn nested_collection_wkt(depth: usize) -> String {
        format!(
            "{}POINT(1 2){}",
            "GEOMETRYCOLLECTION(".repeat(depth),
            ")".repeat(depth)
        )
    }

    #[test]
    fn rejects_collections_nested_too_deep() -> crate::Result<()> {
        let deepest = Geometry::parse_wkt(&nested_collection_wkt(crate::geom::MAX_NESTING_DEPTH))?;
        assert_eq!(deepest.geometry_type(), GeometryType::GeometryCollection);

        for depth in [crate::geom::MAX_NESTING_DEPTH + 1, 600] {
            assert!(matches!(
                Geometry::parse_wkt(&nested_collection_wkt(depth)),
                Err(GpkgError::Parse { .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn multi_members_use_their_own_dimension() {
        let multi_point = Geometry::MultiPoint(MultiPoint {
            points: vec![Point::from_coord(Coord::xyz(1.0, 2.0, 3.0))],
            dim: Dimension::Xy,
            srid: None,
        });
        assert_eq!(multi_point.to_wkt(), "MULTIPOINT(1 2 3)");

        let multi_line = Geometry::MultiLineString(MultiLineString {
            line_strings: vec![LineString::new(vec![Coord::xy(0.0, 0.0), Coord::xy(1.0, 1.0)])],
            dim: Dimension::Xym,
            srid: None,
        });
        assert_eq!(multi_line.to_wkt(), "MULTILINESTRING M ((0 0,1 1))");
    }
}
