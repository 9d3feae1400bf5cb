//! GeoJSON geometry objects via `serde_json::Value`.
//!
//! GeoJSON positions carry at most x, y and z; M values are dropped on output.

use serde_json::{Map, Value, json};

use crate::error::{GpkgError, Result};

use super::{
    Coord, Dimension, Geometry, GeometryCollection, GeometryType, LineString, MultiLineString,
    MultiPoint, MultiPolygon, Point, Polygon, check_nesting,
};

/// SRID assumed for a top-level GeoJSON geometry without a `crs` member.
pub const GEOJSON_DEFAULT_SRID: u32 = 4326;

/// How a `crs` member names the SRID.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CrsStyle {
    /// No `crs` member.
    #[default]
    None,
    /// `EPSG:<srid>`
    Short,
    /// `urn:ogc:def:crs:EPSG::<srid>`
    Long,
}

impl Geometry {
    /// Parse a GeoJSON geometry object. Without a `crs` member the SRID defaults to 4326.
    pub fn parse_geojson(value: &Value) -> Result<Self> {
        parse_object(value, true, 0)
    }

    pub fn parse_geojson_str(input: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(input)?;
        Self::parse_geojson(&value)
    }

    pub fn to_geojson(&self) -> Value {
        self.to_geojson_with_crs(CrsStyle::None)
    }

    /// Like [`Geometry::to_geojson`], adding a named `crs` member when an SRID is set.
    pub fn to_geojson_with_crs(&self, style: CrsStyle) -> Value {
        let mut object = Map::new();
        object.insert(
            "type".to_string(),
            Value::from(self.geometry_type().geojson_name()),
        );
        match self {
            Self::GeometryCollection(collection) => {
                let members = collection
                    .geometries
                    .iter()
                    .map(Geometry::to_geojson)
                    .collect::<Vec<_>>();
                object.insert("geometries".to_string(), Value::Array(members));
            }
            _ => {
                object.insert("coordinates".to_string(), self.geojson_coordinates());
            }
        }
        if let Some(srid) = self.srid() {
            let name = match style {
                CrsStyle::None => None,
                CrsStyle::Short => Some(format!("EPSG:{srid}")),
                CrsStyle::Long => Some(format!("urn:ogc:def:crs:EPSG::{srid}")),
            };
            if let Some(name) = name {
                object.insert(
                    "crs".to_string(),
                    json!({ "type": "name", "properties": { "name": name } }),
                );
            }
        }
        Value::Object(object)
    }

    fn geojson_coordinates(&self) -> Value {
        let has_z = self.has_z();
        match self {
            Self::Point(point) => match &point.coord {
                Some(coord) => position(coord, has_z),
                None => Value::Array(Vec::new()),
            },
            Self::LineString(line) => positions(&line.points, has_z),
            Self::Polygon(polygon) => polygon_coordinates(polygon, has_z),
            Self::MultiPoint(multi) => Value::Array(
                multi
                    .points
                    .iter()
                    .map(|p| match &p.coord {
                        Some(coord) => position(coord, has_z),
                        None => Value::Array(Vec::new()),
                    })
                    .collect(),
            ),
            Self::MultiLineString(multi) => Value::Array(
                multi
                    .line_strings
                    .iter()
                    .map(|l| positions(&l.points, has_z))
                    .collect(),
            ),
            Self::MultiPolygon(multi) => Value::Array(
                multi
                    .polygons
                    .iter()
                    .map(|p| polygon_coordinates(p, has_z))
                    .collect(),
            ),
            Self::GeometryCollection(_) => Value::Null,
        }
    }
}

fn position(coord: &Coord, has_z: bool) -> Value {
    match coord.z {
        Some(z) if has_z => json!([coord.x, coord.y, z]),
        _ => json!([coord.x, coord.y]),
    }
}

fn positions(coords: &[Coord], has_z: bool) -> Value {
    Value::Array(coords.iter().map(|c| position(c, has_z)).collect())
}

fn polygon_coordinates(polygon: &Polygon, has_z: bool) -> Value {
    if polygon.exterior.is_empty() {
        return Value::Array(Vec::new());
    }
    Value::Array(polygon.rings().map(|r| positions(r, has_z)).collect())
}

fn invalid(expected: &'static str) -> GpkgError {
    GpkgError::Parse {
        expected,
        position: 0,
    }
}

fn parse_crs(crs: &Value) -> Result<u32> {
    let name = crs
        .get("properties")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .filter(|_| crs.get("type").and_then(Value::as_str) == Some("name"))
        .ok_or_else(|| invalid("named crs"))?;

    let code = name
        .strip_prefix("urn:ogc:def:crs:EPSG::")
        .or_else(|| name.strip_prefix("EPSG:"))
        .ok_or_else(|| GpkgError::Message(format!("unsupported crs: {name}")))?;
    code.parse::<u32>()
        .map_err(|_| GpkgError::Message(format!("unsupported crs: {name}")))
}

fn parse_position(value: &Value) -> Result<Option<Coord>> {
    let values = value.as_array().ok_or_else(|| invalid("position array"))?;
    if values.is_empty() {
        return Ok(None);
    }
    let number = |i: usize| values.get(i).and_then(Value::as_f64);
    let (Some(x), Some(y)) = (number(0), number(1)) else {
        return Err(invalid("numeric position"));
    };
    Ok(Some(Coord {
        x,
        y,
        z: number(2),
        m: None,
    }))
}

fn parse_positions(value: &Value) -> Result<Vec<Coord>> {
    value
        .as_array()
        .ok_or_else(|| invalid("array of positions"))?
        .iter()
        .map(|p| parse_position(p)?.ok_or_else(|| invalid("non-empty position")))
        .collect()
}

fn parse_rings(value: &Value) -> Result<Vec<Vec<Coord>>> {
    value
        .as_array()
        .ok_or_else(|| invalid("array of rings"))?
        .iter()
        .map(parse_positions)
        .collect()
}

fn polygon_from_rings(mut rings: Vec<Vec<Coord>>) -> Polygon {
    if rings.is_empty() {
        return Polygon::empty(Dimension::Xy);
    }
    let exterior = rings.remove(0);
    Polygon::new(exterior, rings)
}

fn parse_object(value: &Value, top_level: bool, depth: usize) -> Result<Geometry> {
    check_nesting(depth, 0)?;
    let type_name = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("geometry type member"))?;
    let geometry_type = GeometryType::ALL
        .into_iter()
        .find(|t| t.geojson_name() == type_name)
        .ok_or_else(|| GpkgError::UnsupportedGeometryTypeName(type_name.to_string()))?;

    let coordinates = || {
        value
            .get("coordinates")
            .ok_or_else(|| invalid("coordinates member"))
    };

    let mut geometry = match geometry_type {
        GeometryType::Point => match parse_position(coordinates()?)? {
            Some(coord) => Geometry::Point(Point::from_coord(coord)),
            None => Geometry::Point(Point::empty(Dimension::Xy)),
        },
        GeometryType::LineString => {
            Geometry::LineString(LineString::new(parse_positions(coordinates()?)?))
        }
        GeometryType::Polygon => {
            Geometry::Polygon(polygon_from_rings(parse_rings(coordinates()?)?))
        }
        GeometryType::MultiPoint => {
            let points = coordinates()?
                .as_array()
                .ok_or_else(|| invalid("array of positions"))?
                .iter()
                .map(|p| {
                    Ok(match parse_position(p)? {
                        Some(coord) => Point::from_coord(coord),
                        None => Point::empty(Dimension::Xy),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Geometry::MultiPoint(MultiPoint::new(points))
        }
        GeometryType::MultiLineString => {
            let line_strings = parse_rings(coordinates()?)?
                .into_iter()
                .map(LineString::new)
                .collect();
            Geometry::MultiLineString(MultiLineString::new(line_strings))
        }
        GeometryType::MultiPolygon => {
            let polygons = coordinates()?
                .as_array()
                .ok_or_else(|| invalid("array of polygons"))?
                .iter()
                .map(|p| parse_rings(p).map(polygon_from_rings))
                .collect::<Result<Vec<_>>>()?;
            Geometry::MultiPolygon(MultiPolygon::new(polygons))
        }
        GeometryType::GeometryCollection => {
            let geometries = value
                .get("geometries")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid("geometries member"))?
                .iter()
                .map(|g| parse_object(g, false, depth + 1))
                .collect::<Result<Vec<_>>>()?;
            Geometry::GeometryCollection(GeometryCollection::new(geometries))
        }
    };

    let srid = match value.get("crs") {
        Some(crs) => Some(parse_crs(crs)?),
        None if top_level => Some(GEOJSON_DEFAULT_SRID),
        None => None,
    };
    geometry.set_srid(srid);
    Ok(geometry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_to_geojson() {
        let point = Geometry::Point(Point::from_coord(Coord::xyz(1.0, 2.0, 3.0)));
        assert_eq!(
            point.to_geojson(),
            json!({ "type": "Point", "coordinates": [1.0, 2.0, 3.0] })
        );

        let empty = Geometry::Point(Point::empty(Dimension::Xy));
        assert_eq!(
            empty.to_geojson(),
            json!({ "type": "Point", "coordinates": [] })
        );
    }

    #[test]
    fn m_values_are_dropped() {
        let line = Geometry::LineString(LineString::new(vec![
            Coord::xym(0.0, 0.0, 9.0),
            Coord::xym(1.0, 1.0, 9.0),
        ]));
        assert_eq!(
            line.to_geojson(),
            json!({ "type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]] })
        );
    }

    #[test]
    fn crs_styles() {
        let point = Geometry::Point(Point::new(1.0, 2.0)).with_srid(3857);
        assert_eq!(
            point.to_geojson_with_crs(CrsStyle::Short)["crs"]["properties"]["name"],
            "EPSG:3857"
        );
        assert_eq!(
            point.to_geojson_with_crs(CrsStyle::Long)["crs"]["properties"]["name"],
            "urn:ogc:def:crs:EPSG::3857"
        );
        assert!(point.to_geojson().get("crs").is_none());
    }

    #[test]
    fn parse_defaults_srid_and_reads_crs() -> crate::Result<()> {
        let polygon = Geometry::parse_geojson_str(
            r#"{"type":"Polygon","coordinates":[[[0,0],[4,0],[4,4],[0,0]],[[1,1],[2,1],[1,1]]]}"#,
        )?;
        assert_eq!(polygon.srid(), Some(4326));
        let Geometry::Polygon(inner) = &polygon else {
            panic!("expected polygon");
        };
        assert_eq!(inner.exterior.len(), 4);
        assert_eq!(inner.interiors.len(), 1);

        let named = Geometry::parse_geojson(&json!({
            "type": "Point",
            "coordinates": [1, 2],
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::3857" } }
        }))?;
        assert_eq!(named.srid(), Some(3857));
        Ok(())
    }

    #[test]
    fn collection_members_have_no_default_srid() -> crate::Result<()> {
        let collection = Geometry::parse_geojson(&json!({
            "type": "GeometryCollection",
            "geometries": [
                { "type": "Point", "coordinates": [1, 2, 3] },
                { "type": "LineString", "coordinates": [[0, 0, 1], [1, 1, 1]] }
            ]
        }))?;
        assert_eq!(collection.srid(), Some(4326));
        assert!(collection.has_z());
        let Geometry::GeometryCollection(inner) = collection else {
            panic!("expected collection");
        };
        assert!(inner.geometries.iter().all(|g| g.srid().is_none()));
        Ok(())
    }

    #[test]
    fn roundtrip_without_m() -> crate::Result<()> {
        let multi = Geometry::MultiPolygon(MultiPolygon::new(vec![Polygon::new(
            vec![
                Coord::xyz(0.0, 0.0, 1.0),
                Coord::xyz(1.0, 0.0, 1.0),
                Coord::xyz(1.0, 1.0, 1.0),
                Coord::xyz(0.0, 0.0, 1.0),
            ],
            vec![],
        )]))
        .with_srid(4326);
        assert_eq!(Geometry::parse_geojson(&multi.to_geojson())?, multi);
        Ok(())
    }

    #[test]
    fn rejects_unknown_type_and_bad_crs() {
        assert!(matches!(
            Geometry::parse_geojson(&json!({ "type": "Circle", "coordinates": [] })),
            Err(GpkgError::UnsupportedGeometryTypeName(_))
        ));
        assert!(
            Geometry::parse_geojson(&json!({
                "type": "Point",
                "coordinates": [1, 2],
                "crs": { "type": "name", "properties": { "name": "OGC:CRS84" } }
            }))
            .is_err()
        );
    }

    fn nested_collection_geojson(depth: usize) -> Value {
        let mut value = json!({ "type": "Point", "coordinates": [1.0, 2.0] });
        for _ in 0..depth {
            value = json!({ "type": "GeometryCollection", "geometries": [value] });
        }
        value
    }

    #[test]
    fn rejects_collections_nested_too_deep() -> crate::Result<()> {
        let deepest =
            Geometry::parse_geojson(&nested_collection_geojson(crate::geom::MAX_NESTING_DEPTH))?;
        assert_eq!(deepest.geometry_type(), GeometryType::GeometryCollection);

        for depth in [crate::geom::MAX_NESTING_DEPTH + 1, 600] {
            assert!(matches!(
                Geometry::parse_geojson(&nested_collection_geojson(depth)),
                Err(GpkgError::Parse { .. })
            ));
        }
        Ok(())
    }
}
