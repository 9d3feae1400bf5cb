//! Conversion from any `geo_traits` geometry (geo-types, wkb, wkt, ...).

use geo_traits::{
    CoordTrait, Dimensions, GeometryCollectionTrait, GeometryTrait, LineStringTrait,
    MultiLineStringTrait, MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
};

use crate::error::{GpkgError, Result};

use super::{
    Coord, Dimension, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint,
    MultiPolygon, Point, Polygon,
};

impl Geometry {
    /// Copy a `geo_traits` geometry into an owned [`Geometry`].
    ///
    /// `Rect`, `Triangle` and `Line` have no GeoPackage counterpart and are rejected.
    pub fn from_geo_traits<G: GeometryTrait<T = f64>>(geometry: &G) -> Result<Self> {
        use geo_traits::GeometryType as GeoType;

        let dim = dimension_from(geometry.dim())?;
        let converted = match geometry.as_type() {
            GeoType::Point(point) => Geometry::Point(point_from(point, dim)),
            GeoType::LineString(line) => Geometry::LineString(LineString {
                points: coords_from(line, dim),
                dim,
                srid: None,
            }),
            GeoType::Polygon(polygon) => Geometry::Polygon(polygon_from(polygon, dim)),
            GeoType::MultiPoint(multi) => Geometry::MultiPoint(MultiPoint {
                points: multi.points().map(|p| point_from(&p, dim)).collect(),
                dim,
                srid: None,
            }),
            GeoType::MultiLineString(multi) => Geometry::MultiLineString(MultiLineString {
                line_strings: multi
                    .line_strings()
                    .map(|line| LineString {
                        points: coords_from(&line, dim),
                        dim,
                        srid: None,
                    })
                    .collect(),
                dim,
                srid: None,
            }),
            GeoType::MultiPolygon(multi) => Geometry::MultiPolygon(MultiPolygon {
                polygons: multi.polygons().map(|p| polygon_from(&p, dim)).collect(),
                dim,
                srid: None,
            }),
            GeoType::GeometryCollection(collection) => {
                let geometries = collection
                    .geometries()
                    .map(|member| Geometry::from_geo_traits(&member))
                    .collect::<Result<Vec<_>>>()?;
                Geometry::GeometryCollection(GeometryCollection {
                    geometries,
                    dim,
                    srid: None,
                })
            }
            GeoType::Rect(_) => return Err(unsupported("Rect")),
            GeoType::Triangle(_) => return Err(unsupported("Triangle")),
            GeoType::Line(_) => return Err(unsupported("Line")),
        };
        Ok(converted)
    }
}

fn unsupported(name: &str) -> GpkgError {
    GpkgError::UnsupportedGeometryTypeName(name.to_string())
}

fn dimension_from(dim: Dimensions) -> Result<Dimension> {
    match dim {
        Dimensions::Xy | Dimensions::Unknown(2) => Ok(Dimension::Xy),
        Dimensions::Xyz | Dimensions::Unknown(3) => Ok(Dimension::Xyz),
        Dimensions::Xym => Ok(Dimension::Xym),
        Dimensions::Xyzm | Dimensions::Unknown(4) => Ok(Dimension::Xyzm),
        Dimensions::Unknown(n) => Err(GpkgError::Message(format!(
            "unsupported coordinate dimension: {n}"
        ))),
    }
}

fn coord_from<C: CoordTrait<T = f64>>(coord: &C, dim: Dimension) -> Coord {
    let z = if dim.has_z() { coord.nth(2) } else { None };
    let m = match dim {
        Dimension::Xym => coord.nth(2),
        Dimension::Xyzm => coord.nth(3),
        _ => None,
    };
    Coord {
        x: coord.x(),
        y: coord.y(),
        z,
        m,
    }
}

fn point_from<P: PointTrait<T = f64>>(point: &P, dim: Dimension) -> Point {
    Point {
        coord: point.coord().map(|c| coord_from(&c, dim)),
        dim,
        srid: None,
    }
}

fn coords_from<L: LineStringTrait<T = f64>>(line: &L, dim: Dimension) -> Vec<Coord> {
    line.coords().map(|c| coord_from(&c, dim)).collect()
}

fn polygon_from<P: PolygonTrait<T = f64>>(polygon: &P, dim: Dimension) -> Polygon {
    Polygon {
        exterior: polygon
            .exterior()
            .map(|ring| coords_from(&ring, dim))
            .unwrap_or_default(),
        interiors: polygon
            .interiors()
            .map(|ring| coords_from(&ring, dim))
            .collect(),
        dim,
        srid: None,
    }
}
