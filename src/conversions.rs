use crate::error::{GpkgError, Result};
use crate::geom::{Dimension, GeometryType};
use crate::types::ColumnType;

/// WKB type code for a geometry type name as stored in `gpkg_geometry_columns`.
///
/// `GEOMETRY` is the GeoPackage catch-all and maps to GeometryCollection (7).
pub fn wkb_code_from_type_name(name: &str) -> Result<u32> {
    geometry_type_from_str(name).map(GeometryType::code)
}

#[inline]
pub(crate) fn geometry_type_from_str(geometry_type_str: &str) -> Result<GeometryType> {
    if geometry_type_str.eq_ignore_ascii_case("GEOMETRY") {
        return Ok(GeometryType::GeometryCollection);
    }
    GeometryType::from_wkt_name(geometry_type_str)
        .ok_or_else(|| GpkgError::UnsupportedGeometryTypeName(geometry_type_str.to_string()))
}

#[inline]
pub(crate) fn dimension_to_zm(dimension: Dimension) -> (i8, i8) {
    (i8::from(dimension.has_z()), i8::from(dimension.has_m()))
}

/// Layer dimension from the `z`/`m` flags of `gpkg_geometry_columns`.
///
/// `2` marks the ordinate as optional. The layer then reports the dimension
/// that may carry it; each stored geometry keeps its own dimension.
#[inline]
pub(crate) fn dimension_from_zm(z: i8, m: i8) -> Result<Dimension> {
    match (z, m) {
        (0..=2, 0..=2) => Ok(Dimension::from_zm(z != 0, m != 0)),
        _ => Err(GpkgError::InvalidDimension { z, m }),
    }
}

#[inline]
pub(crate) fn column_type_to_str(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer => "INTEGER",
        ColumnType::Double => "DOUBLE",
        ColumnType::Varchar => "TEXT",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Geometry => "GEOMETRY",
    }
}

#[inline]
pub(crate) fn column_type_from_str(column_type_str: &str) -> Option<ColumnType> {
    let s = column_type_str;
    if s.eq_ignore_ascii_case("TINYINT")
        || s.eq_ignore_ascii_case("SMALLINT")
        || s.eq_ignore_ascii_case("MEDIUMINT")
        || s.eq_ignore_ascii_case("INT")
        || s.eq_ignore_ascii_case("INTEGER")
    {
        Some(ColumnType::Integer)
    } else if s.eq_ignore_ascii_case("DOUBLE")
        || s.eq_ignore_ascii_case("FLOAT")
        || s.eq_ignore_ascii_case("REAL")
    {
        Some(ColumnType::Double)
    } else if s.eq_ignore_ascii_case("TEXT")
        || s.eq_ignore_ascii_case("DATE")
        || s.eq_ignore_ascii_case("DATETIME")
        || s.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("TEXT"))
    {
        Some(ColumnType::Varchar)
    } else if s.eq_ignore_ascii_case("BOOLEAN") {
        Some(ColumnType::Boolean)
    } else if s.eq_ignore_ascii_case("BLOB") || s.eq_ignore_ascii_case("GEOMETRY") {
        Some(ColumnType::Geometry)
    } else if geometry_type_from_str(s).is_ok() {
        Some(ColumnType::Geometry)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_to_wkb_codes() -> Result<()> {
        assert_eq!(wkb_code_from_type_name("GEOMETRY")?, 7);
        assert_eq!(wkb_code_from_type_name("POINT")?, 1);
        assert_eq!(wkb_code_from_type_name("MultiPolygon")?, 6);
        assert!(matches!(
            wkb_code_from_type_name("CURVEPOLYGON"),
            Err(GpkgError::UnsupportedGeometryTypeName(name)) if name == "CURVEPOLYGON"
        ));
        Ok(())
    }

    #[test]
    fn zm_flags() -> Result<()> {
        for dim in [Dimension::Xy, Dimension::Xyz, Dimension::Xym, Dimension::Xyzm] {
            let (z, m) = dimension_to_zm(dim);
            assert_eq!(dimension_from_zm(z, m)?, dim);
        }
        assert_eq!(dimension_from_zm(2, 0)?, Dimension::Xyz);
        assert_eq!(dimension_from_zm(0, 2)?, Dimension::Xym);
        assert_eq!(dimension_from_zm(2, 1)?, Dimension::Xyzm);
        assert!(matches!(
            dimension_from_zm(3, 0),
            Err(GpkgError::InvalidDimension { z: 3, m: 0 })
        ));
        Ok(())
    }

    #[test]
    fn declared_column_types() {
        assert_eq!(column_type_from_str("int"), Some(ColumnType::Integer));
        assert_eq!(column_type_from_str("REAL"), Some(ColumnType::Double));
        assert_eq!(column_type_from_str("TEXT(32)"), Some(ColumnType::Varchar));
        assert_eq!(column_type_from_str("DATETIME"), Some(ColumnType::Varchar));
        assert_eq!(column_type_from_str("MULTILINESTRING"), Some(ColumnType::Geometry));
        assert_eq!(column_type_from_str("NUMERIC"), None);
        assert_eq!(
            column_type_from_str(column_type_to_str(ColumnType::Boolean)),
            Some(ColumnType::Boolean)
        );
    }
}
