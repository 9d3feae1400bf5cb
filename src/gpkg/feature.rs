use crate::envelope::{AxisBounds, Envelope};
use crate::error::{GpkgError, Result};
use crate::geom::{ByteReader, Geometry, write_wkb};
use rusqlite::types::{FromSql, FromSqlError, Value, ValueRef};
use std::collections::HashMap;
use std::sync::Arc;

const GPKG_MAGIC: [u8; 2] = [0x47, 0x50];
const GPKG_HEADER_LEN: usize = 8;
const FLAG_LITTLE_ENDIAN: u8 = 0b0000_0001;
const FLAG_EMPTY: u8 = 0b0001_0000;

/// Decode a geometry column value; NULL and zero-length blobs are `None`.
pub(crate) fn decode_column_geometry(column: Option<&[u8]>) -> Result<Option<Geometry>> {
    let bytes = match column {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return Ok(None),
    };
    let blob = decode_gpkg_geometry(bytes)?;
    let mut geometry = Geometry::parse_wkb(blob.wkb)?;
    if blob.srs_id > 0 {
        geometry.set_srid(Some(blob.srs_id as u32));
    }
    Ok(Some(geometry))
}

/// A single feature with geometry bytes and owned properties.
#[derive(Clone, Debug)]
pub struct GpkgFeature {
    pub(super) id: i64,
    pub(super) geometry: Option<Vec<u8>>,
    pub(super) properties: Vec<Value>,
    pub(super) property_index_by_name: Arc<HashMap<String, usize>>,
}

impl GpkgFeature {
    /// Return the primary key value.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// The raw GeoPackage geometry blob, if the column is not NULL.
    pub fn geometry_blob(&self) -> Option<&[u8]> {
        self.geometry.as_deref()
    }

    /// Decode the geometry column.
    ///
    /// `None` for a NULL or zero-length column. The blob's `srs_id` becomes the
    /// geometry's SRID when it is positive.
    pub fn geometry(&self) -> Result<Option<Geometry>> {
        decode_column_geometry(self.geometry.as_deref())
    }

    pub fn properties(&self) -> &[Value] {
        &self.properties
    }

    /// Read a property by index using rusqlite's `FromSql` conversion.
    pub fn property<T: FromSql>(&self, idx: usize) -> Result<T> {
        let value = self
            .properties
            .get(idx)
            .ok_or(GpkgError::Sql(rusqlite::Error::InvalidColumnIndex(idx)))?;
        let value_ref = ValueRef::from(value);
        FromSql::column_result(value_ref).map_err(|err| match err {
            FromSqlError::InvalidType => GpkgError::Sql(rusqlite::Error::InvalidColumnType(
                idx,
                format!("column {idx}"),
                value_ref.data_type(),
            )),
            FromSqlError::OutOfRange(i) => {
                GpkgError::Sql(rusqlite::Error::IntegralValueOutOfRange(idx, i))
            }
            FromSqlError::Other(err) => GpkgError::Sql(rusqlite::Error::FromSqlConversionFailure(
                idx,
                value_ref.data_type(),
                err,
            )),
            FromSqlError::InvalidBlobSize { .. } => {
                GpkgError::Sql(rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    value_ref.data_type(),
                    Box::new(err),
                ))
            }
            _ => GpkgError::Message("unsupported sqlite type conversion".to_string()),
        })
    }

    /// Read a property by column name.
    pub fn property_by_name<T: FromSql>(&self, name: &str) -> Result<T> {
        let idx = self
            .property_index_by_name
            .get(name)
            .copied()
            .ok_or_else(|| GpkgError::Sql(rusqlite::Error::InvalidColumnName(name.to_string())))?;
        self.property(idx)
    }
}

/// Owned iterator over features.
pub struct GpkgFeatureIterator {
    pub(super) features: std::vec::IntoIter<GpkgFeature>,
}

impl Iterator for GpkgFeatureIterator {
    type Item = GpkgFeature;

    fn next(&mut self) -> Option<Self::Item> {
        self.features.next()
    }
}

/// A GeoPackage geometry blob split into its header fields and WKB body.
#[derive(Debug, Clone, PartialEq)]
pub struct GpkgGeometry<'a> {
    pub srs_id: i32,
    pub envelope: Option<Envelope>,
    pub empty: bool,
    pub wkb: &'a [u8],
}

// cf. https://www.geopackage.org/spec140/index.html#gpb_format
pub fn decode_gpkg_geometry(b: &[u8]) -> Result<GpkgGeometry<'_>> {
    if b.len() < GPKG_HEADER_LEN {
        return Err(GpkgError::InvalidGpkgGeometryLength {
            len: b.len(),
            minimum: GPKG_HEADER_LEN,
        });
    }
    if b[0..2] != GPKG_MAGIC {
        return Err(GpkgError::Parse {
            expected: "GP magic",
            position: 0,
        });
    }

    let flags = b[3];
    let (envelope_size, has_z, has_m) = match flags & 0b00001110 {
        0b00000000 => (0, false, false),  // no envelope
        0b00000010 => (32, false, false), // [minx, maxx, miny, maxy]
        0b00000100 => (48, true, false),  // [minx, maxx, miny, maxy, minz, maxz]
        0b00000110 => (48, false, true),  // [minx, maxx, miny, maxy, minm, maxm]
        0b00001000 => (64, true, true),   // [minx, maxx, miny, maxy, minz, maxz, minm, maxm]
        _ => {
            return Err(GpkgError::InvalidGpkgGeometryFlags(flags));
        }
    };
    let offset = GPKG_HEADER_LEN + envelope_size;
    if b.len() < offset {
        return Err(GpkgError::InvalidGpkgGeometryEnvelope {
            len: b.len(),
            required: offset,
        });
    }

    let mut reader = ByteReader::new(&b[4..offset]);
    reader.set_big_endian(flags & FLAG_LITTLE_ENDIAN == 0);
    let srs_id = reader.read_u32()? as i32;

    let envelope = if envelope_size > 0 {
        let mut envelope = Envelope::new(
            reader.read_f64()?,
            reader.read_f64()?,
            reader.read_f64()?,
            reader.read_f64()?,
        );
        if has_z {
            envelope.z = Some(AxisBounds::new(reader.read_f64()?, reader.read_f64()?));
        }
        if has_m {
            envelope.m = Some(AxisBounds::new(reader.read_f64()?, reader.read_f64()?));
        }
        Some(envelope)
    } else {
        None
    };

    Ok(GpkgGeometry {
        srs_id,
        envelope,
        empty: flags & FLAG_EMPTY != 0,
        wkb: &b[offset..],
    })
}

/// Encode a geometry as a little-endian GeoPackage blob without an envelope.
// cf. https://www.geopackage.org/spec140/index.html#gpb_format
pub fn encode_gpkg_geometry(geometry: &Geometry, srs_id: i32) -> Vec<u8> {
    let mut flags = FLAG_LITTLE_ENDIAN;
    if geometry.is_empty() {
        flags |= FLAG_EMPTY;
    }

    let mut geom = Vec::with_capacity(64);
    geom.extend_from_slice(&[
        GPKG_MAGIC[0],
        GPKG_MAGIC[1],
        0x00u8, // version
        flags,
    ]);
    geom.extend_from_slice(&srs_id.to_le_bytes());
    write_wkb(&mut geom, geometry, None);
    geom
}
