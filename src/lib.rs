//! GeoPackage geometry codec and envelope index built on top of rusqlite.
//!
//! ## Overview
//!
//! - `Geometry` is an in-memory simple-feature geometry with WKT/EWKT,
//!   WKB/EWKB, TWKB and GeoJSON encodings.
//! - `Envelope` is the bounding box of a geometry, with optional Z and M ranges.
//! - `Gpkg` is a GeoPackage database; `GpkgLayer` is one feature table in it and
//!   `GpkgFeature` one row of that table.
//! - `FeatureTableIndex` fills the `nga_geometry_index` extension tables with
//!   one envelope per feature so that spatial queries can be answered in SQL.
//!
//! `Gpkg` supports several open modes:
//!
//! - `Gpkg::open_read_only(path)`: open an existing file without write access.
//! - `Gpkg::open(path)`: open a new or existing file for read/write.
//! - `Gpkg::new(path)`: create a new file, failing if it already exists.
//! - `Gpkg::new_in_memory()`: create a transient in-memory GeoPackage.
//!
//! ## Geometries
//!
//! ```
//! use rusqlite_gpkg_index::{Geometry, envelope_of};
//!
//! let geometry = Geometry::parse_wkt("SRID=4326;LINESTRING Z (0 0 1,2 3 4)")?;
//! assert_eq!(geometry.srid(), Some(4326));
//! assert_eq!(geometry.to_wkt(), "LINESTRING Z (0 0 1,2 3 4)");
//!
//! let wkb = geometry.to_wkb();
//! let decoded = Geometry::parse_wkb(&wkb)?;
//! let envelope = envelope_of(&decoded);
//! assert_eq!((envelope.max_x, envelope.max_y), (2.0, 3.0));
//! # Ok::<(), rusqlite_gpkg_index::GpkgError>(())
//! ```
//!
//! ## Writing and indexing features
//!
//! ```
//! use rusqlite_gpkg_index::{
//!     ColumnSpec, ColumnType, Dimension, Envelope, Geometry, GeometryType, Gpkg, Value,
//! };
//!
//! let gpkg = Gpkg::new_in_memory()?;
//! let layer = gpkg.new_layer(
//!     "places",
//!     "geom",
//!     GeometryType::Point,
//!     Dimension::Xy,
//!     4326,
//!     &[ColumnSpec::new("name", ColumnType::Varchar)],
//! )?;
//! layer.insert(&Geometry::parse_wkt("POINT(1 2)")?, [Value::from("alpha".to_string())])?;
//! layer.insert(&Geometry::parse_wkt("POINT(50 60)")?, [Value::from("beta".to_string())])?;
//!
//! let written = layer.feature_table_index().index()?;
//! assert_eq!(written, 2);
//!
//! let hits: Vec<_> = layer
//!     .features_in_envelope(&Envelope::new(0.0, 10.0, 0.0, 10.0))?
//!     .collect();
//! assert_eq!(hits.len(), 1);
//! let name: String = hits[0].property_by_name("name")?;
//! assert_eq!(name, "alpha");
//! # Ok::<(), rusqlite_gpkg_index::GpkgError>(())
//! ```
//!
//! ## Reading in batches
//!
//! `GpkgLayer::features()` materializes the whole table. For large layers use
//! `features_batch(batch_size)` to iterate in chunks and limit peak memory:
//!
//! ```no_run
//! use rusqlite_gpkg_index::Gpkg;
//!
//! let gpkg = Gpkg::open_read_only("data/example.gpkg")?;
//! let layer = gpkg.open_layer("points")?;
//! for batch in layer.features_batch(100)? {
//!     for feature in batch? {
//!         let _id = feature.id();
//!         let _geom = feature.geometry()?;
//!     }
//! }
//! # Ok::<(), rusqlite_gpkg_index::GpkgError>(())
//! ```
//!
//! `Value` is rusqlite's owned dynamic value. Typed access goes through
//! `GpkgFeature::property` and `GpkgFeature::property_by_name`, which accept any
//! `FromSql` type, including `Option<T>` for nullable columns.
mod bounding_box;
mod conversions;
mod envelope;
mod error;
mod geom;
mod gpkg;
mod index;
mod ogc_sql;
mod sql_functions;
mod types;

pub use bounding_box::{BoundingBox, Reproject};
pub use conversions::wkb_code_from_type_name;
pub use envelope::{AxisBounds, Envelope, envelope_of};
pub use error::{GpkgError, Result};
pub use geom::{
    Coord, CrsStyle, Dimension, GEOJSON_DEFAULT_SRID, Geometry, GeometryCollection, GeometryType,
    LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon, TwkbPrecision,
};
pub use gpkg::{
    Gpkg, GpkgFeature, GpkgFeatureBatchIterator, GpkgFeatureIterator, GpkgGeometry,
    GpkgGeometryBatchIterator, GpkgLayer, decode_gpkg_geometry, encode_gpkg_geometry,
};
pub use index::{
    FeatureTableIndex, GeometryIndexCursor, GeometryIndexEntry, GeometryIndexStore,
    IndexerConfig, SpatialQuery, TableIndexEntry,
};
pub use sql_functions::register_spatial_functions;
pub use types::{ColumnSpec, ColumnType};

pub use rusqlite::types::Value;
