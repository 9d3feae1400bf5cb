//! GeoPackage feature storage backed by rusqlite.
//!
//! Feature tables keep their geometries as GeoPackage binary blobs; the
//! geometry index in [`crate::index`] is built from and joined back to them.

mod feature;
mod gpkg;
mod layer;

pub use feature::{
    GpkgFeature, GpkgFeatureIterator, GpkgGeometry, decode_gpkg_geometry, encode_gpkg_geometry,
};
pub use gpkg::Gpkg;
pub use layer::{GpkgFeatureBatchIterator, GpkgGeometryBatchIterator, GpkgLayer};
