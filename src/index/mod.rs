//! Flat bounding-box index over feature tables.
//!
//! Entries live in `nga_geometry_index`, one envelope per feature, and
//! `nga_table_index` marks which tables have a complete index. Queries are a
//! linear predicate over those rows; there is no tree structure.

mod indexer;
mod query;
mod store;

pub use indexer::{FeatureTableIndex, IndexerConfig};
pub use query::{GeometryIndexCursor, SpatialQuery};
pub use store::{GeometryIndexEntry, GeometryIndexStore, TableIndexEntry};
