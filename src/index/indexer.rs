use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::{debug, info, trace};

use crate::bounding_box::{BoundingBox, Reproject};
use crate::envelope::{Envelope, envelope_of};
use crate::error::{GpkgError, Result};
use crate::gpkg::{Gpkg, GpkgLayer};
use crate::index::query::GeometryIndexCursor;
use crate::index::store::{GeometryIndexEntry, GeometryIndexStore, TableIndexEntry};
use crate::ogc_sql::{
    GEOMETRY_INDEX_EXTENSION, GEOMETRY_INDEX_EXTENSION_DEFINITION, SQL_DELETE_EXTENSION,
    SQL_GPKG_EXTENSIONS, SQL_TABLE_EXISTS, SQL_UPSERT_EXTENSION,
};

const LAST_INDEXED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Tuning for indexing passes and index queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Rows fetched per page while scanning the feature table or the index.
    pub batch_size: u32,
    /// Indexed rows between two progress callbacks.
    pub progress_interval: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            progress_interval: 100,
        }
    }
}

/// Geometry index of one feature table.
///
/// A table is indexed once `nga_table_index` has a row for it. [`index`]
/// returns early in that case; [`index_with_force`] rebuilds every entry and
/// refreshes `last_indexed`.
///
/// [`index`]: FeatureTableIndex::index
/// [`index_with_force`]: FeatureTableIndex::index_with_force
///
/// ```
/// use rusqlite_gpkg_index::{Dimension, Envelope, Geometry, GeometryType, Gpkg};
///
/// let gpkg = Gpkg::new_in_memory()?;
/// let layer = gpkg.new_layer("points", "geom", GeometryType::Point, Dimension::Xy, 4326, &[])?;
/// layer.insert(&Geometry::parse_wkt("POINT(1 2)")?, [])?;
///
/// let index = layer.feature_table_index();
/// assert_eq!(index.index()?, 1);
/// let hits = index
///     .query_envelope(&Envelope::new(0.0, 5.0, 0.0, 5.0))?
///     .collect::<Result<Vec<_>, _>>()?;
/// assert_eq!(hits[0].geom_id, 1);
/// # Ok::<(), rusqlite_gpkg_index::GpkgError>(())
/// ```
#[derive(Clone, Debug)]
pub struct FeatureTableIndex<'a> {
    layer: GpkgLayer<'a>,
    config: IndexerConfig,
}

impl<'a> FeatureTableIndex<'a> {
    /// Resolve the geometry column of `table_name`.
    ///
    /// Fails with [`GpkgError::IndexState`] when the table is not a registered
    /// feature table.
    pub fn new(gpkg: &'a Gpkg, table_name: &str) -> Result<Self> {
        let layer = gpkg.open_layer(table_name).map_err(|err| {
            GpkgError::IndexState(format!(
                "cannot resolve geometry column metadata of {table_name}: {err}"
            ))
        })?;
        Ok(Self {
            layer,
            config: IndexerConfig::default(),
        })
    }

    pub(crate) fn from_layer(layer: &GpkgLayer<'a>) -> Self {
        Self {
            layer: layer.clone(),
            config: IndexerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: IndexerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.layer.layer_name
    }

    pub fn column_name(&self) -> &str {
        &self.layer.geometry_column
    }

    fn store(&self) -> GeometryIndexStore<'a> {
        GeometryIndexStore::new(self.layer.gpkg().connection())
    }

    pub fn is_indexed(&self) -> Result<bool> {
        self.store().is_indexed(self.table_name())
    }

    pub fn table_index(&self) -> Result<Option<TableIndexEntry>> {
        self.store().table_index(self.table_name())
    }

    /// Number of index entries stored for this table.
    pub fn count(&self) -> Result<usize> {
        self.store().count_by_table(self.table_name())
    }

    /// Index the table unless it already is. Returns the entries written.
    pub fn index(&self) -> Result<usize> {
        self.index_with_progress(false, |_| {})
    }

    pub fn index_with_force(&self, force: bool) -> Result<usize> {
        self.index_with_progress(force, |_| {})
    }

    /// Scan every row and write one index entry per non-empty geometry.
    ///
    /// `progress` receives a status line every `progress_interval` entries and
    /// once at the end. The pass runs in one transaction: a row that fails to
    /// decode aborts it and leaves the previous index untouched.
    pub fn index_with_progress<F>(&self, force: bool, mut progress: F) -> Result<usize>
    where
        F: FnMut(&str),
    {
        let gpkg = self.layer.gpkg();
        let table_name = self.table_name();
        let store = self.store();

        let previous = store.table_index(table_name)?;
        if previous.is_some() && !force {
            debug!(table_name, "feature table already indexed");
            return Ok(0);
        }
        gpkg.ensure_writable()?;

        let total = self.layer.count()?;
        debug!(table_name, total, force, "indexing feature table");

        let tx = gpkg.connection().unchecked_transaction()?;
        store.create_tables()?;
        self.register_extension()?;
        let deleted = store.delete_by_table(table_name)?;
        if force {
            info!(table_name, deleted, "cleared geometry index for reindex");
        }

        let interval = self.config.progress_interval.max(1);
        let mut written = 0;
        for batch in self.layer.geometry_batches(self.config.batch_size)? {
            for (geom_id, geometry) in batch? {
                let envelope = geometry
                    .filter(|geometry| !geometry.is_empty())
                    .map(|geometry| envelope_of(&geometry))
                    .filter(|envelope| !envelope.is_empty());
                let Some(envelope) = envelope else {
                    trace!(table_name, geom_id, "skipped empty geometry");
                    continue;
                };

                store.upsert(&GeometryIndexEntry::populate(table_name, geom_id, &envelope))?;
                written += 1;
                if written % interval == 0 {
                    progress(&format!("Indexed {written} of {total} features in {table_name}"));
                }
            }
        }

        let last_indexed = next_last_indexed(previous.as_ref());
        store.put_table_index(&TableIndexEntry {
            table_name: table_name.to_string(),
            last_indexed: last_indexed.clone(),
        })?;
        tx.commit()?;

        progress(&format!("Indexed {written} of {total} features in {table_name}"));
        debug!(
            table_name,
            written,
            last_indexed = last_indexed.as_str(),
            "indexed feature table"
        );
        Ok(written)
    }

    /// Remove the index entries, the table index row and the extension row.
    pub fn delete_index(&self) -> Result<usize> {
        let gpkg = self.layer.gpkg();
        gpkg.ensure_writable()?;
        let table_name = self.table_name();
        let store = self.store();

        let tx = gpkg.connection().unchecked_transaction()?;
        let deleted = store.delete_by_table(table_name)?;
        store.delete_table_index(table_name)?;
        let has_extensions: bool =
            tx.query_row(SQL_TABLE_EXISTS, ["gpkg_extensions"], |row| row.get(0))?;
        if has_extensions {
            tx.execute(
                SQL_DELETE_EXTENSION,
                params![table_name, GEOMETRY_INDEX_EXTENSION],
            )?;
        }
        tx.commit()?;
        debug!(table_name, deleted, "deleted geometry index");
        Ok(deleted)
    }

    /// Lazily page through the index entries intersecting `envelope`.
    pub fn query_envelope(&self, envelope: &Envelope) -> Result<GeometryIndexCursor<'a>> {
        self.store()
            .query_envelope(self.table_name(), envelope, self.config.batch_size)
    }

    /// Query with a box expressed in `crs`, reprojected into the table's CRS.
    pub fn query_with_bounding_box(
        &self,
        bounding_box: &BoundingBox,
        crs: &str,
        reprojector: &dyn Reproject,
    ) -> Result<GeometryIndexCursor<'a>> {
        let table_crs = self
            .layer
            .gpkg()
            .srs_code(self.layer.srs_id)?
            .ok_or_else(|| {
                GpkgError::IndexState(format!(
                    "srs_id {} of {} is not in gpkg_spatial_ref_sys",
                    self.layer.srs_id,
                    self.table_name()
                ))
            })?;
        let projected = bounding_box.project(crs, &table_crs, reprojector)?;
        self.query_envelope(&projected.build_envelope())
    }

    fn register_extension(&self) -> Result<()> {
        let conn = self.layer.gpkg().connection();
        conn.execute_batch(SQL_GPKG_EXTENSIONS)?;
        conn.execute(
            SQL_UPSERT_EXTENSION,
            params![
                self.table_name(),
                self.column_name(),
                GEOMETRY_INDEX_EXTENSION,
                GEOMETRY_INDEX_EXTENSION_DEFINITION
            ],
        )?;
        Ok(())
    }
}

/// Current time, bumped past `previous` so a reindex always moves forward.
fn next_last_indexed(previous: Option<&TableIndexEntry>) -> String {
    let mut millis = Utc::now().timestamp_millis();
    if let Some(previous) = previous
        .and_then(|entry| DateTime::parse_from_rfc3339(&entry.last_indexed).ok())
        .map(|dt| dt.timestamp_millis())
    {
        millis = millis.max(previous + 1);
    }
    let timestamp = DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now);
    timestamp.format(LAST_INDEXED_FORMAT).to_string()
}
