use crate::envelope::Envelope;
use crate::error::{GpkgError, Result};
use crate::geom::{Dimension, Geometry, GeometryType};
use crate::index::{FeatureTableIndex, GeometryIndexStore, SpatialQuery};
use crate::ogc_sql::{
    sql_count_features, sql_delete_all, sql_insert_feature, sql_select_feature_by_id,
    sql_select_feature_page, sql_select_features, sql_select_geometry_page,
    sql_select_indexed_features, sql_update_feature,
};
use crate::types::ColumnSpec;
use rusqlite::types::{Type, Value};
use rusqlite::{OptionalExtension, params_from_iter};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::encode_gpkg_geometry;
use super::{Gpkg, GpkgFeature, GpkgFeatureIterator};

mod batch_iterator;

use batch_iterator::KeysetPager;
pub use batch_iterator::{GpkgFeatureBatchIterator, GpkgGeometryBatchIterator};

#[derive(Clone, Debug)]
/// A GeoPackage feature table with geometry metadata and column specs.
pub struct GpkgLayer<'a> {
    pub(super) conn: &'a Gpkg,
    pub layer_name: String,
    pub geometry_column: String,
    pub primary_key_column: String,
    pub geometry_type: GeometryType,
    pub geometry_dimension: Dimension,
    pub srs_id: i32,
    pub property_columns: Vec<ColumnSpec>,
    pub(super) property_index_by_name: Arc<HashMap<String, usize>>,
    pub(super) insert_sql: String,
    pub(super) update_sql: String,
}

// When issueing the SELECT query, always place these columns first so that
// we don't need to find the positions every time.
const GEOMETRY_INDEX: usize = 0;
const PRIMARY_INDEX: usize = 1;

impl<'a> GpkgLayer<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        conn: &'a Gpkg,
        layer_name: &str,
        geometry_column: String,
        primary_key_column: String,
        geometry_type: GeometryType,
        geometry_dimension: Dimension,
        srs_id: i32,
        property_columns: Vec<ColumnSpec>,
    ) -> Self {
        let insert_sql = Self::build_insert_sql(layer_name, &geometry_column, &property_columns);
        let update_sql = Self::build_update_sql(
            layer_name,
            &geometry_column,
            &primary_key_column,
            &property_columns,
        );
        let property_index_by_name = Arc::new(Self::build_property_index_by_name(&property_columns));

        Self {
            conn,
            layer_name: layer_name.to_string(),
            geometry_column,
            primary_key_column,
            geometry_type,
            geometry_dimension,
            srs_id,
            property_columns,
            property_index_by_name,
            insert_sql,
            update_sql,
        }
    }

    pub(crate) fn gpkg(&self) -> &'a Gpkg {
        self.conn
    }

    /// Number of rows in the feature table.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self.conn.connection().query_row(
            &sql_count_features(&self.layer_name),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Iterate over features in the layer in primary key order.
    ///
    /// Example:
    /// ```no_run
    /// use rusqlite_gpkg_index::Gpkg;
    ///
    /// let gpkg = Gpkg::open_read_only("data/example.gpkg")?;
    /// let layer = gpkg.open_layer("points")?;
    /// for feature in layer.features()? {
    ///     let _id = feature.id();
    ///     let _geom = feature.geometry()?;
    /// }
    /// # Ok::<(), rusqlite_gpkg_index::GpkgError>(())
    /// ```
    pub fn features(&self) -> Result<GpkgFeatureIterator> {
        let sql = sql_select_features(
            &self.layer_name,
            &self.geometry_column,
            &self.primary_key_column,
            self.property_names(),
        );
        self.collect_features(&sql, Vec::new())
    }

    /// Iterate over features in chunks of `batch_size`, in primary-key order.
    pub fn features_batch(&self, batch_size: u32) -> Result<GpkgFeatureBatchIterator<'a>> {
        let batch_size = batch_size.max(1);
        let sql = sql_select_feature_page(
            &self.layer_name,
            &self.geometry_column,
            &self.primary_key_column,
            self.property_names(),
            batch_size,
        );
        let stmt = self.conn.connection().prepare(&sql)?;

        Ok(GpkgFeatureBatchIterator {
            pager: KeysetPager::new(stmt, batch_size),
            property_columns: self.property_columns.clone(),
            geometry_column: self.geometry_column.clone(),
            primary_key_column: self.primary_key_column.clone(),
            property_index_by_name: Arc::clone(&self.property_index_by_name),
        })
    }

    /// Decoded geometries with their primary keys, in chunks of `batch_size`.
    ///
    /// Property columns are not read.
    pub fn geometry_batches(&self, batch_size: u32) -> Result<GpkgGeometryBatchIterator<'a>> {
        let batch_size = batch_size.max(1);
        let sql = sql_select_geometry_page(
            &self.layer_name,
            &self.geometry_column,
            &self.primary_key_column,
            batch_size,
        );
        let stmt = self.conn.connection().prepare(&sql)?;
        Ok(GpkgGeometryBatchIterator {
            pager: KeysetPager::new(stmt, batch_size),
        })
    }

    /// Fetch a single feature by primary key.
    pub fn feature(&self, id: i64) -> Result<Option<GpkgFeature>> {
        let sql = sql_select_feature_by_id(
            &self.layer_name,
            &self.geometry_column,
            &self.primary_key_column,
            self.property_names(),
        );
        let mut stmt = self.conn.connection().prepare(&sql)?;
        let feature = stmt
            .query_row([id], |row| {
                row_to_feature(
                    row,
                    &self.property_columns,
                    &self.geometry_column,
                    &self.primary_key_column,
                    &self.property_index_by_name,
                )
            })
            .optional()?;
        Ok(feature)
    }

    /// Features whose index entry intersects `envelope`, in `geom_id` order.
    ///
    /// Reads the geometry index only; features added after the last indexing
    /// pass are not seen. A layer that was never indexed yields nothing.
    pub fn features_in_envelope(&self, envelope: &Envelope) -> Result<GpkgFeatureIterator> {
        if !GeometryIndexStore::new(self.conn.connection()).tables_exist()? {
            return Ok(GpkgFeatureIterator {
                features: Vec::new().into_iter(),
            });
        }

        let query = SpatialQuery::new(&self.layer_name, envelope);
        let sql = sql_select_indexed_features(
            &self.layer_name,
            &self.geometry_column,
            &self.primary_key_column,
            self.property_names(),
            query.where_clause(),
        );
        self.collect_features(&sql, query.args().to_vec())
    }

    /// The geometry index of this layer.
    pub fn feature_table_index(&self) -> FeatureTableIndex<'a> {
        FeatureTableIndex::from_layer(self)
    }

    /// Remove all rows from the layer.
    ///
    /// Example:
    /// ```no_run
    /// use rusqlite_gpkg_index::Gpkg;
    ///
    /// let gpkg = Gpkg::open("data/example.gpkg")?;
    /// let layer = gpkg.open_layer("points")?;
    /// layer.truncate()?;
    /// # Ok::<(), rusqlite_gpkg_index::GpkgError>(())
    /// ```
    pub fn truncate(&self) -> Result<usize> {
        self.ensure_writable()?;
        let sql = sql_delete_all(&self.layer_name);
        let deleted = self.conn.connection().execute(&sql, [])?;
        debug!(layer_name = self.layer_name.as_str(), deleted, "truncated layer");
        Ok(deleted)
    }

    /// Insert a feature with geometry and ordered property values, returning its rowid.
    ///
    /// Example:
    /// ```no_run
    /// use rusqlite_gpkg_index::{Geometry, Gpkg, Value};
    ///
    /// let gpkg = Gpkg::open("data/example.gpkg")?;
    /// let layer = gpkg.open_layer("points")?;
    ///
    /// let point = Geometry::parse_wkt("POINT(1 2)")?;
    /// let properties = vec![Value::Text("alpha".to_string()), Value::Integer(1)];
    /// layer.insert(&point, properties)?;
    /// # Ok::<(), rusqlite_gpkg_index::GpkgError>(())
    /// ```
    pub fn insert<P>(&self, geometry: &Geometry, properties: P) -> Result<i64>
    where
        P: IntoIterator<Item = Value>,
    {
        self.ensure_writable()?;
        let geom = encode_gpkg_geometry(geometry, self.srs_id);
        let params = std::iter::once(Value::Blob(geom)).chain(properties);

        let mut stmt = self.conn.connection().prepare_cached(&self.insert_sql)?;
        stmt.execute(params_from_iter(params))?;
        Ok(self.conn.connection().last_insert_rowid())
    }

    /// Update the feature with geometry and ordered property values.
    pub fn update<P>(&self, geometry: &Geometry, properties: P, id: i64) -> Result<()>
    where
        P: IntoIterator<Item = Value>,
    {
        self.ensure_writable()?;
        let geom = encode_gpkg_geometry(geometry, self.srs_id);
        let params = std::iter::once(Value::Blob(geom))
            .chain(properties)
            .chain(std::iter::once(Value::Integer(id)));

        let mut stmt = self.conn.connection().prepare_cached(&self.update_sql)?;
        stmt.execute(params_from_iter(params))?;
        Ok(())
    }

    fn property_names(&self) -> impl Iterator<Item = &str> {
        self.property_columns.iter().map(|spec| spec.name.as_str())
    }

    fn collect_features(&self, sql: &str, params: Vec<Value>) -> Result<GpkgFeatureIterator> {
        let mut stmt = self.conn.connection().prepare(sql)?;
        let features = stmt
            .query_map(params_from_iter(params), |row| {
                row_to_feature(
                    row,
                    &self.property_columns,
                    &self.geometry_column,
                    &self.primary_key_column,
                    &self.property_index_by_name,
                )
            })?
            .collect::<std::result::Result<Vec<GpkgFeature>, _>>()?;

        Ok(GpkgFeatureIterator {
            features: features.into_iter(),
        })
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.conn.is_read_only() {
            return Err(GpkgError::ReadOnly);
        }
        Ok(())
    }

    fn build_insert_sql(
        layer_name: &str,
        geometry_column: &str,
        property_columns: &[ColumnSpec],
    ) -> String {
        let mut columns = Vec::with_capacity(property_columns.len() + 1);
        columns.push(format!(r#""{}""#, geometry_column));
        columns.extend(
            property_columns
                .iter()
                .map(|spec| format!(r#""{}""#, spec.name)),
        );

        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<String>>()
            .join(",");

        sql_insert_feature(layer_name, &columns.join(","), &placeholders)
    }

    fn build_update_sql(
        layer_name: &str,
        geometry_column: &str,
        primary_key_column: &str,
        property_columns: &[ColumnSpec],
    ) -> String {
        let mut column_names = Vec::with_capacity(property_columns.len() + 1);
        column_names.push(geometry_column);
        column_names.extend(property_columns.iter().map(|spec| spec.name.as_str()));

        let assignments = column_names
            .iter()
            .enumerate()
            .map(|(idx, name)| format!(r#""{}"=?{}"#, name, idx + 1))
            .collect::<Vec<String>>()
            .join(",");

        sql_update_feature(
            layer_name,
            &assignments,
            primary_key_column,
            column_names.len() + 1,
        )
    }

    fn build_property_index_by_name(property_columns: &[ColumnSpec]) -> HashMap<String, usize> {
        let mut property_index_by_name = HashMap::with_capacity(property_columns.len());
        for (idx, column) in property_columns.iter().enumerate() {
            property_index_by_name.insert(column.name.clone(), idx);
        }
        property_index_by_name
    }
}

pub(super) fn row_to_feature(
    row: &rusqlite::Row<'_>,
    property_columns: &[ColumnSpec],
    geometry_column: &str,
    primary_key_column: &str,
    property_index_by_name: &Arc<HashMap<String, usize>>,
) -> rusqlite::Result<GpkgFeature> {
    let mut id: Option<i64> = None;
    let mut geometry: Option<Vec<u8>> = None;
    let mut properties = Vec::with_capacity(property_columns.len());
    let row_len = property_columns.len() + 2;

    for idx in 0..row_len {
        let value_ref = row.get_ref(idx)?;
        let value = Value::try_from(value_ref)?;

        if idx == GEOMETRY_INDEX {
            match value {
                Value::Blob(bytes) => geometry = Some(bytes),
                Value::Null => geometry = None,
                _ => {
                    return Err(rusqlite::Error::InvalidColumnType(
                        idx,
                        geometry_column.to_string(),
                        value_ref.data_type(),
                    ));
                }
            }
        } else if idx == PRIMARY_INDEX {
            match value {
                Value::Integer(value) => id = Some(value),
                _ => {
                    return Err(rusqlite::Error::InvalidColumnType(
                        idx,
                        primary_key_column.to_string(),
                        value_ref.data_type(),
                    ));
                }
            }
        } else {
            properties.push(value);
        }
    }

    let id = id.ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(PRIMARY_INDEX, primary_key_column.to_string(), Type::Null)
    })?;

    Ok(GpkgFeature {
        id,
        geometry,
        properties,
        property_index_by_name: Arc::clone(property_index_by_name),
    })
}
