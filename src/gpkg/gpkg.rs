use crate::conversions::{
    column_type_from_str, column_type_to_str, dimension_from_zm, dimension_to_zm,
    geometry_type_from_str,
};
use crate::error::{GpkgError, Result};
use crate::geom::{Dimension, GeometryType};
use crate::index::GeometryIndexStore;
use crate::ogc_sql::{
    SQL_DELETE_GPKG_CONTENTS, SQL_DELETE_GPKG_GEOMETRY_COLUMNS, SQL_INSERT_GPKG_CONTENTS,
    SQL_INSERT_GPKG_GEOMETRY_COLUMNS, SQL_INSERT_SRS, SQL_LIST_LAYERS,
    SQL_SELECT_GEOMETRY_COLUMN_META, SQL_SELECT_SRS_CODE, SQL_SRS_EXISTS, initialize_gpkg,
    sql_create_table, sql_drop_table, sql_table_columns,
};
use crate::sql_functions::register_spatial_functions;
use crate::types::{ColumnSpec, ColumnSpecs, ColumnType};
use rusqlite::{OpenFlags, OptionalExtension};
use std::path::Path;
use tracing::debug;

use super::layer::GpkgLayer;

#[derive(Debug)]
/// GeoPackage connection wrapper for feature layers and their geometry index.
pub struct Gpkg {
    conn: rusqlite::Connection,
    read_only: bool,
}

impl Gpkg {
    /// Open a GeoPackage in read-only mode.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = rusqlite::Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        register_spatial_functions(&conn)?;
        Ok(Self {
            conn,
            read_only: true,
        })
    }

    /// Open a GeoPackage in read-write mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GpkgError::Message(format!(
                "GeoPackage file does not exist: {}",
                path.display()
            )));
        }

        let conn = rusqlite::Connection::open(path)?;
        register_spatial_functions(&conn)?;
        Ok(Self {
            conn,
            read_only: false,
        })
    }

    /// Create a new GeoPackage
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(GpkgError::Message(format!(
                "GeoPackage file already exists: {}",
                path.display()
            )));
        }

        let conn = rusqlite::Connection::open(path)?;

        initialize_gpkg(&conn)?;
        register_spatial_functions(&conn)?;

        Ok(Self {
            conn,
            read_only: false,
        })
    }

    /// Create a new GeoPackage in memory
    pub fn new_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;

        initialize_gpkg(&conn)?;
        register_spatial_functions(&conn)?;

        Ok(Self {
            conn,
            read_only: false,
        })
    }

    /// The underlying SQLite connection.
    pub fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Register a spatial reference system in `gpkg_spatial_ref_sys`.
    ///
    /// Layers must reference an `srs_id` that already exists there. New
    /// GeoPackages only carry EPSG:4326 and the two undefined systems, so any
    /// other CRS has to be registered with its full WKT definition first. No
    /// validation of the definition is done.
    ///
    /// Example: register EPSG:3857 (Web Mercator / Pseudo-Mercator).
    /// ```
    /// # use rusqlite_gpkg_index::Gpkg;
    /// let gpkg = Gpkg::new_in_memory()?;
    /// gpkg.register_srs(
    ///     "WGS 84 / Pseudo-Mercator",
    ///     3857,
    ///     "EPSG",
    ///     3857,
    ///     r#"PROJCS["WGS 84 / Pseudo-Mercator",AUTHORITY["EPSG","3857"]]"#,
    ///     "Web Mercator / Pseudo-Mercator (EPSG:3857)",
    /// )?;
    /// assert_eq!(gpkg.srs_code(3857)?.as_deref(), Some("EPSG:3857"));
    /// # Ok::<(), rusqlite_gpkg_index::GpkgError>(())
    /// ```
    pub fn register_srs(
        &self,
        srs_name: &str,
        srs_id: i32,
        organization: &str,
        organization_coordsys_id: i32,
        definition: &str,
        description: &str,
    ) -> Result<()> {
        self.ensure_writable()?;

        self.conn.execute(
            SQL_INSERT_SRS,
            rusqlite::params![
                srs_name,
                srs_id,
                organization,
                organization_coordsys_id,
                definition,
                description
            ],
        )?;
        Ok(())
    }

    /// `<organization>:<coordsys id>` of a registered srs, e.g. `EPSG:4326`.
    pub fn srs_code(&self, srs_id: i32) -> Result<Option<String>> {
        let code = self
            .conn
            .query_row(SQL_SELECT_SRS_CODE, [srs_id], |row| {
                let organization: String = row.get(0)?;
                let coordsys_id: i64 = row.get(1)?;
                Ok(format!("{}:{coordsys_id}", organization.to_uppercase()))
            })
            .optional()?;
        Ok(code)
    }

    /// List the names of the feature layers.
    pub fn list_layers(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(SQL_LIST_LAYERS)?;
        let layers = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(layers)
    }

    /// Load a layer definition and metadata by name.
    pub fn open_layer<'a>(&'a self, layer_name: &str) -> Result<GpkgLayer<'a>> {
        let (geometry_column, geometry_type, geometry_dimension, srs_id) =
            self.get_geometry_column_and_srs_id(layer_name)?;
        let column_specs = self.get_column_specs(layer_name)?;
        let property_columns = column_specs
            .other_columns
            .into_iter()
            .filter(|spec| spec.name != geometry_column)
            .collect();

        Ok(GpkgLayer::new(
            self,
            layer_name,
            geometry_column,
            column_specs.primary_key,
            geometry_type,
            geometry_dimension,
            srs_id,
            property_columns,
        ))
    }

    /// Create a new feature layer with an `fid` primary key.
    ///
    /// Example:
    /// ```
    /// use rusqlite_gpkg_index::{ColumnSpec, ColumnType, Dimension, GeometryType, Gpkg};
    ///
    /// let gpkg = Gpkg::new_in_memory()?;
    /// let layer = gpkg.new_layer(
    ///     "rivers",
    ///     "geom",
    ///     GeometryType::LineString,
    ///     Dimension::Xy,
    ///     4326,
    ///     &[ColumnSpec::new("name", ColumnType::Varchar)],
    /// )?;
    /// assert_eq!(layer.primary_key_column, "fid");
    /// # Ok::<(), rusqlite_gpkg_index::GpkgError>(())
    /// ```
    pub fn new_layer<'a>(
        &'a self,
        layer_name: &str,
        geometry_column: &str,
        geometry_type: GeometryType,
        geometry_dimension: Dimension,
        srs_id: i32,
        property_columns: &[ColumnSpec],
    ) -> Result<GpkgLayer<'a>> {
        self.ensure_writable()?;

        if self.list_layers()?.iter().any(|name| name == layer_name) {
            return Err(GpkgError::LayerAlreadyExists {
                layer_name: layer_name.to_string(),
            });
        }

        let srs_exists: bool = self
            .conn
            .query_row(SQL_SRS_EXISTS, [srs_id], |row| row.get(0))?;
        if !srs_exists {
            return Err(GpkgError::MissingSpatialRefSysId { srs_id });
        }

        let (z, m) = dimension_to_zm(geometry_dimension);

        let mut column_defs = Vec::with_capacity(property_columns.len() + 2);
        column_defs.push("fid INTEGER PRIMARY KEY AUTOINCREMENT".to_string());
        column_defs.push(format!(
            r#""{}" {}"#,
            geometry_column,
            geometry_type.wkt_name()
        ));
        for spec in property_columns {
            let col_type = column_type_to_str(spec.column_type);
            column_defs.push(format!(r#""{}" {col_type}"#, spec.name));
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&sql_create_table(layer_name, &column_defs.join(", ")))?;
        tx.execute(
            SQL_INSERT_GPKG_CONTENTS,
            rusqlite::params![layer_name, layer_name, srs_id],
        )?;
        tx.execute(
            SQL_INSERT_GPKG_GEOMETRY_COLUMNS,
            rusqlite::params![
                layer_name,
                geometry_column,
                geometry_type.wkt_name(),
                srs_id,
                z,
                m
            ],
        )?;
        tx.commit()?;
        debug!(layer_name, geometry_column, srs_id, "created layer");

        Ok(GpkgLayer::new(
            self,
            layer_name,
            geometry_column.to_string(),
            "fid".to_string(),
            geometry_type,
            geometry_dimension,
            srs_id,
            property_columns.to_vec(),
        ))
    }

    /// Delete a layer together with its metadata rows and geometry index.
    pub fn delete_layer(&self, layer_name: &str) -> Result<()> {
        self.ensure_writable()?;

        let layer = self.open_layer(layer_name)?;
        layer.feature_table_index().delete_index()?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(SQL_DELETE_GPKG_GEOMETRY_COLUMNS, [layer_name])?;
        tx.execute(SQL_DELETE_GPKG_CONTENTS, [layer_name])?;
        tx.execute_batch(&sql_drop_table(layer_name))?;
        tx.commit()?;
        debug!(layer_name, "deleted layer");
        Ok(())
    }

    /// Build the geometry index of one feature table unless it is already indexed.
    ///
    /// Returns the number of index entries written; `0` when the table was
    /// already indexed.
    pub fn index_feature_table(&self, table_name: &str) -> Result<usize> {
        crate::index::FeatureTableIndex::new(self, table_name)?.index()
    }

    /// Index every feature table. Stops at the first table that fails.
    pub fn index(&self) -> Result<usize> {
        let mut written = 0;
        for table_name in self.list_layers()? {
            written += self.index_feature_table(&table_name)?;
        }
        Ok(written)
    }

    /// Persistence for the geometry index tables of this GeoPackage.
    pub fn geometry_index_store(&self) -> GeometryIndexStore<'_> {
        GeometryIndexStore::new(&self.conn)
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(GpkgError::ReadOnly);
        }
        Ok(())
    }

    /// Resolve the table columns and map SQLite types.
    pub(crate) fn get_column_specs(&self, layer_name: &str) -> Result<ColumnSpecs> {
        let query = sql_table_columns(layer_name);
        let mut stmt = self.conn.prepare(&query)?;

        let rows = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let column_type_str: String = row.get(1)?;
                let primary_key: i32 = row.get(2)?;
                Ok((name, column_type_str, primary_key != 0))
            })?
            .collect::<std::result::Result<Vec<(String, String, bool)>, _>>()?;

        let mut primary_key: Option<String> = None;
        let mut other_columns = Vec::new();
        for (name, column_type_str, is_primary_key) in rows {
            if is_primary_key {
                if primary_key.is_some() {
                    return Err(GpkgError::CompositePrimaryKeyUnsupported {
                        layer_name: layer_name.to_string(),
                    });
                }
                primary_key = Some(name);
                continue;
            }

            // cf. https://www.geopackage.org/spec140/index.html#_sqlite_container
            let column_type: ColumnType =
                column_type_from_str(&column_type_str).ok_or_else(|| {
                    GpkgError::UnsupportedColumnType {
                        column: name.clone(),
                        declared_type: column_type_str.clone(),
                    }
                })?;
            other_columns.push(ColumnSpec { name, column_type });
        }

        let primary_key = primary_key.ok_or_else(|| GpkgError::MissingPrimaryKeyColumn {
            layer_name: layer_name.to_string(),
        })?;

        Ok(ColumnSpecs {
            primary_key,
            other_columns,
        })
    }

    /// Resolve the geometry column metadata and SRS information for a layer.
    pub(crate) fn get_geometry_column_and_srs_id(
        &self,
        layer_name: &str,
    ) -> Result<(String, GeometryType, Dimension, i32)> {
        let mut stmt = self.conn.prepare(SQL_SELECT_GEOMETRY_COLUMN_META)?;

        let (geometry_column, geometry_type_str, z, m, srs_id) =
            stmt.query_one([layer_name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i8>(2)?,
                    row.get::<_, i8>(3)?,
                    row.get::<_, i32>(4)?,
                ))
            })?;

        let geometry_type = geometry_type_from_str(&geometry_type_str)?;
        let geometry_dimension = dimension_from_zm(z, m)?;

        Ok((geometry_column, geometry_type, geometry_dimension, srs_id))
    }
}

#[cfg(test)]
mod tests {
    use super::Gpkg;
    use crate::error::{GpkgError, Result};
    use crate::geom::{Dimension, Geometry, GeometryType};
    use crate::types::{ColumnSpec, ColumnType};

    fn temp_dir() -> Result<tempfile::TempDir> {
        tempfile::tempdir().map_err(|e| GpkgError::Message(e.to_string()))
    }

    #[test]
    fn new_layer_requires_existing_srs() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let err = gpkg
            .new_layer(
                "missing_srs",
                "geom",
                GeometryType::Point,
                Dimension::Xy,
                9999,
                &[],
            )
            .expect_err("missing srs should fail");
        assert!(matches!(
            err,
            GpkgError::MissingSpatialRefSysId { srs_id: 9999 }
        ));
        Ok(())
    }

    #[test]
    fn new_layer_rejects_duplicates() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        gpkg.new_layer("points", "geom", GeometryType::Point, Dimension::Xy, 4326, &[])?;
        let err = gpkg
            .new_layer("points", "geom", GeometryType::Point, Dimension::Xy, 4326, &[])
            .expect_err("duplicate layer should fail");
        assert!(matches!(err, GpkgError::LayerAlreadyExists { .. }));
        Ok(())
    }

    #[test]
    fn new_fails_if_file_exists() -> Result<()> {
        let dir = temp_dir()?;
        let path = dir.path().join("exists.gpkg");
        std::fs::write(&path, []).map_err(|e| GpkgError::Message(e.to_string()))?;

        let err = Gpkg::new(&path).expect_err("existing file should fail");
        match err {
            GpkgError::Message(message) => {
                assert!(message.contains("already exists"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn open_fails_if_missing_file() -> Result<()> {
        let dir = temp_dir()?;
        let err = Gpkg::open(dir.path().join("missing.gpkg")).expect_err("missing file should fail");
        match err {
            GpkgError::Message(message) => {
                assert!(message.contains("does not exist"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn reopens_file_with_layers() -> Result<()> {
        let dir = temp_dir()?;
        let path = dir.path().join("layers.gpkg");
        {
            let gpkg = Gpkg::new(&path)?;
            let columns = [
                ColumnSpec::new("name", ColumnType::Varchar),
                ColumnSpec::new("length", ColumnType::Double),
            ];
            let rivers = gpkg.new_layer(
                "rivers",
                "geom",
                GeometryType::LineString,
                Dimension::Xyz,
                4326,
                &columns,
            )?;
            rivers.insert(
                &Geometry::parse_wkt("LINESTRING Z (0 0 1,1 1 2)")?,
                [
                    rusqlite::types::Value::Text("Nile".to_string()),
                    rusqlite::types::Value::Real(6650.0),
                ],
            )?;
            gpkg.new_layer("lakes", "shape", GeometryType::Polygon, Dimension::Xy, 0, &[])?;
        }

        let gpkg = Gpkg::open(&path)?;
        assert_eq!(gpkg.list_layers()?, vec!["lakes", "rivers"]);

        let rivers = gpkg.open_layer("rivers")?;
        assert_eq!(rivers.geometry_type, GeometryType::LineString);
        assert_eq!(rivers.geometry_dimension, Dimension::Xyz);
        assert_eq!(rivers.property_columns.len(), 2);
        assert_eq!(rivers.features()?.count(), 1);

        let lakes = gpkg.open_layer("lakes")?;
        assert_eq!(lakes.geometry_column, "shape");
        assert_eq!(lakes.srs_id, 0);
        Ok(())
    }

    #[test]
    fn delete_layer_removes_table_and_index() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let layer =
            gpkg.new_layer("points", "geom", GeometryType::Point, Dimension::Xy, 4326, &[])?;
        layer.insert(&Geometry::parse_wkt("POINT(1 2)")?, [])?;
        assert_eq!(gpkg.index_feature_table("points")?, 1);

        gpkg.delete_layer("points")?;
        assert!(gpkg.list_layers()?.is_empty());
        let store = gpkg.geometry_index_store();
        assert_eq!(store.count_by_table("points")?, 0);
        assert!(!store.is_indexed("points")?);
        let extensions: i64 = gpkg.connection().query_row(
            "SELECT COUNT(*) FROM gpkg_extensions WHERE table_name = 'points'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(extensions, 0);
        Ok(())
    }

    #[test]
    fn delete_layer_rejects_read_only() -> Result<()> {
        let dir = temp_dir()?;
        let path = dir.path().join("ro.gpkg");
        Gpkg::new(&path)?.new_layer(
            "points",
            "geom",
            GeometryType::Point,
            Dimension::Xy,
            4326,
            &[],
        )?;

        let gpkg = Gpkg::open_read_only(&path)?;
        let err = gpkg
            .delete_layer("points")
            .expect_err("read-only should fail");
        assert!(matches!(err, GpkgError::ReadOnly));
        Ok(())
    }

    #[test]
    fn srs_code_of_defaults() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        assert_eq!(gpkg.srs_code(4326)?.as_deref(), Some("EPSG:4326"));
        assert_eq!(gpkg.srs_code(-1)?.as_deref(), Some("NONE:-1"));
        assert_eq!(gpkg.srs_code(12345)?, None);
        Ok(())
    }

    #[test]
    fn index_covers_every_layer() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        for name in ["a", "b"] {
            let layer =
                gpkg.new_layer(name, "geom", GeometryType::Point, Dimension::Xy, 4326, &[])?;
            layer.insert(&Geometry::parse_wkt("POINT(1 2)")?, [])?;
            layer.insert(&Geometry::parse_wkt("POINT(3 4)")?, [])?;
        }
        assert_eq!(gpkg.index()?, 4);
        // Already indexed: nothing rewritten.
        assert_eq!(gpkg.index()?, 0);
        assert!(gpkg.geometry_index_store().is_indexed("a")?);
        assert!(gpkg.geometry_index_store().is_indexed("b")?);
        Ok(())
    }
}
