// cf. https://www.geopackage.org/spec140/index.html#table_definition_sql

// gpkg_contents: lists all geospatial contents in the package with identifying
// and descriptive metadata for user display and access.
pub(crate) const SQL_GPKG_CONTENTS: &str = "
CREATE TABLE gpkg_contents (
  table_name TEXT NOT NULL PRIMARY KEY,
  data_type TEXT NOT NULL,
  identifier TEXT UNIQUE,
  description TEXT DEFAULT '',
  last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
  min_x DOUBLE,
  min_y DOUBLE,
  max_x DOUBLE,
  max_y DOUBLE,
  srs_id INTEGER,
  CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
";

// gpkg_extensions: declares which extensions apply to the GeoPackage, a table,
// or a column so clients can detect requirements without scanning user tables.
pub(crate) const SQL_GPKG_EXTENSIONS: &str = "
CREATE TABLE IF NOT EXISTS gpkg_extensions (
  table_name TEXT,
  column_name TEXT,
  extension_name TEXT NOT NULL,
  definition TEXT NOT NULL,
  scope TEXT NOT NULL,
  CONSTRAINT ge_tce UNIQUE (table_name, column_name, extension_name)
);
";

// gpkg_geometry_columns: identifies geometry columns and geometry types for
// vector feature user data tables.
pub(crate) const SQL_GPKG_GEOMETRY_COLUMNS: &str = "
CREATE TABLE gpkg_geometry_columns (
  table_name TEXT NOT NULL,
  column_name TEXT NOT NULL,
  geometry_type_name TEXT NOT NULL,
  srs_id INTEGER NOT NULL,
  z TINYINT NOT NULL,
  m TINYINT NOT NULL,
  CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
  CONSTRAINT uk_gc_table_name UNIQUE (table_name),
  CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
  CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
";

// gpkg_spatial_ref_sys: the SRS catalog referenced by gpkg_contents and
// gpkg_geometry_columns to describe spatial reference systems.
pub(crate) const SQL_GPKG_SPATIAL_REF_SYS: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
  srs_name TEXT NOT NULL,
  srs_id INTEGER PRIMARY KEY,
  organization TEXT NOT NULL,
  organization_coordsys_id INTEGER NOT NULL,
  definition  TEXT NOT NULL,
  description TEXT
);
";

pub(crate) const SQL_LIST_LAYERS: &str =
    "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY table_name";

pub(crate) const SQL_INSERT_GPKG_CONTENTS: &str = "
INSERT INTO gpkg_contents
  (table_name, data_type, identifier, description, srs_id)
VALUES
  (?1, 'features', ?2, '', ?3)
";

pub(crate) const SQL_INSERT_GPKG_GEOMETRY_COLUMNS: &str = "
INSERT INTO gpkg_geometry_columns
  (table_name, column_name, geometry_type_name, srs_id, z, m)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_DELETE_GPKG_CONTENTS: &str =
    "DELETE FROM gpkg_contents WHERE table_name = ?1";

pub(crate) const SQL_DELETE_GPKG_GEOMETRY_COLUMNS: &str =
    "DELETE FROM gpkg_geometry_columns WHERE table_name = ?1";

pub(crate) const SQL_SELECT_GEOMETRY_COLUMN_META: &str = "
SELECT column_name, geometry_type_name, z, m, srs_id
FROM gpkg_geometry_columns
WHERE table_name = ?
";

pub(crate) const SQL_SRS_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM gpkg_spatial_ref_sys WHERE srs_id = ?1)";

pub(crate) const SQL_SELECT_SRS_CODE: &str = "
SELECT organization, organization_coordsys_id
FROM gpkg_spatial_ref_sys
WHERE srs_id = ?1
";

pub(crate) const SQL_INSERT_SRS: &str = "
INSERT INTO gpkg_spatial_ref_sys
  (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_TABLE_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)";

// Geometry index extension tables. nga_table_index records when a feature
// table was last indexed; nga_geometry_index holds one envelope per feature.
pub(crate) const GEOMETRY_INDEX_TABLE: &str = "nga_geometry_index";
pub(crate) const TABLE_INDEX_TABLE: &str = "nga_table_index";
pub(crate) const GEOMETRY_INDEX_EXTENSION: &str = "nga_geometry_index";
pub(crate) const GEOMETRY_INDEX_EXTENSION_DEFINITION: &str =
    "http://ngageoint.github.io/GeoPackage/docs/extensions/geometry-index.html";

pub(crate) const SQL_NGA_TABLE_INDEX: &str = "
CREATE TABLE IF NOT EXISTS nga_table_index (
  table_name TEXT NOT NULL PRIMARY KEY,
  last_indexed DATETIME
);
";

pub(crate) const SQL_NGA_GEOMETRY_INDEX: &str = "
CREATE TABLE IF NOT EXISTS nga_geometry_index (
  table_name TEXT NOT NULL,
  geom_id INTEGER NOT NULL,
  min_x DOUBLE NOT NULL,
  max_x DOUBLE NOT NULL,
  min_y DOUBLE NOT NULL,
  max_y DOUBLE NOT NULL,
  min_z DOUBLE,
  max_z DOUBLE,
  min_m DOUBLE,
  max_m DOUBLE,
  CONSTRAINT pk_ngi PRIMARY KEY (table_name, geom_id)
);
";

pub(crate) const GEOMETRY_INDEX_COLUMNS: &str = "nga_geometry_index.table_name, \
nga_geometry_index.geom_id, nga_geometry_index.min_x, nga_geometry_index.max_x, \
nga_geometry_index.min_y, nga_geometry_index.max_y, nga_geometry_index.min_z, \
nga_geometry_index.max_z, nga_geometry_index.min_m, nga_geometry_index.max_m";

pub(crate) const SQL_UPSERT_GEOMETRY_INDEX: &str = "
INSERT OR REPLACE INTO nga_geometry_index
  (table_name, geom_id, min_x, max_x, min_y, max_y, min_z, max_z, min_m, max_m)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
";

pub(crate) const SQL_DELETE_GEOMETRY_INDEX_BY_TABLE: &str =
    "DELETE FROM nga_geometry_index WHERE table_name = ?1";

pub(crate) const SQL_COUNT_GEOMETRY_INDEX_BY_TABLE: &str =
    "SELECT COUNT(*) FROM nga_geometry_index WHERE table_name = ?1";

pub(crate) const SQL_SELECT_TABLE_INDEX: &str =
    "SELECT table_name, last_indexed FROM nga_table_index WHERE table_name = ?1";

pub(crate) const SQL_UPSERT_TABLE_INDEX: &str =
    "INSERT OR REPLACE INTO nga_table_index (table_name, last_indexed) VALUES (?1, ?2)";

pub(crate) const SQL_DELETE_TABLE_INDEX: &str =
    "DELETE FROM nga_table_index WHERE table_name = ?1";

pub(crate) const SQL_UPSERT_EXTENSION: &str = "
INSERT OR REPLACE INTO gpkg_extensions
  (table_name, column_name, extension_name, definition, scope)
VALUES
  (?1, ?2, ?3, ?4, 'read-write')
";

pub(crate) const SQL_DELETE_EXTENSION: &str =
    "DELETE FROM gpkg_extensions WHERE table_name = ?1 AND extension_name = ?2";

pub(crate) fn sql_select_geometry_index(where_clause: &str) -> String {
    format!(
        "SELECT {GEOMETRY_INDEX_COLUMNS} FROM nga_geometry_index WHERE {where_clause} \
         ORDER BY nga_geometry_index.geom_id"
    )
}

pub(crate) fn sql_create_table(layer_name: &str, column_defs: &str) -> String {
    format!(r#"CREATE TABLE "{}" ({})"#, layer_name, column_defs)
}

pub(crate) fn sql_drop_table(layer_name: &str) -> String {
    format!(r#"DROP TABLE "{layer_name}""#)
}

pub(crate) fn sql_table_columns(layer_name: &str) -> String {
    format!("SELECT name, type, pk FROM pragma_table_info('{layer_name}')")
}

fn feature_columns<'a, I>(
    layer_name: &str,
    geometry_column: &'a str,
    primary_key_column: &'a str,
    other_columns: I,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    std::iter::once(geometry_column)
        .chain(std::iter::once(primary_key_column))
        .chain(other_columns)
        .map(|name| format!(r#""{layer_name}"."{name}""#))
        .collect::<Vec<String>>()
        .join(", ")
}

pub(crate) fn sql_select_features<'a, I>(
    layer_name: &'a str,
    geometry_column: &'a str,
    primary_key_column: &'a str,
    other_columns: I,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns = feature_columns(layer_name, geometry_column, primary_key_column, other_columns);
    format!(r#"SELECT {columns} FROM "{layer_name}" ORDER BY "{primary_key_column}""#)
}

/// One page of features starting at primary key `?1`.
pub(crate) fn sql_select_feature_page<'a, I>(
    layer_name: &'a str,
    geometry_column: &'a str,
    primary_key_column: &'a str,
    other_columns: I,
    page_size: u32,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns = feature_columns(layer_name, geometry_column, primary_key_column, other_columns);
    format!(
        r#"SELECT {columns} FROM "{layer_name}" WHERE "{primary_key_column}" >= ?1 ORDER BY "{primary_key_column}" LIMIT {page_size}"#
    )
}

/// One page of `(primary key, geometry)` pairs starting at primary key `?1`.
pub(crate) fn sql_select_geometry_page(
    layer_name: &str,
    geometry_column: &str,
    primary_key_column: &str,
    page_size: u32,
) -> String {
    format!(
        r#"SELECT "{primary_key_column}", "{geometry_column}" FROM "{layer_name}" WHERE "{primary_key_column}" >= ?1 ORDER BY "{primary_key_column}" LIMIT {page_size}"#
    )
}

pub(crate) fn sql_select_feature_by_id<'a, I>(
    layer_name: &'a str,
    geometry_column: &'a str,
    primary_key_column: &'a str,
    other_columns: I,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns = feature_columns(layer_name, geometry_column, primary_key_column, other_columns);
    format!(r#"SELECT {columns} FROM "{layer_name}" WHERE "{primary_key_column}" = ?1"#)
}

/// Features joined against their index rows; `where_clause` filters `nga_geometry_index`.
pub(crate) fn sql_select_indexed_features<'a, I>(
    layer_name: &'a str,
    geometry_column: &'a str,
    primary_key_column: &'a str,
    other_columns: I,
    where_clause: &str,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns = feature_columns(layer_name, geometry_column, primary_key_column, other_columns);
    format!(
        r#"SELECT {columns} FROM nga_geometry_index INNER JOIN "{layer_name}" ON "{layer_name}"."{primary_key_column}" = nga_geometry_index.geom_id WHERE {where_clause} ORDER BY nga_geometry_index.geom_id"#
    )
}

pub(crate) fn sql_count_features(layer_name: &str) -> String {
    format!(r#"SELECT COUNT(*) FROM "{layer_name}""#)
}

pub(crate) fn sql_delete_all(layer_name: &str) -> String {
    format!(r#"DELETE FROM "{}""#, layer_name)
}

pub(crate) fn sql_insert_feature(layer_name: &str, columns: &str, values: &str) -> String {
    format!(
        r#"INSERT INTO "{}" ({}) VALUES ({})"#,
        layer_name, columns, values
    )
}

pub(crate) fn sql_update_feature(
    layer_name: &str,
    assignments: &str,
    primary_key_column: &str,
    id_placeholder: usize,
) -> String {
    format!(
        r#"UPDATE "{layer_name}" SET {assignments} WHERE "{primary_key_column}" = ?{id_placeholder}"#
    )
}

pub(crate) fn initialize_gpkg(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SQL_GPKG_SPATIAL_REF_SYS)?;
    register_default_srs_ids(conn)?;
    conn.execute_batch(SQL_GPKG_CONTENTS)?;
    conn.execute_batch(SQL_GPKG_GEOMETRY_COLUMNS)?;
    conn.execute_batch(SQL_GPKG_EXTENSIONS)?;
    Ok(())
}

pub(crate) fn initialize_geometry_index(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SQL_NGA_TABLE_INDEX)?;
    conn.execute_batch(SQL_NGA_GEOMETRY_INDEX)?;
    Ok(())
}

// gpkg_spatial_ref_sys must hold a WKT definition for every srs. Only 4326 and
// the two undefined systems the GeoPackage standard requires are seeded here.
fn register_default_srs_ids(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    const EPSG4326_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#;

    conn.execute(
        SQL_INSERT_SRS,
        rusqlite::params!["WGS 84", 4326, "EPSG", 4326, EPSG4326_WKT, "WGS 84"],
    )?;
    conn.execute(
        SQL_INSERT_SRS,
        rusqlite::params![
            "Undefined Cartesian SRS",
            -1,
            "NONE",
            -1,
            "undefined",
            "undefined Cartesian coordinate reference system"
        ],
    )?;
    conn.execute(
        SQL_INSERT_SRS,
        rusqlite::params![
            "Undefined geographic SRS",
            0,
            "NONE",
            0,
            "undefined",
            "undefined geographic coordinate reference system"
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_page_selects_geometry_key_and_properties() {
        let name = String::from("name");
        let sql = sql_select_feature_page("pts", "geom", "fid", [name.as_str()], 50);
        assert_eq!(
            sql,
            r#"SELECT "pts"."geom", "pts"."fid", "pts"."name" FROM "pts" WHERE "fid" >= ?1 ORDER BY "fid" LIMIT 50"#
        );
    }

    #[test]
    fn geometry_page_reads_key_then_geometry() {
        assert_eq!(
            sql_select_geometry_page("pts", "geom", "fid", 10),
            r#"SELECT "fid", "geom" FROM "pts" WHERE "fid" >= ?1 ORDER BY "fid" LIMIT 10"#
        );
    }
}
