use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use crate::envelope::{AxisBounds, Envelope};
use crate::error::Result;
use crate::index::query::{GeometryIndexCursor, SpatialQuery};
use crate::ogc_sql::{
    GEOMETRY_INDEX_TABLE, SQL_COUNT_GEOMETRY_INDEX_BY_TABLE, SQL_DELETE_GEOMETRY_INDEX_BY_TABLE,
    SQL_DELETE_TABLE_INDEX, SQL_SELECT_TABLE_INDEX, SQL_TABLE_EXISTS, SQL_UPSERT_GEOMETRY_INDEX,
    SQL_UPSERT_TABLE_INDEX, TABLE_INDEX_TABLE, initialize_geometry_index,
    sql_select_geometry_index,
};

/// One row of `nga_geometry_index`: the envelope of one feature.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryIndexEntry {
    pub table_name: String,
    pub geom_id: i64,
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub min_z: Option<f64>,
    pub max_z: Option<f64>,
    pub min_m: Option<f64>,
    pub max_m: Option<f64>,
}

impl GeometryIndexEntry {
    /// Build an entry from a feature envelope. Z / M are copied only when present.
    pub fn populate(table_name: &str, geom_id: i64, envelope: &Envelope) -> Self {
        Self {
            table_name: table_name.to_string(),
            geom_id,
            min_x: envelope.min_x,
            max_x: envelope.max_x,
            min_y: envelope.min_y,
            max_y: envelope.max_y,
            min_z: envelope.z.map(|z| z.min),
            max_z: envelope.z.map(|z| z.max),
            min_m: envelope.m.map(|m| m.min),
            max_m: envelope.m.map(|m| m.max),
        }
    }

    pub fn envelope(&self) -> Envelope {
        let axis = |min: Option<f64>, max: Option<f64>| match (min, max) {
            (Some(min), Some(max)) => Some(AxisBounds::new(min, max)),
            _ => None,
        };
        Envelope {
            min_x: self.min_x,
            max_x: self.max_x,
            min_y: self.min_y,
            max_y: self.max_y,
            z: axis(self.min_z, self.max_z),
            m: axis(self.min_m, self.max_m),
        }
    }
}

/// One row of `nga_table_index`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableIndexEntry {
    pub table_name: String,
    /// ISO-8601 UTC timestamp with millisecond precision.
    pub last_indexed: String,
}

pub(crate) fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<GeometryIndexEntry> {
    Ok(GeometryIndexEntry {
        table_name: row.get(0)?,
        geom_id: row.get(1)?,
        min_x: row.get(2)?,
        max_x: row.get(3)?,
        min_y: row.get(4)?,
        max_y: row.get(5)?,
        min_z: row.get(6)?,
        max_z: row.get(7)?,
        min_m: row.get(8)?,
        max_m: row.get(9)?,
    })
}

/// Persistence for the geometry index tables on a borrowed connection.
///
/// Read operations treat missing index tables as "nothing indexed" so they can
/// run against GeoPackages that never had an index built.
#[derive(Clone, Copy)]
pub struct GeometryIndexStore<'a> {
    conn: &'a Connection,
}

impl<'a> GeometryIndexStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create `nga_table_index` and `nga_geometry_index` if they do not exist.
    pub fn create_tables(&self) -> Result<()> {
        initialize_geometry_index(self.conn)?;
        Ok(())
    }

    pub fn tables_exist(&self) -> Result<bool> {
        Ok(self.table_exists(TABLE_INDEX_TABLE)? && self.table_exists(GEOMETRY_INDEX_TABLE)?)
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.conn.query_row(SQL_TABLE_EXISTS, [name], |row| row.get(0))?)
    }

    pub fn upsert(&self, entry: &GeometryIndexEntry) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(SQL_UPSERT_GEOMETRY_INDEX)?;
        stmt.execute(params![
            entry.table_name,
            entry.geom_id,
            entry.min_x,
            entry.max_x,
            entry.min_y,
            entry.max_y,
            entry.min_z,
            entry.max_z,
            entry.min_m,
            entry.max_m,
        ])?;
        Ok(())
    }

    pub fn get(&self, table_name: &str, geom_id: i64) -> Result<Option<GeometryIndexEntry>> {
        if !self.tables_exist()? {
            return Ok(None);
        }
        let sql = sql_select_geometry_index(
            "nga_geometry_index.table_name = ?1 AND nga_geometry_index.geom_id = ?2",
        );
        Ok(self
            .conn
            .query_row(&sql, params![table_name, geom_id], row_to_entry)
            .optional()?)
    }

    /// Remove every entry of `table_name`, returning how many were deleted.
    pub fn delete_by_table(&self, table_name: &str) -> Result<usize> {
        if !self.tables_exist()? {
            return Ok(0);
        }
        let deleted = self
            .conn
            .execute(SQL_DELETE_GEOMETRY_INDEX_BY_TABLE, [table_name])?;
        debug!(table_name, deleted, "deleted geometry index entries");
        Ok(deleted)
    }

    pub fn count_by_table(&self, table_name: &str) -> Result<usize> {
        if !self.tables_exist()? {
            return Ok(0);
        }
        let count: i64 =
            self.conn
                .query_row(SQL_COUNT_GEOMETRY_INDEX_BY_TABLE, [table_name], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }

    /// All entries of `table_name`, ordered by `geom_id`.
    pub fn query_by_table(&self, table_name: &str) -> Result<Vec<GeometryIndexEntry>> {
        if !self.tables_exist()? {
            return Ok(Vec::new());
        }
        let sql = sql_select_geometry_index("nga_geometry_index.table_name = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map([table_name], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Lazily page through the entries of `table_name` overlapping `envelope`.
    pub fn query_envelope(
        &self,
        table_name: &str,
        envelope: &Envelope,
        page_size: u32,
    ) -> Result<GeometryIndexCursor<'a>> {
        if !self.tables_exist()? {
            return Ok(GeometryIndexCursor::empty());
        }
        let query = SpatialQuery::new(table_name, envelope);
        GeometryIndexCursor::new(self.conn, &query, page_size)
    }

    pub fn table_index(&self, table_name: &str) -> Result<Option<TableIndexEntry>> {
        if !self.tables_exist()? {
            return Ok(None);
        }
        Ok(self
            .conn
            .query_row(SQL_SELECT_TABLE_INDEX, [table_name], |row| {
                Ok(TableIndexEntry {
                    table_name: row.get(0)?,
                    last_indexed: row.get(1)?,
                })
            })
            .optional()?)
    }

    pub fn put_table_index(&self, entry: &TableIndexEntry) -> Result<()> {
        self.conn.execute(
            SQL_UPSERT_TABLE_INDEX,
            params![entry.table_name, entry.last_indexed],
        )?;
        Ok(())
    }

    pub fn delete_table_index(&self, table_name: &str) -> Result<usize> {
        if !self.tables_exist()? {
            return Ok(0);
        }
        Ok(self.conn.execute(SQL_DELETE_TABLE_INDEX, [table_name])?)
    }

    /// A table counts as indexed once it has a `nga_table_index` row.
    pub fn is_indexed(&self, table_name: &str) -> Result<bool> {
        Ok(self.table_index(table_name)?.is_some())
    }
}
