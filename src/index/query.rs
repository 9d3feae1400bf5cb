//! Translation of a query envelope into a filter over `nga_geometry_index`.
//!
//! A regular window (`min_x <= max_x`) matches entries that overlap it on
//! every axis the window carries. A window with `min_x > max_x` crosses the
//! antimeridian; its x condition is the four-way disjunction
//!
//! ```text
//! min_x <= q.max_x OR max_x >= q.min_x OR min_x >= q.min_x OR max_x <= q.max_x
//! ```
//!
//! which admits nearly every entry, so callers that need an exact
//! antimeridian filter post-filter the results. Y, Z and M always use the
//! plain overlap test; an entry whose Z or M bound is NULL never matches a
//! window that has that axis.

use std::collections::VecDeque;

use rusqlite::types::Value;
use rusqlite::{Connection, Statement, params_from_iter};
use tracing::trace;

use crate::envelope::{AxisBounds, Envelope};
use crate::error::Result;
use crate::index::store::{GeometryIndexEntry, row_to_entry};
use crate::ogc_sql::sql_select_geometry_index;

const COL_TABLE_NAME: &str = "nga_geometry_index.table_name";
const COL_MIN_X: &str = "nga_geometry_index.min_x";
const COL_MAX_X: &str = "nga_geometry_index.max_x";
const COL_MIN_Y: &str = "nga_geometry_index.min_y";
const COL_MAX_Y: &str = "nga_geometry_index.max_y";
const COL_MIN_Z: &str = "nga_geometry_index.min_z";
const COL_MAX_Z: &str = "nga_geometry_index.max_z";
const COL_MIN_M: &str = "nga_geometry_index.min_m";
const COL_MAX_M: &str = "nga_geometry_index.max_m";

/// A planned envelope query: SQL filter text, bound values, and the same
/// predicate evaluated in memory.
#[derive(Clone, Debug)]
pub struct SpatialQuery {
    table_name: String,
    envelope: Envelope,
    where_clause: String,
    args: Vec<Value>,
}

impl SpatialQuery {
    pub fn new(table_name: &str, envelope: &Envelope) -> Self {
        let mut clauses = vec![format!("{COL_TABLE_NAME} = ?")];
        let mut args = vec![Value::Text(table_name.to_string())];

        if envelope.crosses_antimeridian() {
            clauses.push(format!(
                "({COL_MIN_X} <= ? OR {COL_MAX_X} >= ? OR {COL_MIN_X} >= ? OR {COL_MAX_X} <= ?)"
            ));
            args.extend(
                [envelope.max_x, envelope.min_x, envelope.min_x, envelope.max_x].map(Value::Real),
            );
        } else {
            push_overlap(&mut clauses, &mut args, COL_MIN_X, COL_MAX_X, envelope.min_x, envelope.max_x);
        }
        push_overlap(&mut clauses, &mut args, COL_MIN_Y, COL_MAX_Y, envelope.min_y, envelope.max_y);
        if let Some(z) = envelope.z {
            push_overlap(&mut clauses, &mut args, COL_MIN_Z, COL_MAX_Z, z.min, z.max);
        }
        if let Some(m) = envelope.m {
            push_overlap(&mut clauses, &mut args, COL_MIN_M, COL_MAX_M, m.min, m.max);
        }

        Self {
            table_name: table_name.to_string(),
            envelope: *envelope,
            where_clause: clauses.join(" AND "),
            args,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Filter text with positional `?` placeholders, one per value in [`SpatialQuery::args`].
    pub fn where_clause(&self) -> &str {
        &self.where_clause
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Evaluate the filter against an entry without touching the database.
    pub fn matches(&self, entry: &GeometryIndexEntry) -> bool {
        let q = &self.envelope;
        if entry.table_name != self.table_name {
            return false;
        }
        let x_matches = if q.crosses_antimeridian() {
            entry.min_x <= q.max_x
                || entry.max_x >= q.min_x
                || entry.min_x >= q.min_x
                || entry.max_x <= q.max_x
        } else {
            overlaps(entry.min_x, entry.max_x, q.min_x, q.max_x)
        };
        if !x_matches || !overlaps(entry.min_y, entry.max_y, q.min_y, q.max_y) {
            return false;
        }
        let optional_axis = |axis: Option<AxisBounds>, min: Option<f64>, max: Option<f64>| match axis {
            None => true,
            Some(bounds) => match (min, max) {
                (Some(min), Some(max)) => overlaps(min, max, bounds.min, bounds.max),
                _ => false,
            },
        };
        optional_axis(q.z, entry.min_z, entry.max_z) && optional_axis(q.m, entry.min_m, entry.max_m)
    }
}

fn overlaps(entry_min: f64, entry_max: f64, query_min: f64, query_max: f64) -> bool {
    entry_min <= query_max && entry_max >= query_min
}

fn push_overlap(
    clauses: &mut Vec<String>,
    args: &mut Vec<Value>,
    min_column: &str,
    max_column: &str,
    query_min: f64,
    query_max: f64,
) {
    clauses.push(format!("{min_column} <= ? AND {max_column} >= ?"));
    args.push(Value::Real(query_max));
    args.push(Value::Real(query_min));
}

/// Lazily pages matching index entries with `LIMIT` / `OFFSET`, ordered by `geom_id`.
pub struct GeometryIndexCursor<'a> {
    stmt: Option<Statement<'a>>,
    args: Vec<Value>,
    page_size: u32,
    offset: u32,
    buffered: VecDeque<GeometryIndexEntry>,
    end_or_invalid_state: bool,
}

impl<'a> GeometryIndexCursor<'a> {
    pub(crate) fn new(conn: &'a Connection, query: &SpatialQuery, page_size: u32) -> Result<Self> {
        let sql = format!(
            "{} LIMIT ? OFFSET ?",
            sql_select_geometry_index(query.where_clause())
        );
        let stmt = conn.prepare(&sql)?;
        Ok(Self {
            stmt: Some(stmt),
            args: query.args().to_vec(),
            page_size: page_size.max(1),
            offset: 0,
            buffered: VecDeque::new(),
            end_or_invalid_state: false,
        })
    }

    /// A cursor that yields nothing, for packages without index tables.
    pub(crate) fn empty() -> Self {
        Self {
            stmt: None,
            args: Vec::new(),
            page_size: 1,
            offset: 0,
            buffered: VecDeque::new(),
            end_or_invalid_state: true,
        }
    }

    fn fetch_page(&mut self) -> Result<()> {
        let Some(stmt) = self.stmt.as_mut() else {
            self.end_or_invalid_state = true;
            return Ok(());
        };
        let params = self
            .args
            .iter()
            .cloned()
            .chain([
                Value::Integer(i64::from(self.page_size)),
                Value::Integer(i64::from(self.offset)),
            ])
            .collect::<Vec<_>>();
        let page = stmt
            .query_map(params_from_iter(params), row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        trace!(offset = self.offset, rows = page.len(), "fetched geometry index page");

        if (page.len() as u32) < self.page_size {
            self.end_or_invalid_state = true;
        }
        self.offset += page.len() as u32;
        self.buffered.extend(page);
        Ok(())
    }
}

impl<'a> Iterator for GeometryIndexCursor<'a> {
    type Item = Result<GeometryIndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.end_or_invalid_state {
            if let Err(e) = self.fetch_page() {
                self.end_or_invalid_state = true;
                return Some(Err(e));
            }
        }
        self.buffered.pop_front().map(Ok)
    }
}
