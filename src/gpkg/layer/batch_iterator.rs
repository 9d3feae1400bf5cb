use crate::Result;
use crate::geom::Geometry;
use crate::gpkg::GpkgFeature;
use crate::gpkg::feature::decode_column_geometry;
use crate::types::ColumnSpec;
use rusqlite::{Row, Statement};
use std::collections::HashMap;
use std::sync::Arc;

use super::row_to_feature;

/// Walks a feature table in primary-key order, one page per query.
///
/// The statement takes the first key of the page as `?1`
/// (`WHERE pk >= ?1 ORDER BY pk LIMIT n`), so a page costs the same wherever
/// it starts in the table.
pub(super) struct KeysetPager<'a> {
    stmt: Statement<'a>,
    page_size: u32,
    next_key: i64,
    exhausted: bool,
}

impl<'a> KeysetPager<'a> {
    pub(super) fn new(stmt: Statement<'a>, page_size: u32) -> Self {
        Self {
            stmt,
            page_size,
            next_key: i64::MIN,
            exhausted: false,
        }
    }

    /// Read the next page with `map`. `key_of` returns the primary key of a mapped row.
    fn next_page<T, F, K>(&mut self, map: F, key_of: K) -> Option<Result<Vec<T>>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
        K: Fn(&T) -> i64,
    {
        if self.exhausted {
            return None;
        }

        let page = match self
            .stmt
            .query_map([self.next_key], map)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<T>>>())
        {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Some(Err(e.into()));
            }
        };

        if page.len() < self.page_size as usize {
            self.exhausted = true;
        }
        let last_key = key_of(page.last()?);
        match last_key.checked_add(1) {
            Some(next_key) => self.next_key = next_key,
            None => self.exhausted = true,
        }
        Some(Ok(page))
    }
}

/// Iterator that yields batches of features from a layer.
///
/// Each call to `next()` returns up to `batch_size` features, in primary-key
/// order. This is the chunked alternative to `features()`, which collects the
/// whole layer at once.
pub struct GpkgFeatureBatchIterator<'a> {
    pub(super) pager: KeysetPager<'a>,
    pub(super) property_columns: Vec<ColumnSpec>,
    pub(super) geometry_column: String,
    pub(super) primary_key_column: String,
    pub(super) property_index_by_name: Arc<HashMap<String, usize>>,
}

impl Iterator for GpkgFeatureBatchIterator<'_> {
    type Item = Result<Vec<GpkgFeature>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pager.next_page(
            |row| {
                row_to_feature(
                    row,
                    &self.property_columns,
                    &self.geometry_column,
                    &self.primary_key_column,
                    &self.property_index_by_name,
                )
            },
            GpkgFeature::id,
        )
    }
}

/// Iterator over batches of decoded `(primary key, geometry)` pairs.
///
/// Only the key and geometry columns are read. A NULL or zero-length geometry
/// comes back as `None`; a blob that fails to decode fails its whole batch.
pub struct GpkgGeometryBatchIterator<'a> {
    pub(super) pager: KeysetPager<'a>,
}

impl Iterator for GpkgGeometryBatchIterator<'_> {
    type Item = Result<Vec<(i64, Option<Geometry>)>>;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.pager.next_page(
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<Vec<u8>>>(1)?)),
            |(id, _)| *id,
        )?;
        Some(page.and_then(|rows| {
            rows.into_iter()
                .map(|(id, blob)| Ok((id, decode_column_geometry(blob.as_deref())?)))
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::Result;
    use crate::geom::{Dimension, Geometry, GeometryType, Point};
    use crate::gpkg::{Gpkg, GpkgLayer};

    fn points_layer(gpkg: &Gpkg, total: usize) -> Result<GpkgLayer<'_>> {
        let layer = gpkg.new_layer(
            "batch_points",
            "geom",
            GeometryType::Point,
            Dimension::Xy,
            4326,
            &[],
        )?;
        for i in 0..total {
            layer.insert(&Geometry::Point(Point::new(i as f64, i as f64)), [])?;
        }
        Ok(layer)
    }

    fn batch_sizes(total: usize, batch_size: usize) -> Vec<usize> {
        let mut sizes = vec![batch_size; total / batch_size];
        if total % batch_size != 0 {
            sizes.push(total % batch_size);
        }
        sizes
    }

    fn assert_batch_iteration(total: usize, batch_size: u32) -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let layer = points_layer(&gpkg, total)?;

        let mut counts = Vec::new();
        let mut ids = Vec::new();
        for batch in layer.features_batch(batch_size)? {
            let features = batch?;
            counts.push(features.len());
            ids.extend(features.iter().map(|f| f.id()));
        }

        assert_eq!(ids, (1..=total as i64).collect::<Vec<_>>());
        assert_eq!(counts, batch_sizes(total, batch_size as usize));
        Ok(())
    }

    #[test]
    fn batch_iterator_handles_empty_layer() -> Result<()> {
        assert_batch_iteration(0, 3)
    }

    #[test]
    fn batch_iterator_handles_smaller_than_batch() -> Result<()> {
        assert_batch_iteration(2, 5)
    }

    #[test]
    fn batch_iterator_handles_exact_multiple() -> Result<()> {
        assert_batch_iteration(6, 3)
    }

    #[test]
    fn batch_iterator_handles_remainder() -> Result<()> {
        assert_batch_iteration(7, 3)
    }

    #[test]
    fn batch_iterator_handles_single_item_batches() -> Result<()> {
        assert_batch_iteration(4, 1)
    }

    #[test]
    fn pages_follow_keys_across_gaps() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let layer = points_layer(&gpkg, 10)?;
        gpkg.connection()
            .execute("DELETE FROM batch_points WHERE fid IN (2, 3, 4, 8)", [])?;
        gpkg.connection().execute(
            "INSERT INTO batch_points (fid, geom) VALUES (-5, NULL), (9223372036854775807, NULL)",
            [],
        )?;

        let ids = layer
            .features_batch(2)?
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .map(|f| f.id())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![-5, 1, 5, 6, 7, 9, 10, i64::MAX]);
        Ok(())
    }

    #[test]
    fn geometry_batches_decode_each_row() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let layer = points_layer(&gpkg, 5)?;
        gpkg.connection()
            .execute("UPDATE batch_points SET geom = NULL WHERE fid = 3", [])?;

        let batches = layer.geometry_batches(2)?.collect::<Result<Vec<_>>>()?;
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);

        let rows = batches.into_iter().flatten().collect::<Vec<_>>();
        assert_eq!(rows[2], (3, None));
        let (id, geometry) = &rows[4];
        assert_eq!(*id, 5);
        let geometry = geometry.as_ref().map(Geometry::to_wkt);
        assert_eq!(geometry.as_deref(), Some("POINT(4 4)"));
        assert_eq!(rows[0].1.as_ref().and_then(Geometry::srid), Some(4326));
        Ok(())
    }

    #[test]
    fn geometry_batches_surface_decode_errors() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let layer = points_layer(&gpkg, 1)?;
        gpkg.connection()
            .execute("UPDATE batch_points SET geom = X'4750' WHERE fid = 1", [])?;

        let mut batches = layer.geometry_batches(10)?;
        assert!(batches.next().is_some_and(|batch| batch.is_err()));
        Ok(())
    }
}
