use crate::geom::Geometry;

/// Inclusive range on one axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisBounds {
    pub min: f64,
    pub max: f64,
}

impl AxisBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn empty() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn include(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

/// Axis-aligned bounds of a geometry or a query window.
///
/// `min_x > max_x` describes a window that crosses the antimeridian.
/// `z` / `m` are `Some` exactly when the envelope carries that axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub z: Option<AxisBounds>,
    pub m: Option<AxisBounds>,
}

impl Envelope {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
            z: None,
            m: None,
        }
    }

    pub fn with_z(mut self, min_z: f64, max_z: f64) -> Self {
        self.z = Some(AxisBounds::new(min_z, max_z));
        self
    }

    pub fn with_m(mut self, min_m: f64, max_m: f64) -> Self {
        self.m = Some(AxisBounds::new(min_m, max_m));
        self
    }

    pub fn has_z(&self) -> bool {
        self.z.is_some()
    }

    pub fn has_m(&self) -> bool {
        self.m.is_some()
    }

    /// True for a window whose x range wraps across the antimeridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.min_x > self.max_x
    }

    /// True when no coordinate was folded in (min is still +inf).
    pub fn is_empty(&self) -> bool {
        self.min_x == f64::INFINITY && self.max_x == f64::NEG_INFINITY
    }
}

/// Fold every coordinate of `geometry` into an envelope.
///
/// The z / m axes are tracked when the geometry itself declares them; members
/// that carry extra ordinates under an XY parent do not add axes. A geometry
/// without coordinates yields `+inf` minimums and `-inf` maximums.
pub fn envelope_of(geometry: &Geometry) -> Envelope {
    let mut x = AxisBounds::empty();
    let mut y = AxisBounds::empty();
    let mut z = geometry.has_z().then(AxisBounds::empty);
    let mut m = geometry.has_m().then(AxisBounds::empty);

    geometry.for_each_coord(&mut |coord| {
        x.include(coord.x);
        y.include(coord.y);
        if let (Some(bounds), Some(value)) = (z.as_mut(), coord.z) {
            bounds.include(value);
        }
        if let (Some(bounds), Some(value)) = (m.as_mut(), coord.m) {
            bounds.include(value);
        }
    });

    Envelope {
        min_x: x.min,
        max_x: x.max,
        min_y: y.min,
        max_y: y.max,
        z,
        m,
    }
}

impl Geometry {
    pub fn envelope(&self) -> Envelope {
        envelope_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Coord, Dimension, GeometryCollection, LineString, Point, Polygon};

    #[test]
    fn point_envelope() {
        let envelope = envelope_of(&Geometry::Point(Point::new(3.0, -4.0)));
        assert_eq!(envelope, Envelope::new(3.0, 3.0, -4.0, -4.0));
        assert!(!envelope.has_z());
        assert!(!envelope.has_m());
    }

    #[test]
    fn linestring_with_z() {
        let line = Geometry::LineString(LineString::new(vec![
            Coord::xyz(0.0, 5.0, 10.0),
            Coord::xyz(-2.0, 1.0, -1.0),
            Coord::xyz(7.0, 3.0, 4.0),
        ]));
        assert_eq!(
            envelope_of(&line),
            Envelope::new(-2.0, 7.0, 1.0, 5.0).with_z(-1.0, 10.0)
        );
    }

    #[test]
    fn polygon_includes_interior_rings() {
        let polygon = Geometry::Polygon(Polygon::new(
            vec![Coord::xy(0.0, 0.0), Coord::xy(1.0, 0.0), Coord::xy(0.0, 1.0)],
            vec![vec![Coord::xy(5.0, 5.0), Coord::xy(6.0, 7.0)]],
        ));
        assert_eq!(envelope_of(&polygon), Envelope::new(0.0, 6.0, 0.0, 7.0));
    }

    #[test]
    fn empty_collection_has_inverted_bounds() {
        let envelope = envelope_of(&Geometry::GeometryCollection(GeometryCollection::empty(
            Dimension::Xy,
        )));
        assert_eq!(envelope.min_x, f64::INFINITY);
        assert_eq!(envelope.max_x, f64::NEG_INFINITY);
        assert_eq!(envelope.min_y, f64::INFINITY);
        assert_eq!(envelope.max_y, f64::NEG_INFINITY);
        assert!(envelope.is_empty());
    }

    #[test]
    fn z_axis_follows_top_level_flag() {
        // XY collection over an XYZ member: no z axis.
        let mut collection = GeometryCollection::new(vec![Geometry::Point(Point::from_coord(
            Coord::xyz(1.0, 2.0, 3.0),
        ))]);
        collection.dim = Dimension::Xy;
        assert!(!envelope_of(&Geometry::GeometryCollection(collection)).has_z());

        // XYM collection: m tracked.
        let collection = GeometryCollection::new(vec![
            Geometry::Point(Point::from_coord(Coord::xym(1.0, 2.0, 30.0))),
            Geometry::Point(Point::from_coord(Coord::xym(-1.0, 0.0, 10.0))),
        ]);
        let envelope = Geometry::GeometryCollection(collection).envelope();
        assert_eq!(envelope.m, Some(AxisBounds::new(10.0, 30.0)));
        assert_eq!(envelope.z, None);
    }

    #[test]
    fn antimeridian_window() {
        assert!(Envelope::new(170.0, -170.0, -10.0, 10.0).crosses_antimeridian());
        assert!(!Envelope::new(-170.0, 170.0, -10.0, 10.0).crosses_antimeridian());
    }
}
