use serde_json::{Value, json};

use crate::envelope::Envelope;
use crate::error::{GpkgError, Result};

/// Latitude limit of the Web Mercator projection.
const WEB_MERCATOR_MAX_LATITUDE: f64 = 85.0511;

/// Coordinate transformation supplied by the host application.
///
/// Implementations receive a GeoJSON geometry and return it expressed in
/// `to`. CRS names are of the form `EPSG:4326`.
pub trait Reproject {
    fn reproject(&self, geojson: &Value, from: &str, to: &str) -> Result<Value>;
}

impl<F> Reproject for F
where
    F: Fn(&Value, &str, &str) -> Result<Value>,
{
    fn reproject(&self, geojson: &Value, from: &str, to: &str) -> Result<Value> {
        self(geojson, from, to)
    }
}

/// Longitude / latitude rectangle used to query an index from another CRS.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_longitude: f64,
    pub max_longitude: f64,
    pub min_latitude: f64,
    pub max_latitude: f64,
}

impl BoundingBox {
    pub fn new(min_longitude: f64, max_longitude: f64, min_latitude: f64, max_latitude: f64) -> Self {
        Self {
            min_longitude,
            max_longitude,
            min_latitude,
            max_latitude,
        }
    }

    pub fn build_envelope(&self) -> Envelope {
        Envelope::new(
            self.min_longitude,
            self.max_longitude,
            self.min_latitude,
            self.max_latitude,
        )
    }

    /// The box as a GeoJSON `Feature` holding a closed polygon.
    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [self.min_longitude, self.min_latitude],
                    [self.max_longitude, self.min_latitude],
                    [self.max_longitude, self.max_latitude],
                    [self.min_longitude, self.max_latitude],
                    [self.min_longitude, self.min_latitude]
                ]]
            }
        })
    }

    /// Reproject the two corners from `from` into `to`.
    ///
    /// Going from EPSG:4326 to EPSG:3857 the box is first clamped to the
    /// Web Mercator domain. Identical CRS names return the box unchanged.
    pub fn project(&self, from: &str, to: &str, reprojector: &dyn Reproject) -> Result<Self> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(*self);
        }

        let mut source = *self;
        if from.eq_ignore_ascii_case("EPSG:4326") && to.eq_ignore_ascii_case("EPSG:3857") {
            source.max_latitude = source.max_latitude.min(WEB_MERCATOR_MAX_LATITUDE);
            source.min_latitude = source.min_latitude.max(-WEB_MERCATOR_MAX_LATITUDE);
            source.min_longitude = source.min_longitude.max(-180.0);
            source.max_longitude = source.max_longitude.min(180.0);
        }

        let (min_x, min_y) =
            project_corner(reprojector, source.min_longitude, source.min_latitude, from, to)?;
        let (max_x, max_y) =
            project_corner(reprojector, source.max_longitude, source.max_latitude, from, to)?;
        Ok(Self::new(min_x, max_x, min_y, max_y))
    }
}

fn project_corner(
    reprojector: &dyn Reproject,
    x: f64,
    y: f64,
    from: &str,
    to: &str,
) -> Result<(f64, f64)> {
    let point = json!({ "type": "Point", "coordinates": [x, y] });
    let projected = reprojector.reproject(&point, from, to)?;
    let coordinate = |i: usize| {
        projected
            .get("coordinates")
            .and_then(|c| c.get(i))
            .and_then(Value::as_f64)
    };
    match (coordinate(0), coordinate(1)) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(GpkgError::Reproject(format!(
            "{from} -> {to} did not return a point: {projected}"
        ))),
    }
}
