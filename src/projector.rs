//! Flat projection of campus coordinates onto a fixed-size drawing surface.
//!
//! The extent is derived from the stop set only. Shuttles that have wandered
//! outside it project outside the canvas and are deliberately left unclamped.

use serde::Serialize;

use crate::structs::{GeoPoint, Georeferenced};

/// Smallest span (degrees) used on either axis, so a single stop or a row of
/// stops sharing a coordinate still projects.
pub const MIN_RANGE_DEG: f64 = 0.01;

/// Bounding box in degrees. All zero when there was nothing to bound.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Extent {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Extent {
    pub fn lat_range(&self) -> f64 {
        (self.max_lat - self.min_lat).max(MIN_RANGE_DEG)
    }

    pub fn lon_range(&self) -> f64 {
        (self.max_lon - self.min_lon).max(MIN_RANGE_DEG)
    }
}

/// Drawing surface in pixels, with `padding` in degrees added around the extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
    pub padding: f64,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 600.0,
            height: 360.0,
            padding: 0.001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
}

/// Bounds every positioned item; items without a position are ignored.
pub fn compute_extent<'a, T, I>(points: I) -> Extent
where
    T: Georeferenced + 'a,
    I: IntoIterator<Item = &'a T>,
{
    points
        .into_iter()
        .filter_map(Georeferenced::geo_point)
        .fold(None, |acc: Option<Extent>, p| {
            Some(match acc {
                None => Extent {
                    min_lat: p.lat,
                    max_lat: p.lat,
                    min_lon: p.lon,
                    max_lon: p.lon,
                },
                Some(e) => Extent {
                    min_lat: e.min_lat.min(p.lat),
                    max_lat: e.max_lat.max(p.lat),
                    min_lon: e.min_lon.min(p.lon),
                    max_lon: e.max_lon.max(p.lon),
                },
            })
        })
        .unwrap_or_default()
}

/// Maps `(lat, lon)` into canvas pixels. Latitude grows upwards, so `y` is
/// inverted. The result is not clamped to the canvas.
pub fn project(lat: f64, lon: f64, extent: &Extent, width: f64, height: f64, padding: f64) -> ProjectedPoint {
    let nx = (lon - extent.min_lon + padding) / (extent.lon_range() + padding * 2.0);
    let ny = (lat - extent.min_lat + padding) / (extent.lat_range() + padding * 2.0);

    ProjectedPoint {
        x: nx * width,
        y: height - ny * height,
    }
}

impl Canvas {
    pub fn project(&self, point: GeoPoint, extent: &Extent) -> ProjectedPoint {
        project(point.lat, point.lon, extent, self.width, self.height, self.padding)
    }
}
