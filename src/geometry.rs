//! Overlay geometry: footprint-sized geographic bounds, screen placement
//! and shortest-arc rotation.
//!
//! All functions here are pure. The equirectangular approximation is
//! accurate enough for footprints of a few metres inside a region of a few
//! kilometres.

use crate::types::{EntityClass, LatLng};

/// Metres per degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = 111_319.5;

// ---------------------------------------------------------------------------
// Geographic bounds
// ---------------------------------------------------------------------------

/// Axis-aligned geographic box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl GeoBounds {
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }

    /// North-south extent in metres.
    pub fn height_m(&self) -> f64 {
        (self.north_east.lat - self.south_west.lat) * METERS_PER_DEGREE
    }

    /// East-west extent in metres, measured at the box centre.
    pub fn width_m(&self) -> f64 {
        (self.north_east.lng - self.south_west.lng)
            * METERS_PER_DEGREE
            * self.center().lat.to_radians().cos()
    }
}

/// Bounds centred on `position` sized to the class footprint: the length runs
/// north-south, the width east-west.
pub fn compute_bounds(position: LatLng, class: EntityClass) -> GeoBounds {
    let footprint = class.footprint();
    let lat_delta = footprint.length / 2.0 / METERS_PER_DEGREE;
    let lng_delta =
        footprint.width / 2.0 / (METERS_PER_DEGREE * position.lat.to_radians().cos());

    GeoBounds {
        south_west: LatLng::new(position.lat - lat_delta, position.lng - lng_delta),
        north_east: LatLng::new(position.lat + lat_delta, position.lng + lng_delta),
    }
}

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

/// Normalise an angular difference into (−180°, +180°].
pub fn normalize_delta(mut delta: f64) -> f64 {
    if !delta.is_finite() {
        return 0.0;
    }
    delta %= 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta <= -180.0 {
        delta += 360.0;
    }
    delta
}

/// Next display angle when turning from `current` towards `target`.
///
/// Only the step is normalised; the returned angle is unbounded so the
/// overlay keeps turning through 360° instead of snapping back.
pub fn compute_rotation(current: f64, target: f64) -> f64 {
    current + normalize_delta(target - current)
}

// ---------------------------------------------------------------------------
// Screen space
// ---------------------------------------------------------------------------

/// Pixel position inside the map container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// Pixel box an overlay occupies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    /// Place a box from its projected corners (south-west, north-east).
    pub fn from_corners(sw: ScreenPoint, ne: ScreenPoint) -> Self {
        Self {
            left: sw.x.min(ne.x),
            top: ne.y.min(sw.y),
            width: (ne.x - sw.x).abs(),
            height: (sw.y - ne.y).abs(),
        }
    }
}

/// Geographic → screen projection owned by the map surface.
pub trait Projection {
    fn point_from_coords(&self, coord: LatLng) -> ScreenPoint;
}

/// Project bounds through any projection.
pub fn project_bounds(bounds: &GeoBounds, projection: &dyn Projection) -> ScreenRect {
    ScreenRect::from_corners(
        projection.point_from_coords(bounds.south_west),
        projection.point_from_coords(bounds.north_east),
    )
}

/// Spherical Web Mercator with 256-px tiles, centred on a viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebMercator {
    pub center: LatLng,
    pub zoom: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
}

impl WebMercator {
    const TILE_SIZE: f64 = 256.0;
    const MAX_LAT: f64 = 85.051_128_78;

    pub fn new(center: LatLng, zoom: f64, viewport_width: f64, viewport_height: f64) -> Self {
        Self {
            center,
            zoom,
            viewport_width,
            viewport_height,
        }
    }

    fn world_px(&self, coord: LatLng) -> (f64, f64) {
        let scale = Self::TILE_SIZE * 2f64.powf(self.zoom);
        let lat = coord.lat.clamp(-Self::MAX_LAT, Self::MAX_LAT).to_radians();
        let x = (coord.lng + 180.0) / 360.0 * scale;
        let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0 * scale;
        (x, y)
    }
}

impl Projection for WebMercator {
    fn point_from_coords(&self, coord: LatLng) -> ScreenPoint {
        let (cx, cy) = self.world_px(self.center);
        let (x, y) = self.world_px(coord);
        ScreenPoint {
            x: x - cx + self.viewport_width / 2.0,
            y: y - cy + self.viewport_height / 2.0,
        }
    }
}
