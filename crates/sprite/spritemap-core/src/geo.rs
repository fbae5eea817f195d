//! Web-Mercator helpers and geographic value types.

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051129;
pub const DEG2RAD: f64 = std::f64::consts::PI / 180.0;
pub const RAD2DEG: f64 = 180.0 / std::f64::consts::PI;
/// Width of the world in pixels at zoom 0.
pub const TILE_SIZE: f64 = 512.0;

const MIN_COS_LAT: f64 = 1e-6;

/// Geographic sprite location. `z` is an optional elevation in meters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpriteLocation {
    pub lng: f64,
    pub lat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl SpriteLocation {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat, z: None }
    }

    pub fn with_z(lng: f64, lat: f64, z: f64) -> Self {
        Self { lng, lat, z: Some(z) }
    }

    /// Elevation in meters, zero when unset.
    #[inline]
    pub fn altitude(&self) -> f64 {
        self.z.unwrap_or(0.0)
    }
}

/// Normalized Web-Mercator coordinate (world spans [0,1] on x and y).
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MercatorCoordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[inline]
fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[inline]
pub fn mercator_x_from_lng(lng: f64) -> f64 {
    (180.0 + lng) / 360.0
}

#[inline]
pub fn mercator_y_from_lat(lat: f64) -> f64 {
    let constrained = lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    let radians = constrained * DEG2RAD;
    (180.0 - RAD2DEG * (std::f64::consts::FRAC_PI_4 + radians / 2.0).tan().ln()) / 360.0
}

#[inline]
pub fn lng_from_mercator_x(x: f64) -> f64 {
    x * 360.0 - 180.0
}

#[inline]
pub fn lat_from_mercator_y(y: f64) -> f64 {
    let y2 = 180.0 - y * 360.0;
    (360.0 / std::f64::consts::PI) * (y2 * DEG2RAD).exp().atan() - 90.0
}

#[inline]
pub fn circumference_at_latitude(lat_deg: f64) -> f64 {
    2.0 * std::f64::consts::PI * EARTH_RADIUS_METERS * (lat_deg * DEG2RAD).cos()
}

#[inline]
pub fn mercator_z_from_altitude(altitude: f64, lat_deg: f64) -> f64 {
    let circumference = circumference_at_latitude(lat_deg);
    if circumference == 0.0 {
        return 0.0;
    }
    altitude / circumference
}

/// Convert a geographic location into a mercator coordinate. Non-finite inputs
/// collapse to zero and latitude is clamped to the mercator range.
pub fn mercator_from_location(loc: &SpriteLocation) -> MercatorCoordinate {
    let lng = finite_or(loc.lng, 0.0);
    let lat = finite_or(loc.lat, 0.0).clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    let altitude = finite_or(loc.altitude(), 0.0);
    MercatorCoordinate {
        x: mercator_x_from_lng(lng),
        y: mercator_y_from_lat(lat),
        z: mercator_z_from_altitude(altitude, lat),
    }
}

/// World size in pixels for a zoom level.
#[inline]
pub fn world_size_for_zoom(zoom: f64) -> f64 {
    TILE_SIZE * zoom.exp2()
}

/// Screen pixels per ground meter at a latitude before perspective correction.
#[inline]
pub fn pixels_per_meter(world_size: f64, lat_deg: f64) -> f64 {
    let circumference = circumference_at_latitude(lat_deg);
    if circumference <= 0.0 || !world_size.is_finite() {
        return 0.0;
    }
    world_size / circumference
}

/// Move `base` by `east`/`north` meters on the local tangent plane.
pub fn apply_surface_displacement(base: &SpriteLocation, east: f64, north: f64) -> SpriteLocation {
    let delta_lat = (north / EARTH_RADIUS_METERS) * RAD2DEG;
    let cos_lat = (base.lat * DEG2RAD).cos().max(MIN_COS_LAT);
    let delta_lng = (east / (EARTH_RADIUS_METERS * cos_lat)) * RAD2DEG;
    SpriteLocation {
        lng: base.lng + delta_lng,
        lat: base.lat + delta_lat,
        z: base.z,
    }
}

/// Meters expressed as (lng, lat) degree spans at a latitude.
pub fn meters_to_degree_span(meters: f64, lat_deg: f64) -> (f64, f64) {
    let dlat = (meters / EARTH_RADIUS_METERS) * RAD2DEG;
    let cos_lat = (lat_deg * DEG2RAD).cos().max(MIN_COS_LAT);
    let dlng = (meters / (EARTH_RADIUS_METERS * cos_lat)) * RAD2DEG;
    (dlng, dlat)
}

/// Heading (degrees clockwise from north) and distance to (east, north) meters.
#[inline]
pub fn heading_to_east_north(meters: f64, heading_deg: f64) -> (f64, f64) {
    let rad = heading_deg * DEG2RAD;
    (rad.sin() * meters, rad.cos() * meters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mercator_round_trips() {
        let loc = SpriteLocation::new(139.7671, 35.6812);
        let m = mercator_from_location(&loc);
        assert!((lng_from_mercator_x(m.x) - loc.lng).abs() < 1e-9);
        assert!((lat_from_mercator_y(m.y) - loc.lat).abs() < 1e-9);
    }

    #[test]
    fn origin_maps_to_world_center() {
        let m = mercator_from_location(&SpriteLocation::new(0.0, 0.0));
        assert!((m.x - 0.5).abs() < 1e-12);
        assert!((m.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn displacement_moves_north_by_meters() {
        let base = SpriteLocation::new(10.0, 0.0);
        let moved = apply_surface_displacement(&base, 0.0, 1000.0);
        let expected = 1000.0 / EARTH_RADIUS_METERS * RAD2DEG;
        assert!((moved.lat - expected).abs() < 1e-12);
        assert_eq!(moved.lng, base.lng);
    }

    #[test]
    fn heading_east_is_positive_x() {
        let (e, n) = heading_to_east_north(10.0, 90.0);
        assert!((e - 10.0).abs() < 1e-9);
        assert!(n.abs() < 1e-9);
    }
}
