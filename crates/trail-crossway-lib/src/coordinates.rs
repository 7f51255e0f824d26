//! Coordinate value types and conversions to the `geo` planar representation
//!
//! Coordinates are WGS84 degrees. Whenever they enter planar geometry they are mapped to
//! `geo::Coord` with `x = longitude` and `y = latitude`.

use crate::{CrosswayError, Result};
use geo::Coord;

/// Earth's mean radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Maximum absolute latitude in degrees
pub const MAX_LATITUDE: f64 = 90.0;

/// Maximum absolute longitude in degrees
pub const MAX_LONGITUDE: f64 = 180.0;

/// A WGS84 position without altitude
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinate2D {
    pub latitude: f64,
    pub longitude: f64,
}

/// A WGS84 position enriched with an altitude in meters
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoordinateWithAltitude {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl Coordinate2D {
    #[inline]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check that both components are finite and within WGS84 bounds
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= MAX_LATITUDE
            && self.longitude.abs() <= MAX_LONGITUDE
    }

    /// Return `self` or an `InvalidInput` error naming the offending values
    pub fn validated(self) -> Result<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(CrosswayError::InvalidInput(format!(
                "Malformed coordinate ({}, {})",
                self.latitude, self.longitude
            )))
        }
    }

    /// Attach an altitude to this position
    #[inline]
    pub fn with_altitude(self, altitude: f64) -> CoordinateWithAltitude {
        CoordinateWithAltitude {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude,
        }
    }

    /// Planar `geo` coordinate (x = longitude, y = latitude)
    #[inline(always)]
    pub fn to_coord(self) -> Coord<f64> {
        Coord {
            x: self.longitude,
            y: self.latitude,
        }
    }

    /// Haversine distance to `other` in meters
    pub fn haversine_distance(&self, other: &Coordinate2D) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }
}

impl From<Coord<f64>> for Coordinate2D {
    #[inline(always)]
    fn from(coord: Coord<f64>) -> Self {
        Coordinate2D::new(coord.y, coord.x)
    }
}

impl From<Coordinate2D> for Coord<f64> {
    #[inline(always)]
    fn from(coordinate: Coordinate2D) -> Self {
        coordinate.to_coord()
    }
}

impl From<CoordinateWithAltitude> for Coordinate2D {
    #[inline]
    fn from(coordinate: CoordinateWithAltitude) -> Self {
        Coordinate2D::new(coordinate.latitude, coordinate.longitude)
    }
}

/// Validate every coordinate of a polyline
pub fn validate_all(points: &[Coordinate2D]) -> Result<()> {
    points.iter().try_for_each(|p| p.validated().map(|_| ()))
}

/// Total haversine length of a polyline in meters
pub fn haversine_length(points: &[Coordinate2D]) -> f64 {
    points
        .windows(2)
        .map(|pair| pair[0].haversine_distance(&pair[1]))
        .sum()
}
