//! Device lookup predicates

use crate::error::{RegistryError, Result};
use crate::models::{Device, DeviceStatus, DeviceType, Location};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Slack applied to radius comparisons to absorb floating point error
const DISTANCE_EPSILON_KM: f64 = 1e-9;

/// Great-circle distance in kilometres between two coordinates (haversine)
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Circular area around a query point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoRadius {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

impl GeoRadius {
    pub fn new(latitude: f64, longitude: f64, radius_km: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius_km,
        }
    }

    /// Boundary-inclusive containment check
    pub fn contains(&self, location: &Location) -> bool {
        let distance = haversine_km(
            self.latitude,
            self.longitude,
            location.latitude,
            location.longitude,
        );
        distance <= self.radius_km + DISTANCE_EPSILON_KM
    }
}

/// Independent predicates over devices. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub device_type: Option<DeviceType>,
    pub status: Option<DeviceStatus>,
    pub near: Option<GeoRadius>,
}

impl DeviceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = Some(device_type);
        self
    }

    pub fn status(mut self, status: DeviceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn near(mut self, latitude: f64, longitude: f64, radius_km: f64) -> Self {
        self.near = Some(GeoRadius::new(latitude, longitude, radius_km));
        self
    }

    /// Build a filter from loose query parameters.
    ///
    /// A radius filter needs all of `latitude`, `longitude` and `radius_km`;
    /// supplying only some of them is rejected rather than ignored.
    pub fn from_parts(
        device_type: Option<DeviceType>,
        status: Option<DeviceStatus>,
        latitude: Option<f64>,
        longitude: Option<f64>,
        radius_km: Option<f64>,
    ) -> Result<Self> {
        let near = match (latitude, longitude, radius_km) {
            (None, None, None) => None,
            (Some(lat), Some(lon), Some(radius)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    return Err(RegistryError::InvalidFilter(format!(
                        "coordinates out of range: ({}, {})",
                        lat, lon
                    )));
                }
                if !radius.is_finite() || radius < 0.0 {
                    return Err(RegistryError::InvalidFilter(format!(
                        "radius_km must be a non-negative number, got {}",
                        radius
                    )));
                }
                Some(GeoRadius::new(lat, lon, radius))
            }
            _ => {
                return Err(RegistryError::InvalidFilter(
                    "lat, lon and radius_km must be given together".to_string(),
                ))
            }
        };

        Ok(Self {
            device_type,
            status,
            near,
        })
    }

    pub fn matches(&self, device: &Device) -> bool {
        if let Some(device_type) = self.device_type {
            if device.device_type != device_type {
                return false;
            }
        }
        if let Some(status) = self.status {
            if device.status != status {
                return false;
            }
        }
        if let Some(near) = &self.near {
            if !near.contains(&device.location) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Latitude offset (degrees) that moves a point `km` due north
    fn lat_offset(km: f64) -> f64 {
        (km / EARTH_RADIUS_KM).to_degrees()
    }

    #[test]
    fn test_haversine_zero_distance() {
        assert_eq!(haversine_km(48.8566, 2.3522, 48.8566, 2.3522), 0.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Paris to London is roughly 344 km
        let d = haversine_km(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((d - 343.5).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn test_one_kilometre_apart() {
        let origin = (40.0, -3.7);
        let north = Location::new(origin.0 + lat_offset(1.0), origin.1);

        let d = haversine_km(origin.0, origin.1, north.latitude, north.longitude);
        assert!((d - 1.0).abs() < 1e-9);

        assert!(GeoRadius::new(origin.0, origin.1, 1.0).contains(&north));
        assert!(!GeoRadius::new(origin.0, origin.1, 0.99).contains(&north));
    }

    #[test]
    fn test_from_parts_requires_complete_radius() {
        assert!(DeviceFilter::from_parts(None, None, Some(40.0), Some(-3.7), None).is_err());
        assert!(DeviceFilter::from_parts(None, None, None, None, Some(1.0)).is_err());

        let filter =
            DeviceFilter::from_parts(None, None, Some(40.0), Some(-3.7), Some(1.0)).unwrap();
        assert_eq!(filter.near, Some(GeoRadius::new(40.0, -3.7, 1.0)));

        let plain = DeviceFilter::from_parts(
            Some(DeviceType::Camera),
            Some(DeviceStatus::Online),
            None,
            None,
            None,
        )
        .unwrap();
        assert!(plain.near.is_none());
        assert_eq!(plain.device_type, Some(DeviceType::Camera));
    }

    #[test]
    fn test_from_parts_rejects_bad_values() {
        assert!(matches!(
            DeviceFilter::from_parts(None, None, Some(95.0), Some(0.0), Some(1.0)),
            Err(RegistryError::InvalidFilter(_))
        ));
        assert!(DeviceFilter::from_parts(None, None, Some(0.0), Some(0.0), Some(-1.0)).is_err());
    }

    #[test]
    fn test_empty_filter_is_default() {
        let filter = DeviceFilter::new();
        assert!(filter.device_type.is_none());
        assert!(filter.status.is_none());
        assert!(filter.near.is_none());
    }
}
