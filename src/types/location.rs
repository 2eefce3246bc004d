//! Defines the geographical location used to key every per-location result
//! returned by the BioSIM service.

use ordered_float::OrderedFloat;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A point on the globe for which climate is requested.
///
/// Two locations with the same latitude, longitude and elevation are the same
/// location: equality and hashing go through [`OrderedFloat`], so a `NaN`
/// elevation (unknown, left to the server to impute) compares equal to itself.
///
/// # Examples
///
/// ```
/// use biosim::GeoLocation;
///
/// let quebec = GeoLocation::new(46.87, -71.25, 114.0);
/// assert_eq!(quebec, GeoLocation::new(46.87, -71.25, 114.0));
/// assert_eq!(quebec.to_string(), "46.87_-71.25_114");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct GeoLocation {
    /// Latitude in decimal degrees (positive for North).
    pub latitude: f64,
    /// Longitude in decimal degrees (negative for West).
    pub longitude: f64,
    /// Elevation above sea level in meters, `NaN` if unknown.
    pub elevation: f64,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
        }
    }

    /// Creates a location whose elevation is left for the server to impute.
    pub fn without_elevation(latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude, f64::NAN)
    }

    fn key(&self) -> [OrderedFloat<f64>; 3] {
        [
            OrderedFloat(self.latitude),
            OrderedFloat(self.longitude),
            OrderedFloat(self.elevation),
        ]
    }
}

impl PartialEq for GeoLocation {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for GeoLocation {}

impl Hash for GeoLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.latitude, self.longitude, self.elevation)
    }
}
