use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Campuses served by the shuttle network. Stops and shuttles are always
/// fetched for exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Campus {
    #[default]
    Tesano,
    Abokobi,
    #[serde(rename = "Main Campus")]
    MainCampus,
}

impl Campus {
    pub const ALL: [Campus; 3] = [Campus::Tesano, Campus::Abokobi, Campus::MainCampus];

    /// Name used by the backend in `?campus=` queries and booking bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Campus::Tesano => "Tesano",
            Campus::Abokobi => "Abokobi",
            Campus::MainCampus => "Main Campus",
        }
    }
}

impl fmt::Display for Campus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Campus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "tesano" => Ok(Campus::Tesano),
            "abokobi" => Ok(Campus::Abokobi),
            "main" | "main campus" => Ok(Campus::MainCampus),
            _ => {
                let names = Campus::ALL.map(|c| c.as_str()).join(", ");
                Err(Error::InvalidInput(format!("unknown campus '{}', expected one of {names}", s.trim())))
            }
        }
    }
}

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Anything that can be placed on the map. `None` means no usable position.
pub trait Georeferenced {
    fn geo_point(&self) -> Option<GeoPoint>;
}

impl Georeferenced for GeoPoint {
    fn geo_point(&self) -> Option<GeoPoint> {
        Some(*self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub code: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Georeferenced for Stop {
    fn geo_point(&self) -> Option<GeoPoint> {
        Some(GeoPoint::new(self.latitude, self.longitude))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shuttle {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub identifier: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub battery_level: Option<f64>,
    #[serde(default)]
    pub route_name: Option<String>,
}

impl Georeferenced for Shuttle {
    /// Shuttles without a GPS fix report `None` and are left off the map.
    fn geo_point(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }
}

/// Body of `POST /bookings`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingRequest {
    pub name: String,
    pub email: String,
    pub campus: Campus,
    pub pickup_code: String,
    pub dropoff_code: String,
    /// RFC 3339 timestamp, `None` for "as soon as possible".
    pub scheduled_time: Option<String>,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("name is required".to_string()));
        }
        if !self.email.contains('@') {
            return Err(Error::InvalidInput(format!("'{}' is not an email address", self.email)));
        }
        if self.pickup_code.is_empty() || self.dropoff_code.is_empty() {
            return Err(Error::InvalidInput("pickup and drop-off stops are required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookingConfirmation {
    pub eta_minutes: f64,
}

/// Error body returned by the backend on a rejected request.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub detail: Option<String>,
}
