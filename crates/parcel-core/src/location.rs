// ABOUTME: Typed location payload written by the location producer and read back at delivery time.
// ABOUTME: Decoding is schema-validated and range-checked; failures surface as LocationError.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while decoding a location payload.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("malformed location payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("coordinates out of range: latitude {latitude}, longitude {longitude}")]
    OutOfRange { latitude: f64, longitude: f64 },
}

/// A single location fix as persisted by the location producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub fired_at: DateTime<Utc>,
}

impl LocationPayload {
    pub fn new(latitude: f64, longitude: f64, fired_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            fired_at,
        }
    }

    /// Decode and validate a payload from its JSON text.
    pub fn decode(json: &str) -> Result<Self, LocationError> {
        let payload: LocationPayload = serde_json::from_str(json)?;
        payload.validate()?;
        Ok(payload)
    }

    /// Serialize to the JSON form producers write to disk.
    pub fn encode(&self) -> Result<String, LocationError> {
        Ok(serde_json::to_string(self)?)
    }

    fn validate(&self) -> Result<(), LocationError> {
        let lat_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
        let lon_ok = self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);
        if lat_ok && lon_ok {
            Ok(())
        } else {
            Err(LocationError::OutOfRange {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    /// A map link the operator can tap to see the fix.
    pub fn map_link(&self) -> String {
        format!(
            "https://maps.google.com/?q={:.6},{:.6}",
            self.latitude, self.longitude
        )
    }
}
