use crate::models::Coordinates;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Requested,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Requested => "REQUESTED",
            RideStatus::Accepted => "ACCEPTED",
            RideStatus::InProgress => "IN_PROGRESS",
            RideStatus::Completed => "COMPLETED",
            RideStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RideStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "REQUESTED" => Ok(RideStatus::Requested),
            "ACCEPTED" => Ok(RideStatus::Accepted),
            "IN_PROGRESS" => Ok(RideStatus::InProgress),
            "COMPLETED" => Ok(RideStatus::Completed),
            "CANCELLED" => Ok(RideStatus::Cancelled),
            _ => Err(format!("Invalid ride status: {}", s)),
        }
    }
}

/// Geographic stamps resolved at request time. Every field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeoStamp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff_zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: RideStatus,

    pub pickup: Coordinates,
    pub pickup_address: String,
    pub dropoff: Coordinates,
    pub dropoff_address: String,

    pub estimated_distance_km: f64,
    pub estimated_duration_min: i32,
    pub estimated_fare: f64,
    pub surge_multiplier: f64,
    pub currency: String,
    pub ride_type_id: Option<Uuid>,
    pub promo_id: Option<Uuid>,
    pub discount_amount: f64,
    pub pricing_version: Option<String>,

    pub actual_distance_km: Option<f64>,
    pub actual_duration_min: Option<i32>,
    pub final_fare: Option<f64>,

    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub accepted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    pub cancellation_reason: Option<String>,

    pub rating: Option<i16>,
    pub feedback: Option<String>,

    pub is_scheduled: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
    pub reminder_sent: bool,

    #[serde(flatten)]
    pub geo: GeoStamp,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Ride {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.rider_id == user_id || self.driver_id == Some(user_id)
    }
}

/// Trip request body as submitted by a rider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideRequest {
    pub pickup: Coordinates,
    pub dropoff: Coordinates,
    pub pickup_address: String,
    pub dropoff_address: String,
    #[serde(default)]
    pub ride_type_id: Option<Uuid>,
    #[serde(default)]
    pub promo_code: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
}

impl RideRequest {
    pub fn validate(&self) -> Result<(), String> {
        Coordinates::new(self.pickup.lat, self.pickup.lon).map_err(|e| format!("pickup: {}", e))?;
        Coordinates::new(self.dropoff.lat, self.dropoff.lon)
            .map_err(|e| format!("dropoff: {}", e))?;

        if self.pickup_address.trim().is_empty() {
            return Err("pickup_address is required".to_string());
        }
        if self.dropoff_address.trim().is_empty() {
            return Err("dropoff_address is required".to_string());
        }
        if let Some(code) = &self.promo_code {
            if code.len() > 64 {
                return Err("promo_code is too long".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRideRequest {
    pub actual_distance_km: f64,
}

impl CompleteRideRequest {
    pub fn validate(&self) -> Result<(), String> {
        if !self.actual_distance_km.is_finite() || self.actual_distance_km < 0.0 {
            return Err("actual_distance_km must be a non-negative number".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelRideRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateRideRequest {
    pub rating: i16,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl RateRideRequest {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=5).contains(&self.rating) {
            return Err("rating must be between 1 and 5".to_string());
        }
        Ok(())
    }
}

/// Filters for ride history queries.
#[derive(Debug, Clone, Default)]
pub struct RideFilters {
    pub status: Option<RideStatus>,
    pub start_date: Option<OffsetDateTime>,
    pub end_date: Option<OffsetDateTime>,
}

impl RideFilters {
    pub fn matches(&self, ride: &Ride) -> bool {
        if let Some(status) = self.status {
            if ride.status != status {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if ride.requested_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if ride.requested_at > end {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RidePage {
    pub rides: Vec<Ride>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            RideStatus::Requested,
            RideStatus::Accepted,
            RideStatus::InProgress,
            RideStatus::Completed,
            RideStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<RideStatus>().unwrap(), status);
        }
        assert!("finished".parse::<RideStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RideStatus::Completed.is_terminal());
        assert!(RideStatus::Cancelled.is_terminal());
        assert!(!RideStatus::Requested.is_terminal());
        assert!(!RideStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_ride_request_validation() {
        let request: RideRequest = serde_json::from_value(json!({
            "pickup": {"lat": 40.7128, "lon": -74.0060},
            "dropoff": {"lat": 40.7580, "lon": -73.9855},
            "pickup_address": "123 Main",
            "dropoff_address": "456 Broadway"
        }))
        .unwrap();
        assert!(request.validate().is_ok());
        assert!(request.scheduled_at.is_none());

        let mut bad = request.clone();
        bad.pickup.lat = 120.0;
        assert!(bad.validate().is_err());

        let mut bad = request;
        bad.dropoff_address = "  ".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_rate_request_bounds() {
        assert!(RateRideRequest { rating: 0, feedback: None }.validate().is_err());
        assert!(RateRideRequest { rating: 6, feedback: None }.validate().is_err());
        assert!(RateRideRequest { rating: 5, feedback: None }.validate().is_ok());
    }
}
