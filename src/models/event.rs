use crate::models::{Coordinates, Ride};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const SUBJECT_RIDE_REQUESTED: &str = "ride.requested";
pub const SUBJECT_RIDE_ACCEPTED: &str = "ride.accepted";
pub const SUBJECT_RIDE_STARTED: &str = "ride.started";
pub const SUBJECT_RIDE_COMPLETED: &str = "ride.completed";
pub const SUBJECT_RIDE_CANCELLED: &str = "ride.cancelled";

/// Source identifier stamped on every envelope.
pub const EVENT_SOURCE: &str = "rideflow";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventLocation {
    pub lat: f64,
    pub lon: f64,
    pub address: String,
}

impl EventLocation {
    fn new(point: Coordinates, address: &str) -> Self {
        EventLocation {
            lat: point.lat,
            lon: point.lon,
            address: address.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RideRequestedData {
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub rider_name: String,
    pub rider_rating: f64,
    pub pickup: EventLocation,
    pub dropoff: EventLocation,
    pub ride_type_id: Option<Uuid>,
    pub ride_type_name: Option<String>,
    pub estimated_fare: f64,
    pub estimated_distance: f64,
    pub estimated_duration: i32,
    pub currency: String,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RideAcceptedData {
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Uuid,
    pub pickup: EventLocation,
    pub dropoff: EventLocation,
    #[serde(with = "time::serde::rfc3339")]
    pub accepted_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RideStartedData {
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RideCompletedData {
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Uuid,
    pub fare_amount: f64,
    pub driver_earnings: f64,
    pub currency: String,
    pub distance_km: f64,
    pub duration_min: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CancelledBy {
    Rider,
    Driver,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RideCancelledData {
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub cancelled_by: CancelledBy,
    pub reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub cancelled_at: OffsetDateTime,
}

/// Lifecycle events published on the event bus, one variant per subject.
#[derive(Debug, Clone, PartialEq)]
pub enum RideEvent {
    Requested(RideRequestedData),
    Accepted(RideAcceptedData),
    Started(RideStartedData),
    Completed(RideCompletedData),
    Cancelled(RideCancelledData),
}

impl RideEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            RideEvent::Requested(_) => SUBJECT_RIDE_REQUESTED,
            RideEvent::Accepted(_) => SUBJECT_RIDE_ACCEPTED,
            RideEvent::Started(_) => SUBJECT_RIDE_STARTED,
            RideEvent::Completed(_) => SUBJECT_RIDE_COMPLETED,
            RideEvent::Cancelled(_) => SUBJECT_RIDE_CANCELLED,
        }
    }

    pub fn ride_id(&self) -> Uuid {
        match self {
            RideEvent::Requested(d) => d.ride_id,
            RideEvent::Accepted(d) => d.ride_id,
            RideEvent::Started(d) => d.ride_id,
            RideEvent::Completed(d) => d.ride_id,
            RideEvent::Cancelled(d) => d.ride_id,
        }
    }

    pub fn requested(
        ride: &Ride,
        rider_name: String,
        rider_rating: f64,
        ride_type_name: Option<String>,
    ) -> Self {
        RideEvent::Requested(RideRequestedData {
            ride_id: ride.id,
            rider_id: ride.rider_id,
            rider_name,
            rider_rating,
            pickup: EventLocation::new(ride.pickup, &ride.pickup_address),
            dropoff: EventLocation::new(ride.dropoff, &ride.dropoff_address),
            ride_type_id: ride.ride_type_id,
            ride_type_name,
            estimated_fare: ride.estimated_fare,
            estimated_distance: ride.estimated_distance_km,
            estimated_duration: ride.estimated_duration_min,
            currency: ride.currency.clone(),
            requested_at: ride.requested_at,
        })
    }

    pub fn accepted(ride: &Ride, driver_id: Uuid, accepted_at: OffsetDateTime) -> Self {
        RideEvent::Accepted(RideAcceptedData {
            ride_id: ride.id,
            rider_id: ride.rider_id,
            driver_id,
            pickup: EventLocation::new(ride.pickup, &ride.pickup_address),
            dropoff: EventLocation::new(ride.dropoff, &ride.dropoff_address),
            accepted_at,
        })
    }

    pub fn data(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            RideEvent::Requested(d) => serde_json::to_value(d),
            RideEvent::Accepted(d) => serde_json::to_value(d),
            RideEvent::Started(d) => serde_json::to_value(d),
            RideEvent::Completed(d) => serde_json::to_value(d),
            RideEvent::Cancelled(d) => serde_json::to_value(d),
        }
    }
}

/// Wire envelope wrapping every published event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    pub fn wrap(event: &RideEvent, timestamp: OffsetDateTime) -> serde_json::Result<Self> {
        Ok(EventEnvelope {
            event_id: Uuid::new_v4(),
            event_type: event.subject().to_string(),
            source: EVENT_SOURCE.to_string(),
            timestamp,
            data: event.data()?,
        })
    }
}
