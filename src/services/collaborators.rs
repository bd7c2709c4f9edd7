//! Narrow interfaces to the services the ride core consults.
//!
//! Every collaborator is optional. Failures are reported as [`ClientError`]
//! and never cross the ride service boundary: the service turns them into
//! the documented fallback.

use crate::models::{Coordinates, EventEnvelope, Ride};
use crate::services::pricing::FareQuote;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("circuit open for {0}")]
    CircuitOpen(&'static str),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Clone, Serialize)]
pub struct PriceRequest {
    pub pickup: Coordinates,
    pub dropoff: Coordinates,
    pub distance_km: f64,
    pub duration_min: i32,
    pub ride_type_id: Option<Uuid>,
    pub currency: String,
}

#[async_trait]
pub trait PricingEngine: Send + Sync {
    async fn calculate(&self, request: &PriceRequest) -> ClientResult<FareQuote>;
}

#[async_trait]
pub trait SurgeCalculator: Send + Sync {
    /// Demand multiplier at a point, at least 1.0.
    async fn multiplier(&self, at: &Coordinates) -> ClientResult<f64>;
}

#[derive(Debug, Clone, Serialize)]
pub struct EtaContext {
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    pub distance_km: f64,
    pub ride_type_id: Option<Uuid>,
}

#[async_trait]
pub trait EtaPredictor: Send + Sync {
    /// Predicted trip duration in minutes.
    async fn predict(
        &self,
        pickup: &Coordinates,
        dropoff: &Coordinates,
        context: &EtaContext,
    ) -> ClientResult<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoOutcome {
    pub valid: bool,
    #[serde(default)]
    pub promo_id: Option<Uuid>,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub final_amount: f64,
}

#[async_trait]
pub trait PromoValidator: Send + Sync {
    async fn validate(&self, code: &str, rider_id: Uuid, amount: f64) -> ClientResult<PromoOutcome>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub pricing_zone: Option<String>,
}

#[async_trait]
pub trait LocationResolver: Send + Sync {
    async fn resolve(&self, at: &Coordinates) -> ClientResult<ResolvedLocation>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, subject: &str, envelope: &EventEnvelope) -> ClientResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderProfile {
    pub name: String,
    pub rating: f64,
}

#[async_trait]
pub trait RiderDirectory: Send + Sync {
    async fn profile(&self, rider_id: Uuid) -> ClientResult<RiderProfile>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn scheduled_ride_reminder(&self, ride: &Ride) -> ClientResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyDriver {
    pub driver_id: Uuid,
    pub distance_km: f64,
}

/// Source of available drivers around a point, nearest first.
#[async_trait]
pub trait DriverLocator: Send + Sync {
    async fn nearby(
        &self,
        at: &Coordinates,
        radius_km: f64,
        limit: usize,
    ) -> ClientResult<Vec<NearbyDriver>>;
}

/// Writes reminders to the log when no notification service is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn scheduled_ride_reminder(&self, ride: &Ride) -> ClientResult<()> {
        tracing::info!(
            ride_id = %ride.id,
            rider_id = %ride.rider_id,
            scheduled_at = ?ride.scheduled_at,
            "Scheduled ride reminder"
        );
        Ok(())
    }
}
