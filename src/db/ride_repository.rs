use crate::error::{AppError, Result};
use crate::models::{Coordinates, DriverMatchStats, GeoStamp, Ride, RideFilters, RideStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Shared row-to-Ride conversion (used by the Pg repository and its queries)
// ---------------------------------------------------------------------------

/// Raw ride fields extracted from a database row, before validation.
#[derive(sqlx::FromRow)]
pub(super) struct RideRow {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: String,
    pub pickup_lat: f64,
    pub pickup_lon: f64,
    pub pickup_address: String,
    pub dropoff_lat: f64,
    pub dropoff_lon: f64,
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
    pub requested_at: OffsetDateTime,
    pub accepted_at: Option<OffsetDateTime>,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub cancelled_at: Option<OffsetDateTime>,
    pub cancellation_reason: Option<String>,
    pub rating: Option<i16>,
    pub feedback: Option<String>,
    pub is_scheduled: bool,
    pub scheduled_at: Option<OffsetDateTime>,
    pub reminder_sent: bool,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub pickup_zone: Option<String>,
    pub dropoff_zone: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl RideRow {
    pub fn into_ride(self) -> Result<Ride> {
        let status: RideStatus = self.status.parse().map_err(|e: String| {
            tracing::error!(ride_id = %self.id, "Corrupt ride row: {}", e);
            AppError::Internal(format!("ride {} has an unreadable status", self.id))
        })?;

        Ok(Ride {
            id: self.id,
            rider_id: self.rider_id,
            driver_id: self.driver_id,
            status,
            pickup: Coordinates {
                lat: self.pickup_lat,
                lon: self.pickup_lon,
            },
            pickup_address: self.pickup_address,
            dropoff: Coordinates {
                lat: self.dropoff_lat,
                lon: self.dropoff_lon,
            },
            dropoff_address: self.dropoff_address,
            estimated_distance_km: self.estimated_distance_km,
            estimated_duration_min: self.estimated_duration_min,
            estimated_fare: self.estimated_fare,
            surge_multiplier: self.surge_multiplier,
            currency: self.currency,
            ride_type_id: self.ride_type_id,
            promo_id: self.promo_id,
            discount_amount: self.discount_amount,
            pricing_version: self.pricing_version,
            actual_distance_km: self.actual_distance_km,
            actual_duration_min: self.actual_duration_min,
            final_fare: self.final_fare,
            requested_at: self.requested_at,
            accepted_at: self.accepted_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            cancelled_at: self.cancelled_at,
            cancellation_reason: self.cancellation_reason,
            rating: self.rating,
            feedback: self.feedback,
            is_scheduled: self.is_scheduled,
            scheduled_at: self.scheduled_at,
            reminder_sent: self.reminder_sent,
            geo: GeoStamp {
                country: self.country,
                region: self.region,
                city: self.city,
                pickup_zone: self.pickup_zone,
                dropoff_zone: self.dropoff_zone,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Persistence contract for ride records.
///
/// The guarded methods (`atomic_*`, `activate_scheduled`, `mark_reminder_sent`)
/// are single conditional writes; their boolean result says whether this call
/// performed the transition. Competing callers rely on exactly one of them
/// seeing `true`.
#[async_trait]
pub trait RideStore: Send + Sync {
    /// Insert a new ride. Returns the stored `(created_at, updated_at)`.
    async fn create(&self, ride: &Ride) -> Result<(OffsetDateTime, OffsetDateTime)>;

    async fn get(&self, ride_id: Uuid) -> Result<Ride>;

    /// REQUESTED -> ACCEPTED with `driver_id` and `accepted_at = now`.
    async fn atomic_accept(&self, ride_id: Uuid, driver_id: Uuid) -> Result<bool>;

    /// Start or cancel, guarded on the current status.
    ///
    /// IN_PROGRESS applies only to an ACCEPTED ride held by `driver_id`;
    /// CANCELLED applies only to a non-terminal ride. Returns `false` when
    /// the ride is missing or the guard fails. ACCEPTED and COMPLETED have
    /// writes of their own and are rejected.
    async fn update_status(
        &self,
        ride_id: Uuid,
        status: RideStatus,
        driver_id: Option<Uuid>,
        reason: Option<&str>,
    ) -> Result<bool>;

    /// IN_PROGRESS -> COMPLETED for the assigned driver, storing the actuals.
    async fn atomic_complete(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
        actual_distance_km: f64,
        actual_duration_min: i32,
        final_fare: f64,
    ) -> Result<bool>;

    async fn update_rating(&self, ride_id: Uuid, rating: i16, feedback: Option<&str>)
        -> Result<()>;

    async fn list_by_rider(
        &self,
        rider_id: Uuid,
        filters: &RideFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Ride>, i64)>;

    async fn list_by_driver(
        &self,
        driver_id: Uuid,
        filters: &RideFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Ride>, i64)>;

    /// Live REQUESTED rides, oldest first.
    async fn list_pending(&self) -> Result<Vec<Ride>>;

    /// Aggregates over the last 30 days; drivers without rides get defaults.
    async fn get_driver_match_stats(
        &self,
        driver_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, DriverMatchStats>>;

    /// Scheduled, still REQUESTED rides with `scheduled_at` in `(now, now + minutes_ahead]`.
    async fn list_upcoming_scheduled(&self, minutes_ahead: i64) -> Result<Vec<Ride>>;

    async fn activate_scheduled(&self, ride_id: Uuid) -> Result<bool>;

    async fn mark_reminder_sent(&self, ride_id: Uuid) -> Result<bool>;
}

pub(super) fn ensure_unguarded_status(status: RideStatus) -> Result<()> {
    match status {
        RideStatus::InProgress | RideStatus::Cancelled => Ok(()),
        other => Err(AppError::Internal(format!(
            "update_status cannot perform a transition to {}",
            other
        ))),
    }
}

pub struct PgRideStore {
    pool: sqlx::PgPool,
}

impl PgRideStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait]
impl RideStore for PgRideStore {
    async fn create(&self, ride: &Ride) -> Result<(OffsetDateTime, OffsetDateTime)> {
        Ok(super::ride_queries::insert_ride(&self.pool, ride).await?)
    }

    async fn get(&self, ride_id: Uuid) -> Result<Ride> {
        super::ride_queries::find_ride(&self.pool, ride_id)
            .await?
            .ok_or_else(|| AppError::ride_not_found(ride_id))?
            .into_ride()
    }

    async fn atomic_accept(&self, ride_id: Uuid, driver_id: Uuid) -> Result<bool> {
        Ok(super::ride_queries::accept_ride(&self.pool, ride_id, driver_id).await?)
    }

    async fn update_status(
        &self,
        ride_id: Uuid,
        status: RideStatus,
        driver_id: Option<Uuid>,
        reason: Option<&str>,
    ) -> Result<bool> {
        ensure_unguarded_status(status)?;
        Ok(super::ride_queries::set_status(&self.pool, ride_id, status, driver_id, reason).await?)
    }

    async fn atomic_complete(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
        actual_distance_km: f64,
        actual_duration_min: i32,
        final_fare: f64,
    ) -> Result<bool> {
        Ok(super::ride_queries::complete_ride(
            &self.pool,
            ride_id,
            driver_id,
            actual_distance_km,
            actual_duration_min,
            final_fare,
        )
        .await?)
    }

    async fn update_rating(
        &self,
        ride_id: Uuid,
        rating: i16,
        feedback: Option<&str>,
    ) -> Result<()> {
        let updated = super::ride_queries::set_rating(&self.pool, ride_id, rating, feedback).await?;
        if !updated {
            return Err(AppError::ride_not_found(ride_id));
        }
        Ok(())
    }

    async fn list_by_rider(
        &self,
        rider_id: Uuid,
        filters: &RideFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Ride>, i64)> {
        let (rows, total) = super::ride_queries::list_rides(
            &self.pool,
            super::ride_queries::Participant::Rider(rider_id),
            filters,
            limit,
            offset,
        )
        .await?;
        Ok((into_rides(rows)?, total))
    }

    async fn list_by_driver(
        &self,
        driver_id: Uuid,
        filters: &RideFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Ride>, i64)> {
        let (rows, total) = super::ride_queries::list_rides(
            &self.pool,
            super::ride_queries::Participant::Driver(driver_id),
            filters,
            limit,
            offset,
        )
        .await?;
        Ok((into_rides(rows)?, total))
    }

    async fn list_pending(&self) -> Result<Vec<Ride>> {
        into_rides(super::ride_queries::list_pending(&self.pool).await?)
    }

    async fn get_driver_match_stats(
        &self,
        driver_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, DriverMatchStats>> {
        if driver_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let found = super::ride_queries::driver_match_stats(&self.pool, driver_ids).await?;
        Ok(with_defaults(driver_ids, found))
    }

    async fn list_upcoming_scheduled(&self, minutes_ahead: i64) -> Result<Vec<Ride>> {
        into_rides(super::ride_queries::list_upcoming_scheduled(&self.pool, minutes_ahead).await?)
    }

    async fn activate_scheduled(&self, ride_id: Uuid) -> Result<bool> {
        Ok(super::ride_queries::activate_scheduled(&self.pool, ride_id).await?)
    }

    async fn mark_reminder_sent(&self, ride_id: Uuid) -> Result<bool> {
        Ok(super::ride_queries::mark_reminder_sent(&self.pool, ride_id).await?)
    }
}

fn into_rides(rows: Vec<RideRow>) -> Result<Vec<Ride>> {
    rows.into_iter().map(RideRow::into_ride).collect()
}

/// Fill in defaults for drivers with no history in the stats window.
pub(super) fn with_defaults(
    driver_ids: &[Uuid],
    mut found: HashMap<Uuid, DriverMatchStats>,
) -> HashMap<Uuid, DriverMatchStats> {
    for id in driver_ids {
        found.entry(*id).or_default();
    }
    found
}
