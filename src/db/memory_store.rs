use crate::clock::Clock;
use crate::constants::DRIVER_STATS_WINDOW_DAYS;
use crate::error::{AppError, Result};
use crate::models::{DriverMatchStats, Ride, RideFilters, RideStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ride_repository::{ensure_unguarded_status, with_defaults, RideStore};

#[derive(Default)]
struct Rides {
    /// Insertion order, which doubles as the `created_at` tie-break.
    records: Vec<Ride>,
    index: HashMap<Uuid, usize>,
}

impl Rides {
    fn get_mut(&mut self, ride_id: Uuid) -> Option<&mut Ride> {
        let slot = *self.index.get(&ride_id)?;
        self.records.get_mut(slot)
    }
}

/// Process-local ride store. Every guarded write checks its precondition and
/// mutates under one write lock, so competing callers see the same
/// exactly-one-wins behavior as the Postgres conditional updates.
pub struct InMemoryRideStore {
    rides: RwLock<Rides>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRideStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rides: RwLock::new(Rides::default()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.rides.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn list_for<F>(
        &self,
        belongs: F,
        filters: &RideFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Ride>, i64)>
    where
        F: Fn(&Ride) -> bool + Send,
    {
        let rides = self.rides.read().await;
        let mut matching: Vec<&Ride> = rides
            .records
            .iter()
            .filter(|r| belongs(r) && filters.matches(r))
            .collect();
        matching.sort_by(|a, b| {
            b.requested_at
                .cmp(&a.requested_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl RideStore for InMemoryRideStore {
    async fn create(&self, ride: &Ride) -> Result<(OffsetDateTime, OffsetDateTime)> {
        let mut rides = self.rides.write().await;
        if rides.index.contains_key(&ride.id) {
            return Err(AppError::Internal(format!("ride {} already exists", ride.id)));
        }

        let now = self.clock.now();
        let mut stored = ride.clone();
        stored.status = RideStatus::Requested;
        stored.created_at = now;
        stored.updated_at = now;

        let slot = rides.records.len();
        rides.index.insert(stored.id, slot);
        rides.records.push(stored);
        Ok((now, now))
    }

    async fn get(&self, ride_id: Uuid) -> Result<Ride> {
        let rides = self.rides.read().await;
        rides
            .index
            .get(&ride_id)
            .and_then(|slot| rides.records.get(*slot))
            .cloned()
            .ok_or_else(|| AppError::ride_not_found(ride_id))
    }

    async fn atomic_accept(&self, ride_id: Uuid, driver_id: Uuid) -> Result<bool> {
        let now = self.clock.now();
        let mut rides = self.rides.write().await;
        match rides.get_mut(ride_id) {
            Some(ride) if ride.status == RideStatus::Requested => {
                ride.status = RideStatus::Accepted;
                ride.driver_id = Some(driver_id);
                ride.accepted_at = Some(now);
                ride.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_status(
        &self,
        ride_id: Uuid,
        status: RideStatus,
        driver_id: Option<Uuid>,
        reason: Option<&str>,
    ) -> Result<bool> {
        ensure_unguarded_status(status)?;

        let now = self.clock.now();
        let mut rides = self.rides.write().await;
        let Some(ride) = rides.get_mut(ride_id) else {
            return Ok(false);
        };

        match status {
            RideStatus::InProgress => {
                let held = driver_id.is_some() && ride.driver_id == driver_id;
                if ride.status != RideStatus::Accepted || !held {
                    return Ok(false);
                }
                ride.started_at = Some(now);
            }
            _ => {
                if ride.status.is_terminal() {
                    return Ok(false);
                }
                if ride.driver_id.is_none() {
                    ride.driver_id = driver_id;
                }
                ride.cancelled_at = Some(now);
                ride.cancellation_reason = reason.map(str::to_string);
            }
        }
        ride.status = status;
        ride.updated_at = now;
        Ok(true)
    }

    async fn atomic_complete(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
        actual_distance_km: f64,
        actual_duration_min: i32,
        final_fare: f64,
    ) -> Result<bool> {
        let now = self.clock.now();
        let mut rides = self.rides.write().await;
        match rides.get_mut(ride_id) {
            Some(ride)
                if ride.status == RideStatus::InProgress && ride.driver_id == Some(driver_id) =>
            {
                ride.status = RideStatus::Completed;
                ride.actual_distance_km = Some(actual_distance_km);
                ride.actual_duration_min = Some(actual_duration_min);
                ride.final_fare = Some(final_fare);
                ride.completed_at = Some(now);
                ride.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_rating(
        &self,
        ride_id: Uuid,
        rating: i16,
        feedback: Option<&str>,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut rides = self.rides.write().await;
        let ride = rides
            .get_mut(ride_id)
            .ok_or_else(|| AppError::ride_not_found(ride_id))?;
        ride.rating = Some(rating);
        ride.feedback = feedback.map(str::to_string);
        ride.updated_at = now;
        Ok(())
    }

    async fn list_by_rider(
        &self,
        rider_id: Uuid,
        filters: &RideFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Ride>, i64)> {
        self.list_for(|r| r.rider_id == rider_id, filters, limit, offset)
            .await
    }

    async fn list_by_driver(
        &self,
        driver_id: Uuid,
        filters: &RideFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Ride>, i64)> {
        self.list_for(|r| r.driver_id == Some(driver_id), filters, limit, offset)
            .await
    }

    async fn list_pending(&self) -> Result<Vec<Ride>> {
        let rides = self.rides.read().await;
        let mut pending: Vec<Ride> = rides
            .records
            .iter()
            .filter(|r| r.status == RideStatus::Requested && !r.is_scheduled)
            .cloned()
            .collect();
        // Stable: equal requested_at keeps insertion order.
        pending.sort_by_key(|r| r.requested_at);
        Ok(pending)
    }

    async fn get_driver_match_stats(
        &self,
        driver_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, DriverMatchStats>> {
        let now = self.clock.now();
        let window_start = now - Duration::days(DRIVER_STATS_WINDOW_DAYS);
        let defaults = DriverMatchStats::default();
        let rides = self.rides.read().await;

        let mut found = HashMap::new();
        for driver_id in driver_ids {
            let recent: Vec<&Ride> = rides
                .records
                .iter()
                .filter(|r| r.driver_id == Some(*driver_id) && r.requested_at >= window_start)
                .collect();
            if recent.is_empty() {
                continue;
            }

            let ratings: Vec<f64> = recent.iter().filter_map(|r| r.rating).map(f64::from).collect();
            let rating = if ratings.is_empty() {
                defaults.rating
            } else {
                ratings.iter().sum::<f64>() / ratings.len() as f64
            };

            let completed = recent
                .iter()
                .filter(|r| r.status == RideStatus::Completed)
                .count();
            let acceptance_rate = completed as f64 / recent.len() as f64;

            let idle_minutes = recent
                .iter()
                .filter_map(|r| r.completed_at)
                .max()
                .map(|last| ((now - last).as_seconds_f64() / 60.0).max(0.0))
                .unwrap_or(defaults.idle_minutes);

            found.insert(
                *driver_id,
                DriverMatchStats {
                    rating,
                    acceptance_rate,
                    idle_minutes,
                },
            );
        }

        Ok(with_defaults(driver_ids, found))
    }

    async fn list_upcoming_scheduled(&self, minutes_ahead: i64) -> Result<Vec<Ride>> {
        let now = self.clock.now();
        let horizon = now + Duration::minutes(minutes_ahead);
        let rides = self.rides.read().await;
        let mut upcoming: Vec<Ride> = rides
            .records
            .iter()
            .filter(|r| r.is_scheduled && r.status == RideStatus::Requested)
            .filter(|r| matches!(r.scheduled_at, Some(at) if at > now && at <= horizon))
            .cloned()
            .collect();
        upcoming.sort_by_key(|r| r.scheduled_at);
        Ok(upcoming)
    }

    async fn activate_scheduled(&self, ride_id: Uuid) -> Result<bool> {
        let now = self.clock.now();
        let mut rides = self.rides.write().await;
        match rides.get_mut(ride_id) {
            Some(ride) if ride.is_scheduled && ride.status == RideStatus::Requested => {
                ride.is_scheduled = false;
                ride.requested_at = now;
                ride.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_reminder_sent(&self, ride_id: Uuid) -> Result<bool> {
        let now = self.clock.now();
        let mut rides = self.rides.write().await;
        match rides.get_mut(ride_id) {
            Some(ride) if !ride.reminder_sent => {
                ride.reminder_sent = true;
                ride.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
#[path = "memory_store_tests.rs"]
mod tests;
