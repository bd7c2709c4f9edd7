use crate::clock::Clock;
use crate::config::PricingConfig;
use crate::constants::{DEFAULT_CURRENCY, DEFAULT_PER_PAGE, LOCATION_RESOLVE_TIMEOUT_MS, MAX_PER_PAGE};
use crate::db::RideStore;
use crate::error::{AppError, Result};
use crate::models::event::{
    CancelledBy, RideCancelledData, RideCompletedData, RideStartedData,
};
use crate::models::ride::{CompleteRideRequest, RateRideRequest};
use crate::models::{
    CallerIdentity, Coordinates, GeoStamp, Ride, RideEvent, RideFilters, RidePage, RideRequest,
    RideStatus, Role,
};
use crate::services::collaborators::*;
use crate::services::events::RideEvents;
use crate::services::geo;
use crate::services::pricing::{self, FareQuote};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Optional collaborators. `None` selects the documented fallback.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub pricing: Option<Arc<dyn PricingEngine>>,
    pub surge: Option<Arc<dyn SurgeCalculator>>,
    pub eta: Option<Arc<dyn EtaPredictor>>,
    pub promo: Option<Arc<dyn PromoValidator>>,
    pub location: Option<Arc<dyn LocationResolver>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurgeSource {
    SurgeService,
    TimeOfDay,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurgeInfo {
    pub lat: f64,
    pub lon: f64,
    pub multiplier: f64,
    pub source: SurgeSource,
}

/// A completed ride together with the driver's share of the fare.
#[derive(Debug, Clone, Serialize)]
pub struct RideCompletion {
    #[serde(flatten)]
    pub ride: Ride,
    pub driver_earnings: f64,
}

/// Drives rides through REQUESTED -> ACCEPTED -> IN_PROGRESS -> COMPLETED,
/// with CANCELLED reachable from any non-terminal state.
///
/// The store is the system of record; the two race-sensitive transitions
/// (accept, complete) rely entirely on its guarded writes.
pub struct RideService {
    store: Arc<dyn RideStore>,
    collaborators: Collaborators,
    events: RideEvents,
    pricing: PricingConfig,
    clock: Arc<dyn Clock>,
}

impl RideService {
    pub fn new(
        store: Arc<dyn RideStore>,
        collaborators: Collaborators,
        events: RideEvents,
        pricing: PricingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        RideService {
            store,
            collaborators,
            events,
            pricing,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn RideStore> {
        &self.store
    }

    pub fn events(&self) -> &RideEvents {
        &self.events
    }

    pub async fn request_ride(&self, caller: &CallerIdentity, request: RideRequest) -> Result<Ride> {
        caller.require(Role::Rider)?;
        request.validate().map_err(AppError::Validation)?;

        let now = self.clock.now();
        if let Some(at) = request.scheduled_at {
            if at <= now {
                return Err(AppError::Validation(
                    "scheduled_at must be in the future".to_string(),
                ));
            }
        }

        let distance_km = geo::distance(&request.pickup, &request.dropoff);
        let duration_min = self
            .estimate_duration(&request.pickup, &request.dropoff, distance_km, &request)
            .await;
        let geo_stamp = self.resolve_geo(&request.pickup, &request.dropoff).await;

        let quote = self
            .quote(
                &request.pickup,
                &request.dropoff,
                distance_km,
                duration_min,
                request.ride_type_id,
                None,
            )
            .await;

        let (estimated_fare, promo_id, discount_amount) = match request.promo_code.as_deref() {
            Some(code) if !code.trim().is_empty() => {
                self.apply_promo(code.trim(), caller.user_id, quote.total_fare)
                    .await
            }
            _ => (quote.total_fare, None, 0.0),
        };

        let ride = Ride {
            id: Uuid::new_v4(),
            rider_id: caller.user_id,
            driver_id: None,
            status: RideStatus::Requested,
            pickup: request.pickup,
            pickup_address: request.pickup_address.trim().to_string(),
            dropoff: request.dropoff,
            dropoff_address: request.dropoff_address.trim().to_string(),
            estimated_distance_km: distance_km,
            estimated_duration_min: duration_min,
            estimated_fare,
            surge_multiplier: quote.multiplier,
            currency: quote.currency.clone(),
            ride_type_id: request.ride_type_id,
            promo_id,
            discount_amount,
            pricing_version: quote.pricing_version.clone(),
            actual_distance_km: None,
            actual_duration_min: None,
            final_fare: None,
            requested_at: now,
            accepted_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            rating: None,
            feedback: None,
            is_scheduled: request.scheduled_at.is_some(),
            scheduled_at: request.scheduled_at,
            reminder_sent: false,
            geo: geo_stamp,
            created_at: now,
            updated_at: now,
        };

        let (created_at, updated_at) = self.store.create(&ride).await?;
        let ride = Ride {
            created_at,
            updated_at,
            ..ride
        };

        tracing::info!(
            ride_id = %ride.id,
            rider_id = %ride.rider_id,
            distance_km = ride.estimated_distance_km,
            fare = ride.estimated_fare,
            surge = ride.surge_multiplier,
            scheduled = ride.is_scheduled,
            "Ride requested: {:.2}km, {} {:.2}",
            ride.estimated_distance_km, ride.currency, ride.estimated_fare
        );

        // Scheduled rides are announced by the scheduler when they go live.
        if !ride.is_scheduled {
            self.events
                .emit_requested(ride.clone(), quote.ride_type_name.clone());
        }
        Ok(ride)
    }

    pub async fn accept_ride(&self, caller: &CallerIdentity, ride_id: Uuid) -> Result<Ride> {
        caller.require(Role::Driver)?;
        let driver_id = caller.user_id;

        if !self.store.atomic_accept(ride_id, driver_id).await? {
            // Distinguish a missing ride from a lost race.
            self.store.get(ride_id).await?;
            tracing::info!(ride_id = %ride_id, driver_id = %driver_id, "Accept lost: ride not available");
            return Err(AppError::Conflict("ride not available".to_string()));
        }

        let ride = self.store.get(ride_id).await?;
        tracing::info!(ride_id = %ride_id, driver_id = %driver_id, "Ride accepted");
        let accepted_at = ride.accepted_at.unwrap_or_else(|| self.clock.now());
        self.events
            .emit(RideEvent::accepted(&ride, driver_id, accepted_at));
        Ok(ride)
    }

    pub async fn start_ride(&self, caller: &CallerIdentity, ride_id: Uuid) -> Result<Ride> {
        caller.require(Role::Driver)?;
        let driver_id = caller.user_id;
        let ride = self.store.get(ride_id).await?;

        if ride.status != RideStatus::Accepted {
            return Err(AppError::Validation(format!(
                "ride cannot be started from status {}",
                ride.status
            )));
        }
        if ride.driver_id != Some(driver_id) {
            return Err(AppError::Validation("unauthorized driver".to_string()));
        }

        let started = self
            .store
            .update_status(ride_id, RideStatus::InProgress, Some(driver_id), None)
            .await?;
        let ride = self.store.get(ride_id).await?;
        if !started {
            tracing::info!(ride_id = %ride_id, driver_id = %driver_id, status = %ride.status, "Start lost");
            return Err(AppError::Conflict(format!(
                "ride cannot be started from status {}",
                ride.status
            )));
        }

        tracing::info!(ride_id = %ride_id, driver_id = %driver_id, "Ride started");
        self.events.emit(RideEvent::Started(RideStartedData {
            ride_id,
            rider_id: ride.rider_id,
            driver_id,
            started_at: ride.started_at.unwrap_or_else(|| self.clock.now()),
        }));
        Ok(ride)
    }

    pub async fn complete_ride(
        &self,
        caller: &CallerIdentity,
        ride_id: Uuid,
        request: CompleteRideRequest,
    ) -> Result<RideCompletion> {
        caller.require(Role::Driver)?;
        request.validate().map_err(AppError::Validation)?;
        let driver_id = caller.user_id;
        let ride = self.store.get(ride_id).await?;

        match ride.status {
            RideStatus::InProgress => {}
            RideStatus::Completed => {
                return Err(AppError::Conflict("ride already completed".to_string()))
            }
            other => {
                return Err(AppError::Validation(format!(
                    "ride cannot be completed from status {}",
                    other
                )))
            }
        }
        if ride.driver_id != Some(driver_id) {
            return Err(AppError::Validation("unauthorized driver".to_string()));
        }

        let now = self.clock.now();
        let actual_duration_min = ride
            .started_at
            .map(|started| ((now - started).as_seconds_f64() / 60.0).round().max(0.0) as i32)
            .unwrap_or(0);

        let quote = self
            .quote(
                &ride.pickup,
                &ride.dropoff,
                request.actual_distance_km,
                actual_duration_min,
                ride.ride_type_id,
                Some(ride.surge_multiplier),
            )
            .await;
        let final_fare = pricing::apply_discount(&self.pricing, quote.total_fare, ride.discount_amount);
        let driver_earnings = quote.driver_earnings;

        let completed = self
            .store
            .atomic_complete(
                ride_id,
                driver_id,
                request.actual_distance_km,
                actual_duration_min,
                final_fare,
            )
            .await?;
        if !completed {
            return Err(AppError::Conflict("ride already completed".to_string()));
        }

        let ride = self.store.get(ride_id).await?;
        tracing::info!(
            ride_id = %ride_id,
            driver_id = %driver_id,
            fare = final_fare,
            driver_earnings,
            duration_min = actual_duration_min,
            "Ride completed"
        );

        let currency = if ride.currency.is_empty() {
            DEFAULT_CURRENCY.to_string()
        } else {
            ride.currency.clone()
        };
        self.events.emit(RideEvent::Completed(RideCompletedData {
            ride_id,
            rider_id: ride.rider_id,
            driver_id,
            fare_amount: final_fare,
            driver_earnings,
            currency,
            distance_km: request.actual_distance_km,
            duration_min: actual_duration_min,
            completed_at: ride.completed_at.unwrap_or(now),
        }));

        Ok(RideCompletion {
            ride,
            driver_earnings,
        })
    }

    pub async fn cancel_ride(
        &self,
        caller: &CallerIdentity,
        ride_id: Uuid,
        reason: Option<String>,
    ) -> Result<Ride> {
        let ride = self.store.get(ride_id).await?;

        let cancelled_by = if caller.user_id == ride.rider_id {
            CancelledBy::Rider
        } else if ride.driver_id == Some(caller.user_id) {
            CancelledBy::Driver
        } else {
            return Err(AppError::Validation(
                "not authorized to cancel this ride".to_string(),
            ));
        };
        if ride.status.is_terminal() {
            return Err(AppError::Validation(format!(
                "ride is already {}",
                ride.status
            )));
        }

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let cancelled = self
            .store
            .update_status(ride_id, RideStatus::Cancelled, None, reason.as_deref())
            .await?;
        let ride = self.store.get(ride_id).await?;
        if !cancelled {
            tracing::info!(ride_id = %ride_id, status = %ride.status, "Cancel lost");
            return Err(AppError::Conflict(format!("ride is already {}", ride.status)));
        }

        tracing::info!(
            ride_id = %ride_id,
            user_id = %caller.user_id,
            cancelled_by = ?cancelled_by,
            "Ride cancelled"
        );
        self.events.emit(RideEvent::Cancelled(RideCancelledData {
            ride_id,
            rider_id: ride.rider_id,
            driver_id: ride.driver_id,
            cancelled_by,
            reason,
            cancelled_at: ride.cancelled_at.unwrap_or_else(|| self.clock.now()),
        }));
        Ok(ride)
    }

    pub async fn rate_ride(
        &self,
        caller: &CallerIdentity,
        ride_id: Uuid,
        request: RateRideRequest,
    ) -> Result<Ride> {
        request.validate().map_err(AppError::Validation)?;
        let ride = self.store.get(ride_id).await?;

        if ride.rider_id != caller.user_id {
            return Err(AppError::Validation(
                "only the rider can rate this ride".to_string(),
            ));
        }
        if ride.status != RideStatus::Completed {
            return Err(AppError::Validation(
                "only completed rides can be rated".to_string(),
            ));
        }
        if ride.rating.is_some() {
            return Err(AppError::Validation("ride already rated".to_string()));
        }

        let feedback = request
            .feedback
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());
        self.store
            .update_rating(ride_id, request.rating, feedback)
            .await?;

        tracing::info!(ride_id = %ride_id, rating = request.rating, "Ride rated");
        self.store.get(ride_id).await
    }

    /// Riders and assigned drivers see their rides, any driver sees open
    /// requests. Anything else looks like a missing ride.
    pub async fn get_ride(&self, caller: &CallerIdentity, ride_id: Uuid) -> Result<Ride> {
        let ride = self.store.get(ride_id).await?;
        let open_request = ride.status == RideStatus::Requested && !ride.is_scheduled;
        let visible = ride.is_participant(caller.user_id)
            || (caller.role == Role::Driver && open_request);
        if !visible {
            return Err(AppError::ride_not_found(ride_id));
        }
        Ok(ride)
    }

    pub async fn list_rider_rides(
        &self,
        rider_id: Uuid,
        filters: &RideFilters,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<RidePage> {
        let (page, per_page) = normalize_page(page, per_page);
        let (limit, offset) = limit_offset(page, per_page);
        let (rides, total) = self
            .store
            .list_by_rider(rider_id, filters, limit, offset)
            .await?;
        Ok(RidePage {
            rides,
            total,
            page,
            per_page,
        })
    }

    pub async fn list_driver_rides(
        &self,
        driver_id: Uuid,
        filters: &RideFilters,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<RidePage> {
        let (page, per_page) = normalize_page(page, per_page);
        let (limit, offset) = limit_offset(page, per_page);
        let (rides, total) = self
            .store
            .list_by_driver(driver_id, filters, limit, offset)
            .await?;
        Ok(RidePage {
            rides,
            total,
            page,
            per_page,
        })
    }

    /// Open requests, oldest first.
    pub async fn list_available(&self) -> Result<Vec<Ride>> {
        self.store.list_pending().await
    }

    pub async fn surge_info(&self, at: &Coordinates) -> SurgeInfo {
        let (multiplier, source) = self.current_surge(at).await;
        SurgeInfo {
            lat: at.lat,
            lon: at.lon,
            multiplier,
            source,
        }
    }

    async fn estimate_duration(
        &self,
        pickup: &Coordinates,
        dropoff: &Coordinates,
        distance_km: f64,
        request: &RideRequest,
    ) -> i32 {
        let estimate = geo::estimate_duration(distance_km);
        let Some(eta) = &self.collaborators.eta else {
            return estimate;
        };

        let context = EtaContext {
            requested_at: self.clock.now(),
            distance_km,
            ride_type_id: request.ride_type_id,
        };
        match eta.predict(pickup, dropoff, &context).await {
            Ok(minutes) if minutes.is_finite() && minutes > 0.0 => minutes.round() as i32,
            Ok(_) => estimate,
            Err(e) => {
                tracing::debug!("ETA prediction unavailable, using geometric estimate: {}", e);
                estimate
            }
        }
    }

    async fn resolve_geo(&self, pickup: &Coordinates, dropoff: &Coordinates) -> GeoStamp {
        let Some(resolver) = &self.collaborators.location else {
            return GeoStamp::default();
        };

        let (origin, destination) = futures::future::join(
            resolve_within_deadline(resolver.as_ref(), pickup),
            resolve_within_deadline(resolver.as_ref(), dropoff),
        )
        .await;

        let (country, region, city, pickup_zone) = match origin {
            Some(o) => (o.country, o.region, o.city, o.pricing_zone),
            None => (None, None, None, None),
        };
        GeoStamp {
            country,
            region,
            city,
            pickup_zone,
            dropoff_zone: destination.and_then(|d| d.pricing_zone),
        }
    }

    async fn current_surge(&self, at: &Coordinates) -> (f64, SurgeSource) {
        if let Some(surge) = &self.collaborators.surge {
            match surge.multiplier(at).await {
                Ok(m) if m.is_finite() => return (m.max(1.0), SurgeSource::SurgeService),
                Ok(m) => tracing::warn!("Surge service returned {}, using time-of-day table", m),
                Err(e) => tracing::warn!("Surge service failed, using time-of-day table: {}", e),
            }
        }
        let hour = self.clock.now().hour();
        (pricing::time_of_day_surge(hour), SurgeSource::TimeOfDay)
    }

    /// Pricing engine first; on absence or failure the local formula with
    /// `surge` (or the current surge when `None`).
    async fn quote(
        &self,
        pickup: &Coordinates,
        dropoff: &Coordinates,
        distance_km: f64,
        duration_min: i32,
        ride_type_id: Option<Uuid>,
        surge: Option<f64>,
    ) -> FareQuote {
        if let Some(engine) = &self.collaborators.pricing {
            let request = PriceRequest {
                pickup: *pickup,
                dropoff: *dropoff,
                distance_km,
                duration_min,
                ride_type_id,
                currency: self.pricing.currency.clone(),
            };
            match engine.calculate(&request).await {
                Ok(quote) => {
                    return FareQuote {
                        total_fare: geo::round_to(quote.total_fare.max(self.pricing.minimum_fare), 2),
                        driver_earnings: geo::round_to(quote.driver_earnings, 2),
                        multiplier: if quote.multiplier.is_finite() {
                            quote.multiplier.max(1.0)
                        } else {
                            1.0
                        },
                        ..quote
                    };
                }
                Err(e) => tracing::warn!("Pricing engine failed, using fallback fare: {}", e),
            }
        }

        let surge = match surge {
            Some(s) => s.max(1.0),
            None => self.current_surge(pickup).await.0,
        };
        let mut quote = pricing::fallback_quote(&self.pricing, distance_km, duration_min, surge);
        quote.currency = self.pricing.currency.clone();
        quote
    }

    /// Returns `(fare, promo_id, discount)`. Invalid codes and validator
    /// failures leave the fare untouched.
    async fn apply_promo(&self, code: &str, rider_id: Uuid, fare: f64) -> (f64, Option<Uuid>, f64) {
        let Some(validator) = &self.collaborators.promo else {
            tracing::debug!("Promo code supplied but no promo service configured");
            return (fare, None, 0.0);
        };

        match validator.validate(code, rider_id, fare).await {
            Ok(outcome) if outcome.valid && outcome.discount > 0.0 => {
                let discount = geo::round_to(outcome.discount, 2);
                let discounted = pricing::apply_discount(&self.pricing, fare, discount);
                (discounted, outcome.promo_id, discount)
            }
            Ok(_) => {
                tracing::info!(rider_id = %rider_id, "Promo code {} rejected", code);
                (fare, None, 0.0)
            }
            Err(e) => {
                tracing::warn!(rider_id = %rider_id, "Promo validation failed: {}", e);
                (fare, None, 0.0)
            }
        }
    }
}

async fn resolve_within_deadline(
    resolver: &dyn LocationResolver,
    at: &Coordinates,
) -> Option<ResolvedLocation> {
    let deadline = Duration::from_millis(LOCATION_RESOLVE_TIMEOUT_MS);
    match tokio::time::timeout(deadline, resolver.resolve(at)).await {
        Ok(Ok(location)) => Some(location),
        Ok(Err(e)) => {
            tracing::warn!(lat = at.lat, lon = at.lon, "Location resolution failed: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!(
                lat = at.lat,
                lon = at.lon,
                "Location resolution exceeded {}ms",
                LOCATION_RESOLVE_TIMEOUT_MS
            );
            None
        }
    }
}

pub fn normalize_page(page: Option<u32>, per_page: Option<u32>) -> (u32, u32) {
    let page = page.filter(|p| *p > 0).unwrap_or(1);
    let per_page = match per_page {
        None | Some(0) => DEFAULT_PER_PAGE,
        Some(n) => n.min(MAX_PER_PAGE),
    };
    (page, per_page)
}

fn limit_offset(page: u32, per_page: u32) -> (i64, i64) {
    let limit = i64::from(per_page);
    (limit, i64::from(page - 1) * limit)
}

#[cfg(test)]
#[path = "ride_service_tests.rs"]
mod tests;
