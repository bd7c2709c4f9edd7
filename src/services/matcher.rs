//! Weighted multi-factor driver ranking for dispatch.

use crate::config::MatcherConfig;
use crate::db::RideStore;
use crate::error::{AppError, Result};
use crate::models::{Coordinates, DriverCandidate, ScoreBreakdown};
use crate::services::collaborators::DriverLocator;
use crate::services::geo::round_to;
use async_trait::async_trait;
use std::sync::Arc;

/// Supplies available drivers near a pickup, with their match statistics.
#[async_trait]
pub trait DriverDataProvider: Send + Sync {
    async fn nearby_candidates(
        &self,
        pickup: &Coordinates,
        max_distance_km: f64,
        limit: usize,
    ) -> Result<Vec<DriverCandidate>>;
}

pub struct Matcher {
    provider: Arc<dyn DriverDataProvider>,
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(provider: Arc<dyn DriverDataProvider>, config: MatcherConfig) -> Self {
        Matcher { provider, config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Best drivers for a pickup, highest score first.
    pub async fn find_best_drivers(&self, pickup: &Coordinates) -> Result<Vec<DriverCandidate>> {
        let candidates = self
            .provider
            .nearby_candidates(pickup, self.config.max_distance_km, self.config.max_candidates)
            .await?;

        let nearby: Vec<DriverCandidate> = candidates
            .into_iter()
            .filter(|c| c.distance_km <= self.config.max_distance_km)
            .take(self.config.max_candidates)
            .collect();

        let ranked = self.rank(nearby);
        tracing::debug!(
            lat = pickup.lat,
            lon = pickup.lon,
            matched = ranked.len(),
            top_score = ranked.first().map(|c| c.score),
            "Ranked drivers for pickup"
        );
        Ok(ranked)
    }

    /// Score every candidate against the batch, sort descending (stable) and
    /// keep the top `max_results`.
    pub fn rank(&self, mut candidates: Vec<DriverCandidate>) -> Vec<DriverCandidate> {
        if candidates.is_empty() {
            return candidates;
        }

        let max_distance = candidates
            .iter()
            .map(|c| c.distance_km)
            .fold(0.0_f64, f64::max);
        let max_idle = candidates
            .iter()
            .map(|c| c.idle_minutes)
            .fold(0.0_f64, f64::max);

        for candidate in candidates.iter_mut() {
            let breakdown = sub_scores(candidate, max_distance, max_idle);
            candidate.score = round_to(self.weighted(&breakdown), 3);
            candidate.breakdown = Some(breakdown);
        }

        // sort_by is stable: equal scores keep provider order.
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(self.config.max_results);
        candidates
    }

    fn weighted(&self, s: &ScoreBreakdown) -> f64 {
        self.config.distance_weight * s.distance_score
            + self.config.rating_weight * s.rating_score
            + self.config.acceptance_weight * s.acceptance_score
            + self.config.idle_weight * s.idle_score
    }
}

fn sub_scores(candidate: &DriverCandidate, max_distance: f64, max_idle: f64) -> ScoreBreakdown {
    let distance_score = if max_distance > 0.0 {
        1.0 - candidate.distance_km / max_distance
    } else {
        1.0
    };
    let idle_score = if candidate.idle_minutes > 0.0 && max_idle > 0.0 {
        candidate.idle_minutes.ln_1p() / max_idle.ln_1p()
    } else {
        0.0
    };

    ScoreBreakdown {
        distance_score: distance_score.clamp(0.0, 1.0),
        rating_score: ((candidate.rating - 1.0) / 4.0).clamp(0.0, 1.0),
        acceptance_score: candidate.acceptance_rate.clamp(0.0, 1.0),
        idle_score: idle_score.clamp(0.0, 1.0),
    }
}

/// Nearby drivers from the location service, enriched with 30-day match
/// statistics from the ride store.
pub struct TrackedDriverProvider {
    locator: Arc<dyn DriverLocator>,
    store: Arc<dyn RideStore>,
}

impl TrackedDriverProvider {
    pub fn new(locator: Arc<dyn DriverLocator>, store: Arc<dyn RideStore>) -> Self {
        Self { locator, store }
    }
}

#[async_trait]
impl DriverDataProvider for TrackedDriverProvider {
    async fn nearby_candidates(
        &self,
        pickup: &Coordinates,
        max_distance_km: f64,
        limit: usize,
    ) -> Result<Vec<DriverCandidate>> {
        let nearby = self
            .locator
            .nearby(pickup, max_distance_km, limit)
            .await
            .map_err(|e| AppError::Internal(format!("driver locator failed: {}", e)))?;
        if nearby.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<_> = nearby.iter().map(|d| d.driver_id).collect();
        let stats = self.store.get_driver_match_stats(&ids).await?;

        Ok(nearby
            .into_iter()
            .map(|d| {
                let driver_stats = stats.get(&d.driver_id).copied().unwrap_or_default();
                DriverCandidate::new(d.driver_id, d.distance_km, driver_stats)
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
