use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-driver aggregates over the recent ride history, used by the matcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DriverMatchStats {
    pub rating: f64,
    pub acceptance_rate: f64,
    pub idle_minutes: f64,
}

impl Default for DriverMatchStats {
    /// Applied to drivers with no rides in the stats window.
    fn default() -> Self {
        DriverMatchStats {
            rating: 4.0,
            acceptance_rate: 0.8,
            idle_minutes: 30.0,
        }
    }
}

/// Weighted sub-scores behind a candidate's total, each in 0-1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub distance_score: f64,
    pub rating_score: f64,
    pub acceptance_score: f64,
    pub idle_score: f64,
}

/// A driver considered for dispatch to one pickup. Lives for a single match call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverCandidate {
    pub driver_id: Uuid,
    pub distance_km: f64,
    /// 1-5 scale
    pub rating: f64,
    /// 0-1
    pub acceptance_rate: f64,
    pub idle_minutes: f64,
    /// 0-1 after evaluation
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
}

impl DriverCandidate {
    pub fn new(driver_id: Uuid, distance_km: f64, stats: DriverMatchStats) -> Self {
        DriverCandidate {
            driver_id,
            distance_km,
            rating: stats.rating,
            acceptance_rate: stats.acceptance_rate,
            idle_minutes: stats.idle_minutes,
            score: 0.0,
            breakdown: None,
        }
    }
}
