//! Trip geometry estimates.

use crate::constants::AVERAGE_SPEED_KMH;
use crate::models::Coordinates;

/// Great-circle distance between two points in kilometers, rounded to two decimals.
pub fn distance(from: &Coordinates, to: &Coordinates) -> f64 {
    round_to(from.distance_to(to), 2)
}

/// Driving time in whole minutes at the average urban speed.
pub fn estimate_duration(distance_km: f64) -> i32 {
    (distance_km / AVERAGE_SPEED_KMH * 60.0).round() as i32
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}
