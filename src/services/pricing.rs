//! Local fare formula and time-of-day surge table.
//!
//! These are the fallbacks the ride service applies whenever the pricing
//! engine or the surge calculator is not configured or fails.

use crate::config::PricingConfig;
use crate::constants::*;
use crate::services::geo::round_to;
use serde::{Deserialize, Serialize};

/// A priced trip, from the pricing engine or the local formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareQuote {
    pub total_fare: f64,
    pub driver_earnings: f64,
    pub multiplier: f64,
    pub currency: String,
    #[serde(default)]
    pub pricing_version: Option<String>,
    #[serde(default)]
    pub ride_type_name: Option<String>,
}

/// `max(minimum, (distance * per_km + duration * per_minute) * surge)`, two decimals.
pub fn fallback_fare(config: &PricingConfig, distance_km: f64, duration_min: i32, surge: f64) -> f64 {
    let base = distance_km * config.per_km + f64::from(duration_min) * config.per_minute;
    round_to((base * surge).max(config.minimum_fare), 2)
}

pub fn driver_earnings(config: &PricingConfig, fare: f64) -> f64 {
    round_to(fare * (1.0 - config.commission), 2)
}

pub fn fallback_quote(
    config: &PricingConfig,
    distance_km: f64,
    duration_min: i32,
    surge: f64,
) -> FareQuote {
    let total_fare = fallback_fare(config, distance_km, duration_min, surge);
    FareQuote {
        total_fare,
        driver_earnings: driver_earnings(config, total_fare),
        multiplier: surge,
        currency: DEFAULT_CURRENCY.to_string(),
        pricing_version: None,
        ride_type_name: None,
    }
}

/// Subtract a promo discount without dropping below the minimum fare.
pub fn apply_discount(config: &PricingConfig, fare: f64, discount: f64) -> f64 {
    round_to((fare - discount.max(0.0)).max(config.minimum_fare), 2)
}

/// Surge multiplier for a UTC hour (0-23).
pub fn time_of_day_surge(hour: u8) -> f64 {
    if MORNING_PEAK_HOURS.contains(&hour) || EVENING_PEAK_HOURS.contains(&hour) {
        PEAK_SURGE_MULTIPLIER
    } else if hour >= LATE_NIGHT_START_HOUR || hour < LATE_NIGHT_END_HOUR {
        LATE_NIGHT_SURGE_MULTIPLIER
    } else {
        BASE_SURGE_MULTIPLIER
    }
}
