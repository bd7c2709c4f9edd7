use crate::constants::*;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Postgres,
    /// Process-local store, for development and tests. Nothing survives a restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!(
                "Invalid ride store: {}. Use 'postgres' or 'memory'",
                s
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub pricing: PricingConfig,
    pub matcher: MatcherConfig,
    pub scheduler: SchedulerConfig,
    pub breaker: BreakerConfig,
    pub collaborators: CollaboratorUrls,
    pub event_task_limit: usize,
}

/// Fallback pricing used whenever the pricing engine is absent or failing.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingConfig {
    pub minimum_fare: f64,
    pub per_km: f64,
    pub per_minute: f64,
    /// Fraction of the fare kept by the platform (0.0-1.0)
    pub commission: f64,
    pub currency: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            minimum_fare: DEFAULT_MINIMUM_FARE,
            per_km: DEFAULT_PER_KM_RATE,
            per_minute: DEFAULT_PER_MINUTE_RATE,
            commission: DEFAULT_COMMISSION_RATE,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

impl PricingConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let config = Self {
            minimum_fare: parse_var("PRICING_MINIMUM_FARE", defaults.minimum_fare)?,
            per_km: parse_var("PRICING_PER_KM", defaults.per_km)?,
            per_minute: parse_var("PRICING_PER_MINUTE", defaults.per_minute)?,
            commission: parse_var("PRICING_COMMISSION", defaults.commission)?,
            currency: env::var("PRICING_CURRENCY").unwrap_or(defaults.currency),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.minimum_fare < 0.0 || self.per_km < 0.0 || self.per_minute < 0.0 {
            return Err("Pricing rates must not be negative".to_string());
        }
        if !(0.0..=1.0).contains(&self.commission) {
            return Err("PRICING_COMMISSION must be between 0 and 1".to_string());
        }
        Ok(())
    }
}

/// Weights and limits for driver ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    /// Weight for proximity to the pickup (0.0-1.0)
    pub distance_weight: f64,
    /// Weight for driver rating (0.0-1.0)
    pub rating_weight: f64,
    /// Weight for recent acceptance rate (0.0-1.0)
    pub acceptance_weight: f64,
    /// Weight for time since the last completed ride (0.0-1.0)
    pub idle_weight: f64,
    /// Candidates farther than this from the pickup are dropped
    pub max_distance_km: f64,
    /// How many nearby drivers to request from the provider
    pub max_candidates: usize,
    /// How many ranked drivers to return
    pub max_results: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            distance_weight: DEFAULT_MATCH_DISTANCE_WEIGHT,
            rating_weight: DEFAULT_MATCH_RATING_WEIGHT,
            acceptance_weight: DEFAULT_MATCH_ACCEPTANCE_WEIGHT,
            idle_weight: DEFAULT_MATCH_IDLE_WEIGHT,
            max_distance_km: DEFAULT_MATCH_MAX_DISTANCE_KM,
            max_candidates: DEFAULT_MATCH_MAX_CANDIDATES,
            max_results: DEFAULT_MATCH_MAX_RESULTS,
        }
    }
}

impl MatcherConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            distance_weight: parse_var("MATCH_DISTANCE_WEIGHT", defaults.distance_weight)?,
            rating_weight: parse_var("MATCH_RATING_WEIGHT", defaults.rating_weight)?,
            acceptance_weight: parse_var("MATCH_ACCEPTANCE_WEIGHT", defaults.acceptance_weight)?,
            idle_weight: parse_var("MATCH_IDLE_WEIGHT", defaults.idle_weight)?,
            max_distance_km: parse_var("MATCH_MAX_DISTANCE_KM", defaults.max_distance_km)?,
            max_candidates: parse_var("MATCH_MAX_CANDIDATES", defaults.max_candidates)?,
            max_results: parse_var("MATCH_MAX_RESULTS", defaults.max_results)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub tick: Duration,
    pub lookahead_minutes: i64,
    pub activation_minutes: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(DEFAULT_SCHEDULER_TICK_SECONDS),
            lookahead_minutes: DEFAULT_SCHEDULER_LOOKAHEAD_MINUTES,
            activation_minutes: DEFAULT_SCHEDULER_ACTIVATION_MINUTES,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let config = Self {
            tick: Duration::from_secs(parse_var(
                "SCHEDULER_TICK_SECONDS",
                defaults.tick.as_secs(),
            )?),
            lookahead_minutes: parse_var("SCHEDULER_LOOKAHEAD_MINUTES", defaults.lookahead_minutes)?,
            activation_minutes: parse_var(
                "SCHEDULER_ACTIVATION_MINUTES",
                defaults.activation_minutes,
            )?,
        };

        if config.tick.is_zero() {
            return Err("SCHEDULER_TICK_SECONDS must be positive".to_string());
        }
        if config.activation_minutes > config.lookahead_minutes {
            return Err(
                "SCHEDULER_ACTIVATION_MINUTES must not exceed SCHEDULER_LOOKAHEAD_MINUTES"
                    .to_string(),
            );
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// How long the breaker stays open before letting a probe through
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_BREAKER_FAILURE_THRESHOLD,
            reset_timeout: Duration::from_secs(DEFAULT_BREAKER_RESET_SECONDS),
        }
    }
}

/// Base URLs of optional collaborators. A missing URL selects the fallback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollaboratorUrls {
    pub pricing_engine: Option<String>,
    pub surge: Option<String>,
    pub eta: Option<String>,
    pub promo: Option<String>,
    pub location: Option<String>,
    pub driver_locator: Option<String>,
    pub rider_directory: Option<String>,
    pub notifications: Option<String>,
}

impl CollaboratorUrls {
    pub fn from_env() -> Self {
        Self {
            pricing_engine: optional_var("PRICING_ENGINE_URL"),
            surge: optional_var("SURGE_SERVICE_URL"),
            eta: optional_var("ETA_SERVICE_URL"),
            promo: optional_var("PROMO_SERVICE_URL"),
            location: optional_var("LOCATION_SERVICE_URL"),
            driver_locator: optional_var("DRIVER_LOCATOR_URL"),
            rider_directory: optional_var("RIDER_DIRECTORY_URL"),
            notifications: optional_var("NOTIFICATION_SERVICE_URL"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenv::dotenv().ok();

        let store: StoreBackend = env::var("RIDE_STORE")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL").ok();
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err("DATABASE_URL must be set".to_string());
        }

        let event_task_limit: usize = parse_var("EVENT_TASK_LIMIT", DEFAULT_EVENT_TASK_LIMIT)?;
        if event_task_limit == 0 {
            return Err("EVENT_TASK_LIMIT must be positive".to_string());
        }

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_PORT.to_string())
                .parse()
                .map_err(|_| "Invalid PORT")?,
            store,
            database_url,
            redis_url: optional_var("REDIS_URL"),
            pricing: PricingConfig::from_env()?,
            matcher: MatcherConfig::from_env()?,
            scheduler: SchedulerConfig::from_env()?,
            breaker: BreakerConfig {
                failure_threshold: parse_var(
                    "BREAKER_FAILURE_THRESHOLD",
                    DEFAULT_BREAKER_FAILURE_THRESHOLD,
                )?,
                reset_timeout: Duration::from_secs(parse_var(
                    "BREAKER_RESET_SECONDS",
                    DEFAULT_BREAKER_RESET_SECONDS,
                )?),
            },
            collaborators: CollaboratorUrls::from_env(),
            event_task_limit,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| format!("Invalid {}", key)),
        Err(_) => Ok(default),
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
