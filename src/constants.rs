//! Stable application-wide constants.
//!
//! Values here are structural invariants, algorithm coefficients, and default
//! fallbacks for env-var-based configuration. They should rarely change.
//! Tunable pricing, matching and scheduling knobs live in
//! [`Config`](crate::config::Config) instead.

// --- Server defaults (used when HOST / PORT env vars are absent) ---

/// Default bind address for the HTTP server.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default port for the HTTP server.
pub const DEFAULT_PORT: &str = "8080";

// --- Geo estimation ---

/// Average urban speed used to turn a distance into a duration estimate.
pub const AVERAGE_SPEED_KMH: f64 = 40.0;

// --- Fallback pricing defaults (overridden by PRICING_* env vars) ---

pub const DEFAULT_MINIMUM_FARE: f64 = 5.0;
pub const DEFAULT_PER_KM_RATE: f64 = 1.5;
pub const DEFAULT_PER_MINUTE_RATE: f64 = 0.25;
/// Platform commission; the driver keeps `1 - commission` of the fare.
pub const DEFAULT_COMMISSION_RATE: f64 = 0.20;
pub const DEFAULT_CURRENCY: &str = "USD";

// --- Time-of-day surge table (UTC hours, end exclusive) ---
// Used when no surge service is configured or it fails.

pub const MORNING_PEAK_HOURS: std::ops::Range<u8> = 7..9;
pub const EVENING_PEAK_HOURS: std::ops::Range<u8> = 17..20;
pub const PEAK_SURGE_MULTIPLIER: f64 = 1.5;
/// Late night spans midnight: 23:00 through 04:59.
pub const LATE_NIGHT_START_HOUR: u8 = 23;
pub const LATE_NIGHT_END_HOUR: u8 = 5;
pub const LATE_NIGHT_SURGE_MULTIPLIER: f64 = 1.3;
pub const BASE_SURGE_MULTIPLIER: f64 = 1.0;

// --- Matcher defaults (overridden by MATCH_* env vars) ---

pub const DEFAULT_MATCH_DISTANCE_WEIGHT: f64 = 0.40;
pub const DEFAULT_MATCH_RATING_WEIGHT: f64 = 0.25;
pub const DEFAULT_MATCH_ACCEPTANCE_WEIGHT: f64 = 0.20;
pub const DEFAULT_MATCH_IDLE_WEIGHT: f64 = 0.15;
pub const DEFAULT_MATCH_MAX_DISTANCE_KM: f64 = 10.0;
pub const DEFAULT_MATCH_MAX_CANDIDATES: usize = 50;
pub const DEFAULT_MATCH_MAX_RESULTS: usize = 5;

/// Look-back window for per-driver match statistics.
pub const DRIVER_STATS_WINDOW_DAYS: i64 = 30;

// --- Scheduled rides ---

pub const DEFAULT_SCHEDULER_TICK_SECONDS: u64 = 60;
/// Rides scheduled within this many minutes are considered on each tick.
pub const DEFAULT_SCHEDULER_LOOKAHEAD_MINUTES: i64 = 30;
/// Rides this close to their scheduled time are promoted into the live pool.
pub const DEFAULT_SCHEDULER_ACTIVATION_MINUTES: i64 = 5;

// --- External collaborator deadlines ---

/// Hard deadline on geographic resolution, applied per lookup.
pub const LOCATION_RESOLVE_TIMEOUT_MS: u64 = 500;
/// Deadline for a single event publication, independent of the caller.
pub const EVENT_PUBLISH_TIMEOUT_SECS: u64 = 5;
/// Default per-request timeout for HTTP collaborators.
pub const HTTP_CLIENT_TIMEOUT_SECS: u64 = 3;

// --- Circuit breaker defaults ---

pub const DEFAULT_BREAKER_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_BREAKER_RESET_SECONDS: u64 = 30;

// --- Background task pool ---

/// Maximum concurrently running event publications.
pub const DEFAULT_EVENT_TASK_LIMIT: usize = 256;

// --- Location cache ---

pub const LOCATION_CACHE_TTL_SECONDS: u64 = 600;
pub const LOCATION_CACHE_MAX_ENTRIES: u64 = 10_000;
/// ~100 m buckets for cache keys.
pub const LOCATION_CACHE_COORD_PRECISION: u32 = 3;

// --- Pagination ---

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

// --- Rider metadata defaults for ride.requested ---

pub const DEFAULT_RIDER_NAME: &str = "Rider";
pub const DEFAULT_RIDER_RATING: f64 = 5.0;
