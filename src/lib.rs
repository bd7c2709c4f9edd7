// Library exports for testing and reusability

pub mod clock;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use error::{AppError, Result};

use services::{BackgroundTasks, Matcher, RideService};
use sqlx::PgPool;

// App state for sharing across the application
pub struct AppState {
    pub rides: RideService,
    /// `None` when no driver locator is configured.
    pub matcher: Option<Matcher>,
    pub tasks: BackgroundTasks,
    /// Present only for the Postgres store; used by the health check.
    pub db_pool: Option<PgPool>,
}
