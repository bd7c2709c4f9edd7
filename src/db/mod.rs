use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub mod memory_store;
mod ride_queries;
pub mod ride_repository;

pub use memory_store::InMemoryRideStore;
pub use ride_repository::{PgRideStore, RideStore};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}
