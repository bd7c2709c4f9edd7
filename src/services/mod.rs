pub mod circuit_breaker;
pub mod collaborators;
pub mod events;
pub mod geo;
pub mod http_clients;
pub mod location;
pub mod matcher;
pub mod pricing;
pub mod ride_service;
pub mod scheduler;
pub mod task_pool;

pub use circuit_breaker::{CircuitBreaker, CircuitState, Guarded};
pub use events::{LogEventPublisher, RedisEventPublisher, RideEvents};
pub use location::CachedLocationResolver;
pub use matcher::{DriverDataProvider, Matcher, TrackedDriverProvider};
pub use ride_service::{Collaborators, RideService};
pub use scheduler::ScheduledRideWorker;
pub use task_pool::BackgroundTasks;
