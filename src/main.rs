use axum::Router;
use rideflow::clock::{Clock, SystemClock};
use rideflow::config::{BreakerConfig, Config, StoreBackend};
use rideflow::db::{InMemoryRideStore, PgRideStore, RideStore};
use rideflow::services::circuit_breaker::{CircuitBreaker, Guarded};
use rideflow::services::collaborators::{
    ClientResult, EtaPredictor, EventPublisher, LocationResolver, LogNotifier, Notifier,
    PricingEngine, PromoValidator, RiderDirectory, SurgeCalculator,
};
use rideflow::services::http_clients::*;
use rideflow::services::{
    BackgroundTasks, CachedLocationResolver, Collaborators, LogEventPublisher, Matcher,
    RedisEventPublisher, RideEvents, RideService, ScheduledRideWorker, TrackedDriverProvider,
};
use rideflow::AppState;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rideflow=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| format!("Failed to load configuration: {}", e))?;

    tracing::info!("Starting RideFlow API server");
    tracing::info!("Configuration loaded successfully");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Ride store: Postgres with migrations, or in-process for development
    let (store, db_pool) = match config.store {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL must be set")?;
            tracing::info!("Connecting to database...");
            let pool = rideflow::db::create_pool(database_url).await?;
            tracing::info!("Database connection established");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Database migrations completed");

            let store: Arc<dyn RideStore> = Arc::new(PgRideStore::new(pool.clone()));
            (store, Some(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory ride store. Rides will not survive a restart.");
            let store: Arc<dyn RideStore> = Arc::new(InMemoryRideStore::new(clock.clone()));
            (store, None)
        }
    };

    // Event bus: try Redis, fall back to the log
    let publisher: Arc<dyn EventPublisher> = if let Some(ref redis_url) = config.redis_url {
        tracing::info!("Connecting to Redis event bus...");
        match RedisEventPublisher::new(redis_url).await {
            Ok(publisher) => {
                tracing::info!("Redis event bus connection established");
                Arc::new(publisher)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to connect to Redis: {}. Falling back to logged events.",
                    e
                );
                Arc::new(LogEventPublisher)
            }
        }
    } else {
        tracing::info!("Redis URL not configured. Events will be logged only.");
        Arc::new(LogEventPublisher)
    };

    let urls = &config.collaborators;
    let breaker = &config.breaker;
    let pricing = optional(urls.pricing_engine.as_deref(), "pricing engine", |url| {
        let client: Arc<dyn PricingEngine> =
            Arc::new(guarded("pricing", HttpPricingEngine::new(url)?, breaker));
        Ok(client)
    });
    let surge = optional(urls.surge.as_deref(), "surge calculator", |url| {
        let client: Arc<dyn SurgeCalculator> =
            Arc::new(guarded("surge", HttpSurgeCalculator::new(url)?, breaker));
        Ok(client)
    });
    let eta = optional(urls.eta.as_deref(), "ETA predictor", |url| {
        let client: Arc<dyn EtaPredictor> =
            Arc::new(guarded("eta", HttpEtaPredictor::new(url)?, breaker));
        Ok(client)
    });
    let promo = optional(urls.promo.as_deref(), "promo validator", |url| {
        let client: Arc<dyn PromoValidator> =
            Arc::new(guarded("promo", HttpPromoValidator::new(url)?, breaker));
        Ok(client)
    });
    let location = optional(urls.location.as_deref(), "location resolver", |url| {
        let inner: Arc<dyn LocationResolver> = Arc::new(HttpLocationResolver::new(url)?);
        let cached: Arc<dyn LocationResolver> = Arc::new(CachedLocationResolver::new(inner));
        Ok(cached)
    });
    let collaborators = Collaborators {
        pricing,
        surge,
        eta,
        promo,
        location,
    };

    let riders = optional(urls.rider_directory.as_deref(), "rider directory", |url| {
        let client: Arc<dyn RiderDirectory> = Arc::new(HttpRiderDirectory::new(url)?);
        Ok(client)
    });
    let notifier = optional(urls.notifications.as_deref(), "notification service", |url| {
        let client: Arc<dyn Notifier> = Arc::new(HttpNotifier::new(url)?);
        Ok(client)
    })
    .unwrap_or_else(|| Arc::new(LogNotifier));
    let matcher = optional(
        urls.driver_locator.as_deref(),
        "driver locator",
        HttpDriverLocator::new,
    )
    .map(|locator| {
        let provider = TrackedDriverProvider::new(Arc::new(locator), store.clone());
        Matcher::new(Arc::new(provider), config.matcher.clone())
    });

    // Initialize services
    let tasks = BackgroundTasks::new(config.event_task_limit);
    let events = RideEvents::new(publisher, riders, tasks.clone(), clock.clone());
    let rides = RideService::new(
        store.clone(),
        collaborators,
        events.clone(),
        config.pricing.clone(),
        clock.clone(),
    );

    let shutdown = CancellationToken::new();
    let worker = ScheduledRideWorker::new(
        store,
        events,
        notifier,
        clock,
        config.scheduler.clone(),
    );
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    // Create application state
    let state = Arc::new(AppState {
        rides,
        matcher,
        tasks: tasks.clone(),
        db_pool,
    });

    // Build router with CORS and tracing
    let app = Router::new()
        .nest("/api/v1", rideflow::routes::create_router(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = config.server_address();
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the scheduler before draining queued events
    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        tracing::error!("Scheduled ride worker panicked: {}", e);
    }
    tasks.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn guarded<T>(name: &'static str, client: T, config: &BreakerConfig) -> Guarded<T> {
    Guarded::new(client, CircuitBreaker::new(name, config.clone()))
}

/// Build a collaborator when its URL is configured. A client that cannot be
/// constructed is logged and treated as absent.
fn optional<T>(
    url: Option<&str>,
    what: &str,
    build: impl FnOnce(&str) -> ClientResult<T>,
) -> Option<T> {
    let Some(url) = url else {
        tracing::info!("No {} configured, using fallback", what);
        return None;
    };
    match build(url) {
        Ok(client) => {
            tracing::info!("Using {} at {}", what, url);
            Some(client)
        }
        Err(e) => {
            tracing::warn!("Failed to set up {}: {}. Using fallback.", what, e);
            None
        }
    }
}
