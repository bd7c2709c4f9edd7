use crate::clock::Clock;
use crate::constants::{DEFAULT_RIDER_NAME, DEFAULT_RIDER_RATING, EVENT_PUBLISH_TIMEOUT_SECS};
use crate::models::{EventEnvelope, Ride, RideEvent};
use crate::services::collaborators::{ClientResult, EventPublisher, RiderDirectory, RiderProfile};
use crate::services::task_pool::BackgroundTasks;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

/// Publishes envelopes on the Redis channel named after the event subject.
/// `ConnectionManager` reconnects on its own and is cheap to clone.
pub struct RedisEventPublisher {
    connection: ConnectionManager,
}

impl RedisEventPublisher {
    pub async fn new(redis_url: &str) -> ClientResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;
        tracing::info!("Redis event bus connection established");
        Ok(RedisEventPublisher { connection })
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, subject: &str, envelope: &EventEnvelope) -> ClientResult<()> {
        let payload = serde_json::to_string(envelope)?;
        let mut conn = self.connection.clone();
        let receivers: i64 = conn.publish(subject, payload).await?;
        tracing::debug!(
            subject,
            event_id = %envelope.event_id,
            receivers,
            "Published {}",
            subject
        );
        Ok(())
    }
}

/// Writes events to the log. Used when no event bus is configured.
#[derive(Debug, Default)]
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, subject: &str, envelope: &EventEnvelope) -> ClientResult<()> {
        tracing::info!(
            subject,
            event_id = %envelope.event_id,
            data = %envelope.data,
            "Event {}",
            subject
        );
        Ok(())
    }
}

/// Fire-and-forget emission of ride lifecycle events.
///
/// Publication runs in the background pool under a 5 s deadline, so callers
/// never wait on the bus and failures only reach the log.
#[derive(Clone)]
pub struct RideEvents {
    publisher: Arc<dyn EventPublisher>,
    riders: Option<Arc<dyn RiderDirectory>>,
    tasks: BackgroundTasks,
    clock: Arc<dyn Clock>,
}

impl RideEvents {
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        riders: Option<Arc<dyn RiderDirectory>>,
        tasks: BackgroundTasks,
        clock: Arc<dyn Clock>,
    ) -> Self {
        RideEvents {
            publisher,
            riders,
            tasks,
            clock,
        }
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn emit(&self, event: RideEvent) {
        let publisher = self.publisher.clone();
        let timestamp = self.clock.now();
        self.tasks.spawn("publish-event", publish_deadline(), async move {
            publish(publisher.as_ref(), &event, timestamp).await;
        });
    }

    /// `ride.requested` needs the rider's display metadata, looked up in the
    /// background as well.
    pub fn emit_requested(&self, ride: Ride, ride_type_name: Option<String>) {
        let publisher = self.publisher.clone();
        let riders = self.riders.clone();
        let timestamp = self.clock.now();
        self.tasks.spawn("publish-ride-requested", publish_deadline(), async move {
            let profile = rider_profile(riders.as_deref(), &ride).await;
            let event = RideEvent::requested(&ride, profile.name, profile.rating, ride_type_name);
            publish(publisher.as_ref(), &event, timestamp).await;
        });
    }
}

fn publish_deadline() -> Duration {
    Duration::from_secs(EVENT_PUBLISH_TIMEOUT_SECS)
}

async fn rider_profile(riders: Option<&dyn RiderDirectory>, ride: &Ride) -> RiderProfile {
    let fallback = RiderProfile {
        name: DEFAULT_RIDER_NAME.to_string(),
        rating: DEFAULT_RIDER_RATING,
    };
    let Some(riders) = riders else {
        return fallback;
    };
    match riders.profile(ride.rider_id).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(rider_id = %ride.rider_id, "Rider lookup failed, using defaults: {}", e);
            fallback
        }
    }
}

async fn publish(
    publisher: &dyn EventPublisher,
    event: &RideEvent,
    timestamp: time::OffsetDateTime,
) {
    let envelope = match EventEnvelope::wrap(event, timestamp) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(ride_id = %event.ride_id(), "Failed to encode {}: {}", event.subject(), e);
            return;
        }
    };
    if let Err(e) = publisher.publish(event.subject(), &envelope).await {
        tracing::warn!(
            ride_id = %event.ride_id(),
            subject = event.subject(),
            "Event publication failed: {}",
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::event::RideStartedData;
    use crate::services::collaborators::ClientError;
    use std::sync::Mutex;
    use time::macros::datetime;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, EventEnvelope)>>,
    }

    #[async_trait]
    impl EventPublisher for Recorder {
        async fn publish(&self, subject: &str, envelope: &EventEnvelope) -> ClientResult<()> {
            self.seen
                .lock()
                .unwrap()
                .push((subject.to_string(), envelope.clone()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventPublisher for Failing {
        async fn publish(&self, _: &str, _: &EventEnvelope) -> ClientResult<()> {
            Err(ClientError::Timeout(5000))
        }
    }

    fn events(publisher: Arc<dyn EventPublisher>) -> RideEvents {
        RideEvents::new(
            publisher,
            None,
            BackgroundTasks::new(4),
            Arc::new(FixedClock::new(datetime!(2026-03-01 14:00 UTC))),
        )
    }

    #[tokio::test]
    async fn test_emit_wraps_and_publishes() {
        let recorder = Arc::new(Recorder::default());
        let events = events(recorder.clone());
        let ride_id = Uuid::new_v4();

        events.emit(RideEvent::Started(RideStartedData {
            ride_id,
            rider_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            started_at: datetime!(2026-03-01 14:00 UTC),
        }));
        events.tasks().settle().await;

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "ride.started");
        assert_eq!(seen[0].1.timestamp, datetime!(2026-03-01 14:00 UTC));
        assert_eq!(seen[0].1.data["ride_id"], ride_id.to_string());
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let events = events(Arc::new(Failing));
        events.emit(RideEvent::Started(RideStartedData {
            ride_id: Uuid::new_v4(),
            rider_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            started_at: datetime!(2026-03-01 14:00 UTC),
        }));
        events.tasks().shutdown().await;
    }
}
