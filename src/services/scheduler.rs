use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::db::RideStore;
use crate::error::Result;
use crate::models::Ride;
use crate::services::collaborators::Notifier;
use crate::services::events::RideEvents;
use std::sync::Arc;
use time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// What one tick did, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub activated: usize,
    pub reminded: usize,
    pub failed: usize,
}

/// Promotes scheduled rides into the live pool shortly before their time and
/// sends one reminder to the rider before that.
///
/// Both actions go through guarded store writes, so several workers (or a
/// worker racing the request path) never activate or remind twice.
pub struct ScheduledRideWorker {
    store: Arc<dyn RideStore>,
    events: RideEvents,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl ScheduledRideWorker {
    pub fn new(
        store: Arc<dyn RideStore>,
        events: RideEvents,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        ScheduledRideWorker {
            store,
            events,
            notifier,
            clock,
            config,
        }
    }

    /// Tick until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            tick_secs = self.config.tick.as_secs(),
            lookahead_minutes = self.config.lookahead_minutes,
            "Scheduled ride worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Scheduled ride worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(summary) if summary != TickSummary::default() => {
                            tracing::info!(
                                activated = summary.activated,
                                reminded = summary.reminded,
                                failed = summary.failed,
                                "Scheduled ride tick"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!("Scheduled ride tick failed: {}", e),
                    }
                }
            }
        }
    }

    pub async fn tick(&self) -> Result<TickSummary> {
        let upcoming = self
            .store
            .list_upcoming_scheduled(self.config.lookahead_minutes)
            .await?;

        let mut summary = TickSummary::default();
        for ride in upcoming {
            match self.process(&ride).await {
                Ok(Action::Activated) => summary.activated += 1,
                Ok(Action::Reminded) => summary.reminded += 1,
                Ok(Action::Nothing) => {}
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(ride_id = %ride.id, "Scheduled ride processing failed: {}", e);
                }
            }
        }
        Ok(summary)
    }

    async fn process(&self, ride: &Ride) -> Result<Action> {
        let Some(scheduled_at) = ride.scheduled_at else {
            return Ok(Action::Nothing);
        };
        let until = scheduled_at - self.clock.now();

        if until <= Duration::minutes(self.config.activation_minutes) {
            if !self.store.activate_scheduled(ride.id).await? {
                return Ok(Action::Nothing);
            }
            let activated = self.store.get(ride.id).await?;
            tracing::info!(ride_id = %ride.id, rider_id = %ride.rider_id, "Scheduled ride activated");
            self.events.emit_requested(activated, None);
            return Ok(Action::Activated);
        }

        if ride.reminder_sent || !self.store.mark_reminder_sent(ride.id).await? {
            return Ok(Action::Nothing);
        }
        if let Err(e) = self.notifier.scheduled_ride_reminder(ride).await {
            tracing::warn!(ride_id = %ride.id, "Reminder delivery failed: {}", e);
        }
        Ok(Action::Reminded)
    }
}

enum Action {
    Activated,
    Reminded,
    Nothing,
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
