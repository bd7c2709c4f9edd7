//! Consecutive-failure circuit breaker for flaky collaborators.
//!
//! Closed until `failure_threshold` calls in a row fail, then open for
//! `reset_timeout`. After that a single probe is let through (half-open): a
//! success closes the breaker, a failure opens it again. An open breaker
//! answers with [`ClientError::CircuitOpen`] without calling the service.

use crate::config::BreakerConfig;
use crate::models::Coordinates;
use crate::services::collaborators::*;
use crate::services::pricing::FareQuote;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        CircuitBreaker {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    pub async fn call<T, F>(&self, operation: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        self.admit()?;
        let mut pending = PendingCall {
            breaker: self,
            settled: false,
        };
        let result = operation.await;
        pending.settled = true;
        self.record(result.is_ok());
        result
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open {
            let elapsed = inner
                .opened_at
                .map(|at| at.elapsed() >= self.config.reset_timeout)
                .unwrap_or(true);
            if elapsed {
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = false;
            }
        }
    }

    fn admit(&self) -> ClientResult<()> {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                Ok(())
            }
            _ => Err(ClientError::CircuitOpen(self.name)),
        }
    }

    fn record(&self, success: bool) {
        let mut inner = self.lock();
        if success {
            if inner.state != CircuitState::Closed {
                tracing::info!(breaker = self.name, "Circuit closed");
            }
            inner.state = CircuitState::Closed;
            inner.consecutive_failures = 0;
            inner.opened_at = None;
            inner.probe_in_flight = false;
            return;
        }

        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let trip = inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold;
        if trip {
            tracing::warn!(
                breaker = self.name,
                failures = inner.consecutive_failures,
                "Circuit opened after {} consecutive failures",
                inner.consecutive_failures
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.probe_in_flight = false;
        }
    }
}

/// Counts a call dropped mid-flight as a failure so a half-open probe
/// cannot stay in flight forever.
struct PendingCall<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record(false);
        }
    }
}

/// A collaborator whose every call goes through a [`CircuitBreaker`].
pub struct Guarded<T> {
    inner: T,
    breaker: CircuitBreaker,
}

impl<T> Guarded<T> {
    pub fn new(inner: T, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<T: PricingEngine> PricingEngine for Guarded<T> {
    async fn calculate(&self, request: &PriceRequest) -> ClientResult<FareQuote> {
        self.breaker.call(self.inner.calculate(request)).await
    }
}

#[async_trait]
impl<T: SurgeCalculator> SurgeCalculator for Guarded<T> {
    async fn multiplier(&self, at: &Coordinates) -> ClientResult<f64> {
        self.breaker.call(self.inner.multiplier(at)).await
    }
}

#[async_trait]
impl<T: EtaPredictor> EtaPredictor for Guarded<T> {
    async fn predict(
        &self,
        pickup: &Coordinates,
        dropoff: &Coordinates,
        context: &EtaContext,
    ) -> ClientResult<f64> {
        self.breaker
            .call(self.inner.predict(pickup, dropoff, context))
            .await
    }
}

#[async_trait]
impl<T: PromoValidator> PromoValidator for Guarded<T> {
    async fn validate(&self, code: &str, rider_id: Uuid, amount: f64) -> ClientResult<PromoOutcome> {
        self.breaker
            .call(self.inner.validate(code, rider_id, amount))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn breaker(reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold: 3,
                reset_timeout: reset,
            },
        )
    }

    async fn fail() -> ClientResult<()> {
        Err(ClientError::Timeout(1))
    }

    async fn succeed() -> ClientResult<()> {
        Ok(())
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let cb = breaker(Duration::from_secs(60));
        for _ in 0..2 {
            assert!(cb.call(fail()).await.is_err());
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.call(fail()).await.is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        let calls = AtomicU32::new(0);
        let result = cb
            .call(async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ClientError>(())
            })
            .await;
        assert!(matches!(result, Err(ClientError::CircuitOpen("test"))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = breaker(Duration::from_secs(60));
        assert!(cb.call(fail()).await.is_err());
        assert!(cb.call(fail()).await.is_err());
        assert!(cb.call(succeed()).await.is_ok());
        assert!(cb.call(fail()).await.is_err());
        assert!(cb.call(fail()).await.is_err());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_probe() {
        let cb = breaker(Duration::from_millis(20));
        for _ in 0..3 {
            let _ = cb.call(fail()).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.call(fail()).await.is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cb.call(succeed()).await.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
