use crate::constants::HTTP_CLIENT_TIMEOUT_SECS;
use crate::models::{Coordinates, Ride};
use crate::services::collaborators::*;
use crate::services::pricing::FareQuote;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// JSON-over-HTTP plumbing shared by every collaborator client.
#[derive(Clone)]
pub struct ServiceClient {
    client: Client,
    base_url: String,
    name: &'static str,
}

impl ServiceClient {
    pub fn new(name: &'static str, base_url: impl Into<String>) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECS))
            .build()?;
        Ok(ServiceClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            name,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path))
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<reqwest::Response> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(
                service = self.name,
                status = %status,
                "{} returned HTTP {}: {}",
                self.name, status, body
            );
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    pub async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("{}: {}", self.name, e)))
    }

    pub async fn execute(&self, request: RequestBuilder) -> ClientResult<()> {
        self.send(request).await.map(|_| ())
    }
}

pub struct HttpPricingEngine {
    service: ServiceClient,
}

impl HttpPricingEngine {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Ok(Self {
            service: ServiceClient::new("pricing-engine", base_url)?,
        })
    }
}

#[async_trait]
impl PricingEngine for HttpPricingEngine {
    async fn calculate(&self, request: &PriceRequest) -> ClientResult<FareQuote> {
        let quote: FareQuote = self
            .service
            .json(self.service.post("/v1/pricing/calculate").json(request))
            .await?;
        if !quote.total_fare.is_finite() || quote.total_fare < 0.0 {
            return Err(ClientError::InvalidResponse(format!(
                "pricing-engine: fare {}",
                quote.total_fare
            )));
        }
        Ok(quote)
    }
}

pub struct HttpSurgeCalculator {
    service: ServiceClient,
}

impl HttpSurgeCalculator {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Ok(Self {
            service: ServiceClient::new("surge", base_url)?,
        })
    }
}

#[derive(Deserialize)]
struct SurgeResponse {
    multiplier: f64,
}

#[async_trait]
impl SurgeCalculator for HttpSurgeCalculator {
    async fn multiplier(&self, at: &Coordinates) -> ClientResult<f64> {
        let response: SurgeResponse = self
            .service
            .json(self.service.get("/v1/surge").query(&[("lat", at.lat), ("lon", at.lon)]))
            .await?;
        if !response.multiplier.is_finite() {
            return Err(ClientError::InvalidResponse(
                "surge: non-finite multiplier".to_string(),
            ));
        }
        Ok(response.multiplier.max(1.0))
    }
}

pub struct HttpEtaPredictor {
    service: ServiceClient,
}

impl HttpEtaPredictor {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Ok(Self {
            service: ServiceClient::new("ml-eta", base_url)?,
        })
    }
}

#[derive(Serialize)]
struct EtaRequest<'a> {
    pickup: &'a Coordinates,
    dropoff: &'a Coordinates,
    context: &'a EtaContext,
}

#[derive(Deserialize)]
struct EtaResponse {
    minutes: f64,
}

#[async_trait]
impl EtaPredictor for HttpEtaPredictor {
    async fn predict(
        &self,
        pickup: &Coordinates,
        dropoff: &Coordinates,
        context: &EtaContext,
    ) -> ClientResult<f64> {
        let body = EtaRequest {
            pickup,
            dropoff,
            context,
        };
        let response: EtaResponse = self
            .service
            .json(self.service.post("/v1/eta/predict").json(&body))
            .await?;
        Ok(response.minutes)
    }
}

pub struct HttpPromoValidator {
    service: ServiceClient,
}

impl HttpPromoValidator {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Ok(Self {
            service: ServiceClient::new("promo", base_url)?,
        })
    }
}

#[derive(Serialize)]
struct PromoRequest<'a> {
    code: &'a str,
    rider_id: Uuid,
    amount: f64,
}

#[async_trait]
impl PromoValidator for HttpPromoValidator {
    async fn validate(&self, code: &str, rider_id: Uuid, amount: f64) -> ClientResult<PromoOutcome> {
        let body = PromoRequest {
            code,
            rider_id,
            amount,
        };
        self.service
            .json(self.service.post("/v1/promos/validate").json(&body))
            .await
    }
}

pub struct HttpLocationResolver {
    service: ServiceClient,
}

impl HttpLocationResolver {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Ok(Self {
            service: ServiceClient::new("location", base_url)?,
        })
    }
}

#[async_trait]
impl LocationResolver for HttpLocationResolver {
    async fn resolve(&self, at: &Coordinates) -> ClientResult<ResolvedLocation> {
        self.service
            .json(
                self.service
                    .get("/v1/locations/resolve")
                    .query(&[("lat", at.lat), ("lon", at.lon)]),
            )
            .await
    }
}

pub struct HttpRiderDirectory {
    service: ServiceClient,
}

impl HttpRiderDirectory {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Ok(Self {
            service: ServiceClient::new("rider-directory", base_url)?,
        })
    }
}

#[async_trait]
impl RiderDirectory for HttpRiderDirectory {
    async fn profile(&self, rider_id: Uuid) -> ClientResult<RiderProfile> {
        self.service
            .json(self.service.get(&format!("/v1/riders/{}", rider_id)))
            .await
    }
}

pub struct HttpNotifier {
    service: ServiceClient,
}

impl HttpNotifier {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Ok(Self {
            service: ServiceClient::new("notifications", base_url)?,
        })
    }
}

#[derive(Serialize)]
struct ReminderNotification<'a> {
    user_id: Uuid,
    kind: &'static str,
    ride_id: Uuid,
    pickup_address: &'a str,
    #[serde(with = "time::serde::rfc3339::option")]
    scheduled_at: Option<time::OffsetDateTime>,
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn scheduled_ride_reminder(&self, ride: &Ride) -> ClientResult<()> {
        let body = ReminderNotification {
            user_id: ride.rider_id,
            kind: "scheduled_ride_reminder",
            ride_id: ride.id,
            pickup_address: &ride.pickup_address,
            scheduled_at: ride.scheduled_at,
        };
        self.service
            .execute(self.service.post("/v1/notifications").json(&body))
            .await
    }
}

pub struct HttpDriverLocator {
    service: ServiceClient,
}

impl HttpDriverLocator {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Ok(Self {
            service: ServiceClient::new("driver-locator", base_url)?,
        })
    }
}

#[derive(Deserialize)]
struct NearbyDriversResponse {
    drivers: Vec<NearbyDriver>,
}

#[async_trait]
impl DriverLocator for HttpDriverLocator {
    async fn nearby(
        &self,
        at: &Coordinates,
        radius_km: f64,
        limit: usize,
    ) -> ClientResult<Vec<NearbyDriver>> {
        let request = self.service.get("/v1/drivers/nearby").query(&[
            ("lat", at.lat.to_string()),
            ("lon", at.lon.to_string()),
            ("radius_km", radius_km.to_string()),
            ("limit", limit.to_string()),
        ]);
        let response: NearbyDriversResponse = self.service.json(request).await?;
        Ok(response.drivers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let service = ServiceClient::new("test", "http://pricing.local/").unwrap();
        assert_eq!(service.url("/v1/x"), "http://pricing.local/v1/x");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_a_client_error() {
        // Port 9 (discard) is closed on test machines.
        let engine = HttpPricingEngine::new("http://127.0.0.1:9").unwrap();
        let request = PriceRequest {
            pickup: Coordinates::new(40.7128, -74.0060).unwrap(),
            dropoff: Coordinates::new(40.7580, -73.9855).unwrap(),
            distance_km: 5.31,
            duration_min: 8,
            ride_type_id: None,
            currency: "USD".to_string(),
        };
        assert!(matches!(
            engine.calculate(&request).await,
            Err(ClientError::Http(_))
        ));
    }
}
