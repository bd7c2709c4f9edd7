use crate::error::{AppError, Result};
use crate::models::ride::{CancelRideRequest, RateRideRequest};
use crate::models::{
    CallerIdentity, Coordinates, DriverCandidate, Ride, RideFilters, RidePage, RideRequest,
    RideStatus, Role,
};
use crate::routes::{json_body, ok, query, ride_id, Envelope};
use crate::services::ride_service::SurgeInfo;
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl HistoryQuery {
    pub fn filters(&self) -> Result<RideFilters> {
        let status = self
            .status
            .as_deref()
            .map(|s| s.parse::<RideStatus>())
            .transpose()
            .map_err(AppError::Validation)?;
        Ok(RideFilters {
            status,
            start_date: parse_date("start_date", self.start_date.as_deref())?,
            end_date: parse_date("end_date", self.end_date.as_deref())?,
        })
    }
}

fn parse_date(field: &str, value: Option<&str>) -> Result<Option<OffsetDateTime>> {
    value
        .map(|v| {
            OffsetDateTime::parse(v, &Rfc3339).map_err(|_| {
                AppError::Validation(format!("{} must be an RFC 3339 timestamp", field))
            })
        })
        .transpose()
}

#[derive(Debug, Deserialize)]
pub struct CoordinateQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl CoordinateQuery {
    pub fn coordinates(&self) -> Result<Coordinates> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Coordinates::new(lat, lon).map_err(AppError::Validation),
            _ => Err(AppError::Validation("lat and lon are required".to_string())),
        }
    }
}

/// POST /rides
pub async fn request_ride(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    body: std::result::Result<Json<RideRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Ride>>)> {
    let request = json_body(body)?;
    let ride = state.rides.request_ride(&caller, request).await?;
    Ok((StatusCode::CREATED, ok(ride)))
}

/// GET /rides - the caller's own history, as rider or as driver
pub async fn list_rides(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    params: std::result::Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Envelope<RidePage>>> {
    let params = query(params)?;
    let filters = params.filters()?;

    let page = match caller.role {
        Role::Rider => {
            state
                .rides
                .list_rider_rides(caller.user_id, &filters, params.page, params.per_page)
                .await?
        }
        Role::Driver => {
            state
                .rides
                .list_driver_rides(caller.user_id, &filters, params.page, params.per_page)
                .await?
        }
        Role::Admin => {
            return Err(AppError::Forbidden(
                "ride history is available to riders and drivers".to_string(),
            ))
        }
    };
    Ok(ok(page))
}

/// GET /rides/{id}
pub async fn get_ride(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Ride>>> {
    let ride = state.rides.get_ride(&caller, ride_id(&id)?).await?;
    Ok(ok(ride))
}

/// POST /rides/{id}/cancel - body is optional
pub async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Option<Json<CancelRideRequest>>,
) -> Result<Json<Envelope<Ride>>> {
    let ride_id = ride_id(&id)?;
    let reason = body.and_then(|Json(b)| b.reason);
    let ride = state.rides.cancel_ride(&caller, ride_id, reason).await?;
    Ok(ok(ride))
}

/// POST /rides/{id}/rate
pub async fn rate_ride(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: std::result::Result<Json<RateRideRequest>, JsonRejection>,
) -> Result<Json<Envelope<Ride>>> {
    let ride_id = ride_id(&id)?;
    let request = json_body(body)?;
    let ride = state.rides.rate_ride(&caller, ride_id, request).await?;
    Ok(ok(ride))
}

/// GET /rides/surge-info?lat&lon
pub async fn surge_info(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<CoordinateQuery>, QueryRejection>,
) -> Result<Json<Envelope<SurgeInfo>>> {
    let at = query(params)?.coordinates()?;
    Ok(ok(state.rides.surge_info(&at).await))
}

/// GET /rides/match-drivers?lat&lon
pub async fn match_drivers(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<CoordinateQuery>, QueryRejection>,
) -> Result<Json<Envelope<Vec<DriverCandidate>>>> {
    let pickup = query(params)?.coordinates()?;
    let matcher = state
        .matcher
        .as_ref()
        .ok_or_else(|| AppError::Internal("driver matching not configured".to_string()))?;

    let drivers = matcher.find_best_drivers(&pickup).await?;
    tracing::info!(
        lat = pickup.lat,
        lon = pickup.lon,
        matched = drivers.len(),
        "Driver match request"
    );
    Ok(ok(drivers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_filters() {
        let q = HistoryQuery {
            status: Some("completed".to_string()),
            start_date: Some("2026-03-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        let filters = q.filters().unwrap();
        assert_eq!(filters.status, Some(RideStatus::Completed));
        assert!(filters.start_date.is_some());
        assert!(filters.end_date.is_none());

        let bad = HistoryQuery {
            end_date: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad.filters(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_coordinate_query_requires_both() {
        let q = CoordinateQuery {
            lat: Some(40.7),
            lon: None,
        };
        assert!(q.coordinates().is_err());

        let q = CoordinateQuery {
            lat: Some(95.0),
            lon: Some(0.0),
        };
        assert!(q.coordinates().is_err());
    }
}
