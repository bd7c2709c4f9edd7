use crate::error::Result;
use crate::models::ride::CompleteRideRequest;
use crate::models::{CallerIdentity, Ride, Role};
use crate::routes::{json_body, ok, ride_id, Envelope};
use crate::services::ride_service::RideCompletion;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use std::sync::Arc;

/// GET /driver/rides/available - open requests, oldest first
pub async fn available_rides(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
) -> Result<Json<Envelope<Vec<Ride>>>> {
    caller.require(Role::Driver)?;
    Ok(ok(state.rides.list_available().await?))
}

/// POST /driver/rides/{id}/accept
pub async fn accept_ride(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Ride>>> {
    let ride = state.rides.accept_ride(&caller, ride_id(&id)?).await?;
    Ok(ok(ride))
}

/// POST /driver/rides/{id}/start
pub async fn start_ride(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Ride>>> {
    let ride = state.rides.start_ride(&caller, ride_id(&id)?).await?;
    Ok(ok(ride))
}

/// POST /driver/rides/{id}/complete
pub async fn complete_ride(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: std::result::Result<Json<CompleteRideRequest>, JsonRejection>,
) -> Result<Json<Envelope<RideCompletion>>> {
    let ride_id = ride_id(&id)?;
    let request = json_body(body)?;
    let completion = state.rides.complete_ride(&caller, ride_id, request).await?;
    Ok(ok(completion))
}
