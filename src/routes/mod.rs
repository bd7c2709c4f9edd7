pub mod auth;
pub mod driver;
pub mod health;
pub mod rides;

use crate::error::{AppError, Result};
use crate::AppState;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/rides", post(rides::request_ride).get(rides::list_rides))
        .route("/rides/surge-info", get(rides::surge_info))
        .route("/rides/match-drivers", get(rides::match_drivers))
        .route("/rides/{id}", get(rides::get_ride))
        .route("/rides/{id}/cancel", post(rides::cancel_ride))
        .route("/rides/{id}/rate", post(rides::rate_ride))
        .route("/driver/rides/available", get(driver::available_rides))
        .route("/driver/rides/{id}/accept", post(driver::accept_ride))
        .route("/driver/rides/{id}/start", post(driver::start_ride))
        .route("/driver/rides/{id}/complete", post(driver::complete_ride))
        .route("/health", get(health::health_check))
        .with_state(state)
}

/// Success half of the response envelope; errors render through `AppError`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

pub(crate) fn ride_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("invalid ride id: {}", raw)))
}

pub(crate) fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|e| AppError::Validation(format!("invalid request body: {}", e.body_text())))
}

pub(crate) fn query<T>(
    query: std::result::Result<axum::extract::Query<T>, QueryRejection>,
) -> Result<T> {
    query
        .map(|axum::extract::Query(value)| value)
        .map_err(|e| AppError::Validation(format!("invalid query: {}", e.body_text())))
}
