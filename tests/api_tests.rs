use async_trait::async_trait;
use axum::http::StatusCode;
use rideflow::config::MatcherConfig;
use rideflow::db::RideStore;
use rideflow::models::{
    CallerIdentity, Coordinates, DriverCandidate, DriverMatchStats, Role,
};
use rideflow::services::{Collaborators, DriverDataProvider, Matcher};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

mod common;

use common::{ride_request_body, test_app, test_app_with, TestApp};

async fn request_ride(app: &TestApp, rider: Uuid) -> Value {
    let (status, body) = app
        .send(
            "POST",
            "/rides",
            Some(CallerIdentity::rider(rider)),
            Some(ride_request_body()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"].clone()
}

fn ride_uri(ride: &Value, action: &str) -> String {
    format!("/driver/rides/{}/{}", ride["id"].as_str().unwrap(), action)
}

#[tokio::test]
async fn test_health_check_endpoint() {
    let app = test_app();
    let (status, json) = app.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["checks"]["database"], "memory");
    assert_eq!(json["checks"]["matcher"], false);
}

#[tokio::test]
async fn test_request_ride_endpoint() {
    let app = test_app();
    let rider = Uuid::new_v4();
    let (status, json) = app
        .send(
            "POST",
            "/rides",
            Some(CallerIdentity::rider(rider)),
            Some(ride_request_body()),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    let ride = &json["data"];
    assert_eq!(ride["status"], "REQUESTED");
    assert_eq!(ride["rider_id"], rider.to_string());
    assert_eq!(ride["estimated_distance_km"], 5.31);
    assert_eq!(ride["estimated_duration_min"], 8);
    assert_eq!(ride["estimated_fare"], 9.97);
    assert_eq!(ride["surge_multiplier"], 1.0);

    assert_eq!(app.subjects().await, vec!["ride.requested".to_string()]);
}

#[tokio::test]
async fn test_request_ride_endpoint_validation() {
    let app = test_app();
    let rider = Some(CallerIdentity::rider(Uuid::new_v4()));

    let (status, json) = app.send("POST", "/rides", None, Some(ride_request_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "UNAUTHORIZED");

    let (status, json) = app
        .send(
            "POST",
            "/rides",
            rider,
            Some(json!({"pickup": {"lat": 40.7, "lon": -74.0}})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION");

    let mut body = ride_request_body();
    body["dropoff"]["lon"] = json!(-190.0);
    let (status, _) = app.send("POST", "/rides", rider, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_accept_endpoint() {
    let app = test_app();
    let ride = request_ride(&app, Uuid::new_v4()).await;
    let uri = ride_uri(&ride, "accept");

    let d1 = CallerIdentity::driver(Uuid::new_v4());
    let d2 = CallerIdentity::driver(Uuid::new_v4());
    let (r1, r2) = tokio::join!(
        app.send("POST", &uri, Some(d1), None),
        app.send("POST", &uri, Some(d2), None)
    );

    let mut statuses = vec![r1.0, r2.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);

    let (winner, loser) = if r1.0 == StatusCode::OK { (r1, r2) } else { (r2, r1) };
    assert_eq!(winner.1["data"]["status"], "ACCEPTED");
    assert_eq!(loser.1["error"]["code"], "CONFLICT");
    assert_eq!(loser.1["error"]["message"], "ride not available");

    let stored = tokio_test::assert_ok!(
        app.store
            .get(Uuid::parse_str(ride["id"].as_str().unwrap()).unwrap())
            .await
    );
    assert_eq!(
        stored.driver_id.map(|d| d.to_string()),
        winner.1["data"]["driver_id"].as_str().map(str::to_string)
    );
}

#[tokio::test]
async fn test_start_by_wrong_driver_is_rejected() {
    let app = test_app();
    let ride = request_ride(&app, Uuid::new_v4()).await;
    let driver = CallerIdentity::driver(Uuid::new_v4());
    let (status, _) = app.send("POST", &ride_uri(&ride, "accept"), Some(driver), None).await;
    assert_eq!(status, StatusCode::OK);

    let other = CallerIdentity::driver(Uuid::new_v4());
    let (status, json) = app.send("POST", &ride_uri(&ride, "start"), Some(other), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["message"], "unauthorized driver");

    let id = ride["id"].as_str().unwrap();
    let (_, json) = app
        .send("GET", &format!("/rides/{}", id), Some(driver), None)
        .await;
    assert_eq!(json["data"]["status"], "ACCEPTED");
    assert!(json["data"]["started_at"].is_null());
}

#[tokio::test]
async fn test_complete_and_rate_endpoints() {
    let app = test_app();
    let rider_id = Uuid::new_v4();
    let rider = CallerIdentity::rider(rider_id);
    let driver = CallerIdentity::driver(Uuid::new_v4());
    let ride = request_ride(&app, rider_id).await;
    let id = ride["id"].as_str().unwrap().to_string();

    app.send("POST", &ride_uri(&ride, "accept"), Some(driver), None).await;
    app.send("POST", &ride_uri(&ride, "start"), Some(driver), None).await;
    app.clock.advance(time::Duration::minutes(10));

    let (status, json) = app
        .send(
            "POST",
            &ride_uri(&ride, "complete"),
            Some(driver),
            Some(json!({"actual_distance_km": 12.5})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["data"]["status"], "COMPLETED");
    assert_eq!(json["data"]["final_fare"], 21.25);
    assert_eq!(json["data"]["actual_duration_min"], 10);
    assert_eq!(json["data"]["driver_earnings"], 17.0);

    let (status, json) = app
        .send(
            "POST",
            &ride_uri(&ride, "complete"),
            Some(driver),
            Some(json!({"actual_distance_km": 12.5})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "CONFLICT");

    let rate_uri = format!("/rides/{}/rate", id);
    let (status, json) = app
        .send("POST", &rate_uri, Some(rider), Some(json!({"rating": 0})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["message"], "rating must be between 1 and 5");

    let (status, json) = app
        .send(
            "POST",
            &rate_uri,
            Some(rider),
            Some(json!({"rating": 5, "feedback": "smooth"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["rating"], 5);

    let completed = app
        .published()
        .await
        .into_iter()
        .find(|(s, _)| s == "ride.completed")
        .map(|(_, e)| e.data)
        .unwrap();
    assert_eq!(completed["fare_amount"], 21.25);
    assert_eq!(completed["driver_earnings"], 17.0);
}

#[tokio::test]
async fn test_cancel_endpoint() {
    let app = test_app();
    let rider_id = Uuid::new_v4();
    let ride = request_ride(&app, rider_id).await;
    let uri = format!("/rides/{}/cancel", ride["id"].as_str().unwrap());

    let (status, _) = app
        .send("POST", &uri, Some(CallerIdentity::rider(Uuid::new_v4())), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = app
        .send(
            "POST",
            &uri,
            Some(CallerIdentity::rider(rider_id)),
            Some(json!({"reason": "driver too far"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "CANCELLED");
    assert_eq!(json["data"]["cancellation_reason"], "driver too far");

    let (status, _) = app
        .send("POST", &uri, Some(CallerIdentity::rider(rider_id)), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_ride_errors() {
    let app = test_app();
    let rider = Some(CallerIdentity::rider(Uuid::new_v4()));

    let (status, json) = app.send("GET", "/rides/not-a-uuid", rider, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION");

    let (status, json) = app
        .send("GET", &format!("/rides/{}", Uuid::new_v4()), rider, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_history_endpoint() {
    let app = test_app();
    let rider_id = Uuid::new_v4();
    for _ in 0..3 {
        request_ride(&app, rider_id).await;
    }

    let (status, json) = app
        .send(
            "GET",
            "/rides?page=1&per_page=2&status=REQUESTED",
            Some(CallerIdentity::rider(rider_id)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 3);
    assert_eq!(json["data"]["rides"].as_array().unwrap().len(), 2);
    assert_eq!(json["data"]["per_page"], 2);

    let (status, json) = app
        .send(
            "GET",
            "/rides",
            Some(CallerIdentity::driver(Uuid::new_v4())),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 0);

    let admin = CallerIdentity::new(Uuid::new_v4(), Role::Admin);
    let (status, json) = app.send("GET", "/rides", Some(admin), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "FORBIDDEN");

    let (status, _) = app
        .send("GET", "/rides?status=LOST", Some(CallerIdentity::rider(rider_id)), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_available_rides_endpoint() {
    let app = test_app();
    let first = request_ride(&app, Uuid::new_v4()).await;
    app.clock.advance(time::Duration::seconds(30));
    request_ride(&app, Uuid::new_v4()).await;

    let driver = Some(CallerIdentity::driver(Uuid::new_v4()));
    let (status, json) = app.send("GET", "/driver/rides/available", driver, None).await;
    assert_eq!(status, StatusCode::OK);
    let rides = json["data"].as_array().unwrap();
    assert_eq!(rides.len(), 2);
    assert_eq!(rides[0]["id"], first["id"]);

    let (status, _) = app
        .send(
            "GET",
            "/driver/rides/available",
            Some(CallerIdentity::rider(Uuid::new_v4())),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_surge_info_endpoint() {
    let app = test_app();

    let (status, json) = app
        .send("GET", "/rides/surge-info?lat=40.7128&lon=-74.0060", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["multiplier"], 1.0);
    assert_eq!(json["data"]["source"], "time_of_day");

    let (status, _) = app.send("GET", "/rides/surge-info?lat=40.7", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send("GET", "/rides/surge-info?lat=abc&lon=1", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

struct ScenarioDrivers;

#[async_trait]
impl DriverDataProvider for ScenarioDrivers {
    async fn nearby_candidates(
        &self,
        _pickup: &Coordinates,
        _max_distance_km: f64,
        _limit: usize,
    ) -> rideflow::Result<Vec<DriverCandidate>> {
        let stats = |rating, acceptance_rate, idle_minutes| DriverMatchStats {
            rating,
            acceptance_rate,
            idle_minutes,
        };
        Ok(vec![
            DriverCandidate::new(Uuid::from_u128(1), 0.5, stats(2.0, 0.5, 5.0)),
            DriverCandidate::new(Uuid::from_u128(2), 5.0, stats(5.0, 0.95, 30.0)),
            DriverCandidate::new(Uuid::from_u128(3), 2.0, stats(4.5, 0.85, 15.0)),
        ])
    }
}

#[tokio::test]
async fn test_match_drivers_endpoint() {
    let app = test_app();
    let (status, json) = app
        .send("GET", "/rides/match-drivers?lat=40.7128&lon=-74.0060", None, None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["message"], "internal server error");

    let matcher = Matcher::new(Arc::new(ScenarioDrivers), MatcherConfig::default());
    let app = test_app_with(Collaborators::default(), Some(matcher));

    let (status, _) = app
        .send("GET", "/rides/match-drivers?lon=-74.0060", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = app
        .send("GET", "/rides/match-drivers?lat=40.7128&lon=-74.0060", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let ranked = json["data"].as_array().unwrap();
    let ids: Vec<_> = ranked.iter().map(|c| c["driver_id"].clone()).collect();
    assert_eq!(
        ids,
        vec![
            json!(Uuid::from_u128(3)),
            json!(Uuid::from_u128(1)),
            json!(Uuid::from_u128(2))
        ]
    );
    assert_eq!(ranked[0]["score"], 0.75);
    assert_eq!(ranked[1]["score"], 0.601);
    assert_eq!(ranked[2]["score"], 0.59);
}
