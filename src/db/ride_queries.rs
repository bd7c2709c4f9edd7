use crate::constants::DRIVER_STATS_WINDOW_DAYS;
use crate::models::{DriverMatchStats, Ride, RideFilters, RideStatus};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use super::ride_repository::RideRow;

const RIDE_COLUMNS: &str = "id, rider_id, driver_id, status,
    pickup_lat, pickup_lon, pickup_address, dropoff_lat, dropoff_lon, dropoff_address,
    estimated_distance_km, estimated_duration_min, estimated_fare, surge_multiplier, currency,
    ride_type_id, promo_id, discount_amount, pricing_version,
    actual_distance_km, actual_duration_min, final_fare,
    requested_at, accepted_at, started_at, completed_at, cancelled_at, cancellation_reason,
    rating, feedback, is_scheduled, scheduled_at, reminder_sent,
    country, region, city, pickup_zone, dropoff_zone, created_at, updated_at";

/// Whose rides a history query returns.
pub enum Participant {
    Rider(Uuid),
    Driver(Uuid),
}

pub async fn insert_ride(
    pool: &PgPool,
    ride: &Ride,
) -> Result<(OffsetDateTime, OffsetDateTime), sqlx::Error> {
    sqlx::query_as(
        r#"
        INSERT INTO rides (
            id, rider_id, status,
            pickup_lat, pickup_lon, pickup_address, dropoff_lat, dropoff_lon, dropoff_address,
            estimated_distance_km, estimated_duration_min, estimated_fare, surge_multiplier,
            currency, ride_type_id, promo_id, discount_amount, pricing_version,
            requested_at, is_scheduled, scheduled_at,
            country, region, city, pickup_zone, dropoff_zone
        )
        VALUES ($1, $2, 'REQUESTED', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
        RETURNING created_at, updated_at
        "#,
    )
    .bind(ride.id)
    .bind(ride.rider_id)
    .bind(ride.pickup.lat)
    .bind(ride.pickup.lon)
    .bind(&ride.pickup_address)
    .bind(ride.dropoff.lat)
    .bind(ride.dropoff.lon)
    .bind(&ride.dropoff_address)
    .bind(ride.estimated_distance_km)
    .bind(ride.estimated_duration_min)
    .bind(ride.estimated_fare)
    .bind(ride.surge_multiplier)
    .bind(&ride.currency)
    .bind(ride.ride_type_id)
    .bind(ride.promo_id)
    .bind(ride.discount_amount)
    .bind(&ride.pricing_version)
    .bind(ride.requested_at)
    .bind(ride.is_scheduled)
    .bind(ride.scheduled_at)
    .bind(&ride.geo.country)
    .bind(&ride.geo.region)
    .bind(&ride.geo.city)
    .bind(&ride.geo.pickup_zone)
    .bind(&ride.geo.dropoff_zone)
    .fetch_one(pool)
    .await
}

pub(super) async fn find_ride(
    pool: &PgPool,
    ride_id: Uuid,
) -> Result<Option<RideRow>, sqlx::Error> {
    let sql = format!("SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1");
    sqlx::query_as::<_, RideRow>(&sql)
        .bind(ride_id)
        .fetch_optional(pool)
        .await
}

/// The only write that assigns a driver. Zero rows means someone else won.
pub async fn accept_ride(
    pool: &PgPool,
    ride_id: Uuid,
    driver_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE rides
        SET status = 'ACCEPTED', driver_id = $2, accepted_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'REQUESTED'
        "#,
    )
    .bind(ride_id)
    .bind(driver_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn set_status(
    pool: &PgPool,
    ride_id: Uuid,
    status: RideStatus,
    driver_id: Option<Uuid>,
    reason: Option<&str>,
) -> Result<bool, sqlx::Error> {
    // COALESCE keeps an already assigned driver; a cancel never clears it.
    let query = match status {
        RideStatus::InProgress => sqlx::query(
            "UPDATE rides
             SET status = 'IN_PROGRESS', started_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND status = 'ACCEPTED' AND driver_id = $2",
        )
        .bind(ride_id)
        .bind(driver_id),
        _ => sqlx::query(
            "UPDATE rides
             SET status = $2, driver_id = COALESCE(driver_id, $3),
                 cancelled_at = NOW(), cancellation_reason = $4, updated_at = NOW()
             WHERE id = $1 AND status IN ('REQUESTED', 'ACCEPTED', 'IN_PROGRESS')",
        )
        .bind(ride_id)
        .bind(status.as_str())
        .bind(driver_id)
        .bind(reason),
    };

    let result = query.execute(pool).await?;

    Ok(result.rows_affected() == 1)
}

pub async fn complete_ride(
    pool: &PgPool,
    ride_id: Uuid,
    driver_id: Uuid,
    actual_distance_km: f64,
    actual_duration_min: i32,
    final_fare: f64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE rides
        SET status = 'COMPLETED', actual_distance_km = $3, actual_duration_min = $4,
            final_fare = $5, completed_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'IN_PROGRESS' AND driver_id = $2
        "#,
    )
    .bind(ride_id)
    .bind(driver_id)
    .bind(actual_distance_km)
    .bind(actual_duration_min)
    .bind(final_fare)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn set_rating(
    pool: &PgPool,
    ride_id: Uuid,
    rating: i16,
    feedback: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE rides SET rating = $2, feedback = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(ride_id)
    .bind(rating)
    .bind(feedback)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

fn push_history_filters<'a>(
    builder: &mut QueryBuilder<'a, Postgres>,
    participant: &Participant,
    filters: &RideFilters,
) {
    match participant {
        Participant::Rider(id) => builder.push(" WHERE rider_id = ").push_bind(*id),
        Participant::Driver(id) => builder.push(" WHERE driver_id = ").push_bind(*id),
    };
    if let Some(status) = filters.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(start) = filters.start_date {
        builder.push(" AND requested_at >= ").push_bind(start);
    }
    if let Some(end) = filters.end_date {
        builder.push(" AND requested_at <= ").push_bind(end);
    }
}

pub(super) async fn list_rides(
    pool: &PgPool,
    participant: Participant,
    filters: &RideFilters,
    limit: i64,
    offset: i64,
) -> Result<(Vec<RideRow>, i64), sqlx::Error> {
    let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM rides");
    push_history_filters(&mut count_query, &participant, filters);
    let total = count_query
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await?;

    let mut rows_query =
        QueryBuilder::<Postgres>::new(format!("SELECT {RIDE_COLUMNS} FROM rides"));
    push_history_filters(&mut rows_query, &participant, filters);
    rows_query
        .push(" ORDER BY requested_at DESC, id LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = rows_query.build_query_as::<RideRow>().fetch_all(pool).await?;
    Ok((rows, total))
}

pub(super) async fn list_pending(pool: &PgPool) -> Result<Vec<RideRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {RIDE_COLUMNS} FROM rides
         WHERE status = 'REQUESTED' AND NOT is_scheduled
         ORDER BY requested_at ASC, created_at ASC"
    );
    sqlx::query_as::<_, RideRow>(&sql).fetch_all(pool).await
}

#[derive(sqlx::FromRow)]
struct DriverStatsRow {
    driver_id: Uuid,
    avg_rating: Option<f64>,
    acceptance_rate: Option<f64>,
    idle_minutes: Option<f64>,
}

pub async fn driver_match_stats(
    pool: &PgPool,
    driver_ids: &[Uuid],
) -> Result<HashMap<Uuid, DriverMatchStats>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DriverStatsRow>(
        r#"
        SELECT
            driver_id,
            AVG(rating)::float8 AS avg_rating,
            (COUNT(*) FILTER (WHERE status = 'COMPLETED'))::float8
                / NULLIF(COUNT(*), 0)::float8 AS acceptance_rate,
            (EXTRACT(EPOCH FROM (NOW() - MAX(completed_at))) / 60.0)::float8 AS idle_minutes
        FROM rides
        WHERE driver_id = ANY($1)
          AND requested_at >= NOW() - make_interval(days => $2)
        GROUP BY driver_id
        "#,
    )
    .bind(driver_ids)
    .bind(DRIVER_STATS_WINDOW_DAYS as i32)
    .fetch_all(pool)
    .await?;

    let defaults = DriverMatchStats::default();
    Ok(rows
        .into_iter()
        .map(|row| {
            (
                row.driver_id,
                DriverMatchStats {
                    rating: row.avg_rating.unwrap_or(defaults.rating),
                    acceptance_rate: row.acceptance_rate.unwrap_or(defaults.acceptance_rate),
                    idle_minutes: row.idle_minutes.unwrap_or(defaults.idle_minutes).max(0.0),
                },
            )
        })
        .collect())
}

pub(super) async fn list_upcoming_scheduled(
    pool: &PgPool,
    minutes_ahead: i64,
) -> Result<Vec<RideRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {RIDE_COLUMNS} FROM rides
         WHERE is_scheduled AND status = 'REQUESTED'
           AND scheduled_at > NOW()
           AND scheduled_at <= NOW() + make_interval(mins => $1)
         ORDER BY scheduled_at ASC"
    );
    sqlx::query_as::<_, RideRow>(&sql)
        .bind(minutes_ahead as i32)
        .fetch_all(pool)
        .await
}

pub async fn activate_scheduled(pool: &PgPool, ride_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE rides
        SET is_scheduled = FALSE, requested_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND is_scheduled AND status = 'REQUESTED'
        "#,
    )
    .bind(ride_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn mark_reminder_sent(pool: &PgPool, ride_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE rides SET reminder_sent = TRUE, updated_at = NOW()
         WHERE id = $1 AND NOT reminder_sent",
    )
    .bind(ride_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
