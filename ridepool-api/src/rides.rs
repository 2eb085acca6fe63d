use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use ridepool_domain::Ride;
use ridepool_engine::{EngineError, NewRide, RideFilter};

use crate::auth;
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/rides", post(create_ride).get(list_rides))
        .route("/api/rides/search", get(search_rides))
        .route("/api/rides/{id}", get(get_ride))
        .route("/api/rides/{id}/close", put(close_ride))
        .route("/api/rides/{id}/complete", put(complete_ride))
}

async fn create_ride(
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Json(req): Json<NewRide>,
) -> Result<(StatusCode, Json<Ride>), AppError> {
    let driver_id = auth::verify_bearer(&state.auth, &bearer)?;
    let ride = state.coordinator.create_ride(driver_id, req).await?;
    Ok((StatusCode::CREATED, Json(ride)))
}

async fn list_rides(State(state): State<AppState>) -> Result<Json<Vec<Ride>>, AppError> {
    let rides = state.rides.list_open_rides().await?;
    Ok(Json(rides))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    origin: Option<String>,
    destination: Option<String>,
    departure_date: Option<NaiveDate>,
}

async fn search_rides(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Ride>>, AppError> {
    let filter = RideFilter {
        origin: params.origin,
        destination: params.destination,
        departure_date: params.departure_date,
    };
    let rides = state.rides.search_rides(&filter).await?;
    Ok(Json(rides))
}

async fn get_ride(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let ride = state
        .rides
        .get_ride(id)
        .await?
        .ok_or(EngineError::NotFound("ride"))?;
    Ok(Json(ride))
}

async fn close_ride(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Ride>, AppError> {
    let caller = auth::verify_bearer(&state.auth, &bearer)?;
    let ride = state.coordinator.close_ride(caller, id).await?;
    Ok(Json(ride))
}

#[derive(Debug, Deserialize)]
struct CompleteRideRequest {
    transaction_hash: String,
}

async fn complete_ride(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Json(req): Json<CompleteRideRequest>,
) -> Result<Json<Ride>, AppError> {
    let caller = auth::verify_bearer(&state.auth, &bearer)?;
    let ride = state
        .coordinator
        .complete_ride(caller, id, &req.transaction_hash)
        .await?;
    Ok(Json(ride))
}
