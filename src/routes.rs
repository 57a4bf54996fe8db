//! REST API surface
//!
//! The realtime router's write paths exposed over HTTP, plus the full-state
//! fetches clients run right after (re)connecting. A room attach only
//! guarantees future delivery; these fetches supply the current state.

use crate::auth::AuthedUser;
use crate::error::ApiError;
use crate::handlers::events::{self, ResolveOutcome};
use crate::handlers::room::broadcast_to_room;
use crate::protocol::{PanicAlert, PanicRequest, RosterUser, ServerEvent};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/users", get(list_group_users))
        .route("/users/location", post(update_location))
        .route("/users/profile", put(update_profile))
        .route("/panic", get(list_panic_alerts).post(create_panic_alert))
        .route("/panic/:id/resolve", put(resolve_panic_alert))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "OK", "message": "ITJ Travel API is running" }))
}

async fn list_group_users(
    State(state): State<Arc<AppState>>,
    AuthedUser(claims): AuthedUser,
) -> Result<Json<Vec<RosterUser>>, ApiError> {
    let Some(group_id) = &claims.group_id else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(state.store.group_roster(group_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationBody {
    latitude: f64,
    longitude: f64,
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    AuthedUser(claims): AuthedUser,
    Json(body): Json<LocationBody>,
) -> Result<Json<Value>, ApiError> {
    let location = state
        .store
        .record_location(&claims.id, body.latitude, body.longitude)
        .await?;

    // No socket identity on this path, so the whole room gets the update.
    if let Some(group_id) = &claims.group_id {
        broadcast_to_room(
            &state,
            group_id,
            ServerEvent::UserLocationUpdated {
                user_id: claims.id.clone(),
                location,
            },
        )
        .await;
    }

    Ok(Json(json!({ "message": "Lokasi berhasil diupdate" })))
}

#[derive(Debug, Deserialize)]
struct ProfileBody {
    avatar: String,
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthedUser(claims): AuthedUser,
    Json(body): Json<ProfileBody>,
) -> Result<Json<Value>, ApiError> {
    state.store.update_avatar(&claims.id, &body.avatar).await?;

    if let Some(group_id) = &claims.group_id {
        events::broadcast_profile_update(&state, group_id, &claims.id, &body.avatar).await;
    }

    Ok(Json(json!({
        "message": "Profile berhasil diupdate",
        "avatar": body.avatar
    })))
}

async fn list_panic_alerts(
    State(state): State<Arc<AppState>>,
    AuthedUser(claims): AuthedUser,
) -> Result<Json<Vec<PanicAlert>>, ApiError> {
    let Some(group_id) = &claims.group_id else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(state.store.alerts_for_group(group_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PanicBody {
    message: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

async fn create_panic_alert(
    State(state): State<Arc<AppState>>,
    AuthedUser(claims): AuthedUser,
    Json(body): Json<PanicBody>,
) -> Result<(StatusCode, Json<PanicAlert>), ApiError> {
    let request = PanicRequest {
        message: body.message,
        lat: body.latitude,
        lng: body.longitude,
    };

    let alert = events::raise_panic(
        &state,
        &claims.id,
        &claims.name,
        claims.group_id.as_deref(),
        request,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(alert)))
}

async fn resolve_panic_alert(
    State(state): State<Arc<AppState>>,
    AuthedUser(claims): AuthedUser,
    Path(alert_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match events::resolve_panic(&state, &alert_id, &claims.id, &claims.role).await? {
        ResolveOutcome::Resolved(alert) => {
            if let Some(group_id) = &claims.group_id {
                broadcast_to_room(
                    &state,
                    group_id,
                    ServerEvent::PanicAlertResolved {
                        alert_id: alert.id.clone(),
                        user_id: alert.user_id.clone(),
                    },
                )
                .await;
            }
            Ok(Json(json!({ "message": "Alert berhasil diselesaikan" })))
        }
        ResolveOutcome::NotFound => Err(ApiError::NotFound("Alert tidak ditemukan".to_string())),
        ResolveOutcome::Forbidden => Err(ApiError::Forbidden(
            "Anda tidak berhak menyelesaikan alert ini".to_string(),
        )),
    }
}
