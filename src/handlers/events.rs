//! Realtime event router
//!
//! Validates inbound domain events, writes through the durable store, and
//! fans the committed result out to the sender's room. Every handler writes
//! first and broadcasts only after the write lands; a failed or timed-out
//! write drops the event without any partial fan-out.

use crate::auth::Claims;
use crate::handlers::room::{broadcast_to_room, broadcast_to_room_except};
use crate::protocol::{PanicAlert, PanicRequest, ServerEvent};
use crate::state::AppState;
use crate::store::StoreError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Emergency text stored when a panic raise carries no message.
pub const DEFAULT_PANIC_MESSAGE: &str = "DARURAT! Butuh bantuan segera!";

/// Await a store call with the configured bound. A timeout counts as a
/// failed write; the router never retries.
async fn with_store_timeout<T, F>(state: &AppState, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let bound = Duration::from_millis(state.config.store.timeout_ms);
    match tokio::time::timeout(bound, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    }
}

/// The sender's claims and current room attachment.
async fn session_scope(state: &AppState, conn_id: &str) -> Option<(Claims, Option<String>)> {
    let session = state.peers.get(conn_id)?;
    let claims = session.claims.clone();
    let room_id = session.room_id.read().await.clone();
    Some((claims, room_id))
}

/// Location update: best-effort telemetry. Malformed input is dropped with
/// no error event back to the sender; a dropped update simply means peers
/// see the previous position until the next good sample.
pub async fn handle_location_update(
    state: &Arc<AppState>,
    conn_id: &str,
    latitude: f64,
    longitude: f64,
) {
    if !latitude.is_finite() || !longitude.is_finite() {
        tracing::debug!(conn_id = %conn_id, "Dropped location update with non-finite coordinates");
        return;
    }

    let Some((claims, room_id)) = session_scope(state, conn_id).await else {
        return;
    };
    let user_id = claims.id;

    let location = match with_store_timeout(
        state,
        state.store.record_location(&user_id, latitude, longitude),
    )
    .await
    {
        Ok(location) => location,
        Err(err) => {
            tracing::error!(user_id = %user_id, error = %err, "Failed to persist location update");
            return;
        }
    };

    // The fan-out payload is exactly what the store accepted for this event.
    let Some(room_id) = room_id else {
        return;
    };
    broadcast_to_room_except(
        state,
        &room_id,
        conn_id,
        ServerEvent::UserLocationUpdated {
            user_id: user_id.clone(),
            location,
        },
    )
    .await;

    tracing::debug!(user_id = %user_id, group_id = %room_id, "Location update broadcast");
}

/// Create a durable panic alert for the subject, fan it out to the whole
/// room (sender included, so its UI picks up the durable id), and dispatch
/// the push fan-out. Shared by the socket event and `POST /api/panic`.
pub async fn raise_panic(
    state: &Arc<AppState>,
    user_id: &str,
    user_name: &str,
    group_id: Option<&str>,
    request: PanicRequest,
) -> Result<PanicAlert, StoreError> {
    let message = request
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PANIC_MESSAGE.to_string());
    let lat = request.lat.unwrap_or(0.0);
    let lng = request.lng.unwrap_or(0.0);

    let alert = with_store_timeout(
        state,
        state
            .store
            .create_alert(user_id, user_name, &message, lat, lng),
    )
    .await?;

    tracing::warn!(user_id = %user_id, alert_id = %alert.id, "Panic alert raised");

    if let Some(group_id) = group_id {
        broadcast_to_room(state, group_id, ServerEvent::NewPanicAlert(alert.clone())).await;
        dispatch_push(state, group_id, &alert);
    }

    Ok(alert)
}

/// Socket-inbound panic raise; groupless senders are dropped.
pub async fn handle_panic_alert(state: &Arc<AppState>, conn_id: &str, request: PanicRequest) {
    let Some((claims, room_id)) = session_scope(state, conn_id).await else {
        return;
    };
    let Some(room_id) = room_id else {
        tracing::debug!(user_id = %claims.id, "Dropped panic alert from groupless connection");
        return;
    };

    if let Err(err) =
        raise_panic(state, &claims.id, &claims.name, Some(room_id.as_str()), request).await
    {
        tracing::error!(user_id = %claims.id, error = %err, "Failed to persist panic alert");
    }
}

/// Why a resolve attempt produced no resolution. The socket path drops
/// both; the REST path maps them to 404/403.
pub enum ResolveOutcome {
    Resolved(PanicAlert),
    NotFound,
    Forbidden,
}

/// Resolvers are the alert's own subject or an admin, with the role
/// compared case-insensitively. Same policy on the socket and REST paths.
fn can_resolve(resolver_id: &str, resolver_role: &str, owner_id: &str) -> bool {
    resolver_id == owner_id || resolver_role.eq_ignore_ascii_case("admin")
}

/// Idempotently resolve an alert after the permission check. Shared by the
/// socket event and `PUT /api/panic/:id/resolve`.
pub async fn resolve_panic(
    state: &Arc<AppState>,
    alert_id: &str,
    resolver_id: &str,
    resolver_role: &str,
) -> Result<ResolveOutcome, StoreError> {
    let existing = with_store_timeout(state, state.store.get_alert(alert_id)).await?;
    let Some(existing) = existing else {
        tracing::debug!(alert_id = %alert_id, "Resolve requested for unknown alert");
        return Ok(ResolveOutcome::NotFound);
    };

    if !can_resolve(resolver_id, resolver_role, &existing.user_id) {
        tracing::warn!(alert_id = %alert_id, resolver = %resolver_id, "Resolve without permission");
        return Ok(ResolveOutcome::Forbidden);
    }

    match with_store_timeout(state, state.store.resolve_alert(alert_id, resolver_id)).await? {
        Some(alert) => Ok(ResolveOutcome::Resolved(alert)),
        None => Ok(ResolveOutcome::NotFound),
    }
}

/// Socket-inbound panic resolve; unknown alerts and missing permission are
/// dropped, the stale client reconciles on its next full fetch.
pub async fn handle_panic_resolve(state: &Arc<AppState>, conn_id: &str, alert_id: &str) {
    let Some((claims, room_id)) = session_scope(state, conn_id).await else {
        return;
    };
    let Some(room_id) = room_id else {
        return;
    };

    match resolve_panic(state, alert_id, &claims.id, &claims.role).await {
        Ok(ResolveOutcome::Resolved(alert)) => {
            broadcast_to_room(
                state,
                &room_id,
                ServerEvent::PanicAlertResolved {
                    alert_id: alert.id.clone(),
                    user_id: alert.user_id.clone(),
                },
            )
            .await;
        }
        Ok(ResolveOutcome::NotFound) | Ok(ResolveOutcome::Forbidden) => {}
        Err(err) => {
            tracing::error!(alert_id = %alert_id, error = %err, "Failed to resolve panic alert");
        }
    }
}

/// Broadcast primitive for the request layer: profile changes arrive over
/// REST but fan out on the realtime channel.
pub async fn broadcast_profile_update(
    state: &Arc<AppState>,
    group_id: &str,
    user_id: &str,
    avatar: &str,
) {
    broadcast_to_room(
        state,
        group_id,
        ServerEvent::UserProfileUpdated {
            user_id: user_id.to_string(),
            avatar: avatar.to_string(),
        },
    )
    .await;
}

/// Push fan-out is fire-and-forget: spawned after the durable write and
/// room broadcast, with failures logged and never propagated.
fn dispatch_push(state: &Arc<AppState>, group_id: &str, alert: &PanicAlert) {
    let push = state.push.clone();
    let group_id = group_id.to_string();
    let alert = alert.clone();
    tokio::spawn(async move {
        if let Err(err) = push.send_panic_notification(&group_id, &alert).await {
            tracing::warn!(
                group_id = %group_id,
                alert_id = %alert.id,
                error = %err,
                "Panic push fan-out failed"
            );
        }
    });
}
