//! ITJ Travel realtime presence server

mod auth;
mod config;
mod error;
mod handlers;
mod protocol;
mod push;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod test_util;

use auth::Claims;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use config::Config;
use futures::{SinkExt, StreamExt};
use protocol::{ClientEvent, ServerEvent};
use state::AppState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // Logging init
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Arc::new(store::MemoryStore::new());
    let push = Arc::new(push::LogOnlyPush);
    let state = Arc::new(AppState::new(config, store, push));

    // CORS setup
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = app_router(state.clone())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 ITJ Travel presence server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/ws", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .nest("/api", routes::api_router())
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>ITJ Travel Presence Server</h1><p>WebSocket endpoint: /ws</p>")
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    // The credential rides in a handshake query parameter or a `token`
    // header; verification happens before the upgrade so a rejected client
    // never owns a session or a room slot.
    let token = params.get("token").cloned().or_else(|| {
        headers
            .get("token")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    });

    let Some(token) = token else {
        return (
            StatusCode::UNAUTHORIZED,
            "Authentication error: Token missing",
        )
            .into_response();
    };

    let claims = match state.verifier.verify(&token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::warn!(error = %err, "WebSocket admission rejected");
            return (
                StatusCode::UNAUTHORIZED,
                "Authentication error: Invalid token",
            )
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, claims: Claims) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let conn_id = handlers::connection::handle_connection(state.clone(), tx.clone(), claims).await;

    // Send task
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                if ws_sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Receive loop: one connection's events are processed in the order the
    // transport delivered them.
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                // Frames that do not parse as a known event are dropped;
                // the realtime channel is best-effort telemetry.
                if let Ok(event) = serde_json::from_str::<ClientEvent>(&text) {
                    handle_client_event(&state, &conn_id, &tx, event).await;
                }
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    handlers::connection::handle_disconnect(state, &conn_id).await;
    send_task.abort();
}

async fn handle_client_event(
    state: &Arc<AppState>,
    conn_id: &str,
    sender: &mpsc::UnboundedSender<ServerEvent>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::Heartbeat => {
            handlers::connection::handle_heartbeat(sender);
        }
        ClientEvent::LocationUpdate {
            latitude,
            longitude,
        } => {
            handlers::events::handle_location_update(state, conn_id, latitude, longitude).await;
        }
        ClientEvent::PanicAlert { alert } => {
            handlers::events::handle_panic_alert(state, conn_id, alert).await;
        }
        ClientEvent::PanicResolved { alert_id } => {
            handlers::events::handle_panic_resolve(state, conn_id, &alert_id).await;
        }
    }
}
