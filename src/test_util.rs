//! Shared test fixtures

use crate::auth::Claims;
use crate::config::{AuthConfig, Config, StoreConfig};
use crate::handlers;
use crate::protocol::ServerEvent;
use crate::push::{LogOnlyPush, PushGateway};
use crate::state::AppState;
use crate::store::{MemoryStore, Store, UserSeed};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const TEST_SECRET: &str = "test-secret";

pub fn test_config() -> Config {
    Config {
        port: 0,
        host: "127.0.0.1".to_string(),
        cors_origins: vec!["*".to_string()],
        auth: AuthConfig {
            token_secret: TEST_SECRET.to_string(),
        },
        store: StoreConfig { timeout_ms: 1000 },
        log_level: "debug".to_string(),
    }
}

pub fn test_state() -> Arc<AppState> {
    state_with_store(Arc::new(MemoryStore::new()))
}

pub fn state_with_store(store: Arc<dyn Store>) -> Arc<AppState> {
    Arc::new(AppState::new(test_config(), store, Arc::new(LogOnlyPush)))
}

pub fn state_with_push(push: Arc<dyn PushGateway>) -> Arc<AppState> {
    Arc::new(AppState::new(
        test_config(),
        Arc::new(MemoryStore::new()),
        push,
    ))
}

pub fn claims(id: &str, name: &str, role: &str, group_id: Option<&str>) -> Claims {
    Claims {
        id: id.to_string(),
        name: name.to_string(),
        phone: None,
        role: role.to_string(),
        group_id: group_id.map(str::to_string),
        exp: None,
    }
}

pub fn seed(id: &str, name: &str, role: &str, group_id: Option<&str>) -> UserSeed {
    UserSeed {
        id: id.to_string(),
        name: name.to_string(),
        phone: None,
        role: role.to_string(),
        group_id: group_id.map(str::to_string),
        avatar: None,
    }
}

/// Admit a connection with the given identity and drain the `connected` ack.
pub async fn connect(
    state: &Arc<AppState>,
    id: &str,
    name: &str,
    role: &str,
    group_id: Option<&str>,
) -> (String, mpsc::UnboundedReceiver<ServerEvent>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn_id = handlers::connection::handle_connection(
        state.clone(),
        tx,
        claims(id, name, role, group_id),
    )
    .await;
    let _ = rx.try_recv();
    (conn_id, rx)
}
