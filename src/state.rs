//! Application state management

use crate::auth::{Claims, TokenVerifier};
use crate::config::Config;
use crate::protocol::ServerEvent;
use crate::push::PushGateway;
use crate::store::Store;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc::UnboundedSender, RwLock};

/// Global application state
pub struct AppState {
    /// Room registry (group_id -> Room)
    pub rooms: DashMap<String, Room>,
    /// Peer sessions (connection_id -> PeerSession)
    pub peers: DashMap<String, PeerSession>,
    /// Durable state backend
    pub store: Arc<dyn Store>,
    /// Push notification gateway
    pub push: Arc<dyn PushGateway>,
    /// Session token verifier
    pub verifier: TokenVerifier,
    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>, push: Arc<dyn PushGateway>) -> Self {
        Self {
            rooms: DashMap::new(),
            peers: DashMap::new(),
            store,
            push,
            verifier: TokenVerifier::new(config.auth.token_secret.clone()),
            config: Arc::new(config),
        }
    }
}

/// A group's room: the live connections forming its broadcast audience.
/// Derived state only; rebuilt from connections after a restart.
pub struct Room {
    #[allow(dead_code)]
    pub id: String,
    pub users: RwLock<HashSet<String>>,
    pub created_at: Instant,
}

impl Room {
    pub fn new(id: String) -> Self {
        Self {
            id,
            users: RwLock::new(HashSet::new()),
            created_at: Instant::now(),
        }
    }
}

/// One admitted connection. The claims are fixed at admission and live
/// exactly as long as the connection does.
pub struct PeerSession {
    #[allow(dead_code)]
    pub id: String,
    pub claims: Claims,
    pub room_id: RwLock<Option<String>>,
    pub sender: UnboundedSender<ServerEvent>,
    pub connected_at: Instant,
}
