//! Connection lifecycle handlers

use crate::auth::Claims;
use crate::protocol::ServerEvent;
use crate::state::{AppState, PeerSession};
use crate::store::UserSeed;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc::UnboundedSender, RwLock};
use uuid::Uuid;

/// Register an admitted connection and attach it to its group's room.
///
/// The claim is fixed for the connection's lifetime: joining or leaving a
/// group requires reconnecting with a freshly issued token. A claim without
/// a group leaves the connection admitted but unattached; it neither
/// produces nor receives room broadcasts.
pub async fn handle_connection(
    state: Arc<AppState>,
    sender: UnboundedSender<ServerEvent>,
    claims: Claims,
) -> String {
    let conn_id = Uuid::new_v4().to_string();

    let session = PeerSession {
        id: conn_id.clone(),
        claims: claims.clone(),
        room_id: RwLock::new(None),
        sender: sender.clone(),
        connected_at: Instant::now(),
    };
    state.peers.insert(conn_id.clone(), session);

    let _ = sender.send(ServerEvent::Connected {
        socket_id: conn_id.clone(),
    });

    // Refresh the subject's profile record from its verified claims so the
    // roster and alert fan-out know the current name/role/group.
    if let Err(err) = state.store.upsert_user(UserSeed::from_claims(&claims)).await {
        tracing::warn!(user_id = %claims.id, error = %err, "Failed to refresh user record at admission");
    }

    match &claims.group_id {
        Some(group_id) => {
            crate::handlers::room::attach_to_room(&state, &conn_id, group_id).await;
        }
        None => {
            tracing::info!(conn_id = %conn_id, user_id = %claims.id, "Connection has no group, staying unattached");
        }
    }

    tracing::info!(conn_id = %conn_id, user_id = %claims.id, "New connection established");
    conn_id
}

/// Tear down a connection: detach from its room and drop the session.
///
/// The durable online flag is left untouched: online/offline is driven by
/// login/logout through the REST API, not by socket presence. The two are
/// independent state machines and are not resynchronized here.
pub async fn handle_disconnect(state: Arc<AppState>, conn_id: &str) {
    crate::handlers::room::detach_from_room(&state, conn_id).await;

    if let Some((_, session)) = state.peers.remove(conn_id) {
        tracing::info!(
            conn_id = %conn_id,
            user_id = %session.claims.id,
            connected_for = ?session.connected_at.elapsed(),
            "Connection closed"
        );
    }
}

/// Heartbeat handling
pub fn handle_heartbeat(sender: &UnboundedSender<ServerEvent>) {
    let _ = sender.send(ServerEvent::HeartbeatAck);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::room::members_of;
    use crate::test_util::{claims, test_state};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn admission_attaches_to_the_claimed_group_room() {
        let state = test_state();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let conn_id =
            handle_connection(state.clone(), tx, claims("17", "Ahmad", "jamaah", Some("7"))).await;

        assert!(matches!(
            rx.try_recv(),
            Ok(ServerEvent::Connected { socket_id }) if socket_id == conn_id
        ));
        assert_eq!(members_of(&state, "7").await, vec![conn_id]);
    }

    #[tokio::test]
    async fn groupless_admission_stays_unattached() {
        let state = test_state();
        let (tx, _rx) = mpsc::unbounded_channel();

        handle_connection(state.clone(), tx, claims("17", "Ahmad", "jamaah", None)).await;

        assert_eq!(state.peers.len(), 1);
        assert!(state.rooms.is_empty());
    }

    #[tokio::test]
    async fn disconnect_detaches_and_drops_the_session() {
        let state = test_state();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn_id =
            handle_connection(state.clone(), tx, claims("17", "Ahmad", "jamaah", Some("7"))).await;
        handle_disconnect(state.clone(), &conn_id).await;

        assert!(state.peers.is_empty());
        assert!(state.rooms.is_empty());
    }

    #[tokio::test]
    async fn reconnect_gets_an_independent_attachment() {
        let state = test_state();

        let (tx, _rx) = mpsc::unbounded_channel();
        let first =
            handle_connection(state.clone(), tx, claims("17", "Ahmad", "jamaah", Some("7"))).await;
        handle_disconnect(state.clone(), &first).await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let second =
            handle_connection(state.clone(), tx, claims("17", "Ahmad", "jamaah", Some("7"))).await;

        assert_ne!(first, second);
        assert_eq!(members_of(&state, "7").await, vec![second]);
    }

    #[tokio::test]
    async fn admission_refreshes_the_user_record() {
        let state = test_state();
        let (tx, _rx) = mpsc::unbounded_channel();

        handle_connection(state.clone(), tx, claims("17", "Ahmad", "jamaah", Some("7"))).await;

        let roster = state.store.group_roster("7").await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "Ahmad");
    }
}
