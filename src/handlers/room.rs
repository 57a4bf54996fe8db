//! Presence room registry: group rooms and broadcast fan-out

use crate::protocol::ServerEvent;
use crate::state::{AppState, Room};

/// Attach a connection to its group's room, creating the room on first
/// attach. Idempotent: re-attaching to the same room is a no-op.
pub async fn attach_to_room(state: &AppState, conn_id: &str, group_id: &str) {
    {
        let room = state.rooms.entry(group_id.to_string()).or_insert_with(|| {
            tracing::info!(group_id = %group_id, "Room created");
            Room::new(group_id.to_string())
        });
        room.users.write().await.insert(conn_id.to_string());
    } // DashMap RefMut dropped here, releasing the shard

    if let Some(session) = state.peers.get(conn_id) {
        *session.room_id.write().await = Some(group_id.to_string());
    }

    tracing::info!(conn_id = %conn_id, group_id = %group_id, "Attached to room");
}

/// Detach a connection from whatever room it is in; no-op when unattached.
/// The room is dropped once its last member detaches.
pub async fn detach_from_room(state: &AppState, conn_id: &str) {
    let room_id = match state.peers.get(conn_id) {
        Some(session) => session.room_id.write().await.take(),
        None => None,
    };
    let Some(room_id) = room_id else {
        return;
    };

    let now_empty = if let Some(room) = state.rooms.get(&room_id) {
        let mut users = room.users.write().await;
        users.remove(conn_id);
        users.is_empty()
    } else {
        false
    };

    if now_empty {
        if let Some((_, room)) = state.rooms.remove(&room_id) {
            tracing::info!(group_id = %room_id, lifetime = ?room.created_at.elapsed(), "Room closed");
        }
    }

    tracing::info!(conn_id = %conn_id, group_id = %room_id, "Detached from room");
}

/// Snapshot of the connection ids currently attached to a room.
pub async fn members_of(state: &AppState, group_id: &str) -> Vec<String> {
    match state.rooms.get(group_id) {
        Some(room) => room.users.read().await.iter().cloned().collect(),
        None => Vec::new(),
    }
}

/// Broadcast an event to every connection in a room.
pub async fn broadcast_to_room(state: &AppState, group_id: &str, event: ServerEvent) {
    for conn_id in members_of(state, group_id).await {
        if let Some(session) = state.peers.get(&conn_id) {
            // a connection that closed mid-iteration just drops the send
            let _ = session.sender.send(event.clone());
        }
    }
}

/// Broadcast to every connection in a room except the sender.
pub async fn broadcast_to_room_except(
    state: &AppState,
    group_id: &str,
    except_conn_id: &str,
    event: ServerEvent,
) {
    for conn_id in members_of(state, group_id).await {
        if conn_id == except_conn_id {
            continue;
        }
        if let Some(session) = state.peers.get(&conn_id) {
            let _ = session.sender.send(event.clone());
        }
    }
}
