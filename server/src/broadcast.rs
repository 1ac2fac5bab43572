//! Snapshot Broadcaster.
//!
//! Serializes a message once and queues the text frame on every open
//! connection. Nothing here awaits socket I/O. A connection whose writer has
//! gone away is skipped and its close reaches the registry through the
//! connection task. One whose queue is full is marked stalled and the server
//! drops it after the tick.

use crate::registry::ConnectionRegistry;
use log::{error, warn};
use shared::ServerMessage;
use tokio_tungstenite::tungstenite::Message;

/// Sends `message` to every open connection not listed in `exclude`.
/// Returns how many were queued.
pub fn broadcast(registry: &ConnectionRegistry, message: &ServerMessage, exclude: &[u32]) -> usize {
    let text = match message.encode() {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode broadcast: {}", e);
            return 0;
        }
    };

    registry
        .connections()
        .filter(|connection| !exclude.contains(&connection.id) && connection.is_open())
        .filter(|connection| connection.send(Message::Text(text.clone())))
        .count()
}

/// Sends `message` to one client. Returns false if it is unknown or closed.
pub fn send_to(registry: &ConnectionRegistry, client_id: u32, message: &ServerMessage) -> bool {
    let Some(connection) = registry.get(client_id) else {
        return false;
    };
    if !connection.is_open() {
        return false;
    }

    match message.encode() {
        Ok(text) => {
            let sent = connection.send(Message::Text(text));
            if !sent {
                warn!("Could not queue message for client {}", client_id);
            }
            sent
        }
        Err(e) => {
            error!("Failed to encode message for client {}: {}", client_id, e);
            false
        }
    }
}
