//! Connection Registry: maps each live websocket connection to a client id.
//!
//! Ids come from a counter that only ever grows, so an id is not handed out
//! again until the counter wraps, and never while it is still in use.

use log::{info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;

/// Frames a connection may have queued before it counts as stalled.
pub const OUTBOUND_CAPACITY: usize = 64;

/// One registered connection and its outbound frame queue.
#[derive(Debug)]
pub struct Connection {
    /// Client identity issued by the registry
    pub id: u32,
    /// Peer address, for logging
    pub addr: SocketAddr,
    /// When the connection was registered
    pub connected_at: Instant,
    /// Frames queued here are written to the socket by the connection's writer task
    pub sender: mpsc::Sender<Message>,
    /// Set once a frame was refused because the queue was full
    stalled: AtomicBool,
}

impl Connection {
    pub fn new(id: u32, addr: SocketAddr, sender: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            sender,
            stalled: AtomicBool::new(false),
        }
    }

    /// A connection is open while its writer task still holds the receiver.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queues a frame without waiting. Returns false if the writer task has
    /// gone away or the queue is full; a full queue marks the connection stalled.
    pub fn send(&self, message: Message) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                if !self.stalled.swap(true, Ordering::Relaxed) {
                    warn!(
                        "Client {} ({}) is not reading, {} frames queued",
                        self.id, self.addr, OUTBOUND_CAPACITY
                    );
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::Relaxed)
    }
}

pub struct ConnectionRegistry {
    connections: HashMap<u32, Connection>,
    next_client_id: u32,
}

impl ConnectionRegistry {
    /// Creates an empty registry. The first id issued is 0.
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_client_id: 0,
        }
    }

    /// Registers a connection and returns its freshly issued client id.
    ///
    /// The counter wraps after `u32::MAX` and skips ids still in use.
    pub fn register(&mut self, addr: SocketAddr, sender: mpsc::Sender<Message>) -> u32 {
        let mut client_id = self.next_client_id;
        while self.connections.contains_key(&client_id) {
            client_id = client_id.wrapping_add(1);
        }
        self.next_client_id = client_id.wrapping_add(1);

        info!("Client {} connected from {}", client_id, addr);
        self.connections
            .insert(client_id, Connection::new(client_id, addr, sender));
        client_id
    }

    /// Removes a connection. Returns false if it was already gone.
    pub fn unregister(&mut self, client_id: u32) -> bool {
        if let Some(connection) = self.connections.remove(&client_id) {
            info!(
                "Client {} ({}) disconnected after {:.1}s",
                connection.id,
                connection.addr,
                connection.connected_at.elapsed().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    pub fn get(&self, client_id: u32) -> Option<&Connection> {
        self.connections.get(&client_id)
    }

    pub fn contains(&self, client_id: u32) -> bool {
        self.connections.contains_key(&client_id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Ids of connections whose outbound queue overflowed.
    pub fn stalled(&self) -> Vec<u32> {
        self.connections
            .values()
            .filter(|connection| connection.is_stalled())
            .map(|connection| connection.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn channel() -> (mpsc::Sender<Message>, mpsc::Receiver<Message>) {
        mpsc::channel(OUTBOUND_CAPACITY)
    }

    #[test]
    fn test_first_id_is_zero() {
        let mut registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        assert_eq!(registry.register(test_addr(), tx), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut registry = ConnectionRegistry::new();
        let (tx0, _rx0) = channel();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        let a = registry.register(test_addr(), tx0);
        let b = registry.register(test_addr(), tx1);
        assert!(registry.unregister(a));
        assert!(registry.unregister(b));
        assert!(registry.is_empty());

        let c = registry.register(test_addr(), tx2);
        assert_eq!(c, 2);
    }

    #[test]
    fn test_id_counter_wraps_past_live_ids() {
        let mut registry = ConnectionRegistry::new();
        let (tx0, _rx0) = channel();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        let zero = registry.register(test_addr(), tx0);
        registry.next_client_id = u32::MAX;
        assert_eq!(registry.register(test_addr(), tx1), u32::MAX);
        assert_eq!(registry.register(test_addr(), tx2), 1);
        assert!(registry.contains(zero));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(test_addr(), tx);

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(!registry.unregister(999));
        assert!(!registry.contains(id));
    }

    #[test]
    fn test_connection_open_until_receiver_dropped() {
        let mut registry = ConnectionRegistry::new();
        let (tx, rx) = channel();
        let id = registry.register(test_addr(), tx);

        let connection = registry.get(id).unwrap();
        assert!(connection.is_open());
        assert!(connection.send(Message::Text("hi".into())));

        drop(rx);
        assert!(!connection.is_open());
        assert!(!connection.send(Message::Text("hi".into())));
        assert!(!connection.is_stalled());
    }

    #[test]
    fn test_full_queue_marks_connection_stalled() {
        let mut registry = ConnectionRegistry::new();
        let (tx, mut rx) = channel();
        let (quiet_tx, _quiet_rx) = channel();
        let id = registry.register(test_addr(), tx);
        registry.register(test_addr(), quiet_tx);

        let connection = registry.get(id).unwrap();
        for _ in 0..OUTBOUND_CAPACITY {
            assert!(connection.send(Message::Text("frame".into())));
        }
        assert!(registry.stalled().is_empty());

        assert!(!connection.send(Message::Text("one too many".into())));
        assert_eq!(registry.stalled(), vec![id]);

        let mut queued = 0;
        while rx.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, OUTBOUND_CAPACITY);
    }
}
