//! Client websocket transport with fixed-delay reconnect.
//!
//! The connection runs on a tokio task. The render loop talks to it only
//! through a [`NetworkHandle`]: key edges go out through a queue, the latest
//! movement report through a watch slot that the task samples on its send
//! interval, and everything received comes back as [`ClientEvent`]s that the
//! render loop drains once per frame.

use futures_util::{Sink, SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::{ClientMessage, ServerMessage};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Events delivered from the network task to the render loop
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Message(ServerMessage),
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Server websocket URL, e.g. `ws://127.0.0.1:8080`
    pub url: String,
    /// Interval between movement reports
    pub send_interval: Duration,
    /// Wait between a lost connection and the next attempt
    pub reconnect_delay: Duration,
}

/// Render-loop side of the connection
pub struct NetworkHandle {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    movement: watch::Sender<Option<ClientMessage>>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl NetworkHandle {
    /// Queues a message. Anything queued while disconnected is discarded.
    pub fn send(&self, message: ClientMessage) {
        let _ = self.outgoing.send(message);
    }

    /// Replaces the movement report sent on the next send interval.
    pub fn set_movement(&self, message: ClientMessage) {
        let _ = self.movement.send(Some(message));
    }

    /// Next pending event, if any. Never blocks.
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        self.events.try_recv().ok()
    }
}

/// Starts the connection task on `runtime` and returns its handle.
pub fn spawn(runtime: &Handle, config: NetworkConfig) -> NetworkHandle {
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (movement_tx, movement_rx) = watch::channel(None);
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    runtime.spawn(connection_loop(config, outgoing_rx, movement_rx, events_tx));

    NetworkHandle {
        outgoing: outgoing_tx,
        movement: movement_tx,
        events: events_rx,
    }
}

/// Connects, runs a session until it ends, waits, and tries again. Stops
/// only when the handle is dropped.
async fn connection_loop(
    config: NetworkConfig,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    movement: watch::Receiver<Option<ClientMessage>>,
    events: mpsc::UnboundedSender<ClientEvent>,
) {
    let mut attempt: u64 = 0;

    while !events.is_closed() {
        attempt += 1;
        match connect_async(config.url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!("Connected to {}", config.url);
                attempt = 0;
                if events.send(ClientEvent::Connected).is_err() {
                    break;
                }

                run_session(ws_stream, &config, &mut outgoing, &movement, &events).await;

                info!("Connection to {} lost", config.url);
                if events.send(ClientEvent::Disconnected).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Connection attempt {} to {} failed: {}", attempt, config.url, e);
            }
        }

        sleep(config.reconnect_delay).await;
        warn!("Reconnecting to {}", config.url);
    }

    debug!("Network task stopped");
}

async fn run_session(
    ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    config: &NetworkConfig,
    outgoing: &mut mpsc::UnboundedReceiver<ClientMessage>,
    movement: &watch::Receiver<Option<ClientMessage>>,
    events: &mpsc::UnboundedSender<ClientEvent>,
) {
    let (mut write, mut read) = ws_stream.split();

    // Sends attempted while disconnected are dropped.
    while outgoing.try_recv().is_ok() {}

    let mut send_interval = interval(config.send_interval);
    send_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match ServerMessage::decode(&text) {
                        Ok(message) => {
                            if events.send(ClientEvent::Message(message)).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping frame from server: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Connection error: {}", e);
                        break;
                    }
                }
            },

            Some(message) = outgoing.recv() => {
                if !send_message(&mut write, &message).await {
                    break;
                }
            },

            _ = send_interval.tick() => {
                let report = movement.borrow().clone();
                if let Some(message) = report {
                    if !send_message(&mut write, &message).await {
                        break;
                    }
                }
            },
        }
    }
}

async fn send_message<S>(write: &mut S, message: &ClientMessage) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = match message.encode() {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode {:?}: {}", message, e);
            return true;
        }
    };
    match write.send(Message::Text(text)).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Send failed: {}", e);
            false
        }
    }
}
