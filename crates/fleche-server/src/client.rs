//! Connected WebSocket clients, grouped into per-game rooms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

/// Unique connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl Default for ClientId {
    fn default() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl ClientId {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected WebSocket client.
pub struct Client {
    pub id: ClientId,
    /// Game code of the room the client joined, if any.
    pub room: Option<String>,
    pub tx: mpsc::Sender<String>,
    pub connected: AtomicBool,
    pub last_pong: std::sync::atomic::AtomicU64,
}

impl Client {
    fn new(id: ClientId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            room: None,
            tx,
            connected: AtomicBool::new(true),
            last_pong: std::sync::atomic::AtomicU64::new(now_secs()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < CLIENT_TIMEOUT.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected clients and their rooms.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<Mutex<Client>>>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new client and return its ID + message receiver.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let client = Arc::new(Mutex::new(Client::new(id.clone(), tx)));
        self.clients.insert(id.clone(), client);
        (id, rx)
    }

    /// Remove a client by ID.
    pub fn unregister(&self, id: &ClientId) {
        if let Some((_, client)) = self.clients.remove(id) {
            if let Ok(c) = client.try_lock() {
                c.connected.store(false, Ordering::Relaxed);
            }
        }
    }

    /// Put a client into a game room (one room per client).
    pub async fn set_room(&self, client_id: &ClientId, code: &str) {
        if let Some(client) = self.clients.get(client_id) {
            client.lock().await.room = Some(code.to_string());
        }
    }

    /// Take a client out of its room.
    pub async fn clear_room(&self, client_id: &ClientId) {
        if let Some(client) = self.clients.get(client_id) {
            client.lock().await.room = None;
        }
    }

    /// Send a message to a specific client. Full queues drop the message.
    pub async fn send_to(&self, client_id: &ClientId, message: String) -> bool {
        if let Some(client) = self.clients.get(client_id) {
            let tx = client.lock().await.tx.clone();
            match tx.try_send(message) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(msg)) => {
                    tracing::warn!(
                        client_id = %client_id,
                        msg_len = msg.len(),
                        "send queue full, dropping message"
                    );
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        } else {
            false
        }
    }

    /// Broadcast to every connected client in a room, optionally skipping
    /// one connection (the event's originator).
    pub fn broadcast_to_room(&self, code: &str, message: &str, except: Option<&ClientId>) {
        for entry in self.clients.iter() {
            if except == Some(entry.key()) {
                continue;
            }
            if let Ok(client) = entry.value().try_lock() {
                if client.room.as_deref() == Some(code) && client.is_connected() {
                    let _ = client.tx.try_send(message.to_string());
                }
            }
        }
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// All client IDs currently in a room.
    pub async fn clients_in_room(&self, code: &str) -> Vec<ClientId> {
        let mut result = Vec::new();
        for entry in self.clients.iter() {
            let client = entry.value().lock().await;
            if client.room.as_deref() == Some(code) {
                result.push(client.id.clone());
            }
        }
        result
    }

    /// Remove clients that stopped answering pings.
    pub fn cleanup_dead_clients(&self) -> usize {
        let dead: Vec<ClientId> = self
            .clients
            .iter()
            .filter_map(|entry| {
                if let Ok(client) = entry.value().try_lock() {
                    if !client.is_alive() {
                        return Some(client.id.clone());
                    }
                }
                None
            })
            .collect();

        let removed = dead.len();
        for id in dead {
            self.unregister(&id);
            tracing::info!(client_id = %id, "cleaned up dead client");
        }
        removed
    }
}

/// Handle a WebSocket connection: split reader/writer, heartbeat, forward
/// inbound text to the command channel. Returns when the socket closes.
pub async fn handle_ws_connection(
    socket: WebSocket,
    client_id: ClientId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ClientRegistry>,
    on_message: mpsc::Sender<(ClientId, String)>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer: channel → socket, plus periodic pings.
    let writer_cid = client_id.clone();
    let writer_registry = Arc::clone(&registry);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        if let Some(client) = writer_registry.clients.get(&writer_cid) {
            if let Ok(c) = client.try_lock() {
                c.connected.store(false, Ordering::Relaxed);
            }
        }
    });

    // Reader: socket → command channel, pong tracking.
    let reader_cid = client_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let _ = on_message.send((reader_cid.clone(), text.to_string())).await;
                }
                WsMessage::Pong(_) => {
                    if let Some(client) = reader_registry.clients.get(&reader_cid) {
                        if let Ok(c) = client.try_lock() {
                            c.record_pong();
                        }
                    }
                }
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {} // axum answers pings itself
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    registry.unregister(&client_id);
}

/// Periodic dead-client sweep.
pub fn start_cleanup_task(
    registry: Arc<ClientRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_clients();
            if removed > 0 {
                tracing::info!(removed, "dead client cleanup");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_unique() {
        let a = ClientId::new();
        let b = ClientId::new();
        assert_ne!(a, b);
        assert!(a.0.starts_with("conn_"));
    }

    #[test]
    fn register_and_unregister() {
        let registry = ClientRegistry::new(32);
        assert_eq!(registry.count(), 0);

        let (id1, _rx1) = registry.register();
        let (id2, _rx2) = registry.register();
        assert_eq!(registry.count(), 2);

        registry.unregister(&id1);
        assert_eq!(registry.count(), 1);

        registry.unregister(&id2);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn set_room_and_list() {
        let registry = ClientRegistry::new(32);
        let (id, _rx) = registry.register();
        registry.set_room(&id, "AB12").await;

        let clients = registry.clients_in_room("AB12").await;
        assert_eq!(clients, vec![id.clone()]);

        registry.clear_room(&id).await;
        assert!(registry.clients_in_room("AB12").await.is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_room_only() {
        let registry = ClientRegistry::new(32);
        let (id1, mut rx1) = registry.register();
        let (id2, mut rx2) = registry.register();
        let (_id3, mut rx3) = registry.register();

        registry.set_room(&id1, "AB12").await;
        registry.set_room(&id2, "AB12").await;

        registry.broadcast_to_room("AB12", "hello", None);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_except_skips_originator() {
        let registry = ClientRegistry::new(32);
        let (id1, mut rx1) = registry.register();
        let (id2, mut rx2) = registry.register();

        registry.set_room(&id1, "AB12").await;
        registry.set_room(&id2, "AB12").await;

        registry.broadcast_to_room("AB12", "hello", Some(&id1));

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn send_to_specific_client() {
        let registry = ClientRegistry::new(32);
        let (id, mut rx) = registry.register();

        assert!(registry.send_to(&id, "test message".into()).await);
        assert_eq!(rx.recv().await.unwrap(), "test message");

        let fake = ClientId::new();
        assert!(!registry.send_to(&fake, "test".into()).await);
    }

    #[tokio::test]
    async fn send_to_full_queue_drops() {
        let registry = ClientRegistry::new(2);
        let (id, _rx) = registry.register();

        assert!(registry.send_to(&id, "msg1".into()).await);
        assert!(registry.send_to(&id, "msg2".into()).await);
        assert!(!registry.send_to(&id, "msg3".into()).await);
    }

    #[test]
    fn cleanup_removes_expired_clients() {
        let registry = ClientRegistry::new(32);
        let (id, _rx) = registry.register();

        if let Some(client) = registry.clients.get(&id) {
            if let Ok(c) = client.try_lock() {
                c.last_pong.store(0, Ordering::Relaxed);
            }
        }

        assert_eq!(registry.cleanup_dead_clients(), 1);
        assert_eq!(registry.count(), 0);
    }
}
