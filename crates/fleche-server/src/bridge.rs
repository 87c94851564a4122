//! Fan-out from the coordinator's broadcast channel to room members.

use std::sync::Arc;

use tokio::sync::broadcast;

use fleche_core::events::{GameEvent, ServerEvent};

use crate::client::{ClientId, ClientRegistry};

/// Forwards game events to every connected client of the addressed room,
/// honoring the per-event originator exclusion.
pub struct EventBridge {
    registry: Arc<ClientRegistry>,
}

impl EventBridge {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    pub fn start(&self, mut rx: broadcast::Receiver<GameEvent>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event.event) {
                            let except = event.except_connection.clone().map(ClientId);
                            registry.broadcast_to_room(event.game_code(), &json, except.as_ref());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event bridge lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("event bridge channel closed");
                        break;
                    }
                }
            }
        })
    }
}

/// Create an event bridge wired to a broadcast channel.
pub fn create_bridge(
    registry: Arc<ClientRegistry>,
    rx: broadcast::Receiver<GameEvent>,
) -> tokio::task::JoinHandle<()> {
    EventBridge::new(registry).start(rx)
}

/// Serialize a server event to its wire form.
pub fn serialize_event(event: &ServerEvent) -> Option<String> {
    serde_json::to_string(event).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_presence_remove() {
        let json = serialize_event(&ServerEvent::PresenceRemove { pseudo: "zoe".into() }).unwrap();
        assert!(json.contains("\"type\":\"presence_remove\""));
        assert!(json.contains("zoe"));
    }

    #[tokio::test]
    async fn bridge_forwards_to_room_members() {
        let registry = Arc::new(ClientRegistry::new(32));
        let (tx, rx) = broadcast::channel(100);

        let (id, mut client_rx) = registry.register();
        registry.set_room(&id, "AB12").await;

        let handle = create_bridge(Arc::clone(&registry), rx);

        tx.send(GameEvent::new("AB12", ServerEvent::PresenceRemove { pseudo: "zoe".into() }))
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let msg = client_rx.try_recv().unwrap();
        assert!(msg.contains("presence_remove"));

        handle.abort();
    }

    #[tokio::test]
    async fn bridge_ignores_other_rooms() {
        let registry = Arc::new(ClientRegistry::new(32));
        let (tx, rx) = broadcast::channel(100);

        let (id, mut client_rx) = registry.register();
        registry.set_room(&id, "AB12").await;

        let _handle = create_bridge(Arc::clone(&registry), rx);

        tx.send(GameEvent::new("CD34", ServerEvent::PresenceRemove { pseudo: "zoe".into() }))
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(client_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn bridge_honors_exclusion() {
        let registry = Arc::new(ClientRegistry::new(32));
        let (tx, rx) = broadcast::channel(100);

        let (id1, mut rx1) = registry.register();
        let (id2, mut rx2) = registry.register();
        registry.set_room(&id1, "AB12").await;
        registry.set_room(&id2, "AB12").await;

        let _handle = create_bridge(Arc::clone(&registry), rx);

        tx.send(GameEvent::except(
            "AB12",
            ServerEvent::PresenceRemove { pseudo: "zoe".into() },
            id1.as_str(),
        ))
        .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }
}
