use std::sync::{Arc, PoisonError, RwLock};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::overlay::{
        OverlayOutbound, OverlayPosition, OverlayPositionMessage, TrainAddMessage,
        TrainEndMessage, TrainStartMessage,
    },
    engine::events::{TrainEvent, TrainListener},
};

/// Handle used to push messages to a connected overlay.
pub struct OverlayConnection {
    tx: mpsc::UnboundedSender<Message>,
    alive: bool,
    dropped: Arc<Notify>,
}

/// Registry of overlay sockets and the shared overlay position.
pub struct OverlayHub {
    connections: DashMap<Uuid, OverlayConnection>,
    position: RwLock<OverlayPosition>,
}

impl OverlayHub {
    /// Empty hub starting at `position`.
    pub fn new(position: OverlayPosition) -> Self {
        Self {
            connections: DashMap::new(),
            position: RwLock::new(position),
        }
    }

    /// Track a new socket. The returned [`Notify`] fires when the hub drops it.
    pub fn register(&self, tx: mpsc::UnboundedSender<Message>) -> (Uuid, Arc<Notify>) {
        let id = Uuid::new_v4();
        let dropped = Arc::new(Notify::new());
        self.connections.insert(
            id,
            OverlayConnection {
                tx,
                alive: true,
                dropped: dropped.clone(),
            },
        );
        (id, dropped)
    }

    /// Forget a socket.
    pub fn unregister(&self, id: &Uuid) {
        self.connections.remove(id);
    }

    /// Connected sockets.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no socket is connected.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Current overlay position.
    pub fn position(&self) -> OverlayPosition {
        *self.position.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the overlay and tell every client.
    pub fn set_position(&self, position: OverlayPosition) {
        *self.position.write().unwrap_or_else(PoisonError::into_inner) = position;
        info!(?position, "overlay position changed");
        self.broadcast(&OverlayOutbound::OverlayPosition(OverlayPositionMessage {
            position,
        }));
    }

    /// Record a heartbeat answer.
    pub fn mark_alive(&self, id: &Uuid) {
        if let Some(mut connection) = self.connections.get_mut(id) {
            connection.alive = true;
        }
    }

    /// Push `message` to every socket. Sockets whose writer is gone are dropped.
    pub fn broadcast(&self, message: &OverlayOutbound) {
        let Some(payload) = encode(message) else {
            return;
        };

        let mut closed = Vec::new();
        for entry in self.connections.iter() {
            if entry.tx.send(payload.clone()).is_err() {
                closed.push(*entry.key());
            }
        }
        for id in closed {
            warn!(%id, "overlay writer closed; dropping connection");
            self.drop_connection(&id);
        }
    }

    /// Drop sockets that did not answer the previous probe, then probe the rest.
    pub fn probe(&self) {
        let mut stale = Vec::new();
        for mut entry in self.connections.iter_mut() {
            if !entry.alive || entry.tx.send(Message::Ping(Default::default())).is_err() {
                stale.push(*entry.key());
                continue;
            }
            entry.alive = false;
        }
        for id in stale {
            info!(%id, "overlay missed heartbeat; dropping connection");
            self.drop_connection(&id);
        }
    }

    fn drop_connection(&self, id: &Uuid) {
        if let Some((_, connection)) = self.connections.remove(id) {
            let _ = connection.tx.send(Message::Close(None));
            connection.dropped.notify_one();
        }
    }
}

/// Serialize an outbound message into a text frame.
pub fn encode(message: &OverlayOutbound) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(Message::Text(payload.into())),
        Err(err) => {
            warn!(error = %err, "failed to serialize overlay message `{message:?}`");
            None
        }
    }
}

impl TrainListener for OverlayHub {
    fn on_train_event(&self, event: &TrainEvent) {
        let message = match event {
            TrainEvent::Start(start) => OverlayOutbound::TrainStart(TrainStartMessage::from(start)),
            TrainEvent::Add(add) => OverlayOutbound::TrainAdd(TrainAddMessage::from(add)),
            TrainEvent::End(end) => OverlayOutbound::TrainEnd(TrainEndMessage::from(end)),
            TrainEvent::Report(_) => return,
        };
        debug!(overlays = self.len(), "broadcasting train event");
        self.broadcast(&message);
    }
}
