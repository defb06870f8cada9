use std::{ops::ControlFlow, sync::Arc, time::Duration};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::overlay::{
        InitMessage, OVERLAY_PROTOCOL_VERSION, OverlayInbound, OverlayOutbound, TrainStartMessage,
    },
    state::{OverlayHub, SharedState, encode},
};

/// Handle the full lifecycle of an overlay WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let hub = state.overlays().clone();
    let (id, dropped) = hub.register(outbound_tx.clone());
    info!(%id, overlays = hub.len(), "overlay connected");

    send_snapshot(&state, &outbound_tx).await;

    loop {
        let message = tokio::select! {
            _ = dropped.notified() => break,
            message = receiver.next() => message,
        };
        let Some(message) = message else {
            break;
        };
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                warn!(%id, error = %err, "websocket error");
                break;
            }
        };

        if handle_frame(&state, &id, message, &outbound_tx).await.is_break() {
            break;
        }
    }

    hub.unregister(&id);
    info!(%id, "overlay disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// React to one inbound frame. Breaks when the overlay closed the socket.
pub async fn handle_frame(
    state: &SharedState,
    id: &Uuid,
    message: Message,
    tx: &mpsc::UnboundedSender<Message>,
) -> ControlFlow<()> {
    match message {
        Message::Text(text) => match serde_json::from_str::<OverlayInbound>(text.as_str()) {
            Ok(OverlayInbound::TrainQuery) => send_snapshot(state, tx).await,
            Ok(OverlayInbound::Unknown) => {
                warn!(%id, payload = %text.as_str(), "ignoring unknown overlay message");
            }
            Err(err) => {
                warn!(%id, error = %err, "failed to parse overlay message");
            }
        },
        Message::Ping(payload) => {
            let _ = tx.send(Message::Pong(payload));
        }
        Message::Pong(_) => state.overlays().mark_alive(id),
        Message::Close(frame) => {
            info!(%id, "overlay closed");
            let _ = tx.send(Message::Close(frame));
            return ControlFlow::Break(());
        }
        Message::Binary(_) => {}
    }
    ControlFlow::Continue(())
}

/// Send `init` followed by the live train, if any.
pub async fn send_snapshot(state: &SharedState, tx: &mpsc::UnboundedSender<Message>) {
    let snapshot = match state.machine().current_train().await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(error = %err, "failed to read the current train for an overlay");
            None
        }
    };

    let init = OverlayOutbound::Init(InitMessage {
        version: OVERLAY_PROTOCOL_VERSION,
        no_trains_active: snapshot.is_none(),
        overlay_position: state.overlays().position(),
    });
    let start = snapshot
        .as_ref()
        .map(|start| OverlayOutbound::TrainStart(TrainStartMessage::from(start)));

    for frame in std::iter::once(init).chain(start).filter_map(|message| encode(&message)) {
        if tx.send(frame).is_err() {
            return;
        }
    }
}

/// Probe overlays every `period`, dropping the ones that missed the previous probe.
pub async fn run_heartbeat(hub: Arc<OverlayHub>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        hub.probe();
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
