mod overlay;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    config::AppConfig,
    dao::record_store::{DocumentStore, RecordStore},
    engine::{
        depot::DepotClient,
        grace::GraceTrainMachine,
        hype::{HypeBoard, HypeTrainTracker, PointsPerSub},
    },
    services::chat_service::{ChatAnnouncer, ChatMessage},
};

pub use self::overlay::{OverlayConnection, OverlayHub, encode};

/// Application state shared across handlers.
pub type SharedState = Arc<AppState>;

/// Central application state: the engine, its collaborators and the overlay registry.
pub struct AppState {
    machine: GraceTrainMachine,
    hype: HypeTrainTracker,
    records: RecordStore,
    depot: DepotClient,
    overlays: Arc<OverlayHub>,
}

impl AppState {
    /// Wire the engine and return the shared state with the receiving end of the chat channel.
    ///
    /// Must be called from within a Tokio runtime: the engine's task queue is spawned here.
    pub fn build(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        depot: DepotClient,
    ) -> (SharedState, mpsc::UnboundedReceiver<ChatMessage>) {
        let records = RecordStore::new(store);
        Self::build_with_records(config, records, depot)
    }

    /// Same as [`AppState::build`] with a preconfigured [`RecordStore`].
    pub fn build_with_records(
        config: AppConfig,
        records: RecordStore,
        depot: DepotClient,
    ) -> (SharedState, mpsc::UnboundedReceiver<ChatMessage>) {
        let (chat_tx, chat_rx) = mpsc::unbounded_channel();
        let overlays = Arc::new(OverlayHub::new(config.overlay_position));
        let board = HypeBoard::default();

        let machine = GraceTrainMachine::builder(Arc::new(depot.clone()), records.clone())
            .settings(config.grace_settings())
            .hype_board(board.clone())
            .listener(overlays.clone())
            .listener(Arc::new(ChatAnnouncer::new(chat_tx)))
            .build();
        let hype = HypeTrainTracker::new(
            board,
            machine.clone(),
            Arc::new(PointsPerSub(config.sub_points_per_sub)),
        );

        let state = Arc::new(Self {
            machine,
            hype,
            records,
            depot,
            overlays,
        });
        (state, chat_rx)
    }

    /// The grace train state machine.
    pub fn machine(&self) -> &GraceTrainMachine {
        &self.machine
    }

    /// The hype train tracker.
    pub fn hype(&self) -> &HypeTrainTracker {
        &self.hype
    }

    /// Top record lists.
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Depot client, for direct lookups.
    pub fn depot(&self) -> &DepotClient {
        &self.depot
    }

    /// Registry of overlay sockets.
    pub fn overlays(&self) -> &Arc<OverlayHub> {
        &self.overlays
    }
}
