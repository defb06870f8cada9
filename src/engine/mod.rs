//! Grace and hype train engine: scoring, ordering, and lifecycle.

pub mod depot;
pub mod events;
pub mod grace;
pub mod hype;
pub mod score;
pub mod task_queue;
pub mod train;

pub use self::events::{TrainEvent, TrainListener};
pub use self::grace::{GraceSettings, GraceTrainMachine};
pub use self::hype::{HypeBoard, HypeTrainTracker};
