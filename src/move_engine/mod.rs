pub mod batch;
pub mod engine;
pub mod types;

pub use batch::{BatchMoveCoordinator, BatchRun};
pub use engine::MoveOrchestrator;
pub use types::{
    BatchMoveProgress, BatchMoveResults, DeleteResult, DestinationSelectionManner, DetectedFile,
    MoveDestination, MoveFailure, MoveOperation, MoveResult, MoveResultKind,
};
