//! Messages between the UI layer and the background service.
//!
//! Inside the process they travel as typed [`ServiceMessage`] values. The JSON
//! form exists only at the boundary (`encode` / `decode`); malformed payloads
//! are logged and dropped there.

use crate::error::Result;
use crate::input_validation;
use crate::move_engine::{DetectedFile, MoveDestination, MoveOperation};
use crate::notification::{NotificationResources, PendingMove};
use crate::path_validation;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceMessage {
    MoveFile {
        operation: MoveOperation,
        /// Absent for moves not started from a notification (auto moves).
        resources: Option<NotificationResources>,
    },
    StartBatchMove {
        batch_id: String,
        destination: MoveDestination,
        moves: Vec<PendingMove>,
    },
    CancelBatchMove {
        batch_id: String,
    },
    CleanupNotificationResources {
        resources: NotificationResources,
    },
    DeleteFile {
        file: DetectedFile,
        resources: Option<NotificationResources>,
    },
    RebuildObservers,
}

impl ServiceMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceMessage::MoveFile { .. } => "move_file",
            ServiceMessage::StartBatchMove { .. } => "start_batch_move",
            ServiceMessage::CancelBatchMove { .. } => "cancel_batch_move",
            ServiceMessage::CleanupNotificationResources { .. } => "cleanup_notification_resources",
            ServiceMessage::DeleteFile { .. } => "delete_file",
            ServiceMessage::RebuildObservers => "rebuild_observers",
        }
    }

    /// Checks the paths and ids a sender controls.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            ServiceMessage::MoveFile { operation, .. } => {
                path_validation::validate_path(&operation.file.path())?;
                validate_destination(&operation.destination)
            }
            ServiceMessage::StartBatchMove {
                batch_id,
                destination,
                moves,
            } => {
                input_validation::validate_batch_id(batch_id).map_err(|e| e.to_string())?;
                validate_destination(destination)?;
                moves
                    .iter()
                    .try_for_each(|m| path_validation::validate_path(&m.file.path()))
            }
            ServiceMessage::CancelBatchMove { batch_id } => {
                input_validation::validate_batch_id(batch_id).map_err(|e| e.to_string())
            }
            ServiceMessage::DeleteFile { file, .. } => path_validation::validate_path(&file.path()),
            ServiceMessage::CleanupNotificationResources { .. } | ServiceMessage::RebuildObservers => {
                Ok(())
            }
        }
    }
}

fn validate_destination(destination: &MoveDestination) -> std::result::Result<(), String> {
    match destination {
        MoveDestination::Directory(dir) => path_validation::validate_path(dir),
        MoveDestination::File(path) => {
            path_validation::validate_path(path)?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| format!("Destination has no file name: {}", path.display()))?;
            path_validation::validate_file_name(name)
        }
    }
}

/// Convenience for callers building a single move from an operation.
impl From<MoveOperation> for ServiceMessage {
    fn from(operation: MoveOperation) -> Self {
        ServiceMessage::MoveFile {
            operation,
            resources: None,
        }
    }
}

pub fn encode(message: &ServiceMessage) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Parses and validates a message. Returns `None` (after logging) for
/// anything malformed.
pub fn decode(bytes: &[u8]) -> Option<ServiceMessage> {
    let message: ServiceMessage = match serde_json::from_slice(bytes) {
        Ok(message) => message,
        Err(e) => {
            warn!("Ignoring malformed service message: {e}");
            return None;
        }
    };

    if let Err(e) = message.validate() {
        warn!("Ignoring invalid {} message: {e}", message.name());
        return None;
    }

    Some(message)
}
