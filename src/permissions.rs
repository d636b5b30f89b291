//! Storage permission and destination-picker contracts.
//!
//! Two grants matter for a move: the device-wide "manage all files"
//! permission, checked synchronously, and a persisted per-destination grant
//! that is acquired interactively through a [`DestinationPicker`].

use crate::config::ConfigStore;
use crate::error::Result;
use crate::move_engine::MoveOperation;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

pub trait StoragePermissions: Send + Sync {
    fn manage_all_files_granted(&self) -> bool;

    /// A grant on a directory covers everything beneath it.
    fn has_destination_grant(&self, dir: &Path) -> bool;

    fn persist_destination_grant(&self, dir: &Path) -> Result<()>;
}

/// Permissions recorded in the configuration store.
#[derive(Debug, Clone)]
pub struct ConfigPermissions {
    config: ConfigStore,
}

impl ConfigPermissions {
    pub fn new(config: ConfigStore) -> Self {
        Self { config }
    }
}

impl StoragePermissions for ConfigPermissions {
    fn manage_all_files_granted(&self) -> bool {
        self.config.snapshot().manage_all_files_granted
    }

    fn has_destination_grant(&self, dir: &Path) -> bool {
        self.config
            .snapshot()
            .granted_destinations
            .iter()
            .any(|granted| dir.starts_with(granted))
    }

    fn persist_destination_grant(&self, dir: &Path) -> Result<()> {
        let dir = dir.to_path_buf();
        let added = self.config.update(|c| {
            if c.granted_destinations.iter().any(|g| dir.starts_with(g)) {
                false
            } else {
                c.granted_destinations.push(dir.clone());
                true
            }
        })?;
        if added {
            info!("Persisted destination grant for {}", dir.display());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerOutcome {
    /// The user picked (and granted access to) this directory.
    Granted(PathBuf),
    Denied,
    /// The user navigated back out of the picker. Not a result.
    Dismissed,
}

#[derive(Debug)]
pub struct PickerRequest {
    pub operation: MoveOperation,
    pub reply: oneshot::Sender<PickerOutcome>,
}

/// Interactive destination selection. The request is answered through its
/// oneshot sender; dropping the sender, like a denial, drops the operation.
pub trait DestinationPicker: Send + Sync {
    fn request(&self, request: PickerRequest);
}

/// Answers every request with the same outcome.
#[derive(Debug, Clone)]
pub enum StaticPicker {
    /// Grant the directory the operation asked for.
    GrantRequested,
    Deny,
    Dismiss,
}

impl DestinationPicker for StaticPicker {
    fn request(&self, request: PickerRequest) {
        let outcome = match self {
            StaticPicker::GrantRequested => {
                PickerOutcome::Granted(request.operation.destination.directory().to_path_buf())
            }
            StaticPicker::Deny => PickerOutcome::Denied,
            StaticPicker::Dismiss => PickerOutcome::Dismissed,
        };
        let _ = request.reply.send(outcome);
    }
}

/// Hands requests to a UI task.
#[derive(Debug, Clone)]
pub struct ChannelPicker {
    tx: mpsc::UnboundedSender<PickerRequest>,
}

impl ChannelPicker {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PickerRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DestinationPicker for ChannelPicker {
    fn request(&self, request: PickerRequest) {
        // A closed receiver drops the reply sender, which the caller sees as a denial.
        let _ = self.tx.send(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavigatorConfig;

    #[test]
    fn test_grants_cover_subdirectories() {
        let config = ConfigStore::in_memory(NavigatorConfig::default());
        let permissions = ConfigPermissions::new(config.clone());

        assert!(!permissions.has_destination_grant(Path::new("/storage/Pictures/Trips")));
        permissions
            .persist_destination_grant(Path::new("/storage/Pictures"))
            .unwrap();
        assert!(permissions.has_destination_grant(Path::new("/storage/Pictures/Trips")));
        assert!(!permissions.has_destination_grant(Path::new("/storage/Music")));

        permissions
            .persist_destination_grant(Path::new("/storage/Pictures/Trips"))
            .unwrap();
        assert_eq!(config.snapshot().granted_destinations.len(), 1);
    }

    #[test]
    fn test_manage_all_files_flag() {
        let config = ConfigStore::in_memory(NavigatorConfig {
            manage_all_files_granted: false,
            ..NavigatorConfig::default()
        });
        assert!(!ConfigPermissions::new(config).manage_all_files_granted());
    }
}
