//! Turns move and delete results into user-visible effects: notification
//! cleanup, quick-destination memory, explanations and the activity log.

use crate::config::ConfigStore;
use crate::id_allocator::{BATCH_PROGRESS_NOTIFICATION_ID, BATCH_RESULTS_NOTIFICATION_ID};
use crate::logging::{LogCategory, LogManager};
use crate::move_engine::{
    BatchMoveProgress, BatchMoveResults, DeleteResult, DestinationSelectionManner, DetectedFile,
    MoveFailure, MoveOperation, MoveResult,
};
use crate::notification::{
    ActionKind, Notification, NotificationAction, NotificationCenter, NotificationKind,
    NotificationResources, ResourceIds,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ResultBridge {
    config: ConfigStore,
    ids: Arc<ResourceIds>,
    notifications: Arc<NotificationCenter>,
    activity: LogManager,
}

impl ResultBridge {
    pub fn new(
        config: ConfigStore,
        ids: Arc<ResourceIds>,
        notifications: Arc<NotificationCenter>,
        activity: LogManager,
    ) -> Self {
        Self {
            config,
            ids,
            notifications,
            activity,
        }
    }

    pub fn activity(&self) -> &LogManager {
        &self.activity
    }

    /// Releases the ids of a notification and removes it. Repeated calls
    /// are no-ops.
    pub fn cleanup(&self, resources: &NotificationResources) {
        if self.ids.release(resources) {
            debug!("Released notification {}", resources.id);
            self.notifications.cancel(resources.id);
        }
    }

    pub fn on_move_result(
        &self,
        operation: &MoveOperation,
        resources: Option<&NotificationResources>,
        result: &MoveResult,
    ) {
        if let Some(resources) = resources {
            self.cleanup(resources);
        }

        let file = &operation.file;
        match result {
            MoveResult::Success { destination } => {
                self.activity.info(
                    LogCategory::FileMoved,
                    &format!("{} -> {}", file.path().display(), destination.display()),
                );
                if operation.manner == DestinationSelectionManner::Picked {
                    if let Some(dir) = destination.parent() {
                        self.remember(file, dir);
                    }
                }
            }
            MoveResult::Failure(failure) => {
                self.activity.warn(
                    LogCategory::MoveFailed,
                    &format!("{}: {}", file.path().display(), failure.code()),
                );
                if *failure == MoveFailure::MoveDestinationNotFound {
                    self.invalidate(file, operation.destination.directory());
                }
            }
        }

        if !operation.batched {
            self.notifications.toast(&move_toast(file, result));
        }
    }

    fn remember(&self, file: &DetectedFile, dir: &Path) {
        let (file_type, source_kind) = (file.file_type(), file.source_kind());
        let dir = dir.to_path_buf();
        if let Err(e) = self
            .config
            .update(|c| c.remember_quick_destination(file_type, source_kind, dir))
        {
            error!("Failed to remember quick destination: {e}");
        }
    }

    fn invalidate(&self, file: &DetectedFile, dir: &Path) {
        if dir.is_dir() {
            warn!("Destination {} still exists, keeping it in memory", dir.display());
            return;
        }
        let (file_type, source_kind) = (file.file_type(), file.source_kind());
        let removed = match self
            .config
            .update(|c| c.forget_destination(file_type, source_kind, dir))
        {
            Ok(removed) => removed,
            Err(e) => {
                error!("Failed to forget destination {}: {e}", dir.display());
                return;
            }
        };
        if !removed {
            return;
        }

        warn!("Destination {} is gone, removed from memory", dir.display());
        self.activity.warn(
            LogCategory::DestinationInvalidated,
            &format!("{} ({} {})", dir.display(), source_kind.label(), file_type.label()),
        );

        let resources = self.ids.allocate_auxiliary();
        self.notifications.post(Notification::with_kind(
            resources.id,
            NotificationKind::DestinationInvalid {
                file_type,
                source_kind,
                destination: dir.to_path_buf(),
            },
            vec![NotificationAction {
                label: "OK".to_string(),
                request_code: None,
                kind: ActionKind::Dismiss,
            }],
        ));
    }

    pub fn on_batch_progress(&self, batch_id: &str, progress: BatchMoveProgress) {
        self.notifications.post(Notification::with_kind(
            BATCH_PROGRESS_NOTIFICATION_ID,
            NotificationKind::BatchProgress(progress),
            vec![NotificationAction {
                label: "Cancel".to_string(),
                request_code: None,
                kind: ActionKind::CancelBatch(batch_id.to_string()),
            }],
        ));
    }

    pub fn on_batch_complete(&self, results: &BatchMoveResults) {
        self.notifications.cancel(BATCH_PROGRESS_NOTIFICATION_ID);
        self.notifications.post(Notification::with_kind(
            BATCH_RESULTS_NOTIFICATION_ID,
            NotificationKind::BatchResults(results.clone()),
            Vec::new(),
        ));

        let summary = results.summary_message();
        info!("{summary}");
        self.activity.info(LogCategory::BatchCompleted, &summary);
        self.notifications.toast(&summary);
    }

    pub fn on_delete_result(
        &self,
        file: &DetectedFile,
        resources: Option<&NotificationResources>,
        result: DeleteResult,
    ) {
        if let Some(resources) = resources {
            self.cleanup(resources);
        }

        let message = format!("{}: {}", result.message(), file.record.name);
        match result {
            DeleteResult::Deleted => self.activity.info(LogCategory::FileDeleted, &message),
            _ => self.activity.warn(LogCategory::FileDeleted, &message),
        }
        self.notifications.toast(&message);
    }
}

fn move_toast(file: &DetectedFile, result: &MoveResult) -> String {
    match result {
        MoveResult::Success { destination } => {
            let dir = destination
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| destination.display().to_string());
            format!("Moved {} to {dir}", file.record.name)
        }
        MoveResult::Failure(failure) => failure.message().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavigatorConfig;
    use crate::id_allocator::AUX_NOTIFICATION_SEED;
    use crate::media::{FileType, SourceKind};
    use crate::notification::tests::detected;
    use crate::notification::{ChannelNotificationSink, NewFileNotification, NotificationEvent};
    use std::path::PathBuf;
    use tokio::sync::mpsc;

    struct Fixture {
        bridge: ResultBridge,
        config: ConfigStore,
        ids: Arc<ResourceIds>,
        notifications: Arc<NotificationCenter>,
        rx: mpsc::UnboundedReceiver<NotificationEvent>,
    }

    fn fixture() -> Fixture {
        let config = ConfigStore::in_memory(NavigatorConfig::default());
        let (sink, rx) = ChannelNotificationSink::new();
        let notifications = Arc::new(NotificationCenter::new(Arc::new(sink), 3));
        let ids = Arc::new(ResourceIds::default());
        let bridge = ResultBridge::new(
            config.clone(),
            ids.clone(),
            notifications.clone(),
            LogManager::new(100),
        );
        Fixture {
            bridge,
            config,
            ids,
            notifications,
            rx,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<NotificationEvent>) -> Vec<NotificationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn screenshot() -> DetectedFile {
        detected("Pictures/Screenshots/a.png", FileType::Image, SourceKind::Screenshot)
    }

    #[test]
    fn test_picked_success_is_remembered_and_cleaned_up() {
        let mut fx = fixture();
        let resources = fx.ids.allocate(3);
        fx.notifications.post_new_file(NewFileNotification {
            file: screenshot(),
            quick_destinations: vec![],
            resources: resources.clone(),
        });
        drain(&mut fx.rx);

        let operation = MoveOperation::picked(screenshot(), "/storage/Pictures/Kept".into());
        let result = MoveResult::Success {
            destination: "/storage/Pictures/Kept/a.png".into(),
        };
        fx.bridge.on_move_result(&operation, Some(&resources), &result);
        fx.bridge.on_move_result(&operation, Some(&resources), &result);

        assert_eq!(fx.ids.notifications.live_count(), 0);
        assert_eq!(
            fx.config
                .snapshot()
                .quick_destinations(FileType::Image, SourceKind::Screenshot),
            vec![PathBuf::from("/storage/Pictures/Kept")]
        );
        let events = drain(&mut fx.rx);
        assert_eq!(events[0], NotificationEvent::Cancelled(resources.id));
        assert_eq!(events[1], NotificationEvent::Toast("Moved a.png to Kept".to_string()));
        assert_eq!(fx.bridge.activity().get_logs(Some(LogCategory::FileMoved)).len(), 2);
    }

    #[test]
    fn test_quick_success_is_not_re_remembered() {
        let fx = fixture();
        let operation = MoveOperation::quick(screenshot(), "/storage/Pictures".into());
        fx.bridge.on_move_result(
            &operation,
            None,
            &MoveResult::Success {
                destination: "/storage/Pictures/a.png".into(),
            },
        );
        assert!(fx.config.snapshot().quick_destinations.is_empty());
    }

    #[test]
    fn test_destination_not_found_invalidates_memory() {
        let mut fx = fixture();
        let gone = PathBuf::from("/storage/Pictures/Gone");
        fx.config
            .update(|c| {
                c.remember_quick_destination(FileType::Image, SourceKind::Screenshot, gone.clone());
                c.set_auto_move_rule(FileType::Image, SourceKind::Screenshot, gone.clone());
            })
            .unwrap();

        let operation = MoveOperation::quick(screenshot(), gone.clone());
        fx.bridge.on_move_result(
            &operation,
            None,
            &MoveFailure::MoveDestinationNotFound.into(),
        );

        let config = fx.config.snapshot();
        assert!(config
            .quick_destinations(FileType::Image, SourceKind::Screenshot)
            .is_empty());
        assert!(config
            .auto_move_destination(FileType::Image, SourceKind::Screenshot)
            .is_none());

        let events = drain(&mut fx.rx);
        match &events[0] {
            NotificationEvent::Posted(n) => {
                assert!(n.id >= AUX_NOTIFICATION_SEED);
                assert!(matches!(&n.kind, NotificationKind::DestinationInvalid { destination, .. } if *destination == gone));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            events[1],
            NotificationEvent::Toast(MoveFailure::MoveDestinationNotFound.message().to_string())
        );
        assert_eq!(
            fx.bridge
                .activity()
                .get_logs(Some(LogCategory::DestinationInvalidated))
                .len(),
            1
        );
    }

    #[test]
    fn test_batched_results_have_no_toast() {
        let mut fx = fixture();
        let operation =
            MoveOperation::picked(screenshot(), "/storage/Pictures".into()).into_batched();
        fx.bridge
            .on_move_result(&operation, None, &MoveFailure::MoveFileNotFound.into());
        assert!(drain(&mut fx.rx).is_empty());

        let mut results = BatchMoveResults::new(1);
        results.add(&MoveFailure::MoveFileNotFound.into());
        fx.bridge.on_batch_complete(&results);
        let events = drain(&mut fx.rx);
        assert_eq!(events[0], NotificationEvent::Cancelled(BATCH_PROGRESS_NOTIFICATION_ID));
        assert!(matches!(&events[1], NotificationEvent::Posted(n) if n.id == BATCH_RESULTS_NOTIFICATION_ID));
        assert_eq!(
            events[2],
            NotificationEvent::Toast("Moved 0 of 1 files, 1 failed".to_string())
        );
    }

    #[test]
    fn test_delete_result_is_reported() {
        let mut fx = fixture();
        let resources = fx.ids.allocate(3);
        fx.bridge
            .on_delete_result(&screenshot(), Some(&resources), DeleteResult::Deleted);

        let events = drain(&mut fx.rx);
        assert_eq!(events[0], NotificationEvent::Cancelled(resources.id));
        assert_eq!(events[1], NotificationEvent::Toast("Deleted file: a.png".to_string()));
        assert_eq!(fx.bridge.activity().get_logs(Some(LogCategory::FileDeleted)).len(), 1);
    }

    #[test]
    fn test_existing_destination_is_not_forgotten() {
        let mut fx = fixture();
        let temp = tempfile::TempDir::new().unwrap();
        let kept = temp.path().to_path_buf();
        fx.config
            .update(|c| {
                c.remember_quick_destination(FileType::Image, SourceKind::Screenshot, kept.clone())
            })
            .unwrap();

        let operation = MoveOperation::quick(screenshot(), kept.clone());
        fx.bridge.on_move_result(
            &operation,
            None,
            &MoveFailure::MoveDestinationNotFound.into(),
        );

        assert_eq!(
            fx.config
                .snapshot()
                .quick_destinations(FileType::Image, SourceKind::Screenshot),
            vec![kept]
        );
        assert!(!drain(&mut fx.rx)
            .iter()
            .any(|e| matches!(e, NotificationEvent::Posted(_))));
        assert!(fx
            .bridge
            .activity()
            .get_logs(Some(LogCategory::DestinationInvalidated))
            .is_empty());
    }
}
