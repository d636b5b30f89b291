//! The background service: owns the shared state, the observers and the
//! message loop that executes moves, batches and deletions.

use crate::bridge::ResultBridge;
use crate::config::ConfigStore;
use crate::dedup_cache::RecentMoveTargets;
use crate::error_codes;
use crate::logging::LogManager;
use crate::media::{FsMediaIndex, MediaIndex};
use crate::messages::{self, ServiceMessage};
use crate::move_engine::{
    BatchMoveCoordinator, BatchMoveResults, DetectedFile, MoveDestination, MoveOperation,
    MoveOrchestrator,
};
use crate::notification::{NotificationCenter, NotificationResources, NotificationSink, PendingMove, ResourceIds};
use crate::observer::{build_observers, ObserverContext};
use crate::permissions::{ConfigPermissions, DestinationPicker, StoragePermissions};
use crate::watcher::WatcherManager;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Cloneable sender half for UI code and observers.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    tx: mpsc::UnboundedSender<ServiceMessage>,
}

impl ServiceHandle {
    /// Returns false once the service loop has stopped.
    pub fn send(&self, message: ServiceMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Accepts a JSON-encoded message. Malformed input is logged and dropped.
    pub fn send_json(&self, bytes: &[u8]) -> bool {
        match messages::decode(bytes) {
            Some(message) => self.send(message),
            None => false,
        }
    }
}

pub struct NavigatorService {
    config: ConfigStore,
    ids: Arc<ResourceIds>,
    notifications: Arc<NotificationCenter>,
    activity: LogManager,
    index: Arc<dyn MediaIndex>,
    move_targets: Arc<RecentMoveTargets>,
    orchestrator: Arc<MoveOrchestrator>,
    batches: BatchMoveCoordinator,
    bridge: ResultBridge,
    batch_tokens: RwLock<HashMap<String, CancellationToken>>,
    watchers: Mutex<WatcherManager>,
    observer_tasks: Mutex<Vec<JoinHandle<()>>>,
    handle: ServiceHandle,
    stopped: CancellationToken,
}

impl std::fmt::Debug for NavigatorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigatorService").finish_non_exhaustive()
    }
}

impl NavigatorService {
    /// Service over the filesystem index, with permissions kept in the config.
    pub fn new(
        config: ConfigStore,
        sink: Arc<dyn NotificationSink>,
        picker: Arc<dyn DestinationPicker>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServiceMessage>) {
        let snapshot = config.snapshot();
        let index = Arc::new(FsMediaIndex::new(snapshot.storage_root));
        let permissions = Arc::new(ConfigPermissions::new(config.clone()));
        Self::with_components(config, sink, picker, permissions, index)
    }

    pub fn with_components(
        config: ConfigStore,
        sink: Arc<dyn NotificationSink>,
        picker: Arc<dyn DestinationPicker>,
        permissions: Arc<dyn StoragePermissions>,
        index: Arc<dyn MediaIndex>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServiceMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = config.snapshot();
        let move_targets = Arc::new(RecentMoveTargets::new(Duration::from_secs(
            snapshot.max_record_age_secs,
        )));

        let ids = Arc::new(ResourceIds::default());
        let notifications = Arc::new(NotificationCenter::new(sink, snapshot.batch_threshold));
        let activity = LogManager::default();
        let orchestrator = Arc::new(
            MoveOrchestrator::new(permissions, picker).with_move_targets(move_targets.clone()),
        );
        let bridge = ResultBridge::new(
            config.clone(),
            ids.clone(),
            notifications.clone(),
            activity.clone(),
        );

        let service = Arc::new(Self {
            batches: BatchMoveCoordinator::new(orchestrator.clone()),
            config,
            ids,
            notifications,
            activity,
            index,
            move_targets,
            orchestrator,
            bridge,
            batch_tokens: RwLock::new(HashMap::new()),
            watchers: Mutex::new(WatcherManager::new()),
            observer_tasks: Mutex::new(Vec::new()),
            handle: ServiceHandle { tx },
            stopped: CancellationToken::new(),
        });
        (service, rx)
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn activity(&self) -> &LogManager {
        &self.activity
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        &self.notifications
    }

    pub fn resource_ids(&self) -> &Arc<ResourceIds> {
        &self.ids
    }

    pub(crate) fn observer_context(&self) -> ObserverContext {
        ObserverContext {
            config: self.config.clone(),
            ids: self.ids.clone(),
            notifications: self.notifications.clone(),
            activity: self.activity.clone(),
            index: self.index.clone(),
            move_targets: self.move_targets.clone(),
            service: self.handle.tx.clone(),
        }
    }

    /// Stops all watchers and starts fresh observers from the current
    /// configuration. Returns the number of endpoints now watched.
    pub fn rebuild_observers(&self) -> usize {
        let config = self.config.snapshot();
        match config.validate() {
            Ok(warnings) => {
                for warning in warnings {
                    warn!("{warning}");
                }
            }
            Err(e) => {
                error!("Invalid configuration, not watching anything: {e}");
                self.stop_observers();
                return 0;
            }
        }

        self.stop_observers();
        self.notifications.set_batch_threshold(config.batch_threshold);
        self.move_targets
            .set_ttl(Duration::from_secs(config.max_record_age_secs));

        let context = self.observer_context();
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut tasks = self
            .observer_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for observer in build_observers(&config, &context) {
            let endpoint = observer.endpoint();
            match watchers.start_watching(endpoint, &config.endpoint_roots(endpoint)) {
                Ok(feed) => tasks.push(observer.spawn(feed)),
                Err(e) => warn!(
                    code = error_codes::ERR_WATCH_START_FAILED,
                    "Not watching {}: {e}",
                    endpoint.key()
                ),
            }
        }

        let watched = watchers.get_watching_endpoints().len();
        info!("Observers rebuilt, watching {watched} endpoints");
        watched
    }

    pub fn stop_observers(&self) {
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop_all();
        for task in self
            .observer_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }

    /// Receives messages until shutdown, running each on its own task.
    ///
    /// Batch tokens are registered and cancelled here, in arrival order, so a
    /// cancel sent right after its start always reaches the batch.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<ServiceMessage>) {
        loop {
            let message = tokio::select! {
                _ = self.stopped.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            let service = self.clone();
            match message {
                ServiceMessage::StartBatchMove {
                    batch_id,
                    destination,
                    moves,
                } => {
                    let token = self.register_batch(&batch_id).await;
                    tokio::spawn(async move {
                        service.run_batch(batch_id, token, destination, moves).await;
                    });
                }
                ServiceMessage::CancelBatchMove { batch_id } => self.cancel_batch(&batch_id).await,
                message => {
                    tokio::spawn(async move { service.dispatch(message).await });
                }
            }
        }
        debug!("Service loop finished");
    }

    pub async fn dispatch(&self, message: ServiceMessage) {
        debug!("Handling {}", message.name());
        match message {
            ServiceMessage::MoveFile {
                operation,
                resources,
            } => self.move_file(operation, resources).await,
            ServiceMessage::StartBatchMove {
                batch_id,
                destination,
                moves,
            } => {
                self.batch_move(batch_id, destination, moves).await;
            }
            ServiceMessage::CancelBatchMove { batch_id } => self.cancel_batch(&batch_id).await,
            ServiceMessage::CleanupNotificationResources { resources } => {
                self.bridge.cleanup(&resources)
            }
            ServiceMessage::DeleteFile { file, resources } => {
                self.delete_file(file, resources).await
            }
            ServiceMessage::RebuildObservers => {
                self.rebuild_observers();
            }
        }
    }

    async fn move_file(&self, operation: MoveOperation, resources: Option<NotificationResources>) {
        // None: picker left without a grant, the notification stays actionable.
        if let Some(result) = self.orchestrator.execute(&operation).await {
            self.bridge
                .on_move_result(&operation, resources.as_ref(), &result);
        }
    }

    async fn delete_file(&self, file: DetectedFile, resources: Option<NotificationResources>) {
        let result = self.orchestrator.delete(&file).await;
        self.bridge.on_delete_result(&file, resources.as_ref(), result);
    }

    async fn cancel_batch(&self, batch_id: &str) {
        match self.batch_tokens.read().await.get(batch_id) {
            Some(token) => {
                info!("Cancelling batch {batch_id}");
                token.cancel();
            }
            None => debug!("No running batch {batch_id}"),
        }
    }

    /// `None` when a batch with this id is already running.
    async fn register_batch(&self, batch_id: &str) -> Option<CancellationToken> {
        let mut tokens = self.batch_tokens.write().await;
        if tokens.contains_key(batch_id) {
            warn!("Batch {batch_id} is already running, ignoring the new request");
            return None;
        }
        let token = CancellationToken::new();
        tokens.insert(batch_id.to_string(), token.clone());
        Some(token)
    }

    pub async fn batch_move(
        &self,
        batch_id: String,
        destination: MoveDestination,
        moves: Vec<PendingMove>,
    ) -> BatchMoveResults {
        let token = self.register_batch(&batch_id).await;
        self.run_batch(batch_id, token, destination, moves).await
    }

    async fn run_batch(
        &self,
        batch_id: String,
        token: Option<CancellationToken>,
        destination: MoveDestination,
        moves: Vec<PendingMove>,
    ) -> BatchMoveResults {
        let Some(token) = token else {
            let mut results = BatchMoveResults::new(moves.len());
            results.skipped = moves.len();
            return results;
        };

        let ids: Vec<u32> = moves.iter().map(|m| m.resources.id).collect();
        self.notifications.claim_pending(&ids);

        let bridge = &self.bridge;
        let run = self
            .batches
            .run(
                &destination,
                moves,
                &token,
                |pending, operation, result| {
                    bridge.on_move_result(operation, Some(&pending.resources), result)
                },
                |progress| bridge.on_batch_progress(&batch_id, progress),
            )
            .await;

        self.batch_tokens.write().await.remove(&batch_id);

        let live: Vec<PendingMove> = run
            .unstarted
            .into_iter()
            .filter(|m| self.ids.notifications.is_live(m.resources.id))
            .collect();
        self.notifications.restore_pending(live);

        self.bridge.on_batch_complete(&run.results);
        run.results
    }

    pub async fn shutdown(&self) {
        self.stopped.cancel();
        self.stop_observers();
        for token in self.batch_tokens.read().await.values() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavigatorConfig;
    use crate::notification::{ChannelNotificationSink, NotificationEvent};
    use crate::permissions::StaticPicker;
    use tempfile::TempDir;

    fn service(root: &TempDir) -> (Arc<NavigatorService>, mpsc::UnboundedReceiver<NotificationEvent>) {
        let config = ConfigStore::in_memory(NavigatorConfig {
            granted_destinations: vec![root.path().to_path_buf()],
            ..NavigatorConfig::with_storage_root(root.path().to_path_buf())
        });
        let (sink, events) = ChannelNotificationSink::new();
        let (service, rx) = NavigatorService::new(config, Arc::new(sink), Arc::new(StaticPicker::Deny));
        // Keep the message receiver open for the test's lifetime.
        std::mem::forget(rx);
        (service, events)
    }

    #[tokio::test]
    async fn test_rebuild_watches_existing_roots() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("Download")).unwrap();
        let (service, _events) = service(&root);

        assert_eq!(service.rebuild_observers(), 4);

        service
            .config()
            .update(|c| c.watch.set_type_enabled(crate::media::FileType::Audio, false))
            .unwrap();
        assert_eq!(service.rebuild_observers(), 3);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_config_degrades_to_no_observers() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("Download")).unwrap();
        let (service, _events) = service(&root);
        service.config().update(|c| c.batch_threshold = 0).unwrap();

        assert_eq!(service.rebuild_observers(), 0);
    }

    #[tokio::test]
    async fn test_cancel_unknown_batch_is_ignored() {
        let root = TempDir::new().unwrap();
        let (service, mut events) = service(&root);
        service
            .dispatch(ServiceMessage::CancelBatchMove {
                batch_id: "nope".into(),
            })
            .await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handle_rejects_malformed_json() {
        let root = TempDir::new().unwrap();
        let (service, _events) = service(&root);
        assert!(!service.handle().send_json(b"{oops"));
        assert!(service.handle().send_json(br#"{"type":"rebuild_observers"}"#));
    }
}
