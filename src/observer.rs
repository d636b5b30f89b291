//! Change observers: one per watched endpoint, turning raw path events into
//! new-file notifications or automatic moves.
//!
//! Records are classified before the dedup check, so files outside the
//! watched types and sources never occupy a cache slot. Files the service
//! itself just moved are skipped before either.

use crate::classifier::Classifier;
use crate::config::{ConfigStore, NavigatorConfig};
use crate::dedup_cache::{RecentEventCache, RecentMoveTargets};
use crate::logging::{LogCategory, LogManager};
use crate::media::{FileRecord, MediaIndex, WatchEndpoint};
use crate::messages::ServiceMessage;
use crate::move_engine::{DetectedFile, MoveOperation};
use crate::notification::{NewFileNotification, Notification, NotificationCenter, ResourceIds};
use crate::watcher::WatchFeed;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What an event ended up as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverOutcome {
    /// The index had no entry for the path.
    NotFound,
    Pending,
    /// Written by one of our own moves.
    MovedHere,
    /// Created longer ago than the configured maximum age.
    Stale,
    Unclassified,
    Duplicate,
    /// New-file notification posted with this id.
    Notified(u32),
    AutoMove(PathBuf),
}

/// Everything observers share with the rest of the service.
#[derive(Clone)]
pub struct ObserverContext {
    pub config: ConfigStore,
    pub ids: Arc<ResourceIds>,
    pub notifications: Arc<NotificationCenter>,
    pub activity: LogManager,
    pub index: Arc<dyn MediaIndex>,
    pub move_targets: Arc<RecentMoveTargets>,
    /// Receives auto-move requests.
    pub service: mpsc::UnboundedSender<ServiceMessage>,
}

impl std::fmt::Debug for ObserverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverContext").finish_non_exhaustive()
    }
}

pub struct ChangeObserver {
    classifier: Classifier,
    cache: RecentEventCache,
    max_record_age: Duration,
    context: ObserverContext,
}

impl std::fmt::Debug for ChangeObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeObserver")
            .field("endpoint", &self.classifier.endpoint())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl ChangeObserver {
    pub fn new(classifier: Classifier, max_record_age: Duration, context: ObserverContext) -> Self {
        Self {
            classifier,
            cache: RecentEventCache::default(),
            max_record_age,
            context,
        }
    }

    pub fn endpoint(&self) -> WatchEndpoint {
        self.classifier.endpoint()
    }

    pub fn cached_events(&self) -> usize {
        self.cache.len()
    }

    /// Fetches the record off the async threads and processes it.
    pub async fn on_event(&mut self, path: PathBuf) -> ObserverOutcome {
        let index = self.context.index.clone();
        let record = match tokio::task::spawn_blocking(move || index.query(&path)).await {
            Ok(record) => record,
            Err(e) => {
                error!("Index query panicked: {e}");
                None
            }
        };
        self.process(record)
    }

    pub fn process(&mut self, record: Option<FileRecord>) -> ObserverOutcome {
        let Some(record) = record else {
            return ObserverOutcome::NotFound;
        };
        if record.is_pending {
            return ObserverOutcome::Pending;
        }
        if self.context.move_targets.contains(&record.path()) {
            debug!("Ignoring our own move to {}", record.path().display());
            return ObserverOutcome::MovedHere;
        }

        let age = chrono::Utc::now().signed_duration_since(record.created_at);
        if age.to_std().is_ok_and(|age| age > self.max_record_age) {
            return ObserverOutcome::Stale;
        }

        let Some(classification) = self.classifier.classify(&record) else {
            return ObserverOutcome::Unclassified;
        };

        if self.cache.is_duplicate(&record) {
            debug!("Duplicate event for {}", record.path().display());
            self.cache.record(record);
            return ObserverOutcome::Duplicate;
        }
        self.cache.record(record.clone());

        let file = DetectedFile {
            record,
            classification,
        };
        info!(
            "Detected {} ({:?}/{:?})",
            file.path().display(),
            file.file_type(),
            file.source_kind()
        );
        self.context
            .activity
            .info(LogCategory::FileDetected, &file.path().display().to_string());

        let config = self.context.config.snapshot();
        if let Some(dir) = config.auto_move_destination(file.file_type(), file.source_kind()) {
            let dir = dir.to_path_buf();
            let message = ServiceMessage::from(MoveOperation::auto(file, dir.clone()));
            if self.context.service.send(message).is_err() {
                warn!("Service gone, dropping auto move to {}", dir.display());
            }
            return ObserverOutcome::AutoMove(dir);
        }

        let quick_destinations = config.quick_destinations(file.file_type(), file.source_kind());
        let resources = self
            .context
            .ids
            .allocate(Notification::new_file_request_codes(quick_destinations.len()));
        let id = resources.id;
        self.context.notifications.post_new_file(NewFileNotification {
            file,
            quick_destinations,
            resources,
        });
        ObserverOutcome::Notified(id)
    }

    /// Processes events from the feed in arrival order until the feed is
    /// cancelled or its watcher goes away.
    pub fn spawn(mut self, mut feed: WatchFeed) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = feed.cancellation_token.cancelled() => break,
                    path = feed.paths.recv() => match path {
                        Some(path) => {
                            self.on_event(path).await;
                        }
                        None => break,
                    },
                }
            }
            debug!("Observer for {} stopped", self.endpoint().key());
        })
    }
}

/// Builds one observer per endpoint with at least one enabled file type.
/// Endpoints whose classifier cannot be built are left out.
pub fn build_observers(config: &NavigatorConfig, context: &ObserverContext) -> Vec<ChangeObserver> {
    let max_record_age = Duration::from_secs(config.max_record_age_secs);

    WatchEndpoint::ALL
        .into_iter()
        .filter(|endpoint| !config.watch.enabled_types_for(*endpoint).is_empty())
        .filter_map(|endpoint| match Classifier::for_endpoint(endpoint, config) {
            Ok(classifier) => Some(ChangeObserver::new(
                classifier,
                max_record_age,
                context.clone(),
            )),
            Err(e) => {
                error!("Cannot build observer for {}: {e}", endpoint.key());
                None
            }
        })
        .collect()
}
