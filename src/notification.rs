//! Notification requests handed to the external renderer.
//!
//! The renderer only sees [`Notification`] values: an id, display content and
//! action descriptors. Everything needed to act on a new-file notification
//! (record snapshot, classification, quick destinations, resources) travels
//! inside it, so no action has to re-query the media index.

use crate::classifier::Classification;
use crate::id_allocator::{
    ResourceIdAllocator, AUX_NOTIFICATION_SEED, BATCH_MOVE_NOTIFICATION_ID,
    NEW_FILE_NOTIFICATION_SEED, REQUEST_CODE_SEED,
};
use crate::media::{FileType, SourceKind};
use crate::messages::ServiceMessage;
use crate::move_engine::{
    BatchMoveProgress, BatchMoveResults, DetectedFile, MoveDestination, MoveOperation,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Ids bound to one live notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResources {
    pub id: u32,
    pub request_codes: Vec<u32>,
}

/// The allocators of one service instance.
#[derive(Debug)]
pub struct ResourceIds {
    pub notifications: ResourceIdAllocator,
    pub auxiliary: ResourceIdAllocator,
    pub request_codes: ResourceIdAllocator,
}

impl Default for ResourceIds {
    fn default() -> Self {
        Self {
            notifications: ResourceIdAllocator::new(NEW_FILE_NOTIFICATION_SEED),
            auxiliary: ResourceIdAllocator::new(AUX_NOTIFICATION_SEED),
            request_codes: ResourceIdAllocator::new(REQUEST_CODE_SEED),
        }
    }
}

impl ResourceIds {
    pub fn allocate(&self, request_codes: usize) -> NotificationResources {
        NotificationResources {
            id: self.notifications.allocate(),
            request_codes: self.request_codes.allocate_many(request_codes),
        }
    }

    pub fn allocate_auxiliary(&self) -> NotificationResources {
        NotificationResources {
            id: self.auxiliary.allocate(),
            request_codes: Vec::new(),
        }
    }

    /// Releases the id from whichever namespace owns it and returns whether
    /// it was still live.
    pub fn release(&self, resources: &NotificationResources) -> bool {
        self.request_codes.release_all(&resources.request_codes);
        let from_new_file = self.notifications.release(resources.id);
        let from_auxiliary = self.auxiliary.release(resources.id);
        from_new_file || from_auxiliary
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMove {
    pub file: DetectedFile,
    pub resources: NotificationResources,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFileNotification {
    pub file: DetectedFile,
    pub quick_destinations: Vec<PathBuf>,
    pub resources: NotificationResources,
}

impl NewFileNotification {
    /// Message for a destination the user just picked.
    pub fn move_to(&self, dir: PathBuf) -> ServiceMessage {
        ServiceMessage::MoveFile {
            operation: MoveOperation::picked(self.file.clone(), dir),
            resources: Some(self.resources.clone()),
        }
    }

    pub fn quick_move(&self, index: usize) -> Option<ServiceMessage> {
        let dir = self.quick_destinations.get(index)?;
        Some(ServiceMessage::MoveFile {
            operation: MoveOperation::quick(self.file.clone(), dir.clone()),
            resources: Some(self.resources.clone()),
        })
    }

    pub fn delete(&self) -> ServiceMessage {
        ServiceMessage::DeleteFile {
            file: self.file.clone(),
            resources: Some(self.resources.clone()),
        }
    }

    pub fn dismiss(&self) -> ServiceMessage {
        ServiceMessage::CleanupNotificationResources {
            resources: self.resources.clone(),
        }
    }

    pub fn pending_move(&self) -> PendingMove {
        PendingMove {
            file: self.file.clone(),
            resources: self.resources.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    NewFile(NewFileNotification),
    MoveBatch { pending: Vec<PendingMove> },
    BatchProgress(BatchMoveProgress),
    BatchResults(BatchMoveResults),
    DestinationInvalid {
        file_type: FileType,
        source_kind: SourceKind,
        destination: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// The renderer opens a destination picker and sends the resulting message.
    PickDestination,
    QuickMove(PathBuf),
    Delete,
    Dismiss,
    MoveAll,
    CancelBatch(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub label: String,
    pub request_code: Option<u32>,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u32,
    pub content: NotificationContent,
    pub actions: Vec<NotificationAction>,
    pub kind: NotificationKind,
}

/// Title for a new file of the given classification.
pub fn new_file_title(classification: &Classification) -> String {
    let label = classification.file_type.label();
    match (classification.file_type, classification.source_kind) {
        (FileType::Image, SourceKind::Screenshot) => "New screenshot".to_string(),
        (FileType::Video, SourceKind::Screenshot) => "New screen recording".to_string(),
        (FileType::Image, SourceKind::Camera) => "New photo".to_string(),
        (FileType::Video, SourceKind::Camera) => "New video".to_string(),
        (_, SourceKind::Recording) => "New audio recording".to_string(),
        (_, SourceKind::Download) => format!("New {label} download"),
        (_, SourceKind::OtherApp) => match &classification.app_name {
            Some(app) => format!("New {label} from {app}"),
            None => format!("New {label} from another app"),
        },
        (_, _) => format!("New {label}"),
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Display data for every notification kind.
pub fn notification_content(kind: &NotificationKind) -> NotificationContent {
    match kind {
        NotificationKind::NewFile(n) => NotificationContent {
            title: new_file_title(&n.file.classification),
            body: format!("{} ({})", n.file.record.name, format_size(n.file.record.size)),
        },
        NotificationKind::MoveBatch { pending } => NotificationContent {
            title: format!("{} new files", pending.len()),
            body: "Move all of them to one destination".to_string(),
        },
        NotificationKind::BatchProgress(progress) => NotificationContent {
            title: "Moving files".to_string(),
            body: format!("{}/{}", progress.current, progress.total),
        },
        NotificationKind::BatchResults(results) => NotificationContent {
            title: "Batch move finished".to_string(),
            body: results.summary_message(),
        },
        NotificationKind::DestinationInvalid {
            file_type,
            source_kind,
            destination,
        } => NotificationContent {
            title: "Destination removed".to_string(),
            body: format!(
                "{} no longer exists and was removed from the {} {} destinations",
                destination.display(),
                source_kind.label().to_lowercase(),
                file_type.label()
            ),
        },
    }
}

fn action(label: &str, request_code: Option<u32>, kind: ActionKind) -> NotificationAction {
    NotificationAction {
        label: label.to_string(),
        request_code,
        kind,
    }
}

impl Notification {
    /// Number of request codes a new-file notification needs.
    pub fn new_file_request_codes(quick_destinations: usize) -> usize {
        quick_destinations + 3
    }

    pub fn new_file(payload: NewFileNotification) -> Self {
        let mut codes = payload.resources.request_codes.iter().copied();
        let mut actions = vec![action("Move", codes.next(), ActionKind::PickDestination)];
        for dir in &payload.quick_destinations {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| dir.display().to_string());
            actions.push(action(
                &format!("Move to {name}"),
                codes.next(),
                ActionKind::QuickMove(dir.clone()),
            ));
        }
        actions.push(action("Delete", codes.next(), ActionKind::Delete));
        actions.push(action("Dismiss", codes.next(), ActionKind::Dismiss));

        Self::with_kind(payload.resources.id, NotificationKind::NewFile(payload), actions)
    }

    pub fn with_kind(id: u32, kind: NotificationKind, actions: Vec<NotificationAction>) -> Self {
        Self {
            id,
            content: notification_content(&kind),
            actions,
            kind,
        }
    }
}

/// External notification renderer.
pub trait NotificationSink: Send + Sync {
    fn post(&self, notification: Notification);
    fn cancel(&self, id: u32);
    /// Short-lived feedback, e.g. a toast.
    fn toast(&self, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    Posted(Notification),
    Cancelled(u32),
    Toast(String),
}

/// Forwards everything to a channel, for an embedding UI or tests.
#[derive(Debug, Clone)]
pub struct ChannelNotificationSink {
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

impl ChannelNotificationSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelNotificationSink {
    fn post(&self, notification: Notification) {
        let _ = self.tx.send(NotificationEvent::Posted(notification));
    }

    fn cancel(&self, id: u32) {
        let _ = self.tx.send(NotificationEvent::Cancelled(id));
    }

    fn toast(&self, message: &str) {
        let _ = self.tx.send(NotificationEvent::Toast(message.to_string()));
    }
}

#[derive(Debug, Default)]
struct PendingState {
    pending: BTreeMap<u32, PendingMove>,
    batch_posted: bool,
    batch_threshold: usize,
}

enum BatchUpdate {
    Post(Vec<PendingMove>),
    Withdraw,
    Unchanged,
}

/// Wraps the sink and tracks live new-file notifications so that a batch
/// notification appears once enough of them pile up.
pub struct NotificationCenter {
    sink: Arc<dyn NotificationSink>,
    state: Mutex<PendingState>,
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter").finish_non_exhaustive()
    }
}

impl NotificationCenter {
    pub fn new(sink: Arc<dyn NotificationSink>, batch_threshold: usize) -> Self {
        Self {
            sink,
            state: Mutex::new(PendingState {
                batch_threshold,
                ..PendingState::default()
            }),
        }
    }

    pub fn post_new_file(&self, payload: NewFileNotification) {
        let pending = payload.pending_move();
        let notification = Notification::new_file(payload);
        debug!("Posting notification {}: {}", notification.id, notification.content.title);
        self.sink.post(notification);

        let update = self.with_state(|state| {
            state.pending.insert(pending.resources.id, pending);
        });
        self.apply(update);
    }

    pub fn post(&self, notification: Notification) {
        self.sink.post(notification);
    }

    pub fn cancel(&self, id: u32) {
        self.sink.cancel(id);
        let update = self.with_state(|state| {
            state.pending.remove(&id);
        });
        self.apply(update);
    }

    pub fn toast(&self, message: &str) {
        self.sink.toast(message);
    }

    pub fn pending_moves(&self) -> Vec<PendingMove> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .values()
            .cloned()
            .collect()
    }

    /// Takes the given notifications out of the pending set because a batch
    /// now owns them. Their notifications stay visible until each result.
    pub fn claim_pending(&self, ids: &[u32]) -> Vec<PendingMove> {
        let mut claimed = Vec::new();
        let update = self.with_state(|state| {
            for id in ids {
                if let Some(pending) = state.pending.remove(id) {
                    claimed.push(pending);
                }
            }
        });
        self.apply(update);
        claimed
    }

    /// Returns unstarted batch items to the pending set.
    pub fn restore_pending(&self, moves: Vec<PendingMove>) {
        let update = self.with_state(|state| {
            for pending in moves {
                state.pending.insert(pending.resources.id, pending);
            }
        });
        self.apply(update);
    }

    pub fn set_batch_threshold(&self, threshold: usize) {
        let update = self.with_state(|state| state.batch_threshold = threshold);
        self.apply(update);
    }

    fn with_state(&self, f: impl FnOnce(&mut PendingState)) -> BatchUpdate {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let before = state.pending.len();
        f(&mut state);

        if state.pending.len() >= state.batch_threshold {
            if state.batch_posted && state.pending.len() == before {
                return BatchUpdate::Unchanged;
            }
            state.batch_posted = true;
            BatchUpdate::Post(state.pending.values().cloned().collect())
        } else if state.batch_posted {
            state.batch_posted = false;
            BatchUpdate::Withdraw
        } else {
            BatchUpdate::Unchanged
        }
    }

    fn apply(&self, update: BatchUpdate) {
        match update {
            BatchUpdate::Post(pending) => {
                self.sink.post(Notification::with_kind(
                    BATCH_MOVE_NOTIFICATION_ID,
                    NotificationKind::MoveBatch { pending },
                    vec![action("Move all", None, ActionKind::MoveAll)],
                ));
            }
            BatchUpdate::Withdraw => self.sink.cancel(BATCH_MOVE_NOTIFICATION_ID),
            BatchUpdate::Unchanged => {}
        }
    }
}

/// Builds the batch-start message for the pending moves and a picked directory.
pub fn batch_move_message(batch_id: String, destination: PathBuf, pending: Vec<PendingMove>) -> ServiceMessage {
    ServiceMessage::StartBatchMove {
        batch_id,
        destination: MoveDestination::Directory(destination),
        moves: pending,
    }
}
