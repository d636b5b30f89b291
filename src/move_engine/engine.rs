use crate::config::DEFAULT_MAX_RECORD_AGE_SECS;
use crate::dedup_cache::RecentMoveTargets;
use crate::media::PENDING_FILE_PREFIX;
use crate::move_engine::types::{
    DeleteResult, DetectedFile, MoveDestination, MoveFailure, MoveOperation, MoveResult,
};
use crate::path_validation::join_file_name;
use crate::permissions::{DestinationPicker, PickerOutcome, PickerRequest, StoragePermissions};
use crate::system_integration::{available_space, is_writable_dir, same_volume};
use std::collections::HashMap;
use std::hash::Hasher;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

enum TransferError {
    Failed(MoveFailure),
    Io(io::Error),
}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> Self {
        TransferError::Io(e)
    }
}

impl From<MoveFailure> for TransferError {
    fn from(failure: MoveFailure) -> Self {
        TransferError::Failed(failure)
    }
}

enum Resolution {
    Ready(MoveDestination),
    /// The picker was dismissed, denied or went away.
    Abandoned(&'static str),
}

/// Executes move operations. Stateless per call apart from the
/// per-destination locks, so concurrent moves are fine.
pub struct MoveOrchestrator {
    permissions: Arc<dyn StoragePermissions>,
    picker: Arc<dyn DestinationPicker>,
    destination_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    move_targets: Arc<RecentMoveTargets>,
}

impl std::fmt::Debug for MoveOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoveOrchestrator").finish_non_exhaustive()
    }
}

impl MoveOrchestrator {
    pub fn new(permissions: Arc<dyn StoragePermissions>, picker: Arc<dyn DestinationPicker>) -> Self {
        Self {
            permissions,
            picker,
            destination_locks: Mutex::new(HashMap::new()),
            move_targets: Arc::new(RecentMoveTargets::new(Duration::from_secs(
                DEFAULT_MAX_RECORD_AGE_SECS,
            ))),
        }
    }

    /// Shares the set of written targets with the observers.
    pub fn with_move_targets(mut self, move_targets: Arc<RecentMoveTargets>) -> Self {
        self.move_targets = move_targets;
        self
    }

    /// Runs one operation to its result. `None` when the destination picker
    /// was left without a grant; the operation is dropped and its
    /// notification stays actionable.
    pub async fn execute(&self, operation: &MoveOperation) -> Option<MoveResult> {
        let source = operation.file.path();

        if !self.permissions.manage_all_files_granted() {
            return Some(MoveFailure::ManageAllFilesPermissionMissing.into());
        }
        match fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Some(MoveFailure::MoveFileNotFound.into()),
        }

        let destination = match self.resolve_destination(operation).await {
            Resolution::Ready(destination) => destination,
            Resolution::Abandoned(reason) => {
                debug!("Destination picker {reason} for {}", source.display());
                return None;
            }
        };

        let lock = self.destination_lock(destination.directory());
        let result = {
            let _guard = lock.lock().await;
            match self
                .transfer(&source, &operation.file.record.name, &destination)
                .await
            {
                Ok(target) => MoveResult::Success { destination: target },
                Err(TransferError::Failed(failure)) => failure.into(),
                Err(TransferError::Io(e)) => {
                    let failure = classify_io_error(&e, &source, destination.directory()).await;
                    warn!("Moving {} failed: {e} ({:?})", source.display(), failure);
                    failure.into()
                }
            }
        };
        drop(lock);
        self.prune_locks();

        match &result {
            MoveResult::Success { destination } => {
                info!("Moved {} to {}", source.display(), destination.display())
            }
            MoveResult::Failure(failure) => {
                info!("Move of {} ended with {:?}", source.display(), failure)
            }
        }
        Some(result)
    }

    async fn resolve_destination(&self, operation: &MoveOperation) -> Resolution {
        let requested = operation.destination.directory();
        if self.permissions.has_destination_grant(requested) {
            return Resolution::Ready(operation.destination.clone());
        }

        let (reply, response) = oneshot::channel();
        self.picker.request(PickerRequest {
            operation: operation.clone(),
            reply,
        });

        // No timeout: resolved by the user or by the picker going away.
        match response.await {
            Ok(PickerOutcome::Granted(dir)) => {
                if let Err(e) = self.permissions.persist_destination_grant(&dir) {
                    warn!("Failed to persist grant for {}: {e}", dir.display());
                }
                let destination = match &operation.destination {
                    MoveDestination::Directory(_) => MoveDestination::Directory(dir),
                    MoveDestination::File(path) => match path.file_name() {
                        Some(name) => MoveDestination::File(dir.join(name)),
                        None => MoveDestination::Directory(dir),
                    },
                };
                Resolution::Ready(destination)
            }
            Ok(PickerOutcome::Dismissed) => Resolution::Abandoned("dismissed"),
            Ok(PickerOutcome::Denied) => Resolution::Abandoned("denied"),
            Err(_) => Resolution::Abandoned("closed"),
        }
    }

    async fn transfer(
        &self,
        source: &Path,
        source_name: &str,
        destination: &MoveDestination,
    ) -> Result<PathBuf, TransferError> {
        let dir = destination.directory();
        match fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(MoveFailure::MoveDestinationNotFound.into()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MoveFailure::MoveDestinationNotFound.into())
            }
            Err(e) => return Err(e.into()),
        }
        if !is_writable_dir(dir) {
            warn!("Destination {} is not writable", dir.display());
            return Err(MoveFailure::InternalError.into());
        }

        let name = destination.file_name(source_name);
        let target = join_file_name(dir, name).map_err(|e| {
            warn!("Rejected target name {name:?}: {e}");
            MoveFailure::InternalError
        })?;
        if target == source {
            return Err(MoveFailure::FileAlreadyAtDestination.into());
        }

        let size = fs::metadata(source).await?.len();
        let target = match resolve_conflict(source, size, target).await? {
            Some(target) => target,
            None => return Err(MoveFailure::FileAlreadyAtDestination.into()),
        };

        self.move_targets.record(&target);
        if same_volume(source, dir) {
            fs::rename(source, &target).await?;
            return Ok(target);
        }

        match available_space(dir) {
            Ok(available) if available < size => {
                return Err(MoveFailure::NotEnoughSpaceOnDestination.into())
            }
            Ok(_) => {}
            Err(e) => warn!("Could not query free space of {}: {e}", dir.display()),
        }

        copy_across_volumes(source, &target).await?;
        Ok(target)
    }

    /// Deletes the file of a notification.
    pub async fn delete(&self, file: &DetectedFile) -> DeleteResult {
        if !self.permissions.manage_all_files_granted() {
            return DeleteResult::PermissionMissing;
        }

        let path = file.path();
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted {}", path.display());
                DeleteResult::Deleted
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => DeleteResult::FileNotFound,
            Err(e) => {
                warn!("Deleting {} failed: {e}", path.display());
                DeleteResult::InternalError
            }
        }
    }

    fn destination_lock(&self, dir: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .destination_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(dir.to_path_buf()).or_default().clone()
    }

    fn prune_locks(&self) {
        self.destination_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// Returns the path to write to, or `None` when an identical file already
/// sits at `target`. A differing file keeps its name; the new one gets a
/// numbered suffix.
async fn resolve_conflict(source: &Path, size: u64, target: PathBuf) -> io::Result<Option<PathBuf>> {
    let existing = match fs::metadata(&target).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Some(target)),
        Err(e) => return Err(e),
    };

    if existing.is_file()
        && existing.len() == size
        && calculate_checksum(source).await? == calculate_checksum(&target).await?
    {
        return Ok(None);
    }

    let dir = target.parent().unwrap_or(Path::new("/")).to_path_buf();
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{stem} ({n}){extension}"));
        if !fs::try_exists(&candidate).await? {
            debug!("Name conflict at {}, using {}", target.display(), candidate.display());
            return Ok(Some(candidate));
        }
        n += 1;
    }
}

async fn calculate_checksum(path: &Path) -> io::Result<u64> {
    use twox_hash::XxHash64;

    let mut file = fs::File::open(path).await?;
    let mut hasher = XxHash64::with_seed(0);
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.write(&buffer[..n]);
    }

    Ok(hasher.finish())
}

/// Copy into a pending temp file next to the target, then rename it into
/// place and remove the source. The temp name keeps observers quiet while
/// the copy is in flight.
async fn copy_across_volumes(source: &Path, target: &Path) -> io::Result<()> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = target.with_file_name(format!("{PENDING_FILE_PREFIX}{name}"));

    let result = async {
        fs::copy(source, &temp).await?;

        let meta = fs::metadata(source).await?;
        let modified = meta.modified()?;
        filetime::set_file_mtime(&temp, filetime::FileTime::from_system_time(modified))?;

        fs::rename(&temp, target).await
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&temp).await;
        return Err(e);
    }

    match fs::remove_file(source).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Maps a transfer I/O error to a failure by re-inspecting the environment.
async fn classify_io_error(error: &io::Error, source: &Path, dir: &Path) -> MoveFailure {
    let dir_exists = fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false);
    if !dir_exists {
        return MoveFailure::MoveDestinationNotFound;
    }
    if !fs::try_exists(source).await.unwrap_or(false) {
        return MoveFailure::MoveFileNotFound;
    }
    if error.raw_os_error() == Some(nix::libc::ENOSPC) {
        return MoveFailure::NotEnoughSpaceOnDestination;
    }
    MoveFailure::InternalError
}
