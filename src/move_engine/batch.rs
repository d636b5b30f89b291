use crate::move_engine::engine::MoveOrchestrator;
use crate::move_engine::types::{
    BatchMoveProgress, BatchMoveResults, DestinationSelectionManner, MoveDestination,
    MoveOperation, MoveResult,
};
use crate::notification::PendingMove;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Outcome of one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRun {
    pub results: BatchMoveResults,
    /// Items that never produced a result: not started because of
    /// cancellation, or the picker was left without a grant.
    pub unstarted: Vec<PendingMove>,
}

/// Runs a list of moves to one destination, one at a time.
#[derive(Debug, Clone)]
pub struct BatchMoveCoordinator {
    orchestrator: Arc<MoveOrchestrator>,
}

impl BatchMoveCoordinator {
    pub fn new(orchestrator: Arc<MoveOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// `on_item` sees every produced result (for per-notification cleanup),
    /// `on_progress` fires after each item. Cancellation is checked between
    /// items; an item in flight always runs to its result.
    pub async fn run(
        &self,
        destination: &MoveDestination,
        moves: Vec<PendingMove>,
        cancel: &CancellationToken,
        mut on_item: impl FnMut(&PendingMove, &MoveOperation, &MoveResult),
        mut on_progress: impl FnMut(BatchMoveProgress),
    ) -> BatchRun {
        let total = moves.len();
        let mut results = BatchMoveResults::new(total);
        let mut unstarted = Vec::new();
        let mut items = moves.into_iter();

        info!("Starting batch move of {total} files to {}", destination.directory().display());

        for (index, pending) in items.by_ref().enumerate() {
            if cancel.is_cancelled() {
                debug!("Batch cancelled before item {}", index + 1);
                unstarted.push(pending);
                break;
            }

            let operation = MoveOperation::new(
                pending.file.clone(),
                destination.clone(),
                DestinationSelectionManner::Picked,
            )
            .into_batched();

            match self.orchestrator.execute(&operation).await {
                Some(result) => {
                    results.add(&result);
                    on_item(&pending, &operation, &result);
                }
                None => unstarted.push(pending),
            }

            on_progress(BatchMoveProgress {
                current: index + 1,
                total,
            });
        }

        unstarted.extend(items);
        results.skipped = unstarted.len();
        results.cancelled = cancel.is_cancelled();

        info!("Batch finished: {}", results.summary_message());
        BatchRun { results, unstarted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, NavigatorConfig};
    use crate::move_engine::types::{MoveFailure, MoveResultKind};
    use crate::notification::tests::detected;
    use crate::notification::NotificationResources;
    use crate::media::{FileType, MediaIndex, FsMediaIndex, SourceKind};
    use crate::permissions::{ConfigPermissions, StaticPicker};
    use std::path::Path;
    use tempfile::TempDir;

    fn coordinator(root: &Path) -> BatchMoveCoordinator {
        let config = ConfigStore::in_memory(NavigatorConfig {
            granted_destinations: vec![root.to_path_buf()],
            ..NavigatorConfig::with_storage_root(root.to_path_buf())
        });
        BatchMoveCoordinator::new(Arc::new(MoveOrchestrator::new(
            Arc::new(ConfigPermissions::new(config)),
            Arc::new(StaticPicker::Deny),
        )))
    }

    fn pending(root: &Path, name: &str, id: u32) -> PendingMove {
        let path = root.join("Download").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, name.as_bytes()).unwrap();
        let mut file = detected("Download/x.pdf", FileType::Pdf, SourceKind::Download);
        file.record = FsMediaIndex::new(root.to_path_buf()).query(&path).unwrap();
        PendingMove {
            file,
            resources: NotificationResources {
                id,
                request_codes: vec![],
            },
        }
    }

    #[tokio::test]
    async fn test_batch_reports_monotonic_progress() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("Documents");
        std::fs::create_dir(&dest).unwrap();
        let moves = (0..3)
            .map(|i| pending(temp.path(), &format!("f{i}.pdf"), 1000 + i))
            .collect();

        let mut progress = Vec::new();
        let mut seen = Vec::new();
        let run = coordinator(temp.path())
            .run(
                &MoveDestination::Directory(dest.clone()),
                moves,
                &CancellationToken::new(),
                |pending, operation, _| {
                    assert!(operation.batched);
                    seen.push(pending.resources.id);
                },
                |p| progress.push((p.current, p.total)),
            )
            .await;

        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(seen, vec![1000, 1001, 1002]);
        assert_eq!(run.results.count(MoveResultKind::Success), 3);
        assert_eq!(run.results.completed(), 3);
        assert!(run.unstarted.is_empty());
        assert!(dest.join("f2.pdf").exists());
    }

    #[tokio::test]
    async fn test_failed_item_does_not_abort_batch() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("Documents");
        std::fs::create_dir(&dest).unwrap();
        let first = pending(temp.path(), "a.pdf", 1000);
        let second = pending(temp.path(), "b.pdf", 1001);
        std::fs::remove_file(first.file.path()).unwrap();

        let run = coordinator(temp.path())
            .run(
                &MoveDestination::Directory(dest),
                vec![first, second],
                &CancellationToken::new(),
                |_, _, _| {},
                |_| {},
            )
            .await;

        assert_eq!(run.results.count(MoveFailure::MoveFileNotFound.into()), 1);
        assert_eq!(run.results.successes(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_batch_skips_remaining_items() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("Documents");
        std::fs::create_dir(&dest).unwrap();
        let moves: Vec<_> = (0..3)
            .map(|i| pending(temp.path(), &format!("f{i}.pdf"), 1000 + i))
            .collect();

        let token = CancellationToken::new();
        let cancel = token.clone();
        let run = coordinator(temp.path())
            .run(
                &MoveDestination::Directory(dest),
                moves,
                &token,
                |_, _, _| {},
                |p| {
                    if p.current == 1 {
                        cancel.cancel();
                    }
                },
            )
            .await;

        assert!(run.results.cancelled);
        assert_eq!(run.results.successes(), 1);
        assert_eq!(run.results.skipped, 2);
        let skipped: Vec<_> = run.unstarted.iter().map(|p| p.resources.id).collect();
        assert_eq!(skipped, vec![1001, 1002]);
        assert!(run.results.summary_message().contains("2 skipped"));
    }
}
