use crate::classifier::Classification;
use crate::error_codes;
use crate::media::{FileRecord, FileType, SourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A classified file that can be moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedFile {
    pub record: FileRecord,
    pub classification: Classification,
}

impl DetectedFile {
    pub fn file_type(&self) -> FileType {
        self.classification.file_type
    }

    pub fn source_kind(&self) -> SourceKind {
        self.classification.source_kind
    }

    pub fn path(&self) -> PathBuf {
        self.record.path()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveDestination {
    /// Keep the file name, place it inside this directory.
    Directory(PathBuf),
    /// Exact target path.
    File(PathBuf),
}

impl MoveDestination {
    /// The directory that receives the file.
    pub fn directory(&self) -> &Path {
        match self {
            MoveDestination::Directory(dir) => dir,
            MoveDestination::File(path) => path.parent().unwrap_or(path),
        }
    }

    pub fn file_name<'a>(&'a self, source_name: &'a str) -> &'a str {
        match self {
            MoveDestination::Directory(_) => source_name,
            MoveDestination::File(path) => path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(source_name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestinationSelectionManner {
    /// Chosen interactively for this move.
    Picked,
    /// A remembered quick-move destination.
    Quick,
    /// An auto-move rule.
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOperation {
    pub file: DetectedFile,
    pub destination: MoveDestination,
    pub manner: DestinationSelectionManner,
    pub batched: bool,
}

impl MoveOperation {
    pub fn new(
        file: DetectedFile,
        destination: MoveDestination,
        manner: DestinationSelectionManner,
    ) -> Self {
        Self {
            file,
            destination,
            manner,
            batched: false,
        }
    }

    pub fn picked(file: DetectedFile, dir: PathBuf) -> Self {
        Self::new(file, MoveDestination::Directory(dir), DestinationSelectionManner::Picked)
    }

    pub fn quick(file: DetectedFile, dir: PathBuf) -> Self {
        Self::new(file, MoveDestination::Directory(dir), DestinationSelectionManner::Quick)
    }

    pub fn auto(file: DetectedFile, dir: PathBuf) -> Self {
        Self::new(file, MoveDestination::Directory(dir), DestinationSelectionManner::Auto)
    }

    pub fn into_batched(mut self) -> Self {
        self.batched = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MoveFailure {
    ManageAllFilesPermissionMissing,
    MoveFileNotFound,
    /// Triggers invalidation of the remembered destination.
    MoveDestinationNotFound,
    NotEnoughSpaceOnDestination,
    FileAlreadyAtDestination,
    InternalError,
}

impl MoveFailure {
    pub fn code(&self) -> &'static str {
        match self {
            MoveFailure::ManageAllFilesPermissionMissing => {
                error_codes::ERR_MANAGE_ALL_FILES_PERMISSION_MISSING
            }
            MoveFailure::MoveFileNotFound => error_codes::ERR_MOVE_FILE_NOT_FOUND,
            MoveFailure::MoveDestinationNotFound => error_codes::ERR_MOVE_DESTINATION_NOT_FOUND,
            MoveFailure::NotEnoughSpaceOnDestination => {
                error_codes::ERR_NOT_ENOUGH_SPACE_ON_DESTINATION
            }
            MoveFailure::FileAlreadyAtDestination => error_codes::ERR_FILE_ALREADY_AT_DESTINATION,
            MoveFailure::InternalError => error_codes::ERR_INTERNAL,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            MoveFailure::ManageAllFilesPermissionMissing => {
                "Moving requires the permission to manage all files"
            }
            MoveFailure::MoveFileNotFound => "Couldn't find the file to move",
            MoveFailure::MoveDestinationNotFound => "The destination folder no longer exists",
            MoveFailure::NotEnoughSpaceOnDestination => "Not enough space on the destination",
            MoveFailure::FileAlreadyAtDestination => "The file is already at the destination",
            MoveFailure::InternalError => "Couldn't move the file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveResult {
    Success { destination: PathBuf },
    Failure(MoveFailure),
}

impl MoveResult {
    pub fn is_success(&self) -> bool {
        matches!(self, MoveResult::Success { .. })
    }

    pub fn kind(&self) -> MoveResultKind {
        match self {
            MoveResult::Success { .. } => MoveResultKind::Success,
            MoveResult::Failure(failure) => MoveResultKind::from(*failure),
        }
    }
}

impl From<MoveFailure> for MoveResult {
    fn from(failure: MoveFailure) -> Self {
        MoveResult::Failure(failure)
    }
}

/// Flat discriminant of [`MoveResult`], used to aggregate batch outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MoveResultKind {
    Success,
    ManageAllFilesPermissionMissing,
    MoveFileNotFound,
    MoveDestinationNotFound,
    NotEnoughSpaceOnDestination,
    FileAlreadyAtDestination,
    InternalError,
}

impl From<MoveFailure> for MoveResultKind {
    fn from(failure: MoveFailure) -> Self {
        match failure {
            MoveFailure::ManageAllFilesPermissionMissing => {
                MoveResultKind::ManageAllFilesPermissionMissing
            }
            MoveFailure::MoveFileNotFound => MoveResultKind::MoveFileNotFound,
            MoveFailure::MoveDestinationNotFound => MoveResultKind::MoveDestinationNotFound,
            MoveFailure::NotEnoughSpaceOnDestination => MoveResultKind::NotEnoughSpaceOnDestination,
            MoveFailure::FileAlreadyAtDestination => MoveResultKind::FileAlreadyAtDestination,
            MoveFailure::InternalError => MoveResultKind::InternalError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMoveProgress {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMoveResults {
    pub total: usize,
    pub counts: BTreeMap<MoveResultKind, usize>,
    /// Items never started because the batch was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
}

impl BatchMoveResults {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn add(&mut self, result: &MoveResult) {
        *self.counts.entry(result.kind()).or_insert(0) += 1;
    }

    pub fn count(&self, kind: MoveResultKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn completed(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn successes(&self) -> usize {
        self.count(MoveResultKind::Success)
    }

    pub fn failures(&self) -> usize {
        self.completed() - self.successes()
    }

    pub fn summary_message(&self) -> String {
        let mut message = format!("Moved {} of {} files", self.successes(), self.total);
        if self.failures() > 0 {
            message.push_str(&format!(", {} failed", self.failures()));
        }
        if self.cancelled {
            message.push_str(&format!(" (cancelled, {} skipped)", self.skipped));
        }
        message
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteResult {
    Deleted,
    FileNotFound,
    PermissionMissing,
    InternalError,
}

impl DeleteResult {
    pub fn message(&self) -> &'static str {
        match self {
            DeleteResult::Deleted => "Deleted file",
            DeleteResult::FileNotFound => "Couldn't find the file to delete",
            DeleteResult::PermissionMissing => "Deleting requires the permission to manage all files",
            DeleteResult::InternalError => "Couldn't delete the file",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_directory_and_name() {
        let dir = MoveDestination::Directory("/dest".into());
        assert_eq!(dir.directory(), Path::new("/dest"));
        assert_eq!(dir.file_name("a.jpg"), "a.jpg");

        let file = MoveDestination::File("/dest/renamed.jpg".into());
        assert_eq!(file.directory(), Path::new("/dest"));
        assert_eq!(file.file_name("a.jpg"), "renamed.jpg");
    }

    #[test]
    fn test_every_failure_has_distinct_code() {
        let failures = [
            MoveFailure::ManageAllFilesPermissionMissing,
            MoveFailure::MoveFileNotFound,
            MoveFailure::MoveDestinationNotFound,
            MoveFailure::NotEnoughSpaceOnDestination,
            MoveFailure::FileAlreadyAtDestination,
            MoveFailure::InternalError,
        ];
        let codes: std::collections::HashSet<_> = failures.iter().map(|f| f.code()).collect();
        assert_eq!(codes.len(), failures.len());
    }

    #[test]
    fn test_batch_results_aggregate() {
        let mut results = BatchMoveResults::new(3);
        results.add(&MoveResult::Success {
            destination: "/d/a".into(),
        });
        results.add(&MoveFailure::MoveFileNotFound.into());
        results.add(&MoveFailure::MoveFileNotFound.into());

        assert_eq!(results.completed(), 3);
        assert_eq!(results.successes(), 1);
        assert_eq!(results.count(MoveResultKind::MoveFileNotFound), 2);
        assert_eq!(results.summary_message(), "Moved 1 of 3 files, 2 failed");

        let json = serde_json::to_string(&results).unwrap();
        assert!(json.contains("\"MoveFileNotFound\":2"));
    }
}
