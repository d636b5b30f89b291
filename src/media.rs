//! Media index data model and the query contract.
//!
//! A [`FileRecord`] is an immutable snapshot of one file as the index reported
//! it at query time. Observers re-query on every event and never hold a record
//! beyond the notification that carries it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};

/// Name prefix the media store gives files that are still being written.
pub const PENDING_FILE_PREFIX: &str = ".pending-";

/// Directory (relative to the storage root) holding app-specific shared media.
const APP_MEDIA_DIR: [&str; 2] = ["Android", "media"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileType {
    Image,
    Video,
    Audio,
    Pdf,
    Text,
    Archive,
    Apk,
    EBook,
}

impl FileType {
    /// Declaration order. Extension matching resolves overlaps by this order.
    pub const ALL: [FileType; 8] = [
        FileType::Image,
        FileType::Video,
        FileType::Audio,
        FileType::Pdf,
        FileType::Text,
        FileType::Archive,
        FileType::Apk,
        FileType::EBook,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FileType::Image => "Image",
            FileType::Video => "Video",
            FileType::Audio => "Audio",
            FileType::Pdf => "PDF",
            FileType::Text => "Text",
            FileType::Archive => "Archive",
            FileType::Apk => "APK",
            FileType::EBook => "EBook",
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            FileType::Image => &[
                "jpg", "jpeg", "png", "gif", "bmp", "webp", "heic", "heif", "tif", "tiff", "svg",
            ],
            FileType::Video => &["mp4", "mkv", "webm", "3gp", "avi", "mov", "m4v", "ts"],
            FileType::Audio => &["mp3", "wav", "ogg", "m4a", "aac", "flac", "opus", "amr", "mid"],
            FileType::Pdf => &["pdf"],
            FileType::Text => &["txt", "text", "asc", "csv", "xml", "json", "md"],
            FileType::Archive => &["zip", "rar", "tar", "7z", "gz", "tgz", "bz2", "xz"],
            FileType::Apk => &["apk"],
            FileType::EBook => &["epub", "azw", "azw3", "mobi", "djvu", "fb2"],
        }
    }

    /// The endpoint whose events can carry files of this type.
    pub fn endpoint(&self) -> WatchEndpoint {
        match self {
            FileType::Image => WatchEndpoint::Images,
            FileType::Video => WatchEndpoint::Video,
            FileType::Audio => WatchEndpoint::Audio,
            _ => WatchEndpoint::Downloads,
        }
    }

    pub fn supported_sources(&self) -> &'static [SourceKind] {
        match self {
            FileType::Image | FileType::Video => &[
                SourceKind::Camera,
                SourceKind::Screenshot,
                SourceKind::OtherApp,
                SourceKind::Download,
            ],
            FileType::Audio => &[
                SourceKind::Recording,
                SourceKind::OtherApp,
                SourceKind::Download,
            ],
            _ => &[SourceKind::Download, SourceKind::OtherApp],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceKind {
    Screenshot,
    Camera,
    Recording,
    Download,
    OtherApp,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Screenshot => "Screenshot",
            SourceKind::Camera => "Camera",
            SourceKind::Recording => "Recording",
            SourceKind::Download => "Download",
            SourceKind::OtherApp => "Other app",
        }
    }
}

/// A subscription target of the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WatchEndpoint {
    Images,
    Video,
    Audio,
    /// Shared endpoint for every non-media type.
    Downloads,
}

impl WatchEndpoint {
    pub const ALL: [WatchEndpoint; 4] = [
        WatchEndpoint::Images,
        WatchEndpoint::Video,
        WatchEndpoint::Audio,
        WatchEndpoint::Downloads,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            WatchEndpoint::Images => "images",
            WatchEndpoint::Video => "video",
            WatchEndpoint::Audio => "audio",
            WatchEndpoint::Downloads => "downloads",
        }
    }

    pub fn file_types(&self) -> impl Iterator<Item = FileType> + '_ {
        FileType::ALL.into_iter().filter(move |t| t.endpoint() == *self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub row_id: u64,
    pub name: String,
    pub size: u64,
    pub parent_dir: PathBuf,
    /// Path relative to the storage root.
    pub relative_path: PathBuf,
    /// Lowercase, without the dot. Empty when the name has none.
    pub extension: String,
    pub created_at: DateTime<Utc>,
    pub is_pending: bool,
    pub owner_package: Option<String>,
}

impl FileRecord {
    pub fn path(&self) -> PathBuf {
        self.parent_dir.join(&self.name)
    }

    pub fn parent_dir_name(&self) -> Option<&str> {
        self.parent_dir.file_name().and_then(|n| n.to_str())
    }

    /// Same parent directory, name and size. Row ids are not compared since
    /// the index may reissue them for the same logical file.
    pub fn has_same_content_identity(&self, other: &FileRecord) -> bool {
        self.parent_dir == other.parent_dir && self.name == other.name && self.size == other.size
    }
}

/// External query contract. Implementations may block.
pub trait MediaIndex: Send + Sync {
    /// Returns `None` when the entry no longer exists or is not a regular file.
    fn query(&self, path: &Path) -> Option<FileRecord>;
}

/// Media index backed by the local filesystem under one storage root.
#[derive(Debug, Clone)]
pub struct FsMediaIndex {
    storage_root: PathBuf,
}

impl FsMediaIndex {
    pub fn new(storage_root: PathBuf) -> Self {
        Self { storage_root }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    fn owner_package(relative_path: &Path) -> Option<String> {
        let mut components = relative_path.components().filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        });
        for expected in APP_MEDIA_DIR {
            if components.next()? != expected {
                return None;
            }
        }
        components.next().map(|s| s.to_string())
    }
}

impl MediaIndex for FsMediaIndex {
    fn query(&self, path: &Path) -> Option<FileRecord> {
        let metadata = fs::symlink_metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }

        let name = path.file_name()?.to_str()?.to_string();
        let parent_dir = path.parent()?.to_path_buf();
        let relative_path = path
            .strip_prefix(&self.storage_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf());
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let created = metadata.created().or_else(|_| metadata.modified()).ok()?;

        Some(FileRecord {
            row_id: metadata.ino(),
            is_pending: name.starts_with(PENDING_FILE_PREFIX),
            owner_package: Self::owner_package(&relative_path),
            name,
            size: metadata.len(),
            parent_dir,
            relative_path,
            extension,
            created_at: created.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_every_type_has_an_endpoint_and_sources() {
        for file_type in FileType::ALL {
            assert!(!file_type.extensions().is_empty());
            assert!(!file_type.supported_sources().is_empty());
            assert!(file_type.endpoint().file_types().any(|t| t == file_type));
        }
    }

    #[test]
    fn test_fs_index_builds_record() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("Pictures").join("Screenshots");
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("Shot1.PNG");
        fs::write(&file, vec![0u8; 100]).unwrap();

        let index = FsMediaIndex::new(root.path().to_path_buf());
        let record = index.query(&file).unwrap();

        assert_eq!(record.name, "Shot1.PNG");
        assert_eq!(record.size, 100);
        assert_eq!(record.extension, "png");
        assert_eq!(record.parent_dir_name(), Some("Screenshots"));
        assert_eq!(record.relative_path, Path::new("Pictures/Screenshots/Shot1.PNG"));
        assert!(!record.is_pending);
        assert_eq!(record.owner_package, None);
    }

    #[test]
    fn test_fs_index_marks_pending_and_owner() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("Android/media/org.telegram.messenger/Telegram");
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join(".pending-1700000000-photo.jpg");
        fs::write(&file, b"data").unwrap();

        let record = FsMediaIndex::new(root.path().to_path_buf()).query(&file).unwrap();
        assert!(record.is_pending);
        assert_eq!(record.owner_package.as_deref(), Some("org.telegram.messenger"));
    }

    #[test]
    fn test_fs_index_missing_or_directory() {
        let root = TempDir::new().unwrap();
        let index = FsMediaIndex::new(root.path().to_path_buf());
        assert!(index.query(&root.path().join("gone.jpg")).is_none());
        assert!(index.query(root.path()).is_none());
    }

    #[test]
    fn test_content_identity_ignores_row_id() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("a.txt");
        fs::write(&file, b"abc").unwrap();
        let index = FsMediaIndex::new(root.path().to_path_buf());
        let first = index.query(&file).unwrap();
        let mut second = first.clone();
        second.row_id += 1;
        assert!(first.has_same_content_identity(&second));
        second.size += 1;
        assert!(!first.has_same_content_identity(&second));
    }
}
