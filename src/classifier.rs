//! Maps a [`FileRecord`] to its (FileType, SourceKind) pair.

use crate::config::{NavigatorConfig, WatchConfiguration};
use crate::error::{NavigatorError, Result};
use crate::media::{FileRecord, FileType, SourceKind, WatchEndpoint};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::Component;

const SCREENSHOT_DIRS: [&str; 3] = ["screenshots", "screenrecordings", "screen recordings"];
const CAMERA_DIR: &str = "dcim";
const RECORDING_DIRS: [&str; 3] = ["recordings", "sound recordings", "call recordings"];
const DOWNLOAD_DIRS: [&str; 2] = ["download", "downloads"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub file_type: FileType,
    pub source_kind: SourceKind,
    /// Set for [`SourceKind::OtherApp`].
    pub app_name: Option<String>,
}

/// Case-insensitive extension matching, one glob per file type.
#[derive(Debug, Clone)]
pub struct ExtensionMatcher {
    types: Vec<FileType>,
    set: GlobSet,
}

impl ExtensionMatcher {
    /// `types` must be in priority order; the first matching type wins.
    pub fn new(types: &[FileType], watch: &WatchConfiguration) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for file_type in types {
            let extensions = watch.extensions_for(*file_type);
            let pattern = match extensions.as_slice() {
                [single] => format!("*.{single}"),
                many => format!("*.{{{}}}", many.join(",")),
            };
            let glob = GlobBuilder::new(&pattern)
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .map_err(|e| NavigatorError::Config(format!("{}: {e}", file_type.label())))?;
            builder.add(glob);
        }

        let set = builder
            .build()
            .map_err(|e| NavigatorError::Config(e.to_string()))?;

        Ok(Self {
            types: types.to_vec(),
            set,
        })
    }

    pub fn match_name(&self, name: &str) -> Option<FileType> {
        self.set
            .matches(name)
            .into_iter()
            .min()
            .map(|index| self.types[index])
    }
}

/// Classifier bound to one endpoint and a snapshot of the watch configuration.
#[derive(Debug, Clone)]
pub struct Classifier {
    endpoint: WatchEndpoint,
    matcher: ExtensionMatcher,
    watch: WatchConfiguration,
    known_app_dirs: Vec<String>,
}

impl Classifier {
    pub fn for_endpoint(endpoint: WatchEndpoint, config: &NavigatorConfig) -> Result<Self> {
        let types = config.watch.enabled_types_for(endpoint);
        Ok(Self {
            endpoint,
            matcher: ExtensionMatcher::new(&types, &config.watch)?,
            watch: config.watch.clone(),
            known_app_dirs: config
                .known_app_dirs
                .iter()
                .map(|d| d.to_lowercase())
                .collect(),
        })
    }

    pub fn endpoint(&self) -> WatchEndpoint {
        self.endpoint
    }

    /// `None` when no enabled type matches or the derived source is disabled.
    pub fn classify(&self, record: &FileRecord) -> Option<Classification> {
        let file_type = self.matcher.match_name(&record.name)?;
        let (source_kind, app_name) = derive_source(record, self.endpoint, &self.known_app_dirs)?;

        if !self.watch.is_source_enabled(file_type, source_kind) {
            return None;
        }

        Some(Classification {
            file_type,
            source_kind,
            app_name,
        })
    }
}

/// Source derivation in priority order. `known_app_dirs` must be lowercase.
pub fn derive_source(
    record: &FileRecord,
    endpoint: WatchEndpoint,
    known_app_dirs: &[String],
) -> Option<(SourceKind, Option<String>)> {
    let parent = record.parent_dir_name().map(str::to_lowercase);
    let parent = parent.as_deref();
    let first_component = record
        .relative_path
        .components()
        .find_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .map(str::to_lowercase);
    let first_component = first_component.as_deref();

    if parent.is_some_and(|p| SCREENSHOT_DIRS.contains(&p)) {
        return Some((SourceKind::Screenshot, None));
    }
    if first_component == Some(CAMERA_DIR) {
        return Some((SourceKind::Camera, None));
    }
    if parent.is_some_and(|p| RECORDING_DIRS.contains(&p)) {
        return Some((SourceKind::Recording, None));
    }
    if parent.is_some_and(|p| DOWNLOAD_DIRS.contains(&p))
        || first_component.is_some_and(|c| DOWNLOAD_DIRS.contains(&c))
    {
        return Some((SourceKind::Download, None));
    }
    if let Some(package) = &record.owner_package {
        return Some((SourceKind::OtherApp, Some(package.clone())));
    }
    if let Some(parent) = parent.filter(|p| known_app_dirs.iter().any(|d| d == p)) {
        let name = record.parent_dir_name().unwrap_or(parent).to_string();
        return Some((SourceKind::OtherApp, Some(name)));
    }

    match endpoint {
        WatchEndpoint::Downloads => Some((SourceKind::Download, None)),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::{Path, PathBuf};

    pub(crate) fn record(relative: &str, size: u64) -> FileRecord {
        let relative_path = PathBuf::from(relative);
        let path = Path::new("/storage").join(&relative_path);
        FileRecord {
            row_id: 1,
            name: path.file_name().unwrap().to_str().unwrap().to_string(),
            size,
            parent_dir: path.parent().unwrap().to_path_buf(),
            extension: path
                .extension()
                .map(|e| e.to_str().unwrap().to_lowercase())
                .unwrap_or_default(),
            relative_path,
            created_at: Utc::now(),
            is_pending: false,
            owner_package: None,
        }
    }

    fn classifier(endpoint: WatchEndpoint) -> Classifier {
        Classifier::for_endpoint(endpoint, &NavigatorConfig::default()).unwrap()
    }

    #[test]
    fn test_screenshot_wins_over_camera() {
        let c = classifier(WatchEndpoint::Images)
            .classify(&record("DCIM/Screenshots/shot.PNG", 10))
            .unwrap();
        assert_eq!(c.file_type, FileType::Image);
        assert_eq!(c.source_kind, SourceKind::Screenshot);
    }

    #[test]
    fn test_camera_download_and_other_app() {
        let images = classifier(WatchEndpoint::Images);
        assert_eq!(
            images.classify(&record("DCIM/Camera/IMG_1.jpg", 1)).unwrap().source_kind,
            SourceKind::Camera
        );
        assert_eq!(
            images.classify(&record("Download/cat.webp", 1)).unwrap().source_kind,
            SourceKind::Download
        );

        let telegram = images.classify(&record("Pictures/Telegram/img.jpeg", 1)).unwrap();
        assert_eq!(telegram.source_kind, SourceKind::OtherApp);
        assert_eq!(telegram.app_name.as_deref(), Some("Telegram"));

        let mut owned = record("Android/media/com.whatsapp/WhatsApp/Media/x.jpg", 1);
        owned.owner_package = Some("com.whatsapp".to_string());
        assert_eq!(
            images.classify(&owned).unwrap().app_name.as_deref(),
            Some("com.whatsapp")
        );
    }

    #[test]
    fn test_media_endpoint_without_source_match_is_none() {
        assert!(classifier(WatchEndpoint::Images)
            .classify(&record("Pictures/Random/img.jpg", 1))
            .is_none());
    }

    #[test]
    fn test_downloads_endpoint_falls_back_to_download() {
        let c = classifier(WatchEndpoint::Downloads)
            .classify(&record("Documents/report.pdf", 1))
            .unwrap();
        assert_eq!(c.file_type, FileType::Pdf);
        assert_eq!(c.source_kind, SourceKind::Download);
    }

    #[test]
    fn test_recording_for_audio_only() {
        let audio = classifier(WatchEndpoint::Audio);
        assert_eq!(
            audio.classify(&record("Recordings/memo.m4a", 1)).unwrap().source_kind,
            SourceKind::Recording
        );
        // Images do not support the recording source.
        assert!(classifier(WatchEndpoint::Images)
            .classify(&record("Recordings/memo.png", 1))
            .is_none());
    }

    #[test]
    fn test_endpoint_only_matches_its_types() {
        assert!(classifier(WatchEndpoint::Images)
            .classify(&record("Download/book.epub", 1))
            .is_none());
        assert!(classifier(WatchEndpoint::Downloads)
            .classify(&record("Download/cat.png", 1))
            .is_none());
    }

    #[test]
    fn test_totality_for_enabled_extensions() {
        for endpoint in WatchEndpoint::ALL {
            let c = classifier(endpoint);
            for file_type in endpoint.file_types() {
                for extension in file_type.extensions() {
                    let upper = extension.to_uppercase();
                    let r = record(&format!("Download/file.{upper}"), 1);
                    let classified = c.classify(&r).unwrap_or_else(|| {
                        panic!("{upper} not classified on {endpoint:?}")
                    });
                    assert_eq!(classified.file_type, file_type);
                }
            }
            assert!(c.classify(&record("Download/file.unknownext", 1)).is_none());
            assert!(c.classify(&record("Download/no_extension", 1)).is_none());
        }
    }

    #[test]
    fn test_disabled_source_and_type() {
        let mut config = NavigatorConfig::default();
        config
            .watch
            .set_source_enabled(FileType::Image, SourceKind::Camera, false);
        config.watch.set_type_enabled(FileType::Pdf, false);

        let images = Classifier::for_endpoint(WatchEndpoint::Images, &config).unwrap();
        assert!(images.classify(&record("DCIM/Camera/a.jpg", 1)).is_none());
        assert!(images.classify(&record("Pictures/Screenshots/a.jpg", 1)).is_some());

        let downloads = Classifier::for_endpoint(WatchEndpoint::Downloads, &config).unwrap();
        assert!(downloads.classify(&record("Download/a.pdf", 1)).is_none());
    }

    #[test]
    fn test_overlap_resolved_by_declaration_order() {
        let mut config = NavigatorConfig::default();
        config.watch.add_extra_extension(FileType::EBook, "txt");

        let downloads = Classifier::for_endpoint(WatchEndpoint::Downloads, &config).unwrap();
        assert_eq!(
            downloads.classify(&record("Download/notes.txt", 1)).unwrap().file_type,
            FileType::Text
        );
    }
}
