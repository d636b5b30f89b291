//! Persistent configuration: watch settings, remembered destinations and grants.
//!
//! The store keeps the current [`NavigatorConfig`] in a `watch` channel so the
//! observer-rebuild path can take a synchronous snapshot while UI consumers
//! subscribe to changes. Every write is persisted to YAML before it is
//! published.

use crate::error::{NavigatorError, Result};
use crate::input_validation;
use crate::media::{FileType, SourceKind, WatchEndpoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

/// Quick-move destinations remembered per (FileType, SourceKind).
pub const MAX_QUICK_DESTINATIONS: usize = 2;

pub const DEFAULT_BATCH_THRESHOLD: usize = 3;

pub const DEFAULT_MAX_RECORD_AGE_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTypeConfig {
    pub enabled: bool,
    pub sources: BTreeMap<SourceKind, bool>,
    /// Additional extensions, matched after the built-in ones.
    pub extra_extensions: Vec<String>,
}

impl Default for FileTypeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sources: BTreeMap::new(),
            extra_extensions: Vec::new(),
        }
    }
}

impl FileTypeConfig {
    fn for_type(file_type: FileType) -> Self {
        Self {
            enabled: true,
            sources: file_type.supported_sources().iter().map(|s| (*s, true)).collect(),
            extra_extensions: Vec::new(),
        }
    }
}

/// Which file types and sources are watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchConfiguration {
    file_types: BTreeMap<FileType, FileTypeConfig>,
}

impl Default for WatchConfiguration {
    fn default() -> Self {
        Self {
            file_types: FileType::ALL
                .into_iter()
                .map(|t| (t, FileTypeConfig::for_type(t)))
                .collect(),
        }
    }
}

impl WatchConfiguration {
    pub fn is_type_enabled(&self, file_type: FileType) -> bool {
        self.file_types.get(&file_type).is_some_and(|c| c.enabled)
    }

    /// A source is enabled only if its type is enabled and supports it.
    pub fn is_source_enabled(&self, file_type: FileType, source: SourceKind) -> bool {
        file_type.supported_sources().contains(&source)
            && self
                .file_types
                .get(&file_type)
                .is_some_and(|c| c.enabled && c.sources.get(&source).copied().unwrap_or(false))
    }

    pub fn set_type_enabled(&mut self, file_type: FileType, enabled: bool) {
        self.file_types
            .entry(file_type)
            .or_insert_with(|| FileTypeConfig::for_type(file_type))
            .enabled = enabled;
    }

    pub fn set_source_enabled(&mut self, file_type: FileType, source: SourceKind, enabled: bool) {
        self.file_types
            .entry(file_type)
            .or_insert_with(|| FileTypeConfig::for_type(file_type))
            .sources
            .insert(source, enabled);
    }

    pub fn add_extra_extension(&mut self, file_type: FileType, extension: &str) {
        self.file_types
            .entry(file_type)
            .or_insert_with(|| FileTypeConfig::for_type(file_type))
            .extra_extensions
            .push(extension.to_string());
    }

    /// Enabled types observed through `endpoint`, in declaration order.
    pub fn enabled_types_for(&self, endpoint: WatchEndpoint) -> Vec<FileType> {
        endpoint
            .file_types()
            .filter(|t| self.is_type_enabled(*t))
            .collect()
    }

    /// Built-in extensions followed by the configured extra ones, lowercased.
    pub fn extensions_for(&self, file_type: FileType) -> Vec<String> {
        let mut extensions: Vec<String> =
            file_type.extensions().iter().map(|e| e.to_string()).collect();
        if let Some(config) = self.file_types.get(&file_type) {
            for extra in &config.extra_extensions {
                let extra = extra.trim().trim_start_matches('.').to_lowercase();
                if !extra.is_empty() && !extensions.contains(&extra) {
                    extensions.push(extra);
                }
            }
        }
        extensions
    }

    pub fn extra_extensions(&self) -> impl Iterator<Item = (FileType, &[String])> {
        self.file_types
            .iter()
            .map(|(t, c)| (*t, c.extra_extensions.as_slice()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickDestinationEntry {
    pub file_type: FileType,
    pub source_kind: SourceKind,
    /// Most recent first.
    pub destinations: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMoveRule {
    pub file_type: FileType,
    pub source_kind: SourceKind,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    pub storage_root: PathBuf,
    /// Watched directories per endpoint, relative to `storage_root`.
    pub endpoint_roots: BTreeMap<WatchEndpoint, Vec<PathBuf>>,
    pub watch: WatchConfiguration,
    /// Directory names that identify files written by other apps.
    pub known_app_dirs: Vec<String>,
    pub quick_destinations: Vec<QuickDestinationEntry>,
    pub auto_move_rules: Vec<AutoMoveRule>,
    pub granted_destinations: Vec<PathBuf>,
    pub manage_all_files_granted: bool,
    pub batch_threshold: usize,
    pub max_record_age_secs: u64,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        let roots = |dirs: &[&str]| dirs.iter().map(PathBuf::from).collect::<Vec<_>>();
        let endpoint_roots = BTreeMap::from([
            (
                WatchEndpoint::Images,
                roots(&["DCIM", "Pictures", "Download", "Android/media"]),
            ),
            (
                WatchEndpoint::Video,
                roots(&["DCIM", "Movies", "Download", "Android/media"]),
            ),
            (
                WatchEndpoint::Audio,
                roots(&["Music", "Recordings", "Download", "Android/media"]),
            ),
            (WatchEndpoint::Downloads, roots(&["Download", "Documents"])),
        ]);

        Self {
            storage_root: PathBuf::from("/storage/emulated/0"),
            endpoint_roots,
            watch: WatchConfiguration::default(),
            known_app_dirs: ["Telegram", "WhatsApp", "Signal", "Instagram", "Snapchat"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            quick_destinations: Vec::new(),
            auto_move_rules: Vec::new(),
            granted_destinations: Vec::new(),
            manage_all_files_granted: true,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            max_record_age_secs: DEFAULT_MAX_RECORD_AGE_SECS,
        }
    }
}

impl NavigatorConfig {
    pub fn with_storage_root(storage_root: PathBuf) -> Self {
        Self {
            storage_root,
            ..Self::default()
        }
    }

    /// Absolute watch roots for an endpoint.
    pub fn endpoint_roots(&self, endpoint: WatchEndpoint) -> Vec<PathBuf> {
        self.endpoint_roots
            .get(&endpoint)
            .map(|roots| roots.iter().map(|r| self.storage_root.join(r)).collect())
            .unwrap_or_default()
    }

    pub fn quick_destinations(&self, file_type: FileType, source: SourceKind) -> Vec<PathBuf> {
        self.quick_destinations
            .iter()
            .find(|e| e.file_type == file_type && e.source_kind == source)
            .map(|e| e.destinations.clone())
            .unwrap_or_default()
    }

    /// Moves `destination` to the front of the remembered list.
    pub fn remember_quick_destination(
        &mut self,
        file_type: FileType,
        source: SourceKind,
        destination: PathBuf,
    ) {
        let index = match self
            .quick_destinations
            .iter()
            .position(|e| e.file_type == file_type && e.source_kind == source)
        {
            Some(index) => index,
            None => {
                self.quick_destinations.push(QuickDestinationEntry {
                    file_type,
                    source_kind: source,
                    destinations: Vec::new(),
                });
                self.quick_destinations.len() - 1
            }
        };

        let destinations = &mut self.quick_destinations[index].destinations;
        destinations.retain(|d| d != &destination);
        destinations.insert(0, destination);
        destinations.truncate(MAX_QUICK_DESTINATIONS);
    }

    /// Drops `destination` from the quick list and auto-move rule of the key.
    /// Returns whether anything was removed.
    pub fn forget_destination(
        &mut self,
        file_type: FileType,
        source: SourceKind,
        destination: &Path,
    ) -> bool {
        let mut removed = false;

        for entry in self
            .quick_destinations
            .iter_mut()
            .filter(|e| e.file_type == file_type && e.source_kind == source)
        {
            let before = entry.destinations.len();
            entry.destinations.retain(|d| d != destination);
            removed |= entry.destinations.len() != before;
        }
        self.quick_destinations.retain(|e| !e.destinations.is_empty());

        let before = self.auto_move_rules.len();
        self.auto_move_rules.retain(|r| {
            !(r.file_type == file_type && r.source_kind == source && r.destination == destination)
        });
        removed |= self.auto_move_rules.len() != before;

        removed
    }

    pub fn auto_move_destination(&self, file_type: FileType, source: SourceKind) -> Option<&Path> {
        self.auto_move_rules
            .iter()
            .find(|r| r.file_type == file_type && r.source_kind == source)
            .map(|r| r.destination.as_path())
    }

    pub fn set_auto_move_rule(&mut self, file_type: FileType, source: SourceKind, destination: PathBuf) {
        self.auto_move_rules
            .retain(|r| !(r.file_type == file_type && r.source_kind == source));
        self.auto_move_rules.push(AutoMoveRule {
            file_type,
            source_kind: source,
            destination,
        });
    }

    /// Validates values a user can edit. Returns non-fatal warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.batch_threshold < 2 {
            return Err(NavigatorError::Config(format!(
                "batch_threshold must be at least 2, got {}",
                self.batch_threshold
            )));
        }

        for app_dir in &self.known_app_dirs {
            input_validation::validate_app_dir_name(app_dir)
                .map_err(|e| NavigatorError::Config(e.to_string()))?;
        }

        for (file_type, extras) in self.watch.extra_extensions() {
            input_validation::validate_extensions(extras)
                .map_err(|e| NavigatorError::Config(format!("{}: {e}", file_type.label())))?;
        }

        let declared: Vec<(FileType, Vec<String>)> = FileType::ALL
            .into_iter()
            .map(|t| (t, self.watch.extensions_for(t)))
            .collect();
        Ok(input_validation::find_extension_overlaps(&declared))
    }
}

struct StoreInner {
    path: Option<PathBuf>,
    tx: watch::Sender<NavigatorConfig>,
    write_lock: Mutex<()>,
}

/// Shared handle to the configuration. Cheap to clone.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("path", &self.inner.path)
            .finish()
    }
}

impl ConfigStore {
    /// Loads the YAML file at `path`, falling back to defaults if it is missing.
    pub fn load(path: PathBuf) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let config: NavigatorConfig = serde_yaml::from_str(&contents)?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            NavigatorConfig::default()
        };

        for warning in config.validate()? {
            warn!("{warning}");
        }

        Ok(Self::build(Some(path), config))
    }

    /// A store that is never written to disk.
    pub fn in_memory(config: NavigatorConfig) -> Self {
        Self::build(None, config)
    }

    fn build(path: Option<PathBuf>, config: NavigatorConfig) -> Self {
        let (tx, _rx) = watch::channel(config);
        Self {
            inner: Arc::new(StoreInner {
                path,
                tx,
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn snapshot(&self) -> NavigatorConfig {
        self.inner.tx.borrow().clone()
    }

    /// Stream yielding the current value and then every change.
    pub fn changes(&self) -> WatchStream<NavigatorConfig> {
        WatchStream::new(self.inner.tx.subscribe())
    }

    /// Applies `f` to a copy, persists it and publishes it.
    pub fn update<R>(&self, f: impl FnOnce(&mut NavigatorConfig) -> R) -> Result<R> {
        let _guard = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut config = self.snapshot();
        let result = f(&mut config);
        self.persist(&config)?;
        self.inner.tx.send_replace(config);
        Ok(result)
    }

    fn persist(&self, config: &NavigatorConfig) -> Result<()> {
        let Some(path) = &self.inner.path else {
            return Ok(());
        };

        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let yaml = serde_yaml::to_string(config)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(yaml.as_bytes())?;
        tmp.persist(path).map_err(|e| NavigatorError::Io(e.error))?;
        Ok(())
    }
}
