use crate::media::FileRecord;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default number of records remembered per observer.
pub const DEFAULT_CACHE_CAPACITY: usize = 5;

/// Bounded FIFO of the records an observer saw last.
///
/// The event source fires several times per logical file write, so each
/// observer keeps the most recent records and suppresses content-identical
/// repeats.
#[derive(Debug, Clone)]
pub struct RecentEventCache {
    entries: VecDeque<FileRecord>,
    capacity: usize,
}

impl Default for RecentEventCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl RecentEventCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn is_duplicate(&self, record: &FileRecord) -> bool {
        self.entries
            .iter()
            .any(|cached| cached.has_same_content_identity(record))
    }

    /// Appends `record`, replacing a content-identical entry so that repeats
    /// refresh recency instead of filling the cache.
    pub fn record(&mut self, record: FileRecord) {
        self.entries
            .retain(|cached| !cached.has_same_content_identity(&record));
        self.entries.push_back(record);

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Paths the service itself just moved files to.
///
/// A move into another watched root raises create events for the target, and
/// neither the age filter nor the per-observer cache catches it: the parent
/// directory changed and a same-volume rename keeps the creation time.
/// Observers skip these paths until the entry expires.
#[derive(Debug)]
pub struct RecentMoveTargets {
    state: Mutex<MoveTargetState>,
}

#[derive(Debug)]
struct MoveTargetState {
    ttl: Duration,
    targets: HashMap<PathBuf, Instant>,
}

impl RecentMoveTargets {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(MoveTargetState {
                ttl,
                targets: HashMap::new(),
            }),
        }
    }

    pub fn set_ttl(&self, ttl: Duration) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).ttl = ttl;
    }

    pub fn record(&self, target: &Path) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let ttl = state.ttl;
        state.targets.retain(|_, at| now.duration_since(*at) <= ttl);
        state.targets.insert(target.to_path_buf(), now);
    }

    pub fn contains(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .targets
            .get(path)
            .is_some_and(|at| at.elapsed() <= state.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::record;

    #[test]
    fn test_duplicate_detection_by_content_identity() {
        let mut cache = RecentEventCache::default();
        let first = record("Download/a.pdf", 10);
        assert!(!cache.is_duplicate(&first));
        cache.record(first.clone());

        let mut reissued = first.clone();
        reissued.row_id = 99;
        assert!(cache.is_duplicate(&reissued));

        assert!(!cache.is_duplicate(&record("Download/a.pdf", 11)));
        assert!(!cache.is_duplicate(&record("Documents/a.pdf", 10)));
    }

    #[test]
    fn test_repeats_do_not_grow_cache() {
        let mut cache = RecentEventCache::default();
        for _ in 0..4 {
            cache.record(record("Pictures/Screenshots/shot1.png", 100));
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_eviction_after_capacity() {
        let mut cache = RecentEventCache::new(3);
        for i in 0..4 {
            cache.record(record(&format!("Download/{i}.pdf"), 1));
        }
        assert_eq!(cache.len(), 3);
        assert!(!cache.is_duplicate(&record("Download/0.pdf", 1)));
        assert!(cache.is_duplicate(&record("Download/3.pdf", 1)));
    }

    #[test]
    fn test_refreshed_entry_survives_eviction() {
        let mut cache = RecentEventCache::new(2);
        cache.record(record("Download/a.pdf", 1));
        cache.record(record("Download/b.pdf", 1));
        cache.record(record("Download/a.pdf", 1));
        cache.record(record("Download/c.pdf", 1));

        assert!(cache.is_duplicate(&record("Download/a.pdf", 1)));
        assert!(!cache.is_duplicate(&record("Download/b.pdf", 1)));
    }

    #[test]
    fn test_move_targets_expire() {
        let targets = RecentMoveTargets::new(Duration::from_secs(30));
        let moved = Path::new("/storage/Documents/report.pdf");
        targets.record(moved);
        assert!(targets.contains(moved));
        assert!(!targets.contains(Path::new("/storage/Download/report.pdf")));

        targets.set_ttl(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!targets.contains(moved));
    }
}
