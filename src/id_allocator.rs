//! Notification ids and action request codes.
//!
//! Each allocator owns a numeric namespace starting at its seed. Ids are never
//! handed out twice while live; released ids become available again once no
//! larger id is live.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

/// Fixed id of the "move all pending files" notification.
pub const BATCH_MOVE_NOTIFICATION_ID: u32 = 1;

/// Fixed id of the batch progress notification.
pub const BATCH_PROGRESS_NOTIFICATION_ID: u32 = 2;

/// Fixed id of the batch summary notification.
pub const BATCH_RESULTS_NOTIFICATION_ID: u32 = 3;

pub const NEW_FILE_NOTIFICATION_SEED: u32 = 1_000;

pub const AUX_NOTIFICATION_SEED: u32 = 50_000;

pub const REQUEST_CODE_SEED: u32 = 100_000;

#[derive(Debug)]
pub struct ResourceIdAllocator {
    seed: u32,
    live: Mutex<BTreeSet<u32>>,
}

impl ResourceIdAllocator {
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            live: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn allocate(&self) -> u32 {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        Self::next_into(&mut live, self.seed)
    }

    pub fn allocate_many(&self, n: usize) -> Vec<u32> {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        (0..n).map(|_| Self::next_into(&mut live, self.seed)).collect()
    }

    /// Returns whether `id` was live. Releasing twice is a no-op.
    pub fn release(&self, id: u32) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn release_all(&self, ids: &[u32]) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            live.remove(id);
        }
    }

    pub fn is_live(&self, id: u32) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn next_into(live: &mut BTreeSet<u32>, seed: u32) -> u32 {
        let id = live.last().map_or(seed, |max| max + 1);
        live.insert(id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_allocation_starts_at_seed() {
        let ids = ResourceIdAllocator::new(NEW_FILE_NOTIFICATION_SEED);
        assert_eq!(ids.allocate(), 1_000);
        assert_eq!(ids.allocate_many(2), vec![1_001, 1_002]);
    }

    #[test]
    fn test_release_is_idempotent() {
        let ids = ResourceIdAllocator::new(10);
        let id = ids.allocate();
        assert!(ids.release(id));
        assert!(!ids.release(id));
        assert_eq!(ids.live_count(), 0);
    }

    #[test]
    fn test_no_live_id_handed_out_twice() {
        let ids = ResourceIdAllocator::new(0);
        let mut live: HashSet<u32> = HashSet::new();

        // Deterministic interleaving of allocations and releases.
        for step in 0u32..500 {
            if step % 3 == 2 && !live.is_empty() {
                let victim = *live.iter().min_by_key(|id| (*id * 7 + step) % 11).unwrap();
                live.remove(&victim);
                ids.release(victim);
            } else {
                let id = ids.allocate();
                assert!(live.insert(id), "id {id} handed out while live");
            }
        }
        assert_eq!(ids.live_count(), live.len());
    }

    #[test]
    fn test_release_all_then_reuse() {
        let ids = ResourceIdAllocator::new(REQUEST_CODE_SEED);
        let codes = ids.allocate_many(4);
        ids.release_all(&codes);
        assert_eq!(ids.live_count(), 0);
        assert_eq!(ids.allocate(), REQUEST_CODE_SEED);
    }

    #[test]
    fn test_concurrent_allocations_are_unique() {
        let ids = Arc::new(ResourceIdAllocator::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || ids.allocate_many(50))
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 400);
    }
}
