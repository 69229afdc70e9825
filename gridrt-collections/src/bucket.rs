//! Bucket storage: a fixed-capacity entry array plus a lazily allocated
//! overflow link (§4.5 "Bucket addressing").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::state::{AtomicEntryState, EntryState};

/// The key/value payload of an [`Entry`]. `key` is `None` exactly when the
/// entry's state is `Empty`; `value` is default-constructed up front so an
/// insertion policy always has an "existing" value to merge into, mirroring
/// the source material's always-present, default-constructed `Entry::value`
/// field.
pub(crate) struct EntrySlot<K, V> {
    pub(crate) key: Option<K>,
    pub(crate) value: V,
}

/// One slot in a bucket. `slot` holds the key/value pair once `state`
/// reaches `Used`; readers must never interpret `slot` while `state` is
/// `PendingInsert`/`PendingUpdate` (§4.5 "Per-entry FSM").
pub(crate) struct Entry<K, V> {
    pub(crate) state: AtomicEntryState,
    pub(crate) slot: RwLock<EntrySlot<K, V>>,
}

impl<K, V: Default> Entry<K, V> {
    fn empty() -> Self {
        Entry {
            state: AtomicEntryState::new(EntryState::Empty),
            slot: RwLock::new(EntrySlot {
                key: None,
                value: V::default(),
            }),
        }
    }
}

/// One bucket of `capacity` entries plus an overflow chain. The overflow
/// bucket itself is allocated once, on demand, under double-checked
/// locking (`next_allocating` gates which racing inserter does the
/// allocation; the rest spin on `next` appearing).
pub(crate) struct Bucket<K, V> {
    pub(crate) entries: Vec<Entry<K, V>>,
    next: RwLock<Option<Arc<Bucket<K, V>>>>,
    next_allocating: AtomicBool,
}

impl<K, V: Default> Bucket<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        let entries = (0..capacity).map(|_| Entry::empty()).collect();
        Bucket {
            entries,
            next: RwLock::new(None),
            next_allocating: AtomicBool::new(false),
        }
    }

    pub(crate) fn next(&self) -> Option<Arc<Bucket<K, V>>> {
        self.next.read().clone()
    }

    /// Return the overflow bucket, allocating it exactly once if absent.
    pub(crate) fn next_or_allocate(&self, capacity: usize) -> Arc<Bucket<K, V>> {
        if let Some(existing) = self.next() {
            return existing;
        }
        if self
            .next_allocating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let fresh = Arc::new(Bucket::new(capacity));
            *self.next.write() = Some(fresh.clone());
            fresh
        } else {
            loop {
                if let Some(existing) = self.next() {
                    return existing;
                }
                std::thread::yield_now();
            }
        }
    }
}
