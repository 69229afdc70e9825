//! The local chained hash set (§4.6). Same bucket/overflow structure as
//! the map, with the update branch removed: state set is
//! `{Empty, Used, PendingInsert}`, and inserting an element already
//! present is a no-op returning `false`.

use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gridrt_core::handle::Handle;
use gridrt_core::runtime::Grid;

use crate::bucket::{Bucket, Entry};
use crate::state::EntryState;

fn bucket_index<K: Hash>(key: &K, num_buckets: usize) -> usize {
    use std::hash::Hasher;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % num_buckets
}

/// A concurrent chained hash set, built on the same per-entry FSM as
/// [`crate::LocalHashMap`] minus the update transition.
pub struct LocalHashSet<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    buckets: Vec<Bucket<K, ()>>,
    bucket_capacity: usize,
    size: AtomicUsize,
}

impl<K> LocalHashSet<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    pub fn new(num_buckets: usize, bucket_capacity: usize) -> Self {
        let num_buckets = num_buckets.max(1);
        let buckets = (0..num_buckets).map(|_| Bucket::new(bucket_capacity)).collect();
        LocalHashSet {
            buckets,
            bucket_capacity,
            size: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `key`. Returns `true` if it was newly added, `false` if it
    /// was already present.
    pub fn insert(&self, key: K) -> bool {
        let idx = bucket_index(&key, self.buckets.len());
        let mut bucket: &Bucket<K, ()> = &self.buckets[idx];
        let mut owned_overflow: Option<Arc<Bucket<K, ()>>>;

        loop {
            let mut entry_idx = 0;
            while entry_idx < bucket.entries.len() {
                let entry = &bucket.entries[entry_idx];

                if entry.state.try_transition(EntryState::Empty, EntryState::PendingInsert) {
                    entry.slot.write().key = Some(key);
                    self.size.fetch_add(1, Ordering::AcqRel);
                    entry.state.store(EntryState::Used);
                    return true;
                }

                while entry.state.load() == EntryState::PendingInsert {
                    std::thread::yield_now();
                }

                // As in the map: the wait above can resolve to Empty (a
                // concurrent erase just finalized this entry). Retry the
                // CAS on this same entry rather than advancing past it.
                if entry.state.load() == EntryState::Empty {
                    continue;
                }

                let same_key = entry.slot.read().key.as_ref() == Some(&key);
                if same_key {
                    return false;
                }

                entry_idx += 1;
            }

            let next = bucket.next_or_allocate(self.bucket_capacity);
            owned_overflow = Some(next);
            bucket = owned_overflow.as_deref().expect("just assigned");
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        let idx = bucket_index(key, self.buckets.len());
        let mut bucket: &Bucket<K, ()> = &self.buckets[idx];
        let mut owned_overflow: Option<Arc<Bucket<K, ()>>>;

        loop {
            for entry in &bucket.entries {
                match entry.state.load() {
                    EntryState::Empty => return false,
                    EntryState::PendingInsert => {
                        std::thread::yield_now();
                        continue;
                    }
                    EntryState::Used => {
                        if entry.slot.read().key.as_ref() == Some(key) {
                            return true;
                        }
                    }
                    EntryState::PendingUpdate => unreachable!("sets never enter PendingUpdate"),
                }
            }
            match bucket.next() {
                Some(next) => {
                    owned_overflow = Some(next);
                    bucket = owned_overflow.as_deref().expect("just assigned");
                }
                None => return false,
            }
        }
    }

    /// Remove `key` if present, using the same contiguous-compaction
    /// protocol as the map's erase (minus the update state it never
    /// enters). No error on absent key.
    pub fn erase(&self, key: &K) -> bool {
        let idx = bucket_index(key, self.buckets.len());
        loop {
            match self.try_erase_once(idx, key) {
                SetEraseOutcome::NotFound => return false,
                SetEraseOutcome::Erased => return true,
                SetEraseOutcome::Retry => continue,
            }
        }
    }

    fn try_erase_once(&self, idx: usize, key: &K) -> SetEraseOutcome {
        let root = &self.buckets[idx];
        let mut chain = vec![root];
        let mut owned = Vec::new();
        let mut cursor = root.next();
        while let Some(b) = cursor {
            owned.push(b);
            cursor = owned.last().unwrap().next();
        }
        for b in &owned {
            chain.push(b.as_ref());
        }

        let mut to_delete: Option<(&Bucket<K, ()>, usize)> = None;
        'outer: for bucket in chain.iter().copied() {
            for (i, entry) in bucket.entries.iter().enumerate() {
                match entry.state.load() {
                    EntryState::Empty => break 'outer,
                    EntryState::PendingInsert => std::thread::yield_now(),
                    _ => {
                        if entry.slot.read().key.as_ref() == Some(key) {
                            if !entry.state.try_transition(EntryState::Used, EntryState::PendingInsert) {
                                return SetEraseOutcome::Retry;
                            }
                            to_delete = Some((bucket, i));
                            break 'outer;
                        }
                    }
                }
            }
        }

        let (del_bucket, del_idx) = match to_delete {
            None => return SetEraseOutcome::NotFound,
            Some(v) => v,
        };
        self.size.fetch_sub(1, Ordering::AcqRel);

        // The boundary EMPTY entry is claimed via CAS before we trust it as
        // the end of the run (see the map's erase for the full rationale).
        let mut last: Option<(&Bucket<K, ()>, usize)> = None;
        let mut pinned_boundary: Option<&Entry<K, ()>> = None;
        let start_bucket_pos = chain.iter().position(|b| std::ptr::eq(*b, del_bucket)).unwrap();
        let mut seen_del = false;
        'scan: for bucket in chain[start_bucket_pos..].iter().copied() {
            let start_i = if !seen_del && std::ptr::eq(bucket, del_bucket) {
                seen_del = true;
                del_idx
            } else {
                0
            };
            for i in start_i..bucket.entries.len() {
                let entry = &bucket.entries[i];
                loop {
                    match entry.state.load() {
                        EntryState::Empty => {
                            if entry.state.try_transition(EntryState::Empty, EntryState::PendingInsert) {
                                pinned_boundary = Some(entry);
                                break 'scan;
                            }
                            continue;
                        }
                        EntryState::PendingInsert if std::ptr::eq(bucket, del_bucket) && i == del_idx => {
                            last = Some((bucket, i));
                            break;
                        }
                        EntryState::PendingInsert => {
                            std::thread::yield_now();
                            continue;
                        }
                        EntryState::Used => {
                            last = Some((bucket, i));
                            break;
                        }
                        EntryState::PendingUpdate => unreachable!("sets never enter PendingUpdate"),
                    }
                }
            }
        }

        let (last_bucket, last_idx) = last.expect("deleted entry itself is always a candidate");
        if std::ptr::eq(last_bucket, del_bucket) && last_idx == del_idx {
            del_bucket.entries[del_idx].state.store(EntryState::Empty);
            if let Some(boundary) = pinned_boundary {
                boundary.state.store(EntryState::Empty);
            }
            return SetEraseOutcome::Erased;
        }

        let last_entry = &last_bucket.entries[last_idx];
        if !last_entry.state.try_transition(EntryState::Used, EntryState::PendingInsert) {
            del_bucket.entries[del_idx].state.store(EntryState::Used);
            self.size.fetch_add(1, Ordering::AcqRel);
            if let Some(boundary) = pinned_boundary {
                boundary.state.store(EntryState::Empty);
            }
            return SetEraseOutcome::Retry;
        }

        let moved_key = last_entry.slot.write().key.take().expect("pinned used entry has a key");
        del_bucket.entries[del_idx].slot.write().key = Some(moved_key);
        del_bucket.entries[del_idx].state.store(EntryState::Used);
        last_entry.state.store(EntryState::Empty);
        if let Some(boundary) = pinned_boundary {
            boundary.state.store(EntryState::Empty);
        }
        SetEraseOutcome::Erased
    }

    pub fn for_each(&self, mut f: impl FnMut(&K)) {
        for root in &self.buckets {
            let mut bucket: &Bucket<K, ()> = root;
            let mut owned_overflow: Option<Arc<Bucket<K, ()>>>;
            loop {
                for entry in &bucket.entries {
                    if entry.state.load() == EntryState::Used {
                        if let Some(ref k) = entry.slot.read().key {
                            f(k);
                        }
                    }
                }
                match bucket.next() {
                    Some(next) => {
                        owned_overflow = Some(next);
                        bucket = owned_overflow.as_deref().expect("just assigned");
                    }
                    None => break,
                }
            }
        }
    }

    /// Reset size and drop the overflow chain. Not safe under concurrency
    /// with other mutators (§4.6 "clear").
    pub fn clear(&self) {
        for root in &self.buckets {
            for entry in &root.entries {
                entry.state.store(EntryState::Empty);
                entry.slot.write().key = None;
            }
        }
        self.size.store(0, Ordering::Release);
    }

    /// Resize the bucket array to `max(1, expected / 16)` and drop all
    /// contents. Not concurrency-safe (§4.6 "reset").
    pub fn reset(&mut self, expected: usize) {
        let num_buckets = (expected / 16).max(1);
        self.buckets = (0..num_buckets).map(|_| Bucket::new(self.bucket_capacity)).collect();
        self.size.store(0, Ordering::Release);
    }
}

impl<K> LocalHashSet<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    pub fn async_insert(self: &Arc<Self>, handle: &Handle, key: K) {
        let this = self.clone();
        let loc = Grid::this_locality();
        handle.track(Grid::scoped(loc, async move {
            this.insert(key);
        }));
    }

    pub fn async_erase(self: &Arc<Self>, handle: &Handle, key: K) {
        let this = self.clone();
        let loc = Grid::this_locality();
        handle.track(Grid::scoped(loc, async move {
            this.erase(&key);
        }));
    }
}

enum SetEraseOutcome {
    NotFound,
    Erased,
    Retry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let set: LocalHashSet<u64> = LocalHashSet::new(8, 4);
        assert!(set.insert(1));
        assert!(!set.insert(1));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn erase_then_contains_is_false() {
        let set: LocalHashSet<u64> = LocalHashSet::new(4, 4);
        set.insert(1);
        set.insert(2);
        assert!(set.erase(&1));
        assert!(!set.contains(&1));
        assert!(set.contains(&2));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn reset_drops_contents_and_resizes() {
        let mut set: LocalHashSet<u64> = LocalHashSet::new(4, 4);
        for i in 0..10u64 {
            set.insert(i);
        }
        set.reset(320);
        assert_eq!(set.len(), 0);
        assert_eq!(set.buckets.len(), 20);
    }
}
