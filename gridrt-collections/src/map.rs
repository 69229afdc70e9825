//! The local chained hash map (§4.5).

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gridrt_core::handle::Handle;
use gridrt_core::runtime::Grid;

use crate::bucket::{Bucket, Entry};
use crate::policy::{InsertPolicy, Overwriter};
use crate::state::EntryState;

/// Default entries per bucket before chaining into an overflow bucket
/// (§0.B `RuntimeConfig::bucket_capacity`'s default).
pub const DEFAULT_BUCKET_CAPACITY: usize = 128;

fn bucket_index<K: Hash>(key: &K, num_buckets: usize) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % num_buckets
}

/// A concurrent chained hash map with a CAS-driven per-entry FSM
/// (§4.5). `K` must be `Clone` because the erase algorithm moves a key out
/// of one entry into another as part of its compaction step.
pub struct LocalHashMap<K, V, P = Overwriter>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
    P: InsertPolicy<V>,
{
    buckets: Vec<Bucket<K, V>>,
    bucket_capacity: usize,
    size: AtomicUsize,
    policy: P,
}

impl<K, V> LocalHashMap<K, V, Overwriter>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
{
    pub fn new(num_buckets: usize, bucket_capacity: usize) -> Self {
        Self::with_policy(num_buckets, bucket_capacity, Overwriter)
    }
}

impl<K, V, P> LocalHashMap<K, V, P>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
    P: InsertPolicy<V>,
{
    pub fn with_policy(num_buckets: usize, bucket_capacity: usize, policy: P) -> Self {
        let num_buckets = num_buckets.max(1);
        let buckets = (0..num_buckets).map(|_| Bucket::new(bucket_capacity)).collect();
        LocalHashMap {
            buckets,
            bucket_capacity,
            size: AtomicUsize::new(0),
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Install `(key, value)`, applying the insertion policy if `key` is
    /// already present. Returns whether the policy wrote a new value
    /// (§4.5 "Insertion algorithm").
    pub fn insert(&self, key: K, value: V) -> bool {
        let idx = bucket_index(&key, self.buckets.len());
        let mut bucket: &Bucket<K, V> = &self.buckets[idx];
        let mut owned_overflow: Option<Arc<Bucket<K, V>>>;

        loop {
            let mut entry_idx = 0;
            while entry_idx < bucket.entries.len() {
                let entry = &bucket.entries[entry_idx];

                if entry.state.try_transition(EntryState::Empty, EntryState::PendingInsert) {
                    let inserted = {
                        let mut slot = entry.slot.write();
                        slot.key = Some(key.clone());
                        self.policy.merge(&mut slot.value, value, false)
                    };
                    self.size.fetch_add(1, Ordering::AcqRel);
                    entry.state.store(EntryState::Used);
                    return inserted;
                }

                loop {
                    match entry.state.load() {
                        EntryState::PendingInsert => std::thread::yield_now(),
                        _ => break,
                    }
                }

                // The wait above can resolve to Empty (a concurrent erase
                // just finalized this very entry). Retry the Empty CAS on
                // this same entry instead of falling through to the next
                // one, or a lookup racing the same window could see an
                // Empty slot ahead of a Used one.
                if entry.state.load() == EntryState::Empty {
                    continue;
                }

                let same_key = {
                    let slot = entry.slot.read();
                    slot.key.as_ref() == Some(&key)
                };
                if same_key {
                    while !entry.state.try_transition(EntryState::Used, EntryState::PendingUpdate) {
                        std::thread::yield_now();
                    }
                    let inserted = {
                        let mut slot = entry.slot.write();
                        self.policy.merge(&mut slot.value, value, true)
                    };
                    entry.state.store(EntryState::Used);
                    return inserted;
                }

                entry_idx += 1;
            }

            let next = bucket.next_or_allocate(self.bucket_capacity);
            owned_overflow = Some(next);
            bucket = owned_overflow.as_deref().expect("just assigned");
        }
    }

    /// Copy out the value for `key`, if present.
    pub fn lookup(&self, key: &K) -> Option<V> {
        let idx = bucket_index(key, self.buckets.len());
        let mut bucket: &Bucket<K, V> = &self.buckets[idx];
        let mut owned_overflow: Option<Arc<Bucket<K, V>>>;

        loop {
            for entry in &bucket.entries {
                match entry.state.load() {
                    EntryState::Empty => return None,
                    EntryState::PendingInsert => {
                        std::thread::yield_now();
                        continue;
                    }
                    _ => {}
                }
                let found = {
                    let slot = entry.slot.read();
                    if slot.key.as_ref() == Some(key) {
                        Some(slot.value.clone())
                    } else {
                        None
                    }
                };
                if found.is_some() {
                    while entry.state.load() == EntryState::PendingUpdate {
                        std::thread::yield_now();
                    }
                    return found;
                }
            }
            match bucket.next() {
                Some(next) => {
                    owned_overflow = Some(next);
                    bucket = owned_overflow.as_deref().expect("just assigned");
                }
                None => return None,
            }
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.lookup(key).is_some()
    }

    /// Invoke `f` against the value for `key` while the entry is pinned
    /// against structural change, returning `f`'s result if `key` was
    /// present (§4.5 "apply").
    pub fn apply<R>(&self, key: &K, f: impl FnOnce(&K, &mut V) -> R) -> Option<R> {
        let idx = bucket_index(key, self.buckets.len());
        let mut bucket: &Bucket<K, V> = &self.buckets[idx];
        let mut owned_overflow: Option<Arc<Bucket<K, V>>>;

        loop {
            for entry in &bucket.entries {
                match entry.state.load() {
                    EntryState::Empty => return None,
                    EntryState::PendingInsert => {
                        std::thread::yield_now();
                        continue;
                    }
                    _ => {}
                }
                let is_match = entry.slot.read().key.as_ref() == Some(key);
                if is_match {
                    while !entry.state.try_transition(EntryState::Used, EntryState::PendingUpdate) {
                        std::thread::yield_now();
                    }
                    let result = {
                        let mut slot = entry.slot.write();
                        let k = slot.key.clone().expect("pinned used entry has a key");
                        f(&k, &mut slot.value)
                    };
                    entry.state.store(EntryState::Used);
                    return Some(result);
                }
            }
            match bucket.next() {
                Some(next) => {
                    owned_overflow = Some(next);
                    bucket = owned_overflow.as_deref().expect("just assigned");
                }
                None => return None,
            }
        }
    }

    /// Remove `key` if present, restoring the invariant that USED entries
    /// form a contiguous run from the root bucket (§4.5 "Erase algorithm").
    /// No error if `key` is absent.
    pub fn erase(&self, key: &K) -> bool {
        let idx = bucket_index(key, self.buckets.len());
        loop {
            match self.try_erase_once(idx, key) {
                EraseOutcome::NotFound => return false,
                EraseOutcome::Erased => return true,
                EraseOutcome::Retry => continue,
            }
        }
    }

    fn try_erase_once(&self, idx: usize, key: &K) -> EraseOutcome {
        let root = &self.buckets[idx];

        // Step 1: find and pin the entry to delete.
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

        let mut to_delete: Option<(&Bucket<K, V>, usize)> = None;
        'outer: for bucket in chain.iter().copied() {
            for (i, entry) in bucket.entries.iter().enumerate() {
                match entry.state.load() {
                    EntryState::Empty => break 'outer,
                    EntryState::PendingInsert => {
                        std::thread::yield_now();
                    }
                    _ => {
                        if entry.slot.read().key.as_ref() == Some(key) {
                            if !entry.state.try_transition(EntryState::Used, EntryState::PendingInsert) {
                                return EraseOutcome::Retry;
                            }
                            to_delete = Some((bucket, i));
                            break 'outer;
                        }
                    }
                }
            }
        }

        let (del_bucket, del_idx) = match to_delete {
            None => return EraseOutcome::NotFound,
            Some(v) => v,
        };
        self.size.fetch_sub(1, Ordering::AcqRel);

        // Step 2: scan forward from the deletion point for the last USED
        // entry before the first EMPTY. The boundary EMPTY entry itself is
        // claimed via CAS before we trust it as the end of the run, so a
        // concurrent insert can't land a new entry past it while we're
        // still deciding what "last" is.
        let mut last: Option<(&Bucket<K, V>, usize)> = None;
        let mut pinned_boundary: Option<&Entry<K, V>> = None;
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
                            // Lost the race for the boundary slot; reread
                            // and react to whatever it became.
                            continue;
                        }
                        EntryState::PendingInsert if std::ptr::eq(bucket, del_bucket) && i == del_idx => {
                            // this is the entry we just pinned ourselves
                            last = Some((bucket, i));
                            break;
                        }
                        EntryState::PendingInsert | EntryState::PendingUpdate => {
                            std::thread::yield_now();
                            continue;
                        }
                        EntryState::Used => {
                            last = Some((bucket, i));
                            break;
                        }
                    }
                }
            }
        }

        let (last_bucket, last_idx) = last.expect("deleted entry itself is always a candidate");

        if std::ptr::eq(last_bucket, del_bucket) && last_idx == del_idx {
            // The entry being deleted is already the last USED entry.
            del_bucket.entries[del_idx].state.store(EntryState::Empty);
            if let Some(boundary) = pinned_boundary {
                boundary.state.store(EntryState::Empty);
            }
            return EraseOutcome::Erased;
        }

        let last_entry = &last_bucket.entries[last_idx];
        if !last_entry.state.try_transition(EntryState::Used, EntryState::PendingInsert) {
            // Lost a race for the last entry; undo our own pins and retry.
            del_bucket.entries[del_idx].state.store(EntryState::Used);
            self.size.fetch_add(1, Ordering::AcqRel);
            if let Some(boundary) = pinned_boundary {
                boundary.state.store(EntryState::Empty);
            }
            return EraseOutcome::Retry;
        }

        let moved = {
            let mut last_slot = last_entry.slot.write();
            let moved_key = last_slot.key.take().expect("pinned used entry has a key");
            let moved_value = std::mem::replace(&mut last_slot.value, V::default());
            (moved_key, moved_value)
        };
        {
            let mut del_slot = del_bucket.entries[del_idx].slot.write();
            del_slot.key = Some(moved.0);
            del_slot.value = moved.1;
        }
        del_bucket.entries[del_idx].state.store(EntryState::Used);
        last_entry.state.store(EntryState::Empty);
        if let Some(boundary) = pinned_boundary {
            boundary.state.store(EntryState::Empty);
        }
        EraseOutcome::Erased
    }

    /// Visit every `Used` entry. Makes no guarantee about entries inserted
    /// or erased concurrently with the scan (§4.5 "For-each semantics").
    pub fn for_each_entry(&self, mut f: impl FnMut(&K, &V)) {
        for root in &self.buckets {
            let mut bucket: &Bucket<K, V> = root;
            let mut owned_overflow: Option<Arc<Bucket<K, V>>>;
            loop {
                for entry in &bucket.entries {
                    match entry.state.load() {
                        EntryState::Used => {
                            let slot = entry.slot.read();
                            if let Some(ref k) = slot.key {
                                f(k, &slot.value);
                            }
                        }
                        EntryState::Empty => {}
                        _ => tracing::debug!("entry in pending state while iterating"),
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

    pub fn for_each_key(&self, mut f: impl FnMut(&K)) {
        self.for_each_entry(|k, _| f(k));
    }

    /// Reset size and drop the overflow chain. Not safe under concurrency
    /// with other mutators (§4.5 "clear").
    pub fn clear(&self) {
        for root in &self.buckets {
            for entry in &root.entries {
                entry.state.store(EntryState::Empty);
                let mut slot = entry.slot.write();
                slot.key = None;
                slot.value = V::default();
            }
        }
        self.size.store(0, Ordering::Release);
    }
}

impl<K, V, P> LocalHashMap<K, V, P>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
    P: InsertPolicy<V>,
{
    pub fn async_insert(self: &Arc<Self>, handle: &Handle, key: K, value: V) {
        let this = self.clone();
        let loc = Grid::this_locality();
        handle.track(Grid::scoped(loc, async move {
            this.insert(key, value);
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

enum EraseOutcome {
    NotFound,
    Erased,
    Retry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Updater;

    #[test]
    fn insert_then_lookup_round_trips() {
        let map: LocalHashMap<u64, u64> = LocalHashMap::new(8, 4);
        assert!(map.insert(1, 100));
        assert_eq!(map.lookup(&1), Some(100));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn overwriter_replaces_existing_value() {
        let map: LocalHashMap<u64, u64> = LocalHashMap::new(8, 4);
        map.insert(1, 100);
        let wrote = map.insert(1, 200);
        assert!(wrote);
        assert_eq!(map.lookup(&1), Some(200));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn updater_merges_instead_of_overwriting() {
        let map: LocalHashMap<u64, u64, Updater<u64, _>> =
            LocalHashMap::with_policy(8, 4, Updater::new(|existing, incoming| *existing += incoming));
        map.insert(1, 10);
        let wrote = map.insert(1, 5);
        assert!(!wrote);
        assert_eq!(map.lookup(&1), Some(15));
    }

    #[test]
    fn erase_removes_entry_and_keeps_others_reachable() {
        let map: LocalHashMap<u64, u64> = LocalHashMap::new(1, 8);
        for i in 0..5u64 {
            map.insert(i, i * 10);
        }
        assert!(map.erase(&2));
        assert_eq!(map.len(), 4);
        assert_eq!(map.lookup(&2), None);
        for i in [0u64, 1, 3, 4] {
            assert_eq!(map.lookup(&i), Some(i * 10));
        }
    }

    #[test]
    fn erase_of_absent_key_is_a_benign_no_op() {
        let map: LocalHashMap<u64, u64> = LocalHashMap::new(4, 4);
        map.insert(1, 1);
        assert!(!map.erase(&99));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn erase_across_overflow_boundary_keeps_compaction_correct() {
        let map: LocalHashMap<u64, u64> = LocalHashMap::new(1, 2);
        for i in 0..6u64 {
            map.insert(i, i);
        }
        assert!(map.erase(&0));
        assert_eq!(map.len(), 5);
        for i in 1..6u64 {
            assert_eq!(map.lookup(&i), Some(i));
        }
    }

    #[test]
    fn for_each_entry_visits_every_used_entry_exactly_once() {
        let map: LocalHashMap<u64, u64> = LocalHashMap::new(4, 4);
        for i in 0..20u64 {
            map.insert(i, i);
        }
        let mut seen = Vec::new();
        map.for_each_entry(|k, v| seen.push((*k, *v)));
        seen.sort();
        let expected: Vec<_> = (0..20u64).map(|i| (i, i)).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn clear_resets_size_and_entries() {
        let map: LocalHashMap<u64, u64> = LocalHashMap::new(4, 4);
        map.insert(1, 1);
        map.insert(2, 2);
        map.clear();
        assert_eq!(map.len(), 0);
        assert_eq!(map.lookup(&1), None);
    }

    #[tokio::test]
    async fn async_insert_is_observable_after_wait() {
        let map = Arc::new(LocalHashMap::<u64, u64>::new(8, 4));
        let handle = Handle::new();
        for i in 0..4096u64 {
            map.async_insert(&handle, i, i);
        }
        handle.wait().await.unwrap();
        assert_eq!(map.len(), 4096);
        let mut seen = 0usize;
        map.for_each_entry(|_, _| seen += 1);
        assert_eq!(seen, 4096);
    }

    proptest::proptest! {
        // A small bucket count and capacity forces frequent overflow chains
        // and cross-bucket compaction, which is where a broken erase would
        // surface as a lost or unreachable entry.
        #[test]
        fn erase_never_breaks_bucket_contiguity(
            ops in proptest::collection::vec(
                (0u64..64, proptest::bool::ANY),
                0..500,
            )
        ) {
            let map: LocalHashMap<u64, u64> = LocalHashMap::new(4, 2);
            let mut model = std::collections::HashMap::new();

            for (key, should_insert) in ops {
                if should_insert {
                    map.insert(key, key * 7);
                    model.insert(key, key * 7);
                } else {
                    map.erase(&key);
                    model.remove(&key);
                }
            }

            proptest::prop_assert_eq!(map.len(), model.len());
            for (key, value) in &model {
                proptest::prop_assert_eq!(map.lookup(key), Some(*value));
            }
            let mut seen = Vec::new();
            map.for_each_entry(|k, v| seen.push((*k, *v)));
            proptest::prop_assert_eq!(seen.len(), model.len());
            for (k, v) in seen {
                proptest::prop_assert_eq!(model.get(&k), Some(&v));
            }
        }
    }
}
