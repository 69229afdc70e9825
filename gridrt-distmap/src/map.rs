//! The distributed map front end (§4.8).

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use gridrt_core::config::RuntimeConfig;
use gridrt_core::distributed_object::{create, destroy, get_ptr};
use gridrt_core::error::Result;
use gridrt_core::handle::Handle;
use gridrt_core::locality::Locality;
use gridrt_core::objectid::ObjectId;
use gridrt_core::runtime::Grid;

use gridrt_aggregate::{capacity_from_byte_budget, BufferSink, BuffersVector};
use gridrt_collections::policy::{InsertPolicy, Overwriter};

use crate::map_shard::{MapShard, MapShardArgs};
use crate::partitioning::locality_for;

/// Shared implementation behind `for_each_entry`/`async_for_each_entry` —
/// takes owned handles to the map's identity instead of `&self` so it runs
/// equally well awaited inline or inside a spawned, handle-tracked task.
async fn run_for_each_entry<K, V, P, F>(grid: Arc<Grid>, id: ObjectId<MapShard<K, V, P>>, f: Arc<F>)
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
    P: InsertPolicy<V> + Clone + Send + Sync + 'static,
    F: Fn(&K, &V) + Send + Sync + 'static,
{
    let grid_arg = grid.clone();
    grid.execute_on_all(
        move |(grid, f): (Arc<Grid>, Arc<F>)| {
            if let Some(shard) = get_ptr::<MapShard<K, V, P>>(&grid, id) {
                shard.map.for_each_entry(|k, v| f(k, v));
            }
        },
        (grid_arg, f),
    )
    .await;
}

/// Replays buffered `(key, value)` pairs into the shard living on whichever
/// locality the flush lands on — the container-specific `bufferEntryInsert`
/// hook (§6), same role as `gridrt-array`'s `ArraySink`.
struct MapSink<K, V, P>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
    P: InsertPolicy<V> + Clone + Send + Sync + 'static,
{
    grid: Arc<Grid>,
    id: ObjectId<MapShard<K, V, P>>,
}

impl<K, V, P> BufferSink<(K, V)> for MapSink<K, V, P>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
    P: InsertPolicy<V> + Clone + Send + Sync + 'static,
{
    fn bulk_insert(&self, entries: Vec<(K, V)>) {
        if let Some(shard) = get_ptr::<MapShard<K, V, P>>(&self.grid, self.id) {
            for (key, value) in entries {
                shard.map.insert(key, value);
            }
        }
    }
}

/// A hash-partitioned distributed map: `locality = hash(k) mod N`, one
/// [`MapShard`] per locality.
pub struct DistributedMap<K, V, P = Overwriter>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
    P: InsertPolicy<V> + Clone + Send + Sync + 'static,
{
    grid: Arc<Grid>,
    id: ObjectId<MapShard<K, V, P>>,
    num_localities: u16,
    buffers: BuffersVector<(K, V)>,
}

impl<K, V> DistributedMap<K, V, Overwriter>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
{
    pub async fn create(grid: Arc<Grid>, num_buckets: usize, bucket_capacity: usize) -> Result<Self> {
        Self::with_policy(grid, num_buckets, bucket_capacity, Overwriter).await
    }
}

impl<K, V, P> DistributedMap<K, V, P>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
    P: InsertPolicy<V> + Clone + Send + Sync + 'static,
{
    pub async fn with_policy(grid: Arc<Grid>, num_buckets: usize, bucket_capacity: usize, policy: P) -> Result<Self> {
        let args = MapShardArgs { num_buckets, bucket_capacity, policy };
        let shard = create::<MapShard<K, V, P>>(&grid, args).await?;
        let id = shard.id;
        let num_localities = grid.num_localities();

        let capacity = capacity_from_byte_budget::<(K, V)>(RuntimeConfig::default().buffer_byte_budget);
        let sink: Arc<dyn BufferSink<(K, V)>> = Arc::new(MapSink { grid: grid.clone(), id });
        let buffers = BuffersVector::new(grid.clone(), capacity, sink);

        tracing::debug!(num_localities, "distributed map created");
        Ok(DistributedMap { grid, id, num_localities, buffers })
    }

    pub async fn destroy(self) -> Result<()> {
        destroy::<MapShard<K, V, P>>(&self.grid, self.id).await
    }

    fn owner(&self, key: &K) -> Locality {
        locality_for(key, self.num_localities)
    }

    /// Dispatch `insert` to `key`'s owner and wait for it to land.
    pub async fn insert(&self, key: K, value: V) -> bool {
        let loc = self.owner(&key);
        let grid = self.grid.clone();
        let id = self.id;
        self.grid
            .execute_at(loc, move || {
                get_ptr::<MapShard<K, V, P>>(&grid, id)
                    .map(|shard| shard.map.insert(key, value))
                    .unwrap_or(false)
            })
            .await
    }

    pub fn async_insert(&self, handle: &Handle, key: K, value: V) {
        let loc = self.owner(&key);
        let grid = self.grid.clone();
        let id = self.id;
        handle.track(Grid::scoped(loc, async move {
            if let Some(shard) = get_ptr::<MapShard<K, V, P>>(&grid, id) {
                shard.map.insert(key, value);
            }
        }));
    }

    pub async fn erase(&self, key: K) -> bool {
        let loc = self.owner(&key);
        let grid = self.grid.clone();
        let id = self.id;
        self.grid
            .execute_at(loc, move || {
                get_ptr::<MapShard<K, V, P>>(&grid, id)
                    .map(|shard| shard.map.erase(&key))
                    .unwrap_or(false)
            })
            .await
    }

    pub fn async_erase(&self, handle: &Handle, key: K) {
        let loc = self.owner(&key);
        let grid = self.grid.clone();
        let id = self.id;
        handle.track(Grid::scoped(loc, async move {
            if let Some(shard) = get_ptr::<MapShard<K, V, P>>(&grid, id) {
                shard.map.erase(&key);
            }
        }));
    }

    pub async fn lookup(&self, key: K) -> Option<V> {
        let loc = self.owner(&key);
        let grid = self.grid.clone();
        let id = self.id;
        self.grid
            .execute_at(loc, move || get_ptr::<MapShard<K, V, P>>(&grid, id).and_then(|shard| shard.map.lookup(&key)))
            .await
    }

    pub fn async_lookup(&self, handle: &Handle, key: K, out: Arc<Mutex<Option<V>>>) {
        let loc = self.owner(&key);
        let grid = self.grid.clone();
        let id = self.id;
        handle.track(Grid::scoped(loc, async move {
            if let Some(shard) = get_ptr::<MapShard<K, V, P>>(&grid, id) {
                *out.lock() = shard.map.lookup(&key);
            }
        }));
    }

    pub async fn apply<R, F>(&self, key: K, f: F) -> Option<R>
    where
        F: FnOnce(&K, &mut V) -> R + Send + 'static,
        R: Send + 'static,
    {
        let loc = self.owner(&key);
        let grid = self.grid.clone();
        let id = self.id;
        self.grid
            .execute_at(loc, move || get_ptr::<MapShard<K, V, P>>(&grid, id).and_then(|shard| shard.map.apply(&key, f)))
            .await
    }

    pub fn async_apply<F>(&self, handle: &Handle, key: K, f: F)
    where
        F: FnOnce(&K, &mut V) + Send + 'static,
    {
        let loc = self.owner(&key);
        let grid = self.grid.clone();
        let id = self.id;
        handle.track(Grid::scoped(loc, async move {
            if let Some(shard) = get_ptr::<MapShard<K, V, P>>(&grid, id) {
                shard.map.apply(&key, |k, v| f(k, v));
            }
        }));
    }

    /// Positional insert routed through the per-destination aggregation
    /// buffer (§4.9) instead of an immediate dispatch.
    pub async fn buffered_insert(&self, key: K, value: V) -> Result<()> {
        let loc = self.owner(&key);
        self.buffers.insert((key, value), loc).await
    }

    pub fn buffered_async_insert(&self, handle: &Handle, key: K, value: V) {
        let loc = self.owner(&key);
        self.buffers.async_insert(handle, (key, value), loc);
    }

    pub async fn flush_buffers(&self) {
        self.buffers.flush_all().await;
    }

    pub fn async_flush_buffers(&self, handle: &Handle) {
        self.buffers.async_flush_all(handle);
    }

    /// Sequential, blocking sum over every locality — intentionally
    /// heavyweight (§4.8).
    pub async fn size(&self) -> usize {
        let mut total = 0usize;
        for loc in self.grid.all_localities() {
            let grid = self.grid.clone();
            let id = self.id;
            total += self
                .grid
                .execute_at(loc, move || get_ptr::<MapShard<K, V, P>>(&grid, id).map(|shard| shard.map.len()).unwrap_or(0))
                .await;
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    /// Broadcast a for-each across every locality's buckets.
    pub async fn for_each_entry<F>(&self, f: F)
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        run_for_each_entry(self.grid.clone(), self.id, Arc::new(f)).await;
    }

    pub async fn for_each_key<F>(&self, f: F)
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        self.for_each_entry(move |k, _| f(k)).await;
    }

    /// Tracked analog of [`Self::for_each_entry`] — dispatches the whole
    /// broadcast as one unit of work against `handle` rather than waiting
    /// on it inline.
    pub fn async_for_each_entry<F>(&self, handle: &Handle, f: F)
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        let grid = self.grid.clone();
        let id = self.id;
        let f = Arc::new(f);
        handle.track(async move {
            run_for_each_entry(grid, id, f).await;
        });
    }

    pub fn async_for_each_key<F>(&self, handle: &Handle, f: F)
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        self.async_for_each_entry(handle, move |k, _| f(k));
    }

    pub async fn clear(&self) {
        let grid = self.grid.clone();
        let id = self.id;
        self.grid
            .execute_on_all(
                move |_: ()| {
                    if let Some(shard) = get_ptr::<MapShard<K, V, P>>(&grid, id) {
                        shard.map.clear();
                    }
                },
                (),
            )
            .await;
    }

    /// A snapshot-driven cursor over every entry, advancing locality by
    /// locality.
    pub fn begin(&self) -> DistributedMapCursor<K, V, P> {
        DistributedMapCursor::new(self.grid.clone(), self.id, self.num_localities)
    }
}

/// Advances across localities one synchronous RPC at a time, snapshotting
/// a whole locality's entries per RPC rather than one entry per RPC — the
/// natural batching once remote access is `execute_at` instead of a raw
/// pointer dereference. `next()` returning `None` is the `(N, nullOid)`
/// end sentinel.
pub struct DistributedMapCursor<K, V, P>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
    P: InsertPolicy<V> + Clone + Send + Sync + 'static,
{
    grid: Arc<Grid>,
    id: ObjectId<MapShard<K, V, P>>,
    num_localities: u16,
    loc: u16,
    snapshot: Vec<(K, V)>,
    pos: usize,
}

impl<K, V, P> DistributedMapCursor<K, V, P>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
    P: InsertPolicy<V> + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(grid: Arc<Grid>, id: ObjectId<MapShard<K, V, P>>, num_localities: u16) -> Self {
        DistributedMapCursor { grid, id, num_localities, loc: 0, snapshot: Vec::new(), pos: 0 }
    }

    async fn fetch_locality(&self, loc: u16) -> Vec<(K, V)> {
        let grid = self.grid.clone();
        let id = self.id;
        self.grid
            .execute_at(Locality::new(loc), move || {
                let mut out = Vec::new();
                if let Some(shard) = get_ptr::<MapShard<K, V, P>>(&grid, id) {
                    shard.map.for_each_entry(|k, v| out.push((k.clone(), v.clone())));
                }
                out
            })
            .await
    }

    pub async fn next(&mut self) -> Option<(K, V)> {
        loop {
            if self.pos < self.snapshot.len() {
                let entry = self.snapshot[self.pos].clone();
                self.pos += 1;
                return Some(entry);
            }
            if self.loc >= self.num_localities {
                return None;
            }
            self.snapshot = self.fetch_locality(self.loc).await;
            self.pos = 0;
            self.loc += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_then_lookup_round_trips_across_localities() {
        let grid = Grid::new(4);
        let map: DistributedMap<u64, u64> = DistributedMap::create(grid, 8, 8).await.unwrap();

        for k in 0..200u64 {
            map.insert(k, k * 10).await;
        }
        assert_eq!(map.size().await, 200);
        for k in 0..200u64 {
            assert_eq!(map.lookup(k).await, Some(k * 10));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn erase_removes_only_the_targeted_key() {
        let grid = Grid::new(3);
        let map: DistributedMap<u64, u64> = DistributedMap::create(grid, 4, 4).await.unwrap();
        for k in 0..50u64 {
            map.insert(k, k).await;
        }
        assert!(map.erase(7).await);
        assert_eq!(map.lookup(7).await, None);
        assert_eq!(map.size().await, 49);
        assert_eq!(map.lookup(8).await, Some(8));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn for_each_entry_visits_every_key_across_every_locality() {
        let grid = Grid::new(4);
        let map: DistributedMap<u64, u64> = DistributedMap::create(grid, 4, 4).await.unwrap();
        for k in 0..100u64 {
            map.insert(k, k).await;
        }
        let seen: Arc<parking_lot::Mutex<Vec<u64>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_for_closure = seen.clone();
        map.for_each_entry(move |k, _| seen_for_closure.lock().push(*k)).await;
        let mut seen = seen.lock().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..100u64).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cursor_visits_every_entry_exactly_once() {
        let grid = Grid::new(3);
        let map: DistributedMap<u64, u64> = DistributedMap::create(grid, 4, 4).await.unwrap();
        for k in 0..30u64 {
            map.insert(k, k).await;
        }
        let mut cursor = map.begin();
        let mut seen = Vec::new();
        while let Some((k, _)) = cursor.next().await {
            seen.push(k);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..30u64).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_empties_every_locality() {
        let grid = Grid::new(3);
        let map: DistributedMap<u64, u64> = DistributedMap::create(grid, 4, 4).await.unwrap();
        for k in 0..30u64 {
            map.insert(k, k).await;
        }
        map.clear().await;
        assert_eq!(map.size().await, 0);
        assert!(map.is_empty().await);
    }
}
