//! The distributed set front end (§4.8), analogous to [`crate::map::DistributedMap`]
//! with element-only semantics.

use std::hash::Hash;
use std::sync::Arc;

use gridrt_core::config::RuntimeConfig;
use gridrt_core::distributed_object::{create, destroy, get_ptr};
use gridrt_core::error::Result;
use gridrt_core::handle::Handle;
use gridrt_core::locality::Locality;
use gridrt_core::objectid::ObjectId;
use gridrt_core::runtime::Grid;

use gridrt_aggregate::{capacity_from_byte_budget, BufferSink, BuffersVector};

use crate::partitioning::locality_for;
use crate::set_shard::{SetShard, SetShardArgs};

struct SetSink<K: Hash + Eq + Clone + Send + Sync + 'static> {
    grid: Arc<Grid>,
    id: ObjectId<SetShard<K>>,
}

impl<K: Hash + Eq + Clone + Send + Sync + 'static> BufferSink<K> for SetSink<K> {
    fn bulk_insert(&self, entries: Vec<K>) {
        if let Some(shard) = get_ptr::<SetShard<K>>(&self.grid, self.id) {
            for key in entries {
                shard.set.insert(key);
            }
        }
    }
}

async fn run_for_each<K, F>(grid: Arc<Grid>, id: ObjectId<SetShard<K>>, f: Arc<F>)
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    F: Fn(&K) + Send + Sync + 'static,
{
    let grid_arg = grid.clone();
    grid.execute_on_all(
        move |(grid, f): (Arc<Grid>, Arc<F>)| {
            if let Some(shard) = get_ptr::<SetShard<K>>(&grid, id) {
                shard.set.for_each(|k| f(k));
            }
        },
        (grid_arg, f),
    )
    .await;
}

/// A hash-partitioned distributed set: `locality = hash(k) mod N`, one
/// [`SetShard`] per locality.
pub struct DistributedSet<K: Hash + Eq + Clone + Send + Sync + 'static> {
    grid: Arc<Grid>,
    id: ObjectId<SetShard<K>>,
    num_localities: u16,
    buffers: BuffersVector<K>,
}

impl<K: Hash + Eq + Clone + Send + Sync + 'static> DistributedSet<K> {
    pub async fn create(grid: Arc<Grid>, num_buckets: usize, bucket_capacity: usize) -> Result<Self> {
        let args = SetShardArgs { num_buckets, bucket_capacity };
        let shard = create::<SetShard<K>>(&grid, args).await?;
        let id = shard.id;
        let num_localities = grid.num_localities();

        let capacity = capacity_from_byte_budget::<K>(RuntimeConfig::default().buffer_byte_budget);
        let sink: Arc<dyn BufferSink<K>> = Arc::new(SetSink { grid: grid.clone(), id });
        let buffers = BuffersVector::new(grid.clone(), capacity, sink);

        tracing::debug!(num_localities, "distributed set created");
        Ok(DistributedSet { grid, id, num_localities, buffers })
    }

    pub async fn destroy(self) -> Result<()> {
        destroy::<SetShard<K>>(&self.grid, self.id).await
    }

    fn owner(&self, key: &K) -> Locality {
        locality_for(key, self.num_localities)
    }

    /// Insert `key`, dispatched to its owner. Returns whether it was newly
    /// added.
    pub async fn insert(&self, key: K) -> bool {
        let loc = self.owner(&key);
        let grid = self.grid.clone();
        let id = self.id;
        self.grid
            .execute_at(loc, move || get_ptr::<SetShard<K>>(&grid, id).map(|shard| shard.set.insert(key)).unwrap_or(false))
            .await
    }

    pub fn async_insert(&self, handle: &Handle, key: K) {
        let loc = self.owner(&key);
        let grid = self.grid.clone();
        let id = self.id;
        handle.track(Grid::scoped(loc, async move {
            if let Some(shard) = get_ptr::<SetShard<K>>(&grid, id) {
                shard.set.insert(key);
            }
        }));
    }

    pub async fn erase(&self, key: K) -> bool {
        let loc = self.owner(&key);
        let grid = self.grid.clone();
        let id = self.id;
        self.grid
            .execute_at(loc, move || get_ptr::<SetShard<K>>(&grid, id).map(|shard| shard.set.erase(&key)).unwrap_or(false))
            .await
    }

    pub fn async_erase(&self, handle: &Handle, key: K) {
        let loc = self.owner(&key);
        let grid = self.grid.clone();
        let id = self.id;
        handle.track(Grid::scoped(loc, async move {
            if let Some(shard) = get_ptr::<SetShard<K>>(&grid, id) {
                shard.set.erase(&key);
            }
        }));
    }

    pub async fn contains(&self, key: K) -> bool {
        let loc = self.owner(&key);
        let grid = self.grid.clone();
        let id = self.id;
        self.grid
            .execute_at(loc, move || get_ptr::<SetShard<K>>(&grid, id).map(|shard| shard.set.contains(&key)).unwrap_or(false))
            .await
    }

    pub async fn buffered_insert(&self, key: K) -> Result<()> {
        let loc = self.owner(&key);
        self.buffers.insert(key, loc).await
    }

    pub fn buffered_async_insert(&self, handle: &Handle, key: K) {
        let loc = self.owner(&key);
        self.buffers.async_insert(handle, key, loc);
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
                .execute_at(loc, move || get_ptr::<SetShard<K>>(&grid, id).map(|shard| shard.set.len()).unwrap_or(0))
                .await;
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    pub async fn for_each<F>(&self, f: F)
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        run_for_each(self.grid.clone(), self.id, Arc::new(f)).await;
    }

    pub fn async_for_each<F>(&self, handle: &Handle, f: F)
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        let grid = self.grid.clone();
        let id = self.id;
        let f = Arc::new(f);
        handle.track(async move {
            run_for_each(grid, id, f).await;
        });
    }

    pub async fn clear(&self) {
        let grid = self.grid.clone();
        let id = self.id;
        self.grid
            .execute_on_all(
                move |_: ()| {
                    if let Some(shard) = get_ptr::<SetShard<K>>(&grid, id) {
                        shard.set.clear();
                    }
                },
                (),
            )
            .await;
    }

    pub fn begin(&self) -> DistributedSetCursor<K> {
        DistributedSetCursor::new(self.grid.clone(), self.id, self.num_localities)
    }
}

/// Same locality-by-locality RPC batching as
/// [`crate::map::DistributedMapCursor`], element-only.
pub struct DistributedSetCursor<K: Hash + Eq + Clone + Send + Sync + 'static> {
    grid: Arc<Grid>,
    id: ObjectId<SetShard<K>>,
    num_localities: u16,
    loc: u16,
    snapshot: Vec<K>,
    pos: usize,
}

impl<K: Hash + Eq + Clone + Send + Sync + 'static> DistributedSetCursor<K> {
    pub(crate) fn new(grid: Arc<Grid>, id: ObjectId<SetShard<K>>, num_localities: u16) -> Self {
        DistributedSetCursor { grid, id, num_localities, loc: 0, snapshot: Vec::new(), pos: 0 }
    }

    async fn fetch_locality(&self, loc: u16) -> Vec<K> {
        let grid = self.grid.clone();
        let id = self.id;
        self.grid
            .execute_at(Locality::new(loc), move || {
                let mut out = Vec::new();
                if let Some(shard) = get_ptr::<SetShard<K>>(&grid, id) {
                    shard.set.for_each(|k| out.push(k.clone()));
                }
                out
            })
            .await
    }

    pub async fn next(&mut self) -> Option<K> {
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
    async fn insert_is_idempotent_across_localities() {
        let grid = Grid::new(4);
        let set: DistributedSet<u64> = DistributedSet::create(grid, 4, 4).await.unwrap();
        assert!(set.insert(7).await);
        assert!(!set.insert(7).await);
        assert_eq!(set.size().await, 1);
        assert!(set.contains(7).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn erase_then_contains_is_false() {
        let grid = Grid::new(3);
        let set: DistributedSet<u64> = DistributedSet::create(grid, 4, 4).await.unwrap();
        for k in 0..40u64 {
            set.insert(k).await;
        }
        assert!(set.erase(5).await);
        assert!(!set.contains(5).await);
        assert_eq!(set.size().await, 39);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cursor_visits_every_element_exactly_once() {
        let grid = Grid::new(3);
        let set: DistributedSet<u64> = DistributedSet::create(grid, 4, 4).await.unwrap();
        for k in 0..25u64 {
            set.insert(k).await;
        }
        let mut cursor = set.begin();
        let mut seen = Vec::new();
        while let Some(k) = cursor.next().await {
            seen.push(k);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..25u64).collect::<Vec<_>>());
    }
}
