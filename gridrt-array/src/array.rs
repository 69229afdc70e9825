//! The distributed array front end (§4.7).

use std::ops::{Add, Range};
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

use crate::chunk::{ArrayChunk, ChunkArgs};
use crate::cursor::ArrayCursor;
use crate::partition::Partition;
use crate::scan::{local_inclusive_scan, spawn_scan_step};

/// Replays buffered `(local offset, value)` pairs into the chunk living on
/// whichever locality the flush lands on — the container-specific
/// `bufferEntryInsert` hook (§6).
struct ArraySink<E: Default + Clone + Send + Sync + 'static> {
    grid: Arc<Grid>,
    id: ObjectId<ArrayChunk<E>>,
}

impl<E: Default + Clone + Send + Sync + 'static> BufferSink<(usize, E)> for ArraySink<E> {
    fn bulk_insert(&self, entries: Vec<(usize, E)>) {
        if let Some(chunk) = get_ptr::<ArrayChunk<E>>(&self.grid, self.id) {
            let mut data = chunk.data.write();
            for (offset, value) in entries {
                data[offset] = value;
            }
        }
    }
}

/// Shared implementation behind `for_each_in_range`/`async_for_each_in_range`
/// — takes owned handles to the array's identity instead of `&self` so it
/// can run equally well awaited inline or inside a spawned, handle-tracked
/// task.
async fn run_for_each_in_range<E, F>(grid: Arc<Grid>, id: ObjectId<ArrayChunk<E>>, partition: Partition, range: Range<usize>, f: Arc<F>)
where
    E: Default + Clone + Send + Sync + 'static,
    F: Fn(&mut E) + Send + Sync + 'static,
{
    let start = range.start.min(partition.len());
    let end = range.end.min(partition.len());
    if start >= end {
        return;
    }
    for (loc, count) in partition.chunks() {
        let chunk_start = partition.chunk_start(loc);
        let chunk_end = chunk_start + count;
        let lo = start.max(chunk_start);
        let hi = end.min(chunk_end);
        if lo >= hi {
            continue;
        }
        let local_lo = lo - chunk_start;
        let n = hi - lo;
        let grid_for_closure = grid.clone();
        let f = f.clone();
        grid.for_each_at(loc, n, (), move |_, i| {
            if let Some(chunk) = get_ptr::<ArrayChunk<E>>(&grid_for_closure, id) {
                f(&mut chunk.data.write()[local_lo + i]);
            }
        })
        .await;
    }
}

/// A fixed-size sequence partitioned across every locality per
/// [`Partition`]. `E` must be `Default` so a fresh chunk can be
/// zero-initialized on construction.
pub struct DistributedArray<E: Default + Clone + Send + Sync + 'static> {
    grid: Arc<Grid>,
    id: ObjectId<ArrayChunk<E>>,
    partition: Partition,
    buffers: BuffersVector<(usize, E)>,
}

impl<E: Default + Clone + Send + Sync + 'static> DistributedArray<E> {
    /// Collectively allocate an array of `n` elements, chunked per
    /// [`Partition`] across `grid`'s localities.
    pub async fn create(grid: Arc<Grid>, n: usize) -> Result<Self> {
        let partition = Partition::new(n, grid.num_localities());
        let chunk = create::<ArrayChunk<E>>(&grid, ChunkArgs { partition: partition.clone() }).await?;
        let id = chunk.id;

        let capacity = capacity_from_byte_budget::<(usize, E)>(RuntimeConfig::default().buffer_byte_budget);
        let sink: Arc<dyn BufferSink<(usize, E)>> = Arc::new(ArraySink { grid: grid.clone(), id });
        let buffers = BuffersVector::new(grid.clone(), capacity, sink);

        Ok(DistributedArray { grid, id, partition, buffers })
    }

    pub async fn destroy(self) -> Result<()> {
        destroy::<ArrayChunk<E>>(&self.grid, self.id).await
    }

    pub fn len(&self) -> usize {
        self.partition.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partition.is_empty()
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn begin(&self) -> ArrayCursor<E> {
        ArrayCursor::new(self.grid.clone(), self.id, self.partition.clone(), 0)
    }

    pub fn end(&self) -> ArrayCursor<E> {
        ArrayCursor::new(self.grid.clone(), self.id, self.partition.clone(), self.partition.len())
    }

    /// Positional write, dispatched to the owner locality and waited out
    /// before returning.
    pub async fn insert_at(&self, pos: usize, value: E) -> Result<()> {
        let (loc, offset) = self.partition.locate_checked(pos)?;
        let grid = self.grid.clone();
        let id = self.id;
        self.grid
            .execute_at(loc, move || {
                get_ptr::<ArrayChunk<E>>(&grid, id).expect("chunk missing on owner locality").data.write()[offset] = value;
            })
            .await;
        Ok(())
    }

    /// Same as [`Self::insert_at`] but tracked on `handle` instead of
    /// waited out inline.
    pub fn async_insert_at(&self, handle: &Handle, pos: usize, value: E) -> Result<()> {
        let (loc, offset) = self.partition.locate_checked(pos)?;
        let grid = self.grid.clone();
        let id = self.id;
        handle.track(Grid::scoped(loc, async move {
            if let Some(chunk) = get_ptr::<ArrayChunk<E>>(&grid, id) {
                chunk.data.write()[offset] = value;
            }
        }));
        Ok(())
    }

    /// Positional write routed through the per-destination aggregation
    /// buffer (§4.9) instead of an immediate dispatch.
    pub async fn buffered_insert_at(&self, pos: usize, value: E) -> Result<()> {
        let (loc, offset) = self.partition.locate_checked(pos)?;
        self.buffers.insert((offset, value), loc).await
    }

    pub fn buffered_async_insert_at(&self, handle: &Handle, pos: usize, value: E) -> Result<()> {
        let (loc, offset) = self.partition.locate_checked(pos)?;
        self.buffers.async_insert(handle, (offset, value), loc);
        Ok(())
    }

    pub async fn flush_buffers(&self) {
        self.buffers.flush_all().await;
    }

    pub fn async_flush_buffers(&self, handle: &Handle) {
        self.buffers.async_flush_all(handle);
    }

    /// Positional read, dispatched to the owner locality.
    pub async fn at(&self, pos: usize) -> Result<E> {
        let (loc, offset) = self.partition.locate_checked(pos)?;
        let grid = self.grid.clone();
        let id = self.id;
        Ok(self
            .grid
            .execute_at(loc, move || {
                get_ptr::<ArrayChunk<E>>(&grid, id).expect("chunk missing on owner locality").data.read()[offset].clone()
            })
            .await)
    }

    pub fn async_at(&self, handle: &Handle, pos: usize, out: Arc<Mutex<Option<E>>>) -> Result<()> {
        let (loc, offset) = self.partition.locate_checked(pos)?;
        let grid = self.grid.clone();
        let id = self.id;
        handle.track(Grid::scoped(loc, async move {
            if let Some(chunk) = get_ptr::<ArrayChunk<E>>(&grid, id) {
                *out.lock() = Some(chunk.data.read()[offset].clone());
            }
        }));
        Ok(())
    }

    /// Apply `f` to the element at `pos` on its owner locality and return
    /// its result.
    pub async fn apply<R, F>(&self, pos: usize, f: F) -> Result<R>
    where
        F: FnOnce(&mut E) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (loc, offset) = self.partition.locate_checked(pos)?;
        let grid = self.grid.clone();
        let id = self.id;
        Ok(self
            .grid
            .execute_at(loc, move || {
                let chunk = get_ptr::<ArrayChunk<E>>(&grid, id).expect("chunk missing on owner locality");
                let mut guard = chunk.data.write();
                f(&mut guard[offset])
            })
            .await)
    }

    pub fn async_apply<F>(&self, handle: &Handle, pos: usize, f: F) -> Result<()>
    where
        F: FnOnce(&mut E) + Send + 'static,
    {
        let (loc, offset) = self.partition.locate_checked(pos)?;
        let grid = self.grid.clone();
        let id = self.id;
        handle.track(Grid::scoped(loc, async move {
            if let Some(chunk) = get_ptr::<ArrayChunk<E>>(&grid, id) {
                f(&mut chunk.data.write()[offset]);
            }
        }));
        Ok(())
    }

    /// Like [`Self::async_apply`], but `f`'s return value lands in
    /// `out.lock()[index]` instead of being discarded — lets many calls
    /// accumulate results into one pre-sized buffer under one handle.
    pub fn async_apply_with_return_buffer<R, F>(
        &self,
        handle: &Handle,
        pos: usize,
        out: Arc<Mutex<Vec<Option<R>>>>,
        index: usize,
        f: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut E) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (loc, offset) = self.partition.locate_checked(pos)?;
        let grid = self.grid.clone();
        let id = self.id;
        handle.track(Grid::scoped(loc, async move {
            if let Some(chunk) = get_ptr::<ArrayChunk<E>>(&grid, id) {
                let result = f(&mut chunk.data.write()[offset]);
                out.lock()[index] = Some(result);
            }
        }));
        Ok(())
    }

    /// Invoke `f` on every element in `range`, one work item per touched
    /// locality, using the runtime's internal parallel-for across each
    /// locality's share of the range.
    pub async fn for_each_in_range<F>(&self, range: Range<usize>, f: F) -> Result<()>
    where
        F: Fn(&mut E) + Send + Sync + 'static,
    {
        run_for_each_in_range(self.grid.clone(), self.id, self.partition.clone(), range, Arc::new(f)).await;
        Ok(())
    }

    pub async fn for_each<F>(&self, f: F) -> Result<()>
    where
        F: Fn(&mut E) + Send + Sync + 'static,
    {
        self.for_each_in_range(0..self.partition.len(), f).await
    }

    /// Tracked analog of [`Self::for_each_in_range`] — dispatches the
    /// whole multi-locality sweep as one unit of work against `handle`
    /// rather than waiting on it inline.
    pub fn async_for_each_in_range<F>(&self, handle: &Handle, range: Range<usize>, f: F)
    where
        F: Fn(&mut E) + Send + Sync + 'static,
    {
        let grid = self.grid.clone();
        let id = self.id;
        let partition = self.partition.clone();
        let f = Arc::new(f);
        handle.track(async move {
            run_for_each_in_range(grid, id, partition, range, f).await;
        });
    }

    pub fn async_for_each<F>(&self, handle: &Handle, f: F)
    where
        F: Fn(&mut E) + Send + Sync + 'static,
    {
        self.async_for_each_in_range(handle, 0..self.partition.len(), f);
    }

    /// Issue one bulk fetch per locality spanned by `[start, start+count)`,
    /// writing results into the corresponding slots of `out` (pre-sized to
    /// `count`) — `asyncGetElements` (§4.7).
    pub fn async_get_elements(&self, handle: &Handle, out: Arc<Mutex<Vec<E>>>, start: usize, count: usize) -> Result<()>
    where
        E: Clone,
    {
        let end = start + count;
        if end > self.partition.len() {
            return Err(gridrt_core::error::GridError::OutOfRange { pos: end, len: self.partition.len() });
        }
        for (loc, chunk_count) in self.partition.chunks() {
            let chunk_start = self.partition.chunk_start(loc);
            let chunk_end = chunk_start + chunk_count;
            let lo = start.max(chunk_start);
            let hi = end.min(chunk_end);
            if lo >= hi {
                continue;
            }
            let local_lo = lo - chunk_start;
            let n = hi - lo;
            let out_offset = lo - start;
            let grid = self.grid.clone();
            let id = self.id;
            let out = out.clone();
            handle.track(Grid::scoped(loc, async move {
                if let Some(chunk) = get_ptr::<ArrayChunk<E>>(&grid, id) {
                    let data = chunk.data.read();
                    let mut out_guard = out.lock();
                    for i in 0..n {
                        out_guard[out_offset + i] = data[local_lo + i].clone();
                    }
                }
            }));
        }
        Ok(())
    }

    /// Two-phase distributed exclusive prefix scan (§4.7). Completes when
    /// every recursively-spawned locality step has finished.
    pub async fn exclusive_scan(&self) -> Result<()>
    where
        E: Copy + Add<Output = E>,
    {
        let grid = self.grid.clone();
        let grid_arg = grid.clone();
        let id = self.id;
        grid.execute_on_all(
            move |_: ()| {
                if let Some(chunk) = get_ptr::<ArrayChunk<E>>(&grid_arg, id) {
                    let mut data = chunk.data.write();
                    local_inclusive_scan(&mut data);
                }
            },
            (),
        )
        .await;

        let handle = Handle::new();
        spawn_scan_step(
            self.grid.clone(),
            self.id,
            Locality::new(0),
            self.partition.num_localities(),
            E::default(),
            handle.clone(),
        );
        handle.wait().await
    }

    /// Sum of every element across every locality — a sequential
    /// per-locality reduce, not a single broadcast.
    pub async fn accumulate(&self) -> E
    where
        E: Copy + Add<Output = E>,
    {
        let mut total = E::default();
        for loc in self.grid.all_localities() {
            let grid = self.grid.clone();
            let id = self.id;
            let partial = self
                .grid
                .execute_at(loc, move || {
                    get_ptr::<ArrayChunk<E>>(&grid, id)
                        .map(|chunk| {
                            let data = chunk.data.read();
                            let mut acc = E::default();
                            for x in data.iter() {
                                acc = acc + *x;
                            }
                            acc
                        })
                        .unwrap_or_default()
                })
                .await;
            total = total + partial;
        }
        total
    }

    pub async fn min_element(&self) -> Option<E>
    where
        E: Ord,
    {
        self.reduce_per_locality(|data| data.iter().min().cloned())
            .await
            .into_iter()
            .flatten()
            .min()
    }

    pub async fn max_element(&self) -> Option<E>
    where
        E: Ord,
    {
        self.reduce_per_locality(|data| data.iter().max().cloned())
            .await
            .into_iter()
            .flatten()
            .max()
    }

    async fn reduce_per_locality<R, F>(&self, f: F) -> Vec<Option<R>>
    where
        F: Fn(&[E]) -> Option<R> + Send + Sync + 'static,
        R: Send + 'static,
    {
        let f = Arc::new(f);
        let mut results = Vec::with_capacity(self.partition.num_localities() as usize);
        for loc in self.grid.all_localities() {
            let grid = self.grid.clone();
            let id = self.id;
            let f = f.clone();
            let r = self
                .grid
                .execute_at(loc, move || get_ptr::<ArrayChunk<E>>(&grid, id).and_then(|chunk| f(&chunk.data.read())))
                .await;
            results.push(r);
        }
        results
    }
}
