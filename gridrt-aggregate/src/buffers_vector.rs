//! One buffer per locality, routing each inserted entry to the buffer
//! for its destination (§4.9 "BuffersVector").

use std::sync::Arc;

use gridrt_core::error::Result;
use gridrt_core::handle::Handle;
use gridrt_core::locality::Locality;
use gridrt_core::runtime::Grid;

use crate::buffer::Buffer;
use crate::sink::BufferSink;

/// Default buffer capacity derived from a byte budget, mirroring the
/// source material's `kBufferNumBytes = 3072` constant: `max(1, budget /
/// size_of::<E>())`.
pub fn capacity_from_byte_budget<E>(buffer_byte_budget: usize) -> usize {
    (buffer_byte_budget / std::mem::size_of::<E>().max(1)).max(1)
}

/// `num_localities` independent [`Buffer`]s, one per destination. A
/// caller inserting many entries bound for scattered localities gets
/// them coalesced per-destination automatically, rather than one flush
/// per entry.
pub struct BuffersVector<E: Send + 'static> {
    buffers: Vec<Arc<Buffer<E>>>,
}

impl<E: Send + 'static> BuffersVector<E> {
    pub fn new(grid: Arc<Grid>, capacity: usize, sink: Arc<dyn BufferSink<E>>) -> Self {
        let buffers = grid
            .all_localities()
            .map(|loc| Arc::new(Buffer::new(grid.clone(), loc, capacity, sink.clone())))
            .collect();
        BuffersVector { buffers }
    }

    pub fn buffer_for(&self, target: Locality) -> &Arc<Buffer<E>> {
        &self.buffers[usize::from(target)]
    }

    /// Append `entry` to the buffer for `target`, blocking until any
    /// flush it triggers has landed.
    pub async fn insert(&self, entry: E, target: Locality) -> Result<()> {
        self.buffer_for(target).insert(entry).await
    }

    /// Same as [`BuffersVector::insert`] but tracks a triggered flush
    /// against `handle` instead of waiting inline.
    pub fn async_insert(&self, handle: &Handle, entry: E, target: Locality) {
        self.buffer_for(target).async_insert(handle, entry);
    }

    /// Flush every buffer, including ones not yet full, waiting for all
    /// of them to land. Call only after every buffered insert that should
    /// be visible has already completed — `wait()`-then-`flush_all()`,
    /// never the reverse (§4.9 ordering contract).
    pub async fn flush_all(&self) {
        let joins: Vec<_> = self
            .buffers
            .iter()
            .map(|b| {
                let b = b.clone();
                tokio::spawn(async move { b.flush().await })
            })
            .collect();
        for join in joins {
            join.await.expect("buffer flush work item panicked");
        }
    }

    pub fn async_flush_all(&self, handle: &Handle) {
        for buffer in &self.buffers {
            buffer.async_flush(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        seen: StdMutex<Vec<u64>>,
        calls: AtomicUsize,
    }

    impl BufferSink<u64> for RecordingSink {
        fn bulk_insert(&self, entries: Vec<u64>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().extend(entries);
        }
    }

    #[test]
    fn capacity_from_byte_budget_matches_the_documented_constant() {
        assert_eq!(capacity_from_byte_budget::<u64>(3072), 384);
        assert_eq!(capacity_from_byte_budget::<u64>(0), 1);
    }

    #[tokio::test]
    async fn insert_routes_to_the_buffer_for_its_target_locality() {
        let grid = Grid::new(3);
        let sink = Arc::new(RecordingSink {
            seen: StdMutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        });
        let vec = BuffersVector::new(grid, 2, sink.clone());

        vec.insert(1, Locality::new(0)).await.unwrap();
        vec.insert(2, Locality::new(1)).await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);

        vec.insert(3, Locality::new(0)).await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*sink.seen.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn flush_all_drains_every_buffer_regardless_of_fill_level() {
        let grid = Grid::new(2);
        let sink = Arc::new(RecordingSink {
            seen: StdMutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        });
        let vec = BuffersVector::new(grid, 16, sink.clone());

        vec.insert(10, Locality::new(0)).await.unwrap();
        vec.insert(20, Locality::new(1)).await.unwrap();
        vec.flush_all().await;

        let mut seen = sink.seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![10, 20]);
    }

    #[tokio::test]
    async fn async_flush_all_is_observable_after_handle_wait() {
        let grid = Grid::new(2);
        let sink = Arc::new(RecordingSink {
            seen: StdMutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        });
        let vec = BuffersVector::new(grid, 16, sink.clone());
        let handle = Handle::new();

        vec.async_insert(&handle, 7, Locality::new(0));
        handle.wait().await.unwrap();
        vec.async_flush_all(&handle);
        handle.wait().await.unwrap();

        assert_eq!(*sink.seen.lock().unwrap(), vec![7]);
    }
}
