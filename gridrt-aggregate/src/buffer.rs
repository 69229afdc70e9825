//! A single per-destination aggregation buffer (§4.9 "Buffer").

use std::sync::Arc;

use parking_lot::Mutex;

use gridrt_core::error::Result;
use gridrt_core::handle::Handle;
use gridrt_core::locality::Locality;
use gridrt_core::runtime::Grid;

use crate::sink::BufferSink;

/// Staging array for entries bound for one locality. `insert` appends
/// under the buffer's own lock and, once the buffer is full, hands the
/// accumulated batch off to [`Buffer::dispatch_flush`] — which runs
/// *outside* the lock, since the batch was already swapped out for an
/// empty one while the lock was held. That swap is what the source
/// material's "flush while still holding the lock" achieves in a
/// synchronous runtime: here the equivalent safety property is that no
/// two flushes ever see an overlapping set of entries, not that the
/// dispatch itself runs under the mutex (which would mean holding a
/// `parking_lot` guard across an `.await`).
pub struct Buffer<E: Send + 'static> {
    grid: Arc<Grid>,
    target: Locality,
    capacity: usize,
    sink: Arc<dyn BufferSink<E>>,
    entries: Mutex<Vec<E>>,
}

impl<E: Send + 'static> Buffer<E> {
    pub fn new(grid: Arc<Grid>, target: Locality, capacity: usize, sink: Arc<dyn BufferSink<E>>) -> Self {
        Buffer {
            grid,
            target,
            capacity: capacity.max(1),
            sink,
            entries: Mutex::new(Vec::with_capacity(capacity.max(1))),
        }
    }

    pub fn target(&self) -> Locality {
        self.target
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `entry`. If the buffer is now full, flushes it to `target`
    /// and waits for the flush's side effects to land before returning —
    /// this is the blocking-call analogue used by [`crate::BuffersVector::insert`].
    pub async fn insert(&self, entry: E) -> Result<()> {
        if let Some(batch) = self.push_and_maybe_drain(entry) {
            self.dispatch_flush(batch).await;
        }
        Ok(())
    }

    /// Append `entry`, tracking any triggered flush against `handle`
    /// instead of waiting for it inline.
    pub fn async_insert(self: &Arc<Self>, handle: &Handle, entry: E) {
        if let Some(batch) = self.push_and_maybe_drain(entry) {
            let this = self.clone();
            let loc = Grid::this_locality();
            handle.track(Grid::scoped(loc, async move {
                this.dispatch_flush(batch).await;
            }));
        }
    }

    /// Flush whatever is currently buffered, even if not yet full.
    pub async fn flush(&self) {
        let batch = std::mem::take(&mut *self.entries.lock());
        if !batch.is_empty() {
            self.dispatch_flush(batch).await;
        }
    }

    pub fn async_flush(self: &Arc<Self>, handle: &Handle) {
        let batch = std::mem::take(&mut *self.entries.lock());
        if batch.is_empty() {
            return;
        }
        let this = self.clone();
        let loc = Grid::this_locality();
        handle.track(Grid::scoped(loc, async move {
            this.dispatch_flush(batch).await;
        }));
    }

    fn push_and_maybe_drain(&self, entry: E) -> Option<Vec<E>> {
        let mut guard = self.entries.lock();
        guard.push(entry);
        if guard.len() >= self.capacity {
            Some(std::mem::take(&mut *guard))
        } else {
            None
        }
    }

    async fn dispatch_flush(&self, batch: Vec<E>) {
        let sink = self.sink.clone();
        self.grid
            .execute_at(self.target, move || sink.bulk_insert(batch))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        received: AtomicUsize,
    }

    impl BufferSink<u64> for CountingSink {
        fn bulk_insert(&self, entries: Vec<u64>) {
            self.received.fetch_add(entries.len(), Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn insert_flushes_exactly_when_full() {
        let grid = Grid::new(2);
        let sink = Arc::new(CountingSink { received: AtomicUsize::new(0) });
        let buffer = Buffer::new(grid, Locality::new(1), 4, sink.clone());

        for i in 0..3u64 {
            buffer.insert(i).await.unwrap();
        }
        assert_eq!(sink.received.load(Ordering::SeqCst), 0);
        assert_eq!(buffer.len(), 3);

        buffer.insert(99).await.unwrap();
        assert_eq!(sink.received.load(Ordering::SeqCst), 4);
        assert_eq!(buffer.len(), 0);
    }

    #[tokio::test]
    async fn flush_drains_a_partially_filled_buffer() {
        let grid = Grid::new(2);
        let sink = Arc::new(CountingSink { received: AtomicUsize::new(0) });
        let buffer = Buffer::new(grid, Locality::new(0), 8, sink.clone());

        buffer.insert(1).await.unwrap();
        buffer.insert(2).await.unwrap();
        buffer.flush().await;

        assert_eq!(sink.received.load(Ordering::SeqCst), 2);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn flush_on_an_empty_buffer_dispatches_nothing() {
        let grid = Grid::new(1);
        let sink = Arc::new(CountingSink { received: AtomicUsize::new(0) });
        let buffer: Buffer<u64> = Buffer::new(grid, Locality::new(0), 4, sink.clone());
        buffer.flush().await;
        assert_eq!(sink.received.load(Ordering::SeqCst), 0);
    }
}
