//! Random-access cursor over a distributed array (§4.7 "Iterators").
//!
//! The source material's iterator is `(locality, offset, oid, cached chunk
//! pointer, n)` and blocks synchronously on `rt::executeAt` to dereference.
//! `gridrt`'s transport is async-only, so the natural translation keeps the
//! same logical position but exposes dereference as an async method rather
//! than implementing `std::iter::Iterator` (which cannot await). `+=`/`-=`
//! only ever touch the plain `pos` field — the locality and local offset
//! are re-derived from [`Partition::locate`] on demand, never stored stale.

use std::sync::Arc;

use gridrt_core::distributed_object::get_ptr;
use gridrt_core::objectid::ObjectId;
use gridrt_core::runtime::Grid;

use crate::chunk::ArrayChunk;
use crate::partition::Partition;

pub struct ArrayCursor<E: Send + Sync + 'static> {
    grid: Arc<Grid>,
    id: ObjectId<ArrayChunk<E>>,
    partition: Partition,
    pos: usize,
}

impl<E: Send + Sync + 'static> ArrayCursor<E> {
    pub(crate) fn new(grid: Arc<Grid>, id: ObjectId<ArrayChunk<E>>, partition: Partition, pos: usize) -> Self {
        ArrayCursor { grid, id, partition, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_end(&self) -> bool {
        self.pos >= self.partition.len()
    }

    /// `+=`/`-=` in the source material — advances by `delta` (negative
    /// moves backward). Landing exactly on `len()` is the end sentinel.
    pub fn advance(&mut self, delta: isize) {
        let next = self.pos as isize + delta;
        assert!(next >= 0, "cursor advanced before the start of the array");
        self.pos = next as usize;
    }

    pub async fn get(&self) -> Option<E>
    where
        E: Default + Clone,
    {
        if self.is_end() {
            return None;
        }
        let (loc, offset) = self.partition.locate(self.pos);
        let grid = self.grid.clone();
        let id = self.id;
        Some(
            self.grid
                .execute_at(loc, move || {
                    get_ptr::<ArrayChunk<E>>(&grid, id)
                        .expect("chunk missing on owner locality")
                        .data
                        .read()[offset]
                        .clone()
                })
                .await,
        )
    }

    pub async fn set(&self, value: E)
    where
        E: Default + Clone,
    {
        if self.is_end() {
            return;
        }
        let (loc, offset) = self.partition.locate(self.pos);
        let grid = self.grid.clone();
        let id = self.id;
        self.grid
            .execute_at(loc, move || {
                get_ptr::<ArrayChunk<E>>(&grid, id)
                    .expect("chunk missing on owner locality")
                    .data
                    .write()[offset] = value;
            })
            .await;
    }
}
