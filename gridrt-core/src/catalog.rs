//! Per-type object catalog (§4.3 "Catalog").
//!
//! Real SHAD runs one OS process per locality, so `Catalog<T>::Instance()`
//! being a process-local static already makes it a per-(container-type,
//! locality) singleton. `gridrt` simulates every locality inside a single
//! process, so the analogous unit is per-(container-type, [`Grid`](crate::runtime::Grid)) —
//! see [`crate::runtime::Grid::catalog_for`].
//!
//! SHAD's `register_` is indexed `[ownerLocality][localSlot]` because each
//! process only ever sees object ids it minted itself *or* ids broadcast to
//! it by another locality's `Create` call — the owner dimension keeps those
//! from colliding when several localities mint ids for the same type
//! independently. `gridrt` instead hands every `(type, Grid)` pair a single
//! shared [`ObjectIdCounter`](crate::objectid::ObjectIdCounter), so local
//! slots are globally unique on their own; the catalog here collapses the
//! owner dimension and indexes directly on `(at_locality, local_slot)`. This
//! is recorded as an open-question resolution in the design ledger, not a
//! silent deviation — it preserves every invariant §4.3 and §7 require
//! (stable identity, owner recoverable from the id's high bits without a
//! table, no reuse while live).

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{FatalKind, GridError, Result};
use crate::locality::Locality;
use crate::objectid::{ObjectId, ObjectIdCounter};

/// One coarse lock per container-type per locality (§5 "Shared Resources").
/// Lookups take the read side; insert, grow, and erase take the write side.
pub struct Catalog<T> {
    slots: Vec<RwLock<Vec<Option<Arc<T>>>>>,
    free_slots: Mutex<VecDeque<u64>>,
    counter: ObjectIdCounter<T>,
}

impl<T> Catalog<T> {
    pub fn new(num_localities: u16) -> Self {
        let slots = (0..num_localities).map(|_| RwLock::new(Vec::new())).collect();
        Catalog {
            slots,
            free_slots: Mutex::new(VecDeque::new()),
            counter: ObjectIdCounter::new(),
        }
    }

    /// Allocate the next id, preferring a recycled slot over growing the
    /// counter (mirrors SHAD's `GetNextID`, which drains `oidCache_` first).
    pub fn next_id(&self, minted_at: Locality) -> Result<ObjectId<T>> {
        if let Some(slot) = self.free_slots.lock().pop_front() {
            return Ok(ObjectId::new(minted_at, slot));
        }
        self.counter
            .post_increment(minted_at)
            .map_err(GridError::from)
    }

    /// Store the local instance living at `at` under `id`'s local slot.
    /// Grows the dense array under the write lock, same as SHAD resizing
    /// `register_[locality]` to `localID + 1` on demand.
    pub fn insert(&self, at: Locality, id: ObjectId<T>, value: Arc<T>) {
        let mut slots = self.slots[usize::from(at)].write();
        let idx = id.local_slot() as usize;
        if slots.len() <= idx {
            slots.resize(idx + 1, None);
        }
        slots[idx] = Some(value);
    }

    /// Unlocked-feeling, read-locked indexed fetch — this is `GetPtr`. A
    /// miss is always benign: the object may not be constructed at `at`
    /// yet, or may already be destroyed.
    pub fn get(&self, at: Locality, id: ObjectId<T>) -> Option<Arc<T>> {
        let idx = id.local_slot() as usize;
        self.slots[usize::from(at)].read().get(idx).cloned().flatten()
    }

    /// Clear the slot at `at`. Returns an error if it was already empty,
    /// which is how double-destroy is detected at the call site.
    pub fn erase(&self, at: Locality, id: ObjectId<T>) -> Result<()> {
        let idx = id.local_slot() as usize;
        let mut slots = self.slots[usize::from(at)].write();
        match slots.get_mut(idx) {
            Some(cell) if cell.is_some() => {
                *cell = None;
                Ok(())
            }
            _ => Err(GridError::Fatal(FatalKind::DoubleDestroy(id.raw()))),
        }
    }

    /// Return a destroyed id's local slot to the free list so `next_id` can
    /// reuse it. Called once destruction has completed on every locality.
    pub fn recycle(&self, id: ObjectId<T>) {
        self.free_slots.lock().push_back(id.local_slot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let catalog: Catalog<u32> = Catalog::new(4);
        let loc = Locality::new(2);
        let id = catalog.next_id(loc).unwrap();
        catalog.insert(loc, id, Arc::new(7));
        assert_eq!(*catalog.get(loc, id).unwrap(), 7);
    }

    #[test]
    fn get_on_unpopulated_locality_is_benign_miss() {
        let catalog: Catalog<u32> = Catalog::new(4);
        let loc = Locality::new(0);
        let id = catalog.next_id(loc).unwrap();
        catalog.insert(loc, id, Arc::new(1));
        assert!(catalog.get(Locality::new(1), id).is_none());
    }

    #[test]
    fn double_erase_is_fatal() {
        let catalog: Catalog<u32> = Catalog::new(2);
        let loc = Locality::new(0);
        let id = catalog.next_id(loc).unwrap();
        catalog.insert(loc, id, Arc::new(5));
        catalog.erase(loc, id).unwrap();
        let err = catalog.erase(loc, id).unwrap_err();
        assert!(matches!(err, GridError::Fatal(FatalKind::DoubleDestroy(_))));
    }

    #[test]
    fn recycled_slot_is_reused_before_growing_counter() {
        let catalog: Catalog<u32> = Catalog::new(1);
        let loc = Locality::new(0);
        let first = catalog.next_id(loc).unwrap();
        catalog.insert(loc, first, Arc::new(1));
        catalog.erase(loc, first).unwrap();
        catalog.recycle(first);
        let second = catalog.next_id(loc).unwrap();
        assert_eq!(second.local_slot(), first.local_slot());
    }
}
