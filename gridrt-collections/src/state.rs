//! Per-entry FSM (§4.5 "Per-entry FSM").
//!
//! Legal transitions: `Empty -> PendingInsert` (CAS) `-> Used` (store);
//! `Used -> PendingUpdate` (CAS) `-> Used` (store); `Used -> PendingInsert`
//! (CAS, during erase) `-> Empty` (store, final step) or back `-> Used`
//! (store, erase rollback). A reader that observes a `Pending*` state must
//! yield and re-read — it must never interpret key/value while pending.

use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Empty = 0,
    Used = 1,
    PendingInsert = 2,
    PendingUpdate = 3,
}

impl EntryState {
    fn from_u8(v: u8) -> EntryState {
        match v {
            0 => EntryState::Empty,
            1 => EntryState::Used,
            2 => EntryState::PendingInsert,
            3 => EntryState::PendingUpdate,
            _ => unreachable!("invalid entry state byte"),
        }
    }
}

/// An atomic cell holding one [`EntryState`], with the CAS helpers the
/// insert/erase/lookup algorithms drive.
pub struct AtomicEntryState(AtomicU8);

impl AtomicEntryState {
    pub fn new(initial: EntryState) -> Self {
        AtomicEntryState(AtomicU8::new(initial as u8))
    }

    pub fn load(&self) -> EntryState {
        EntryState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Attempt `from -> to`. Returns whether the CAS won.
    pub fn try_transition(&self, from: EntryState, to: EntryState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Unconditional store, used for the non-competing second half of a
    /// transition (`PendingInsert -> Used`, `PendingInsert -> Empty`, …) —
    /// the entry is already owned by the caller at this point.
    pub fn store(&self, to: EntryState) {
        self.0.store(to as u8, Ordering::Release);
    }
}

impl Default for AtomicEntryState {
    fn default() -> Self {
        AtomicEntryState::new(EntryState::Empty)
    }
}
