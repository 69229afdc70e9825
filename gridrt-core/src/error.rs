//! Crate-wide error taxonomy.
//!
//! The split mirrors §7 of the design: programming errors and resource
//! exhaustion are `Fatal` (the caller should stop, but the library itself
//! never aborts the process), out-of-range positional access is reported as
//! a normal `Err`, and transient CAS contention never reaches this type at
//! all — it is resolved by retry loops inside `gridrt-collections`.

use thiserror::Error;

use crate::locality::Locality;

/// A programming error: something that should never happen in a correct
/// program. Recovering from these locally is not attempted — the caller is
/// expected to treat them as fatal and stop, same as a failed assertion.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalKind {
    #[error("object id counter for this type saturated its 48-bit local-slot space")]
    CounterSaturated,

    #[error("getPtr handle for object on locality {owner} used from locality {used_on}")]
    CrossLocalityHandle { owner: Locality, used_on: Locality },

    #[error("waitForCompletion depends on unreachable locality {0}")]
    UnreachableLocality(Locality),

    #[error("object id {0:#x} destroyed twice")]
    DoubleDestroy(u64),

    #[error("aggregation buffer insert called with {given} entries, capacity is {capacity}")]
    BufferCapacityExceeded { given: usize, capacity: usize },

    #[error("overflow bucket allocation failed")]
    OverflowAllocationFailed,

    #[error("broadcast of a collective work item to locality {0} failed")]
    CollectiveDispatchFailed(Locality),
}

/// The crate-wide result type. Benign absence (lookup miss, erase of an
/// absent key) is represented by `bool`/`Option` return values, not by this
/// enum — only the two categories below ever produce an `Err`.
#[derive(Debug, Error)]
pub enum GridError {
    /// §7 "Programming error (fatal)" and "Resource exhaustion".
    #[error("fatal: {0}")]
    Fatal(#[from] FatalKind),

    /// §7 "Benign absence" for positional array access: `at`/`asyncAt` past
    /// the end of the sequence fails the dispatch synchronously.
    #[error("position {pos} out of range for sequence of length {len}")]
    OutOfRange { pos: usize, len: usize },

    /// §0.B: a loaded or hand-built `RuntimeConfig` failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GridError>;
