//! The flush target every aggregation buffer replays into (§4.9
//! "`bufferEntryInsert` is invoked inside a work item that runs with
//! ordinary concurrency").

/// A container that can absorb a batch of buffered entries on whichever
/// locality it's called from. Implemented by the distributed containers
/// that own a [`crate::BuffersVector`] — the distributed array and the
/// distributed map/set overlay.
pub trait BufferSink<E>: Send + Sync + 'static {
    /// Insert every entry in `entries` using the local container's
    /// ordinary concurrent insertion path — this runs inside a work item,
    /// concurrently with other local traffic.
    fn bulk_insert(&self, entries: Vec<E>);
}
