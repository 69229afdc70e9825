//! The distributed exclusive prefix scan (§4.7 "Distributed prefix scan").
//!
//! Phase 1 computes an inclusive local prefix sum on every locality,
//! independently and in parallel. Phase 2 is a chain of work items, one
//! per locality, each tracked on the same [`Handle`] — not a call stack:
//! locality `i` reads its pre-delta local total, folds in the delta
//! inherited from locality `i−1`, rewrites its chunk in place as the
//! locality's exclusive segment, and tail-dispatches the next locality
//! with the new running total. The scan is complete once that handle is
//! waited out.

use std::ops::Add;
use std::sync::Arc;

use gridrt_core::distributed_object::get_ptr;
use gridrt_core::handle::Handle;
use gridrt_core::locality::Locality;
use gridrt_core::objectid::ObjectId;
use gridrt_core::runtime::Grid;

use crate::chunk::ArrayChunk;

pub(crate) fn local_inclusive_scan<E>(data: &mut [E])
where
    E: Copy + Default + Add<Output = E>,
{
    let mut acc = E::default();
    for x in data.iter_mut() {
        acc = acc + *x;
        *x = acc;
    }
}

/// Rewrites `data` (currently holding local-only inclusive sums, or for
/// locality 0 the final global values already) into the globally-correct
/// exclusive segment given the inbound `delta` — the total of every
/// element on every preceding locality. Returns the delta to hand to the
/// next locality.
fn apply_delta_and_shift<E>(data: &mut [E], delta: E) -> E
where
    E: Copy + Default + Add<Output = E>,
{
    if data.is_empty() {
        return delta;
    }
    let local_total = *data.last().expect("checked non-empty above");
    let next_delta = local_total + delta;
    for i in (1..data.len()).rev() {
        data[i] = data[i - 1] + delta;
    }
    data[0] = delta;
    next_delta
}

pub(crate) fn spawn_scan_step<E>(
    grid: Arc<Grid>,
    id: ObjectId<ArrayChunk<E>>,
    loc: Locality,
    num_localities: u16,
    delta: E,
    handle: Handle,
) where
    E: Copy + Default + Add<Output = E> + Send + Sync + 'static,
{
    let handle_for_track = handle.clone();
    let fut = Grid::scoped(loc, async move {
        let next_delta = {
            let chunk = get_ptr::<ArrayChunk<E>>(&grid, id).expect("chunk missing on owner locality");
            let mut data = chunk.data.write();
            apply_delta_and_shift(&mut data, delta)
        };
        let next_loc_id = loc.id() + 1;
        if next_loc_id < num_localities {
            spawn_scan_step(grid, id, Locality::new(next_loc_id), num_localities, next_delta, handle);
        }
    });
    handle_for_track.track(fut);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_inclusive_scan_matches_running_sum() {
        let mut data = vec![1u64, 2, 3, 4];
        local_inclusive_scan(&mut data);
        assert_eq!(data, vec![1, 3, 6, 10]);
    }

    #[test]
    fn delta_shift_converts_inclusive_to_exclusive_with_no_incoming_delta() {
        let mut data = vec![1u64, 3, 6, 10];
        let next = apply_delta_and_shift(&mut data, 0);
        assert_eq!(data, vec![0, 1, 3, 6]);
        assert_eq!(next, 10);
    }

    #[test]
    fn delta_shift_folds_in_an_incoming_delta() {
        let mut data = vec![5u64, 9, 12];
        let next = apply_delta_and_shift(&mut data, 10);
        assert_eq!(data, vec![10, 15, 19]);
        assert_eq!(next, 22);
    }
}
