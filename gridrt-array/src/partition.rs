//! Distribution schedule for the array (§3 "Distribution schedule for the
//! array").
//!
//! Given size `n` and locality count `N`, `q = n/N`, `r = n mod N`, pivot
//! `p = N` if `r == 0` else `N − r`. Localities `[0, p)` hold `q` elements
//! each; `[p, N)` hold `q+1` each. This is a pure function of `(n, N)` —
//! [`Partition`] caches a dense `starts` table only to make the inverse
//! lookup (`locate`) a binary search instead of a re-derivation on every
//! call; the per-locality chunk size itself is still computed, never
//! looked up.

use gridrt_core::error::GridError;
use gridrt_core::locality::Locality;

#[derive(Debug, Clone)]
pub struct Partition {
    n: usize,
    num_localities: u16,
    q: usize,
    pivot: u16,
    starts: Vec<usize>,
}

impl Partition {
    pub fn new(n: usize, num_localities: u16) -> Self {
        assert!(num_localities > 0, "a partition needs at least one locality");
        let nl = num_localities as usize;
        let q = n / nl;
        let r = n % nl;
        let pivot = if r == 0 { num_localities } else { (nl - r) as u16 };

        let mut starts = Vec::with_capacity(nl);
        let mut next = 0usize;
        for i in 0..num_localities {
            starts.push(next);
            next += if i < pivot { q } else { q + 1 };
        }

        Partition { n, num_localities, q, pivot, starts }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn num_localities(&self) -> u16 {
        self.num_localities
    }

    /// Number of elements `loc` holds — `q` below the pivot, `q+1` at or
    /// past it.
    pub fn chunk_size(&self, loc: Locality) -> usize {
        if loc.id() < self.pivot { self.q } else { self.q + 1 }
    }

    /// Global position of the first element on `loc`.
    pub fn chunk_start(&self, loc: Locality) -> usize {
        self.starts[usize::from(loc)]
    }

    /// The `(locality, element-count)` sequence, for range-based parallel
    /// algorithms that need to dispatch one work item per touched locality
    /// (§6 "iterator partitioning hooks").
    pub fn chunks(&self) -> impl Iterator<Item = (Locality, usize)> + '_ {
        (0..self.num_localities).map(move |i| {
            let loc = Locality::new(i);
            (loc, self.chunk_size(loc))
        })
    }

    /// Resolve a global position to `(locality, local offset)`, assuming
    /// `pos < len()`. Uses the cached `starts` table rather than
    /// re-deriving `q`/`pivot` arithmetic, per the dense-range-table note
    /// in §3.
    pub fn locate(&self, pos: usize) -> (Locality, usize) {
        let idx = self.starts.partition_point(|&s| s <= pos) - 1;
        (Locality::new(idx as u16), pos - self.starts[idx])
    }

    pub fn locate_checked(&self, pos: usize) -> Result<(Locality, usize), GridError> {
        if pos >= self.n {
            return Err(GridError::OutOfRange { pos, len: self.n });
        }
        Ok(self.locate(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_two_localities_evenly_divides() {
        let p = Partition::new(10, 2);
        assert_eq!(p.chunk_size(Locality::new(0)), 5);
        assert_eq!(p.chunk_size(Locality::new(1)), 5);
        assert_eq!(p.locate(0), (Locality::new(0), 0));
        assert_eq!(p.locate(9), (Locality::new(1), 4));
    }

    #[test]
    fn scenario_four_localities_with_remainder() {
        // n=10, N=4: q=2, r=2, pivot = 4-2 = 2.
        let p = Partition::new(10, 4);
        assert_eq!(p.chunk_size(Locality::new(0)), 2);
        assert_eq!(p.chunk_size(Locality::new(1)), 2);
        assert_eq!(p.chunk_size(Locality::new(2)), 3);
        assert_eq!(p.chunk_size(Locality::new(3)), 3);
        assert_eq!(p.locate(5), (Locality::new(2), 1));
    }

    #[test]
    fn partitioning_fidelity_sums_to_n() {
        for n in [0usize, 1, 7, 10, 100, 257] {
            for nl in [1u16, 2, 3, 4, 9] {
                let p = Partition::new(n, nl);
                let total: usize = p.chunks().map(|(_, c)| c).sum();
                assert_eq!(total, n, "n={n} nl={nl}");

                for pos in 0..n {
                    let (loc, offset) = p.locate(pos);
                    assert!(offset < p.chunk_size(loc));
                    assert_eq!(p.chunk_start(loc) + offset, pos);
                }
            }
        }
    }

    #[test]
    fn begin_lives_on_the_pivot_when_size_is_smaller_than_locality_count() {
        // n=2, N=5: q=0, r=2, pivot=3. Localities 0,1,2 hold 0; 3,4 hold 1.
        let p = Partition::new(2, 5);
        assert_eq!(p.locate(0), (Locality::new(3), 0));
        assert_eq!(p.locate(1), (Locality::new(4), 0));
    }
}
