//! Key-to-locality routing (§4.8 "Partitioning: `locality = hash(k) mod
//! N`"). Folds the key's `std::hash::Hash` digest through `blake3` rather
//! than taking `DefaultHasher`'s output directly, so a key type with a
//! weak or low-entropy `Hash` impl doesn't skew which locality owns it.

use std::hash::{Hash, Hasher};

use gridrt_core::locality::Locality;

pub fn locality_for<K: Hash + ?Sized>(key: &K, num_localities: u16) -> Locality {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    let seed = hasher.finish().to_le_bytes();
    let digest = blake3::hash(&seed);
    let folded = u64::from_le_bytes(digest.as_bytes()[0..8].try_into().expect("8 bytes"));
    Locality::new((folded % num_localities as u64) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locality_for_is_deterministic() {
        assert_eq!(locality_for(&42u64, 8), locality_for(&42u64, 8));
        assert_eq!(locality_for(&"hello", 5), locality_for(&"hello", 5));
    }

    #[test]
    fn locality_for_stays_in_range() {
        for k in 0..2000u64 {
            assert!(locality_for(&k, 6).id() < 6);
        }
    }

    #[test]
    fn distribution_touches_every_locality_over_many_keys() {
        let mut seen = [false; 4];
        for k in 0..5000u64 {
            seen[locality_for(&k, 4).id() as usize] = true;
        }
        assert!(seen.iter().all(|&hit| hit), "every locality should own at least one key out of 5000");
    }
}
