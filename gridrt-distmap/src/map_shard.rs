//! The per-locality slice of a distributed map (§4.8): one
//! [`LocalHashMap`] per locality, owning whichever keys
//! [`crate::partitioning::locality_for`] routes there.

use std::hash::Hash;

use gridrt_collections::policy::{InsertPolicy, Overwriter};
use gridrt_collections::LocalHashMap;
use gridrt_core::distributed_object::DistributedObject;
use gridrt_core::objectid::ObjectId;

#[derive(Clone)]
pub struct MapShardArgs<P = Overwriter> {
    pub num_buckets: usize,
    pub bucket_capacity: usize,
    pub policy: P,
}

pub struct MapShard<K, V, P = Overwriter>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
    P: InsertPolicy<V>,
{
    #[allow(dead_code)]
    pub(crate) id: ObjectId<MapShard<K, V, P>>,
    pub(crate) map: LocalHashMap<K, V, P>,
}

impl<K, V, P> DistributedObject for MapShard<K, V, P>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Default + Clone + Send + Sync + 'static,
    P: InsertPolicy<V> + Clone + Send + Sync + 'static,
{
    type Args = MapShardArgs<P>;

    fn construct(id: ObjectId<Self>, args: &MapShardArgs<P>) -> Self {
        MapShard {
            id,
            map: LocalHashMap::with_policy(args.num_buckets, args.bucket_capacity, args.policy.clone()),
        }
    }
}
