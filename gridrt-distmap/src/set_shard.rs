//! The per-locality slice of a distributed set (§4.8), analogous to
//! [`crate::map_shard::MapShard`] with element-only semantics.

use std::hash::Hash;

use gridrt_collections::LocalHashSet;
use gridrt_core::distributed_object::DistributedObject;
use gridrt_core::objectid::ObjectId;

#[derive(Clone)]
pub struct SetShardArgs {
    pub num_buckets: usize,
    pub bucket_capacity: usize,
}

pub struct SetShard<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    #[allow(dead_code)]
    pub(crate) id: ObjectId<SetShard<K>>,
    pub(crate) set: LocalHashSet<K>,
}

impl<K> DistributedObject for SetShard<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    type Args = SetShardArgs;

    fn construct(id: ObjectId<Self>, args: &SetShardArgs) -> Self {
        SetShard {
            id,
            set: LocalHashSet::new(args.num_buckets, args.bucket_capacity),
        }
    }
}
