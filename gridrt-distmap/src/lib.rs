//! Hash-partitioned distributed map and set, overlaying one local
//! concurrent container per locality (§4.8).

mod map;
mod map_shard;
mod partitioning;
mod set;
mod set_shard;

pub use map::{DistributedMap, DistributedMapCursor};
pub use map_shard::{MapShard, MapShardArgs};
pub use partitioning::locality_for;
pub use set::{DistributedSet, DistributedSetCursor};
pub use set_shard::{SetShard, SetShardArgs};
