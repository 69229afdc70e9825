//! The per-locality slice of a distributed array (§4.7). Each locality
//! owns exactly one [`ArrayChunk`], sized by [`Partition::chunk_size`] for
//! wherever `Grid::this_locality()` turns out to be when it's constructed.

use parking_lot::RwLock;

use gridrt_core::distributed_object::DistributedObject;
use gridrt_core::objectid::ObjectId;
use gridrt_core::runtime::Grid;

use crate::partition::Partition;

#[derive(Clone)]
pub struct ChunkArgs {
    pub partition: Partition,
}

pub struct ArrayChunk<E> {
    pub(crate) id: ObjectId<ArrayChunk<E>>,
    pub(crate) data: RwLock<Vec<E>>,
}

impl<E: Default + Clone + Send + Sync + 'static> DistributedObject for ArrayChunk<E> {
    type Args = ChunkArgs;

    fn construct(id: ObjectId<Self>, args: &ChunkArgs) -> Self {
        let here = Grid::this_locality();
        let len = args.partition.chunk_size(here);
        ArrayChunk {
            id,
            data: RwLock::new(vec![E::default(); len]),
        }
    }
}
