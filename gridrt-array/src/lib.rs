//! Fixed-size distributed array with a published chunking function and a
//! two-phase distributed prefix scan (§4.7).

mod array;
mod chunk;
mod cursor;
mod partition;
mod scan;

pub use array::DistributedArray;
pub use chunk::ArrayChunk;
pub use cursor::ArrayCursor;
pub use partition::Partition;
