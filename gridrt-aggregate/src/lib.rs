//! Aggregation buffers that coalesce many fine-grained inserts bound for
//! the same locality into one bulk work item (§4.9).

mod buffer;
mod buffers_vector;
mod sink;

pub use buffer::Buffer;
pub use buffers_vector::{capacity_from_byte_budget, BuffersVector};
pub use sink::BufferSink;
