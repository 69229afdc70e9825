//! Locality identity, the in-process transport, object identifiers, the
//! per-locality catalog, and the distributed-object base every container
//! crate in this workspace builds on.

pub mod catalog;
pub mod config;
pub mod distributed_object;
pub mod error;
pub mod handle;
pub mod locality;
pub mod objectid;
pub mod runtime;
pub mod telemetry;

pub use catalog::Catalog;
pub use config::RuntimeConfig;
pub use distributed_object::{create, destroy, get_ptr, DistributedObject};
pub use error::{FatalKind, GridError, Result};
pub use handle::Handle;
pub use locality::Locality;
pub use objectid::{ObjectId, ObjectIdCounter};
pub use runtime::Grid;
