//! Fan-out of logical events to destinations
//!
//! Every logical event is mapped to a remote path per destination and sent to
//! all destinations concurrently. A failing destination only affects its own
//! result.

pub mod destination;
pub mod engine;
pub mod error;
pub mod factory;
pub mod local;
pub mod memory;
pub mod remote_path;

pub use destination::{Destination, Transfer};
pub use engine::{Action, DispatchEngine, DispatchResult, DispatchSummary, Target};
pub use error::DispatchError;
pub use factory::{build_destination, build_targets, BuiltTargets};
pub use local::LocalDirDestination;
pub use memory::{MemoryDestination, MemoryEntry, Operation};
pub use remote_path::remote_path_for;
