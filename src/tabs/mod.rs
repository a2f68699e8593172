//! Tab documents and the registry that owns them.
//!
//! The registry is the only mutable shared state in the server. Producers, the file
//! watcher and observers all mutate tabs through it and receive value copies back.

mod error;
mod registry;
mod types;

pub use error::TabError;
pub use registry::{DEFAULT_UNDO_CAPACITY, TabRegistry, generate_id};
pub use types::{DiffMeta, NewTab, Tab, TabKind};
