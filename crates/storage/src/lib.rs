mod error;
mod lifecycle;
mod memory;
mod record;
mod traits;

pub mod conformance;

pub use error::StorageError;
pub use lifecycle::{create_next_version, now_rfc3339};
pub use memory::{MemorySnapshot, MemoryStorage};
pub use record::{
    EntryProgress, EntryRecord, EntryValueRecord, FormVersionRecord, NewEntry, NewFormVersion,
};
pub use traits::FormStorage;
