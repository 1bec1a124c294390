//! Low-level primitives for the on-disk parameter log.

pub mod codec;
pub mod log_store;
pub mod reassembly;

pub use codec::{DataChunk, DataEntry, EntryType};
pub use log_store::{LogRead, LogStats, LogStore};
pub use reassembly::{Reassembled, reassemble};
