//! Durable storage for pipeline parameters.
//!
//! Parameters and parameter sets are kept in an in-memory index and,
//! optionally, in an append-only log file that several processes may share.
//! See [`FileParameterStore`] for the reconciliation rules.

pub mod config;
pub mod constants;
pub mod error;
pub mod index;
pub mod io;
pub mod store;
pub mod types;
pub mod util;

pub use config::{FileStoreConfig, StoreConfig, StoreFormat, open_store};
pub use error::{Result, StoreError};
pub use index::ParameterIndex;
pub use store::{FileParameterStore, InMemoryParameterStore, ParameterStore};
pub use types::{
    Action, ParameterGroup, ParameterSet, ParameterSetRecord, Parameters, ParametersKey, StoreId,
};
