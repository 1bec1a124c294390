//! Parameter stores: the shared trait and the in-memory implementation.

mod file;

use std::sync::Mutex;

use serde_json::{Map, Value};

pub use file::FileParameterStore;

use crate::error::Result;
use crate::index::ParameterIndex;
use crate::types::{Action, ParameterGroup, ParameterSet, Parameters, StoreId};

/// Storage for parameters and parameter sets.
///
/// Every object handed out is stamped with the store's [`StoreId`] so callers
/// can route later saves back to the store that produced it.
pub trait ParameterStore: Send + Sync {
    fn id(&self) -> StoreId;

    fn parameters_by_id(&self, id: &[u8]) -> Result<Option<Parameters>>;

    /// Parameters generated for `action` in its current configuration and
    /// for `group`, if any.
    fn parameters(&self, action: &Action, group: &ParameterGroup) -> Result<Option<Parameters>>;

    fn parameter_set(&self, hash: &[u8]) -> Result<Option<ParameterSet>>;

    /// All parameters, ordered by id.
    fn all_parameters(&self) -> Result<Vec<Parameters>>;

    /// All parameter sets, ordered by hash.
    fn all_parameter_sets(&self) -> Result<Vec<ParameterSet>>;

    /// Persists `parameters`. Returns `false` when they were already stored.
    fn save_parameters(&self, parameters: &Parameters) -> Result<bool>;

    /// Persists `set`. Returns `false` when a set with the same hash exists.
    fn save_parameter_set(&self, set: &ParameterSet) -> Result<bool>;

    fn delete_parameters(&self, parameters: &Parameters) -> Result<bool>;

    fn delete_parameter_set(&self, hash: &[u8]) -> Result<bool>;
}

fn stamp_parameters(parameters: &Parameters, store: StoreId) -> Parameters {
    let mut parameters = parameters.clone();
    parameters.set_parameter_store(store);
    parameters
}

fn stamp_set(set: &ParameterSet, store: StoreId) -> ParameterSet {
    let mut set = set.clone();
    set.set_parameter_store(store);
    set
}

fn collect_parameters(index: &ParameterIndex, store: StoreId) -> Vec<Parameters> {
    let mut all: Vec<Parameters> = index
        .all_parameters()
        .map(|parameters| stamp_parameters(parameters, store))
        .collect();
    all.sort_by(|a, b| a.id().cmp(b.id()));
    all
}

fn collect_sets(index: &ParameterIndex, store: StoreId) -> Vec<ParameterSet> {
    let mut all: Vec<ParameterSet> = index
        .all_parameter_sets()
        .map(|set| stamp_set(set, store))
        .collect();
    all.sort_by(|a, b| a.hash().cmp(b.hash()));
    all
}

/// A process-local store with no persistence.
#[derive(Debug)]
pub struct InMemoryParameterStore {
    id: StoreId,
    index: Mutex<ParameterIndex>,
}

impl InMemoryParameterStore {
    #[must_use]
    pub fn new(config: Map<String, Value>) -> Self {
        Self {
            id: StoreId::new(),
            index: Mutex::new(ParameterIndex::new(config)),
        }
    }

    pub fn config(&self) -> Result<Map<String, Value>> {
        Ok(self.index.lock()?.config().clone())
    }
}

impl Default for InMemoryParameterStore {
    fn default() -> Self {
        Self::new(Map::new())
    }
}

impl ParameterStore for InMemoryParameterStore {
    fn id(&self) -> StoreId {
        self.id
    }

    fn parameters_by_id(&self, id: &[u8]) -> Result<Option<Parameters>> {
        let index = self.index.lock()?;
        Ok(index
            .parameters_by_id(id)
            .map(|parameters| stamp_parameters(parameters, self.id)))
    }

    fn parameters(&self, action: &Action, group: &ParameterGroup) -> Result<Option<Parameters>> {
        let index = self.index.lock()?;
        Ok(index
            .parameters(action, group)?
            .map(|parameters| stamp_parameters(parameters, self.id)))
    }

    fn parameter_set(&self, hash: &[u8]) -> Result<Option<ParameterSet>> {
        let index = self.index.lock()?;
        Ok(index.parameter_set(hash).map(|set| stamp_set(set, self.id)))
    }

    fn all_parameters(&self) -> Result<Vec<Parameters>> {
        let index = self.index.lock()?;
        Ok(collect_parameters(&index, self.id))
    }

    fn all_parameter_sets(&self) -> Result<Vec<ParameterSet>> {
        let index = self.index.lock()?;
        Ok(collect_sets(&index, self.id))
    }

    fn save_parameters(&self, parameters: &Parameters) -> Result<bool> {
        self.index.lock()?.save_parameters(parameters.clone())
    }

    fn save_parameter_set(&self, set: &ParameterSet) -> Result<bool> {
        Ok(self.index.lock()?.save_parameter_set(set.clone()))
    }

    fn delete_parameters(&self, parameters: &Parameters) -> Result<bool> {
        self.index.lock()?.delete_parameters(parameters)
    }

    fn delete_parameter_set(&self, hash: &[u8]) -> Result<bool> {
        Ok(self.index.lock()?.delete_parameter_set(hash))
    }
}
