//! In-memory index of materialized parameters and parameter sets.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{Result, StoreError};
use crate::types::{Action, ParameterGroup, ParameterSet, Parameters, ParametersKey};

/// Parameters keyed by id and by lookup key, parameter sets keyed by hash.
///
/// The index has no persistence of its own. It enforces that at most one
/// [`Parameters`] exists per [`ParametersKey`].
#[derive(Debug, Default)]
pub struct ParameterIndex {
    config: Map<String, Value>,
    parameters_by_id: HashMap<Vec<u8>, Parameters>,
    parameters_by_key: HashMap<ParametersKey, Vec<u8>>,
    parameter_sets: HashMap<Vec<u8>, ParameterSet>,
}

impl ParameterIndex {
    #[must_use]
    pub fn new(config: Map<String, Value>) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Configuration block the index was created with.
    #[must_use]
    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    #[must_use]
    pub fn parameters_by_id(&self, id: &[u8]) -> Option<&Parameters> {
        self.parameters_by_id.get(id)
    }

    /// Looks up parameters by exact match on action id, action config hash
    /// and group hash.
    pub fn parameters(
        &self,
        action: &Action,
        group: &ParameterGroup,
    ) -> Result<Option<&Parameters>> {
        let key = ParametersKey::new(action, group)?;
        Ok(self.parameters_for_key(&key))
    }

    #[must_use]
    pub fn parameters_for_key(&self, key: &ParametersKey) -> Option<&Parameters> {
        self.parameters_by_key
            .get(key)
            .and_then(|id| self.parameters_by_id.get(id))
    }

    #[must_use]
    pub fn parameter_set(&self, hash: &[u8]) -> Option<&ParameterSet> {
        self.parameter_sets.get(hash)
    }

    pub fn all_parameters(&self) -> impl Iterator<Item = &Parameters> {
        self.parameters_by_id.values()
    }

    pub fn all_parameter_sets(&self) -> impl Iterator<Item = &ParameterSet> {
        self.parameter_sets.values()
    }

    #[must_use]
    pub fn parameters_len(&self) -> usize {
        self.parameters_by_id.len()
    }

    #[must_use]
    pub fn parameter_sets_len(&self) -> usize {
        self.parameter_sets.len()
    }

    /// Inserts `parameters`.
    ///
    /// Fails with [`StoreError::DuplicateKey`] when other parameters already
    /// occupy the same lookup key, and returns `false` when these exact
    /// parameters are already indexed.
    pub fn save_parameters(&mut self, parameters: Parameters) -> Result<bool> {
        let key = parameters.key()?;
        if let Some(existing) = self.parameters_for_key(&key) {
            if existing.id() == parameters.id() {
                return Ok(false);
            }
            return Err(StoreError::DuplicateKey {
                key: key.to_string(),
            });
        }
        if self.parameters_by_id.contains_key(parameters.id()) {
            return Ok(false);
        }
        self.parameters_by_key.insert(key, parameters.id().to_vec());
        self.parameters_by_id
            .insert(parameters.id().to_vec(), parameters);
        Ok(true)
    }

    /// Inserts `set` unless a set with the same hash exists.
    pub fn save_parameter_set(&mut self, set: ParameterSet) -> bool {
        if self.parameter_sets.contains_key(set.hash()) {
            return false;
        }
        self.parameter_sets.insert(set.hash().to_vec(), set);
        true
    }

    /// Removes `parameters` from the index. Returns whether anything was removed.
    pub fn delete_parameters(&mut self, parameters: &Parameters) -> Result<bool> {
        let key = parameters.key()?;
        if self
            .parameters_by_key
            .get(&key)
            .is_some_and(|id| id.as_slice() == parameters.id())
        {
            self.parameters_by_key.remove(&key);
        }
        Ok(self.parameters_by_id.remove(parameters.id()).is_some())
    }

    /// Removes the set with `hash`. Returns whether anything was removed.
    pub fn delete_parameter_set(&mut self, hash: &[u8]) -> bool {
        self.parameter_sets.remove(hash).is_some()
    }
}
