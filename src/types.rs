//! Application objects persisted by the parameter stores.
//!
//! Byte fields (ids and hashes) are written as lowercase hex strings in the
//! JSON payloads.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::util::random_id;

/// Identity of one store instance, stamped on the objects it hands out so
/// callers can route later saves back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(Uuid);

impl StoreId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn content_hash(value: &impl Serialize) -> Result<Vec<u8>> {
    // serde_json maps are ordered by key, which keeps the bytes canonical.
    let bytes = serde_json::to_vec(value)?;
    Ok(blake3::hash(&bytes).as_bytes().to_vec())
}

/// The pipeline action a set of parameters was generated for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "hex")]
    pub id: Vec<u8>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl Action {
    #[must_use]
    pub fn new(kind: impl Into<String>, id: impl Into<Vec<u8>>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            name: name.into(),
            description: String::new(),
            config: Map::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Stable hash of the action's configuration.
    pub fn config_hash(&self) -> Result<Vec<u8>> {
        content_hash(&self.config)
    }
}

/// A group of records that share one set of parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGroup {
    #[serde(with = "hex")]
    pub hash: Vec<u8>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ParameterGroup {
    /// Builds a group whose hash is derived from `data`.
    pub fn new(data: Map<String, Value>) -> Result<Self> {
        Ok(Self {
            hash: content_hash(&data)?,
            data,
        })
    }

    #[must_use]
    pub fn with_hash(hash: impl Into<Vec<u8>>, data: Map<String, Value>) -> Self {
        Self {
            hash: hash.into(),
            data,
        }
    }

    #[must_use]
    pub fn hash(&self) -> &[u8] {
        &self.hash
    }
}

/// Lookup key of a [`Parameters`] object: at most one may exist per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParametersKey {
    pub action_id: Vec<u8>,
    pub config_hash: Vec<u8>,
    pub group_hash: Vec<u8>,
}

impl ParametersKey {
    pub fn new(action: &Action, group: &ParameterGroup) -> Result<Self> {
        if action.id.is_empty() {
            return Err(StoreError::MissingId { context: "action" });
        }
        Ok(Self {
            action_id: action.id.clone(),
            config_hash: action.config_hash()?,
            group_hash: group.hash.clone(),
        })
    }
}

impl fmt::Display for ParametersKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "action {} (config {}) and group {}",
            hex::encode(&self.action_id),
            hex::encode(&self.config_hash),
            hex::encode(&self.group_hash)
        )
    }
}

/// Parameters generated for one action and parameter group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(with = "hex")]
    id: Vec<u8>,
    action: Action,
    parameter_group: ParameterGroup,
    #[serde(default)]
    parameters: Option<Value>,
    #[serde(skip)]
    store: Option<StoreId>,
}

impl Parameters {
    /// Creates parameters with a fresh random id.
    #[must_use]
    pub fn new(action: Action, parameter_group: ParameterGroup, parameters: Option<Value>) -> Self {
        Self::with_id(random_id(), action, parameter_group, parameters)
    }

    #[must_use]
    pub fn with_id(
        id: impl Into<Vec<u8>>,
        action: Action,
        parameter_group: ParameterGroup,
        parameters: Option<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            action,
            parameter_group,
            parameters,
            store: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }

    #[must_use]
    pub fn parameter_group(&self) -> &ParameterGroup {
        &self.parameter_group
    }

    #[must_use]
    pub fn parameters(&self) -> Option<&Value> {
        self.parameters.as_ref()
    }

    /// The store instance that last loaded or saved these parameters.
    #[must_use]
    pub fn parameter_store(&self) -> Option<StoreId> {
        self.store
    }

    pub fn set_parameter_store(&mut self, store: StoreId) {
        self.store = Some(store);
    }

    pub fn key(&self) -> Result<ParametersKey> {
        ParametersKey::new(&self.action, &self.parameter_group)
    }

    /// Whether these parameters were generated for `action` in its current
    /// configuration and for `group`.
    pub fn is_valid_for(&self, action: &Action, group: &ParameterGroup) -> Result<bool> {
        Ok(self.action.id == action.id
            && self.action.config_hash()? == action.config_hash()?
            && self.parameter_group.hash == group.hash)
    }
}

impl PartialEq for Parameters {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.action == other.action
            && self.parameter_group == other.parameter_group
            && self.parameters == other.parameters
    }
}

/// JSON form of a [`ParameterSet`]: member ids and the set hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSetRecord {
    pub parameters: Vec<String>,
    #[serde(with = "hex")]
    pub hash: Vec<u8>,
}

/// A content-addressed collection of [`Parameters`].
#[derive(Debug, Clone)]
pub struct ParameterSet {
    hash: Vec<u8>,
    parameters: Vec<Parameters>,
    store: Option<StoreId>,
}

impl ParameterSet {
    pub fn new(parameters: Vec<Parameters>) -> Result<Self> {
        let mut set = Self {
            hash: Vec::new(),
            parameters,
            store: None,
        };
        set.update_hash()?;
        Ok(set)
    }

    /// Rebuilds a set from its stored record, resolving member ids with `lookup`.
    ///
    /// The stored hash is kept as is.
    pub fn restore<F>(record: ParameterSetRecord, mut lookup: F) -> Result<Self>
    where
        F: FnMut(&[u8]) -> Result<Option<Parameters>>,
    {
        let mut parameters = Vec::with_capacity(record.parameters.len());
        for hex_id in &record.parameters {
            let id = hex::decode(hex_id).map_err(|err| {
                StoreError::malformed(format!("invalid parameters id {hex_id:?}: {err}"))
            })?;
            let found = lookup(&id)?.ok_or_else(|| StoreError::MissingParameters {
                id: hex_id.clone(),
            })?;
            parameters.push(found);
        }
        Ok(Self {
            hash: record.hash,
            parameters,
            store: None,
        })
    }

    #[must_use]
    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameters] {
        &self.parameters
    }

    pub fn parameter_ids(&self) -> impl Iterator<Item = &[u8]> {
        self.parameters.iter().map(Parameters::id)
    }

    /// True when no member carries a parameters value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.iter().all(|p| p.parameters.is_none())
    }

    #[must_use]
    pub fn parameter_store(&self) -> Option<StoreId> {
        self.store
    }

    pub fn set_parameter_store(&mut self, store: StoreId) {
        self.store = Some(store);
    }

    /// Replaces the member generated for the same action as `parameters` and
    /// recomputes the hash.
    pub fn replace_parameters(&mut self, parameters: Parameters) -> Result<()> {
        let slot = self
            .parameters
            .iter_mut()
            .find(|existing| existing.action.id == parameters.action.id)
            .ok_or_else(|| StoreError::malformed("action not found in parameter set"))?;
        *slot = parameters;
        self.update_hash()
    }

    /// Recomputes the hash from the sorted member ids.
    pub fn update_hash(&mut self) -> Result<()> {
        let mut ids: Vec<&[u8]> = Vec::with_capacity(self.parameters.len());
        for parameters in &self.parameters {
            if parameters.id.is_empty() {
                return Err(StoreError::MissingId {
                    context: "parameters",
                });
            }
            ids.push(&parameters.id);
        }
        ids.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        for id in ids {
            hasher.update(&(id.len() as u64).to_le_bytes());
            hasher.update(id);
        }
        self.hash = hasher.finalize().as_bytes().to_vec();
        Ok(())
    }

    #[must_use]
    pub fn to_record(&self) -> ParameterSetRecord {
        ParameterSetRecord {
            parameters: self.parameter_ids().map(hex::encode).collect(),
            hash: self.hash.clone(),
        }
    }
}

impl PartialEq for ParameterSet {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.parameters == other.parameters
    }
}

impl Serialize for ParameterSet {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_record().serialize(serializer)
    }
}
