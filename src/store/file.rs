//! Parameter store backed by a shared append-only log file.
//!
//! Any number of processes may open the same file. Each keeps its own index
//! and reconciles it against the log before answering a miss. The first
//! complete record for a lookup key in file order wins; later records for the
//! same key are ignored.

use std::path::Path;
use std::sync::Mutex;

use serde_json::{Map, Value};

use super::{ParameterStore, collect_parameters, collect_sets, stamp_parameters, stamp_set};
use crate::error::{Result, StoreError};
use crate::index::ParameterIndex;
use crate::io::{DataEntry, EntryType, LogRead, LogStats, LogStore};
use crate::types::{
    Action, ParameterGroup, ParameterSet, ParameterSetRecord, Parameters, StoreId,
};

struct Inner {
    index: ParameterIndex,
    log: LogStore,
}

impl Inner {
    /// Replays log entries appended since the last call into the index.
    ///
    /// A frame cut off at the end of the log is left for a later call. The
    /// entries completed before it are applied.
    fn update(&mut self) -> Result<()> {
        let LogRead { entries, truncated } = self.log.read()?;
        if let Some(err) = truncated {
            tracing::debug!(path = %self.log.path().display(), %err, "log tail incomplete");
        }
        for entry in entries {
            match entry.kind {
                EntryType::Parameters => self.apply_parameters(&entry)?,
                EntryType::ParameterSet => self.apply_parameter_set(&entry)?,
                EntryType::None => {
                    tracing::debug!(id = %hex::encode(&entry.id), "skipping untyped entry");
                }
            }
        }
        Ok(())
    }

    fn apply_parameters(&mut self, entry: &DataEntry) -> Result<()> {
        let parameters: Parameters = match serde_json::from_slice(&entry.data) {
            Ok(parameters) => parameters,
            Err(err) => {
                tracing::warn!(
                    id = %hex::encode(&entry.id),
                    %err,
                    "skipping unreadable parameters"
                );
                return Ok(());
            }
        };
        if parameters.id() != entry.id.as_slice() {
            tracing::warn!(
                id = %hex::encode(&entry.id),
                payload_id = %hex::encode(parameters.id()),
                "skipping parameters with mismatched id"
            );
            return Ok(());
        }
        let key = match parameters.key() {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(id = %hex::encode(&entry.id), %err, "skipping parameters");
                return Ok(());
            }
        };
        if self.index.parameters_by_id(parameters.id()).is_some()
            || self.index.parameters_for_key(&key).is_some()
        {
            tracing::debug!(id = %hex::encode(&entry.id), "parameters already indexed");
            return Ok(());
        }
        self.index.save_parameters(parameters)?;
        Ok(())
    }

    fn apply_parameter_set(&mut self, entry: &DataEntry) -> Result<()> {
        let record: ParameterSetRecord = match serde_json::from_slice(&entry.data) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    id = %hex::encode(&entry.id),
                    %err,
                    "skipping unreadable parameter set"
                );
                return Ok(());
            }
        };
        if record.hash != entry.id {
            tracing::warn!(
                id = %hex::encode(&entry.id),
                hash = %hex::encode(&record.hash),
                "skipping parameter set with mismatched hash"
            );
            return Ok(());
        }
        if self.index.parameter_set(&record.hash).is_some() {
            tracing::debug!(hash = %hex::encode(&record.hash), "parameter set already indexed");
            return Ok(());
        }
        let index = &self.index;
        let restored = ParameterSet::restore(record, |id| Ok(index.parameters_by_id(id).cloned()));
        let set = match restored {
            Ok(set) => set,
            Err(err) => {
                tracing::warn!(id = %hex::encode(&entry.id), %err, "skipping parameter set");
                return Ok(());
            }
        };
        self.index.save_parameter_set(set);
        Ok(())
    }

    fn write(&mut self, kind: EntryType, id: &[u8], data: Vec<u8>) -> Result<()> {
        self.log.write(&DataEntry::new(kind, id, data))?;
        tracing::debug!(%kind, id = %hex::encode(id), "appended entry");
        self.update()
    }
}

/// A [`ParameterStore`] persisted to a log file shared between processes.
///
/// Deletes only affect this instance's index; the log is never rewritten.
pub struct FileParameterStore {
    id: StoreId,
    inner: Mutex<Inner>,
}

impl FileParameterStore {
    /// Opens (or creates) the log at `path` and loads its current contents.
    ///
    /// `index_config` is forwarded to the in-memory index.
    pub fn open<P: AsRef<Path>>(
        path: P,
        frame_size: usize,
        index_config: Map<String, Value>,
    ) -> Result<Self> {
        Self::load(LogStore::open(path, frame_size)?, index_config)
    }

    /// Opens an existing log without creating it. Saves on the returned store
    /// fail with an I/O error.
    pub fn open_read_only<P: AsRef<Path>>(
        path: P,
        frame_size: usize,
        index_config: Map<String, Value>,
    ) -> Result<Self> {
        Self::load(LogStore::open_read_only(path, frame_size)?, index_config)
    }

    fn load(log: LogStore, index_config: Map<String, Value>) -> Result<Self> {
        let mut inner = Inner {
            index: ParameterIndex::new(index_config),
            log,
        };
        inner.update()?;
        tracing::debug!(
            path = %inner.log.path().display(),
            parameters = inner.index.parameters_len(),
            sets = inner.index.parameter_sets_len(),
            "loaded parameter store"
        );
        Ok(Self {
            id: StoreId::new(),
            inner: Mutex::new(inner),
        })
    }

    pub fn log_stats(&self) -> Result<LogStats> {
        Ok(self.inner.lock()?.log.stats())
    }
}

impl ParameterStore for FileParameterStore {
    fn id(&self) -> StoreId {
        self.id
    }

    fn parameters_by_id(&self, id: &[u8]) -> Result<Option<Parameters>> {
        let mut inner = self.inner.lock()?;
        if inner.index.parameters_by_id(id).is_none() {
            inner.update()?;
        }
        Ok(inner
            .index
            .parameters_by_id(id)
            .map(|parameters| stamp_parameters(parameters, self.id)))
    }

    fn parameters(&self, action: &Action, group: &ParameterGroup) -> Result<Option<Parameters>> {
        let mut inner = self.inner.lock()?;
        if inner.index.parameters(action, group)?.is_none() {
            inner.update()?;
        }
        Ok(inner
            .index
            .parameters(action, group)?
            .map(|parameters| stamp_parameters(parameters, self.id)))
    }

    fn parameter_set(&self, hash: &[u8]) -> Result<Option<ParameterSet>> {
        let mut inner = self.inner.lock()?;
        if inner.index.parameter_set(hash).is_none() {
            inner.update()?;
        }
        Ok(inner
            .index
            .parameter_set(hash)
            .map(|set| stamp_set(set, self.id)))
    }

    fn all_parameters(&self) -> Result<Vec<Parameters>> {
        let mut inner = self.inner.lock()?;
        inner.update()?;
        Ok(collect_parameters(&inner.index, self.id))
    }

    fn all_parameter_sets(&self) -> Result<Vec<ParameterSet>> {
        let mut inner = self.inner.lock()?;
        inner.update()?;
        Ok(collect_sets(&inner.index, self.id))
    }

    fn save_parameters(&self, parameters: &Parameters) -> Result<bool> {
        if parameters.id().is_empty() {
            return Err(StoreError::MissingId {
                context: "parameters",
            });
        }
        let key = parameters.key()?;
        let mut inner = self.inner.lock()?;
        inner.update()?;
        if inner.index.parameters_by_id(parameters.id()).is_some()
            || inner.index.parameters_for_key(&key).is_some()
        {
            return Ok(false);
        }

        let data = serde_json::to_vec(parameters)?;
        inner.write(EntryType::Parameters, parameters.id(), data)?;

        if inner.index.parameters_by_id(parameters.id()).is_some() {
            return Ok(true);
        }
        if inner.index.parameters_for_key(&key).is_some() {
            // Another writer appended parameters for the same key first.
            tracing::debug!(id = %hex::encode(parameters.id()), %key, "lost race for key");
            return Ok(false);
        }
        Err(StoreError::ReadBackFailed {
            id: hex::encode(parameters.id()),
        })
    }

    fn save_parameter_set(&self, set: &ParameterSet) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.update()?;
        if inner.index.parameter_set(set.hash()).is_some() {
            return Ok(false);
        }
        // Members must be stored first, otherwise the record cannot be restored.
        for id in set.parameter_ids() {
            if inner.index.parameters_by_id(id).is_none() {
                return Err(StoreError::MissingParameters {
                    id: hex::encode(id),
                });
            }
        }

        let data = serde_json::to_vec(set)?;
        inner.write(EntryType::ParameterSet, set.hash(), data)?;

        if inner.index.parameter_set(set.hash()).is_some() {
            Ok(true)
        } else {
            Err(StoreError::ReadBackFailed {
                id: hex::encode(set.hash()),
            })
        }
    }

    fn delete_parameters(&self, parameters: &Parameters) -> Result<bool> {
        self.inner.lock()?.index.delete_parameters(parameters)
    }

    fn delete_parameter_set(&self, hash: &[u8]) -> Result<bool> {
        Ok(self.inner.lock()?.index.delete_parameter_set(hash))
    }
}
