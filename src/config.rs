//! Store configuration and the store factory.
//!
//! The settings layer hands over a JSON object. Its `type` field selects the
//! store (`in-memory` when absent); the remaining fields configure it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::DEFAULT_FRAME_SIZE;
use crate::error::{Result, StoreError};
use crate::store::{FileParameterStore, InMemoryParameterStore, ParameterStore};
use crate::util::expand_home;

/// Payload encoding of stored records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    #[default]
    Json,
}

fn default_frame_size() -> usize {
    DEFAULT_FRAME_SIZE
}

/// Settings of a [`FileParameterStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileStoreConfig {
    pub filename: PathBuf,
    #[serde(default)]
    pub format: StoreFormat,
    /// Forwarded verbatim to the in-memory index.
    #[serde(default)]
    pub in_memory_config: Map<String, Value>,
    /// Maximum size in bytes of one physical frame, header included.
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
}

impl FileStoreConfig {
    #[must_use]
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            format: StoreFormat::default(),
            in_memory_config: Map::new(),
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }

    /// The log file path with a leading `~` expanded.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        expand_home(&self.filename)
    }

    pub fn open(&self) -> Result<FileParameterStore> {
        FileParameterStore::open(self.path(), self.frame_size, self.in_memory_config.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    InMemory(Map<String, Value>),
    File(FileStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::InMemory(Map::new())
    }
}

impl StoreConfig {
    /// Parses a store configuration object. `null` selects the in-memory store.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(StoreError::InvalidConfig {
                    reason: format!("expected an object, got {other}").into(),
                });
            }
        };
        let kind = match map.get("type") {
            None | Some(Value::Null) => "in-memory",
            Some(Value::String(kind)) => kind.as_str(),
            Some(other) => {
                return Err(StoreError::InvalidConfig {
                    reason: format!("store type must be a string, got {other}").into(),
                });
            }
        };
        match kind {
            "in-memory" => {
                let mut config = map.clone();
                config.remove("type");
                Ok(Self::InMemory(config))
            }
            "file" => {
                let config: FileStoreConfig =
                    serde_json::from_value(value.clone()).map_err(|err| {
                        StoreError::InvalidConfig {
                            reason: format!("file store: {err}").into(),
                        }
                    })?;
                if config.filename.as_os_str().is_empty() {
                    return Err(StoreError::InvalidConfig {
                        reason: "file store: filename is empty".into(),
                    });
                }
                Ok(Self::File(config))
            }
            other => Err(StoreError::UnknownStoreType {
                kind: other.to_string(),
            }),
        }
    }

    pub fn open(&self) -> Result<Box<dyn ParameterStore>> {
        match self {
            Self::InMemory(config) => Ok(Box::new(InMemoryParameterStore::new(config.clone()))),
            Self::File(config) => {
                let store = config.open()?;
                tracing::debug!(path = %config.path().display(), "opened file parameter store");
                Ok(Box::new(store))
            }
        }
    }
}

/// Builds the parameter store described by `config`.
pub fn open_store(config: &Value) -> Result<Box<dyn ParameterStore>> {
    StoreConfig::from_value(config)?.open()
}
