use crate::flags::FlagRule;
use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Empty flag name")]
    EmptyFlagName,

    #[error("Duplicate flag name: {0}")]
    DuplicateFlagName(String),

    #[error("Flag evaluation timeout cannot be 0")]
    ZeroEvaluationTimeout,

    #[error("Empty status store path")]
    EmptyStorePath,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the status API
    pub listener: Listener,
    /// Listener for health and readiness probes
    pub admin_listener: Listener,
    pub store: StoreConfig,
    pub flags: FlagsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.store.validate()?;
        self.flags.validate()
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreConfig {
    Memory,
    Filesystem { path: PathBuf },
}

impl StoreConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            StoreConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err(ValidationError::EmptyStorePath)
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct FlagsConfig {
    /// Flags evaluated for every status query. Either a YAML list or a
    /// comma separated string.
    #[serde(deserialize_with = "deserialize_flag_names")]
    pub names: Vec<String>,
    /// Upper bound for evaluating all flags of one request
    pub evaluation_timeout_ms: Option<u64>,
    /// Rules for the built-in static flag oracle
    #[serde(default)]
    pub rules: HashMap<String, FlagRule>,
}

impl FlagsConfig {
    pub fn evaluation_timeout(&self) -> Option<Duration> {
        self.evaluation_timeout_ms.map(Duration::from_millis)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for name in &self.names {
            if name.is_empty() {
                return Err(ValidationError::EmptyFlagName);
            }
            if !seen.insert(name) {
                return Err(ValidationError::DuplicateFlagName(name.clone()));
            }
        }

        if self.evaluation_timeout_ms == Some(0) {
            return Err(ValidationError::ZeroEvaluationTimeout);
        }

        Ok(())
    }
}

fn deserialize_flag_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlagNames {
        List(Vec<String>),
        CommaSeparated(String),
    }

    Ok(match FlagNames::deserialize(deserializer)? {
        FlagNames::List(names) => names,
        FlagNames::CommaSeparated(names) if names.trim().is_empty() => Vec::new(),
        FlagNames::CommaSeparated(names) => {
            names.split(',').map(|name| name.trim().to_string()).collect()
        }
    })
}
