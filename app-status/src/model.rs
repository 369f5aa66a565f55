use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Flag name to enabled, one entry per configured flag.
pub type FlagMap = HashMap<String, bool>;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ModelError {
    #[error("version must not be empty")]
    EmptyVersion,

    #[error("unsupported platform {0:?}, supported values: ios,android,windows,blackberry")]
    UnknownPlatform(String),

    #[error("unsupported status {0:?}, supported values: supported,deprecated,unsupported,latest")]
    UnknownStatus(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Windows,
    Blackberry,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Ios,
        Platform::Android,
        Platform::Windows,
        Platform::Blackberry,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Windows => "windows",
            Platform::Blackberry => "blackberry",
        }
    }
}

impl FromStr for Platform {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ModelError::UnknownPlatform(s.to_string()))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Supported,
    Deprecated,
    Unsupported,
    Latest,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Supported,
        Status::Deprecated,
        Status::Unsupported,
        Status::Latest,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Supported => "supported",
            Status::Deprecated => "deprecated",
            Status::Unsupported => "unsupported",
            Status::Latest => "latest",
        }
    }
}

impl FromStr for Status {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ModelError::UnknownStatus(s.to_string()))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published status event. Never mutated once appended to a store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub version: String,
    pub platform: Platform,
    pub status: Status,
    pub published_at: DateTime<Utc>,
}

impl StatusRecord {
    pub fn new<V>(version: V, platform: Platform, status: Status, published_at: DateTime<Utc>) -> Self
    where
        V: Into<String>,
    {
        StatusRecord {
            version: version.into(),
            platform,
            status,
            published_at,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusQueryResult {
    pub status: Status,
    pub found: bool,
}

impl StatusQueryResult {
    /// Reported when no record exists for a version/platform pair.
    pub const NOT_FOUND: StatusQueryResult = StatusQueryResult {
        status: Status::Supported,
        found: false,
    };
}

/// Body of a publish request, exactly as received on the wire.
#[derive(Clone, Debug, Deserialize)]
pub struct PublishRequest {
    pub version: String,
    pub platform: String,
    pub status: String,
}

/// A publish request whose fields have been checked and parsed.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidPublish {
    pub version: String,
    pub platform: Platform,
    pub status: Status,
}

impl PublishRequest {
    pub fn validate(self) -> Result<ValidPublish, ModelError> {
        if self.version.trim().is_empty() {
            return Err(ModelError::EmptyVersion);
        }

        Ok(ValidPublish {
            platform: self.platform.parse()?,
            status: self.status.parse()?,
            version: self.version,
        })
    }
}
