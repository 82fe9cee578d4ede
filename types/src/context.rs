//! Descriptors of the originating context that travel with a fetch:
//! cookie-jar settings, client and controller descriptors, console reports.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("cookie jar settings could not be deserialized: {0}")]
    CookieJar(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieBehavior {
    #[default]
    Accept,
    RejectForeign,
    RejectAll,
    RejectTrackers,
    RejectTrackersAndPartitionForeign,
}

/// Cookie-jar settings of the originating context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieJarSettings {
    #[serde(default)]
    pub cookie_behavior: CookieBehavior,
    /// Partition key for partitioned (CHIPS / first-party isolated) jars.
    #[serde(default)]
    pub partition_key: Option<String>,
    #[serde(default)]
    pub should_resist_fingerprinting: bool,
}

impl CookieJarSettings {
    /// Deserialize settings sent across the context boundary.
    pub fn from_serialized(serialized: &SerializedCookieJarSettings) -> Result<Self, ContextError> {
        serde_json::from_str(&serialized.0).map_err(ContextError::CookieJar)
    }

    #[must_use]
    pub fn to_serialized(&self) -> SerializedCookieJarSettings {
        // Serializing plain data into a String cannot fail.
        SerializedCookieJarSettings(serde_json::to_string(self).unwrap_or_default())
    }

    #[must_use]
    pub fn rejects_all(&self) -> bool {
        self.cookie_behavior == CookieBehavior::RejectAll
    }
}

/// Wire form of [`CookieJarSettings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializedCookieJarSettings(String);

impl SerializedCookieJarSettings {
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    Window,
    Worker,
    SharedWorker,
    ServiceWorker,
}

/// The environment a worker fetch was issued from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_type: ClientType,
    pub url: Url,
}

/// The service worker controlling the client, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceWorkerDescriptor {
    pub scope: Url,
    pub script_url: Url,
}

/// A console message produced while fetching, forwarded to the originating
/// context when the fetch ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleReport {
    pub category: String,
    pub message_name: String,
    #[serde(default)]
    pub params: Vec<String>,
    pub source_url: Option<Url>,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}
