//! Principals: the security identity a request is made on behalf of.
//!
//! Callers hand the service a serialized [`PrincipalInfo`]; the service turns
//! it into a [`Principal`] during instance initialization. Resolution is the
//! only place malformed descriptors are rejected.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

/// Serialized principal descriptor as it crosses the context boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrincipalInfo {
    System,
    Null {
        /// Spec of the principal this null principal was derived from, if any.
        #[serde(default)]
        precursor: Option<String>,
    },
    Content {
        spec: String,
        /// Origin attribute suffix, e.g. `^userContextId=2`. Empty for none.
        #[serde(default)]
        origin_suffix: String,
    },
}

impl PrincipalInfo {
    /// Content principal descriptor for `spec` with no origin attributes.
    #[must_use]
    pub fn content(spec: impl Into<String>) -> Self {
        Self::Content {
            spec: spec.into(),
            origin_suffix: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrincipalError {
    #[error("invalid principal spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },
    #[error("principal spec '{0}' has an opaque origin")]
    OpaqueOrigin(String),
    #[error("invalid origin suffix '{0}'")]
    InvalidOriginSuffix(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    System,
    Null,
    Content,
}

/// A resolved principal.
///
/// Fields are private; the only construction paths validate their input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    kind: PrincipalKind,
    url: Option<Url>,
    origin: String,
}

const SYSTEM_ORIGIN: &str = "[System Principal]";
const NULL_ORIGIN: &str = "null";

impl Principal {
    /// Resolve a serialized descriptor.
    pub fn from_info(info: &PrincipalInfo) -> Result<Self, PrincipalError> {
        match info {
            PrincipalInfo::System => Ok(Self::system()),
            PrincipalInfo::Null { .. } => Ok(Self::null()),
            PrincipalInfo::Content {
                spec,
                origin_suffix,
            } => {
                let url = Url::parse(spec).map_err(|e| PrincipalError::InvalidSpec {
                    spec: spec.clone(),
                    reason: e.to_string(),
                })?;
                Self::content_with_suffix(url, origin_suffix)
            }
        }
    }

    #[must_use]
    pub fn system() -> Self {
        Self {
            kind: PrincipalKind::System,
            url: None,
            origin: SYSTEM_ORIGIN.to_string(),
        }
    }

    #[must_use]
    pub fn null() -> Self {
        Self {
            kind: PrincipalKind::Null,
            url: None,
            origin: NULL_ORIGIN.to_string(),
        }
    }

    /// Content principal for `url` with no origin attributes.
    pub fn content(url: Url) -> Result<Self, PrincipalError> {
        Self::content_with_suffix(url, "")
    }

    fn content_with_suffix(url: Url, suffix: &str) -> Result<Self, PrincipalError> {
        if !is_valid_origin_suffix(suffix) {
            return Err(PrincipalError::InvalidOriginSuffix(suffix.to_string()));
        }
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(PrincipalError::OpaqueOrigin(url.to_string()));
        }
        let origin = format!("{}{suffix}", origin.ascii_serialization());
        Ok(Self {
            kind: PrincipalKind::Content,
            url: Some(url),
            origin,
        })
    }

    #[must_use]
    pub fn kind(&self) -> PrincipalKind {
        self.kind
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.kind == PrincipalKind::Null
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.kind == PrincipalKind::System
    }

    /// Origin string including origin attributes. This is the key keepalive
    /// accounting is partitioned by.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Spec used in log lines. Non-content principals log their origin token.
    #[must_use]
    pub fn ascii_spec(&self) -> &str {
        self.url.as_ref().map_or(self.origin.as_str(), Url::as_str)
    }

    #[must_use]
    pub fn is_loopback_host(&self) -> bool {
        self.url.as_ref().is_some_and(is_loopback_url)
    }
}

/// Whether `url` points at the local machine: `localhost`, any
/// `*.localhost` name, or a loopback IP literal.
#[must_use]
pub fn is_loopback_url(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(addr)) => addr.is_loopback(),
        Some(Host::Ipv6(addr)) => addr.is_loopback(),
        None => false,
    }
}

fn is_valid_origin_suffix(suffix: &str) -> bool {
    if suffix.is_empty() {
        return true;
    }
    let Some(attrs) = suffix.strip_prefix('^') else {
        return false;
    };
    !attrs.is_empty()
        && attrs.split('&').all(|pair| {
            pair.split_once('=')
                .is_some_and(|(key, value)| !key.is_empty() && !value.is_empty())
        })
}
