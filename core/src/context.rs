//! Per-fetch execution context: load group, performance storage, the
//! navigation channel a preload rides on, and the resolved bundle of all
//! three that an initialized instance carries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use url::Url;

use fetchd_types::{CookieJarSettings, LoadGroupId, Principal, ResponseTiming};

use crate::error::LoadGroupError;

static NEXT_LOAD_GROUP_ID: AtomicU64 = AtomicU64::new(1);

/// Groups the network operations issued on behalf of one principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadGroup {
    id: LoadGroupId,
    owner_origin: String,
}

impl LoadGroup {
    /// A fresh load group owned by `principal`.
    pub fn for_principal(principal: &Principal) -> Result<Self, LoadGroupError> {
        if principal.is_null() {
            return Err(LoadGroupError::NullPrincipal);
        }
        Ok(Self {
            id: LoadGroupId::new(NEXT_LOAD_GROUP_ID.fetch_add(1, Ordering::Relaxed)),
            owner_origin: principal.origin().to_string(),
        })
    }

    #[must_use]
    pub fn id(&self) -> LoadGroupId {
        self.id
    }

    #[must_use]
    pub fn owner_origin(&self) -> &str {
        &self.owner_origin
    }
}

/// Shared sink for resource-timing entries of a navigation.
#[derive(Debug, Clone, Default)]
pub struct PerformanceStorage {
    entries: Arc<Mutex<Vec<ResponseTiming>>>,
}

impl PerformanceStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&self, timing: ResponseTiming) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(timing);
    }

    #[must_use]
    pub fn entries(&self) -> Vec<ResponseTiming> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The navigation channel a preload request is attached to.
#[derive(Debug, Clone)]
pub struct Channel {
    uri: Url,
    result_principal: Option<Principal>,
    load_group: Option<LoadGroup>,
    cookie_jar: Option<CookieJarSettings>,
    performance_storage: Option<PerformanceStorage>,
}

impl Channel {
    #[must_use]
    pub fn new(uri: Url) -> Self {
        Self {
            uri,
            result_principal: None,
            load_group: None,
            cookie_jar: None,
            performance_storage: None,
        }
    }

    #[must_use]
    pub fn with_result_principal(mut self, principal: Principal) -> Self {
        self.result_principal = Some(principal);
        self
    }

    #[must_use]
    pub fn with_load_group(mut self, load_group: LoadGroup) -> Self {
        self.load_group = Some(load_group);
        self
    }

    #[must_use]
    pub fn with_cookie_jar(mut self, cookie_jar: CookieJarSettings) -> Self {
        self.cookie_jar = Some(cookie_jar);
        self
    }

    #[must_use]
    pub fn with_performance_storage(mut self, storage: PerformanceStorage) -> Self {
        self.performance_storage = Some(storage);
        self
    }

    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[must_use]
    pub fn result_principal(&self) -> Option<&Principal> {
        self.result_principal.as_ref()
    }

    #[must_use]
    pub fn load_group(&self) -> Option<&LoadGroup> {
        self.load_group.as_ref()
    }

    #[must_use]
    pub fn cookie_jar(&self) -> Option<&CookieJarSettings> {
        self.cookie_jar.as_ref()
    }

    #[must_use]
    pub fn performance_storage(&self) -> Option<&PerformanceStorage> {
        self.performance_storage.as_ref()
    }
}

/// Everything initialization resolves for one fetch.
#[derive(Debug, Clone)]
pub struct ResolvedContext {
    pub principal: Principal,
    pub load_group: LoadGroup,
    pub cookie_jar: Option<CookieJarSettings>,
    pub performance_storage: Option<PerformanceStorage>,
}
