//! Keepalive admission control.
//!
//! Counts in-flight keepalive requests globally and per origin. The global
//! count always equals the sum of the per-origin counts; origins whose
//! count drops to zero are removed from the map.

use std::collections::HashMap;

use serde::Serialize;

use fetchd_config::KeepaliveConfig;

/// Which ceiling refused a keepalive request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepaliveLimit {
    TotalKeepaliveLimit,
    PerOrigin,
}

impl KeepaliveLimit {
    /// Discard-counter label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            KeepaliveLimit::TotalKeepaliveLimit => "total_keepalive_limit",
            KeepaliveLimit::PerOrigin => "per_origin_limit",
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeepaliveLimiter {
    total_limit: u32,
    per_origin_limit: u32,
    total: u32,
    per_origin: HashMap<String, u32>,
}

impl KeepaliveLimiter {
    #[must_use]
    pub fn new(config: KeepaliveConfig) -> Self {
        Self {
            total_limit: config.total_request_limit,
            per_origin_limit: config.request_limit_per_origin,
            total: 0,
            per_origin: HashMap::new(),
        }
    }

    /// The ceiling a new keepalive request for `origin` would break, if any.
    /// The global ceiling is checked first.
    #[must_use]
    pub fn exceeded_limit(&self, origin: &str) -> Option<KeepaliveLimit> {
        if self.total >= self.total_limit {
            return Some(KeepaliveLimit::TotalKeepaliveLimit);
        }
        if self.count_for(origin) >= self.per_origin_limit {
            return Some(KeepaliveLimit::PerOrigin);
        }
        None
    }

    pub fn increment(&mut self, origin: &str) {
        self.total += 1;
        *self.per_origin.entry(origin.to_string()).or_insert(0) += 1;
        tracing::trace!(origin, total = self.total, "Keepalive slot taken");
    }

    pub fn decrement(&mut self, origin: &str) {
        debug_assert!(
            self.per_origin.contains_key(origin),
            "keepalive decrement for untracked origin {origin}"
        );
        let Some(count) = self.per_origin.get_mut(origin) else {
            tracing::warn!("Keepalive decrement for untracked origin '{origin}'");
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.per_origin.remove(origin);
        }
        self.total = self.total.saturating_sub(1);
        tracing::trace!(origin, total = self.total, "Keepalive slot released");
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn count_for(&self, origin: &str) -> u32 {
        self.per_origin.get(origin).copied().unwrap_or(0)
    }

    /// Number of origins with at least one in-flight keepalive request.
    #[must_use]
    pub fn tracked_origins(&self) -> usize {
        self.per_origin.len()
    }
}
