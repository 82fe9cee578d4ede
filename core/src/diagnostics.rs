//! Failure counters of the fetch service.

use serde::Serialize;

use crate::error::FetchFailure;
use crate::keepalive::KeepaliveLimit;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeepaliveDiscards {
    pub total_keepalive_limit: u64,
    pub per_origin_limit: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub keepalive_discards: KeepaliveDiscards,
    pub offline_rejections: u64,
    pub initialization_failures: u64,
    pub driver_start_failures: u64,
    pub duplicate_registrations: u64,
}

impl Diagnostics {
    pub(crate) fn record(&mut self, failure: &FetchFailure) {
        match failure {
            FetchFailure::AdmissionRejected {
                limit: KeepaliveLimit::TotalKeepaliveLimit,
            } => self.keepalive_discards.total_keepalive_limit += 1,
            FetchFailure::AdmissionRejected {
                limit: KeepaliveLimit::PerOrigin,
            } => self.keepalive_discards.per_origin_limit += 1,
            FetchFailure::Offline => self.offline_rejections += 1,
            FetchFailure::Initialization(_) => self.initialization_failures += 1,
            FetchFailure::DriverStart(_) => self.driver_start_failures += 1,
            FetchFailure::DuplicateRegistration => self.duplicate_registrations += 1,
            FetchFailure::Aborted => {}
        }
    }

    /// Discard count by label (`total_keepalive_limit`, `per_origin_limit`).
    #[must_use]
    pub fn keepalive_discard_count(&self, label: &str) -> u64 {
        match label {
            "total_keepalive_limit" => self.keepalive_discards.total_keepalive_limit,
            "per_origin_limit" => self.keepalive_discards.per_origin_limit,
            _ => 0,
        }
    }
}
