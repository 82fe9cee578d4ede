//! Resource timing reported through the Timing future.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Initiator type forced onto navigation-preload timing entries.
pub const NAVIGATION_INITIATOR_TYPE: &str = "navigation";

/// Raw timing measured by an execution driver. Offsets are relative to the
/// moment the driver started the fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingData {
    pub request_start: Duration,
    pub response_start: Duration,
    pub response_end: Duration,
    pub transfer_size: u64,
    pub encoded_body_size: u64,
    pub decoded_body_size: u64,
    pub response_status: u16,
    pub redirect_count: u32,
}

/// What a driver hands over when timing becomes available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingReport {
    pub initiator_type: String,
    pub entry_name: String,
    pub data: TimingData,
}

/// Timing as resolved on the Timing future.
///
/// The default value is the "empty" timing used for failed and aborted
/// fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTiming {
    initiator_type: String,
    entry_name: String,
    data: Option<TimingData>,
}

impl ResponseTiming {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_report(report: TimingReport) -> Self {
        Self {
            initiator_type: report.initiator_type,
            entry_name: report.entry_name,
            data: Some(report.data),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    #[must_use]
    pub fn initiator_type(&self) -> &str {
        &self.initiator_type
    }

    pub fn set_initiator_type(&mut self, initiator_type: impl Into<String>) {
        self.initiator_type = initiator_type.into();
    }

    #[must_use]
    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    #[must_use]
    pub fn data(&self) -> Option<&TimingData> {
        self.data.as_ref()
    }
}
