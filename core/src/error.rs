//! Error types for the fetch service.
//!
//! None of these reach a caller of `fetch` directly: every failure is
//! normalised into a network-error bundle. They surface through tracing
//! and the service diagnostics.

use thiserror::Error;

use fetchd_types::{ContextError, PrincipalError};

use crate::keepalive::KeepaliveLimit;

#[derive(Debug, Error)]
pub enum LoadGroupError {
    #[error("a null principal cannot own a load group")]
    NullPrincipal,
}

/// Resolving principal, load group or cookie jar for a fetch failed.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("invalid principal: {0}")]
    Principal(#[from] PrincipalError),
    #[error("channel has no result principal")]
    MissingChannelPrincipal,
    #[error("load group: {0}")]
    LoadGroup(#[from] LoadGroupError),
    #[error("cookie jar: {0}")]
    CookieJar(#[from] ContextError),
    #[error("fetch started before initialization")]
    NotInitialized,
}

/// The execution driver could not be started.
#[derive(Debug, Clone, Error)]
pub enum DriverStartError {
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("no async runtime available to run the driver")]
    NoRuntime,
    #[error("{0}")]
    Other(String),
}

/// Why a fetch resolved as a network error.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("initialization failed: {0}")]
    Initialization(#[from] InitializationError),
    #[error("keepalive request rejected: {} reached", limit.as_str())]
    AdmissionRejected { limit: KeepaliveLimit },
    #[error("network is offline")]
    Offline,
    #[error("driver failed to start: {0}")]
    DriverStart(#[from] DriverStartError),
    #[error("fetch aborted")]
    Aborted,
    #[error("bundle already registered")]
    DuplicateRegistration,
}

impl FetchFailure {
    /// Stable label for logs and diagnostics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FetchFailure::Initialization(_) => "initialization",
            FetchFailure::AdmissionRejected { .. } => "admission_rejected",
            FetchFailure::Offline => "offline",
            FetchFailure::DriverStart(_) => "driver_start",
            FetchFailure::Aborted => "aborted",
            FetchFailure::DuplicateRegistration => "duplicate_registration",
        }
    }
}

/// Starting or talking to the service control loop failed.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no tokio runtime is running")]
    NoRuntime,
    #[error("network status monitor is closed")]
    MonitorClosed,
    #[error("shutdown signal is closed")]
    ShutdownClosed,
    #[error("fetch service has stopped")]
    Stopped,
}
