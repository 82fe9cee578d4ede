//! Execution driver boundary.
//!
//! A driver performs one network operation and reports back through a
//! [`DriverSink`]. Events for one instance arrive at most once each, in
//! causal order: response-available, data-available (any number),
//! timing-ready, response-end. Response-end is always the last event.

use tokio::sync::mpsc;
use url::Url;

use fetchd_types::{
    BrowsingContextId, ConsoleReport, CookieJarSettings, EndReason, InstanceId, Principal, Request,
    Response, TimingReport,
};

use crate::context::{LoadGroup, PerformanceStorage};
use crate::error::DriverStartError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    ResponseAvailable(Response),
    DataAvailable,
    /// `None` when the driver has no timing to report.
    TimingReady(Option<TimingReport>),
    ConsoleReport(ConsoleReport),
    NetworkMonitorAlternateStack(u64),
    ResponseEnd(EndReason),
}

impl DriverEvent {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            DriverEvent::ResponseAvailable(_) => "response_available",
            DriverEvent::DataAvailable => "data_available",
            DriverEvent::TimingReady(_) => "timing_ready",
            DriverEvent::ConsoleReport(_) => "console_report",
            DriverEvent::NetworkMonitorAlternateStack(_) => "network_monitor_alternate_stack",
            DriverEvent::ResponseEnd(_) => "response_end",
        }
    }
}

/// Everything a driver needs to run one fetch.
#[derive(Debug, Clone)]
pub struct DriverParams {
    pub request: Request,
    pub principal: Principal,
    pub load_group: LoadGroup,
    pub cookie_jar: Option<CookieJarSettings>,
    pub performance_storage: Option<PerformanceStorage>,
    pub is_third_party_context: Option<bool>,
    pub worker: Option<WorkerContext>,
}

/// Worker-only driver settings.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub worker_script: Url,
    pub client_url: Url,
    pub has_controller: bool,
    pub has_csp_event_listener: bool,
    pub associated_browsing_context_id: Option<BrowsingContextId>,
    pub is_on_3pcb_exception_list: bool,
}

/// Where a driver reports events for its instance.
#[derive(Debug, Clone)]
pub struct DriverSink {
    instance: InstanceId,
    tx: mpsc::UnboundedSender<(InstanceId, DriverEvent)>,
}

impl DriverSink {
    #[must_use]
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Returns false once the service is gone.
    pub fn send(&self, event: DriverEvent) -> bool {
        self.tx.send((self.instance, event)).is_ok()
    }
}

/// Service-side factory for [`DriverSink`]s.
#[derive(Debug, Clone)]
pub struct DriverEventSender {
    tx: mpsc::UnboundedSender<(InstanceId, DriverEvent)>,
}

impl DriverEventSender {
    #[must_use]
    pub fn sink_for(&self, instance: InstanceId) -> DriverSink {
        DriverSink {
            instance,
            tx: self.tx.clone(),
        }
    }
}

/// Receiving end of all driver events, drained by the control loop.
#[derive(Debug)]
pub struct DriverEvents {
    rx: mpsc::UnboundedReceiver<(InstanceId, DriverEvent)>,
}

impl DriverEvents {
    pub async fn recv(&mut self) -> Option<(InstanceId, DriverEvent)> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<(InstanceId, DriverEvent)> {
        self.rx.try_recv().ok()
    }
}

#[must_use]
pub fn driver_channel() -> (DriverEventSender, DriverEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DriverEventSender { tx }, DriverEvents { rx })
}

/// A running network operation.
pub trait ExecutionDriver: Send {
    /// Run the abort algorithm. The driver must follow up with
    /// `ResponseEnd(Aborted)` unless it already reported its end.
    fn abort(&mut self);
}

/// Creates and starts drivers. Must not block: the fetch itself runs on
/// a task of the driver's own.
pub trait DriverFactory: Send + Sync {
    fn start(
        &self,
        params: DriverParams,
        sink: DriverSink,
    ) -> Result<Box<dyn ExecutionDriver>, DriverStartError>;
}
