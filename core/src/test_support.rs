//! Recording driver factory for service and instance tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use fetchd_types::{
    ActorId, EndReason, PrincipalInfo, Request, Response, TimingData, TimingReport,
};

use crate::args::{ContextArgs, FetchArgs};
use crate::dispatch::{DispatchTarget, OriginMessage};
use crate::driver::{DriverEvent, DriverFactory, DriverParams, DriverSink, ExecutionDriver};
use crate::error::DriverStartError;

pub(crate) struct StartedDriver {
    pub params: DriverParams,
    pub sink: DriverSink,
    pub aborted: Arc<AtomicBool>,
}

#[derive(Default)]
struct MockState {
    started: Vec<StartedDriver>,
    fail_starts: bool,
}

/// Records every driver it starts. Aborting a mock driver reports
/// `ResponseEnd(Aborted)` through its sink, like a real driver would.
#[derive(Clone, Default)]
pub(crate) struct MockFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_starts(&self) {
        self.state.lock().unwrap().fail_starts = true;
    }

    pub fn started(&self) -> usize {
        self.state.lock().unwrap().started.len()
    }

    pub fn sink(&self, index: usize) -> DriverSink {
        self.state.lock().unwrap().started[index].sink.clone()
    }

    pub fn params(&self, index: usize) -> DriverParams {
        self.state.lock().unwrap().started[index].params.clone()
    }

    pub fn was_aborted(&self, index: usize) -> bool {
        self.state.lock().unwrap().started[index]
            .aborted
            .load(Ordering::SeqCst)
    }

    /// Report a successful response with timing and a normal end.
    pub fn complete(&self, index: usize, status: u16) {
        let sink = self.sink(index);
        let url = self.params(index).request.url().clone();
        sink.send(DriverEvent::ResponseAvailable(Response::new(
            status,
            "OK",
            vec![url.clone()],
        )));
        sink.send(DriverEvent::TimingReady(Some(TimingReport {
            initiator_type: "fetch".to_string(),
            entry_name: url.to_string(),
            data: TimingData {
                response_status: status,
                ..Default::default()
            },
        })));
        sink.send(DriverEvent::ResponseEnd(EndReason::Normal));
    }
}

struct MockDriver {
    sink: DriverSink,
    aborted: Arc<AtomicBool>,
}

impl ExecutionDriver for MockDriver {
    fn abort(&mut self) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            self.sink.send(DriverEvent::ResponseEnd(EndReason::Aborted));
        }
    }
}

impl DriverFactory for MockFactory {
    fn start(
        &self,
        params: DriverParams,
        sink: DriverSink,
    ) -> Result<Box<dyn ExecutionDriver>, DriverStartError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_starts {
            return Err(DriverStartError::Other("mock start failure".to_string()));
        }
        let aborted = Arc::new(AtomicBool::new(false));
        state.started.push(StartedDriver {
            params,
            sink: sink.clone(),
            aborted: Arc::clone(&aborted),
        });
        Ok(Box::new(MockDriver { sink, aborted }))
    }
}

/// Main-thread fetch args for a page at `https://a.test/`.
pub(crate) fn page_args(
    url: &str,
    keepalive: bool,
    actor: ActorId,
    target: &DispatchTarget,
) -> FetchArgs {
    let request = Request::parse(url).unwrap().with_keepalive(keepalive);
    FetchArgs::MainThread(ContextArgs::new(
        request,
        PrincipalInfo::content("https://a.test/"),
        actor,
        target.clone(),
    ))
}

pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<OriginMessage>) -> Vec<OriginMessage> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}
