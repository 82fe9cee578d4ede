//! One in-flight fetch.
//!
//! A `FetchInstance` owns its arguments, the context resolved for them, the
//! driver while the network operation runs, and the Promise Bundle it
//! publishes into. Driver events are fed in by the service; each handler
//! redispatches to the originating actor (unless the fetch is a navigation
//! preload or the actor is dying) and then settles the matching future.

use std::mem;

use fetchd_types::{
    ConsoleReport, CookieJarSettings, EndReason, InstanceId, NAVIGATION_INITIATOR_TYPE, Principal,
    Response, ResponseTiming, TimingReport,
};

use crate::args::{ContextArgs, FetchArgs, WorkerArgs};
use crate::context::{LoadGroup, ResolvedContext};
use crate::dispatch::OriginMessage;
use crate::driver::{DriverFactory, DriverParams, DriverSink, ExecutionDriver, WorkerContext};
use crate::error::{FetchFailure, InitializationError};
use crate::keepalive::KeepaliveLimiter;
use crate::promise::PromiseBundle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Created,
    Initialized,
    Executing,
    ResponseAvailable,
    TimingReported,
    Ended,
    Cancelled,
}

impl ExecutionState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, ExecutionState::Ended | ExecutionState::Cancelled)
    }
}

pub(crate) struct FetchInstance {
    id: InstanceId,
    args: FetchArgs,
    context: Option<ResolvedContext>,
    state: ExecutionState,
    response: Option<Response>,
    /// Present exactly while the network operation runs.
    driver: Option<Box<dyn ExecutionDriver>>,
    bundle: PromiseBundle,
    actor_dying: bool,
    console_reports: Vec<ConsoleReport>,
    /// Origin this fetch is counted under in the keepalive limiter.
    /// Taken on release so the slot is returned exactly once.
    keepalive_origin: Option<String>,
}

impl FetchInstance {
    pub(crate) fn new(id: InstanceId, args: FetchArgs, bundle: PromiseBundle) -> Self {
        Self {
            id,
            args,
            context: None,
            state: ExecutionState::Created,
            response: None,
            driver: None,
            bundle,
            actor_dying: false,
            console_reports: Vec::new(),
            keepalive_origin: None,
        }
    }

    pub(crate) fn id(&self) -> InstanceId {
        self.id
    }

    pub(crate) fn bundle(&self) -> &PromiseBundle {
        &self.bundle
    }

    /// Swap in a private bundle so later settlement reaches no caller.
    pub(crate) fn detach_bundle(&mut self) {
        self.bundle = PromiseBundle::new();
    }

    pub(crate) fn state(&self) -> ExecutionState {
        self.state
    }

    /// Whether the request goes to a loopback host. Such fetches survive
    /// the network going offline.
    pub(crate) fn is_local_host_fetch(&self) -> bool {
        self.args.request().targets_loopback()
    }

    /// Resolve principal, load group, cookie jar and (for preloads)
    /// performance storage.
    pub(crate) fn initialize(&mut self) -> Result<(), InitializationError> {
        debug_assert_eq!(self.state, ExecutionState::Created);
        let context = match &self.args {
            FetchArgs::NavigationPreload(args) => {
                let channel = &args.channel;
                let principal = channel
                    .result_principal()
                    .cloned()
                    .ok_or(InitializationError::MissingChannelPrincipal)?;
                let load_group = match channel.load_group() {
                    Some(group) => group.clone(),
                    None => LoadGroup::for_principal(&principal)?,
                };
                ResolvedContext {
                    principal,
                    load_group,
                    cookie_jar: channel.cookie_jar().cloned(),
                    performance_storage: channel.performance_storage().cloned(),
                }
            }
            FetchArgs::MainThread(args) | FetchArgs::Worker(WorkerArgs { context: args, .. }) => {
                resolve_descriptor(args)?
            }
        };
        tracing::debug!(
            instance = %self.id,
            principal = context.principal.ascii_spec(),
            load_group = %context.load_group.id(),
            "Fetch instance initialized"
        );
        self.context = Some(context);
        self.state = ExecutionState::Initialized;
        Ok(())
    }

    /// Admit and start the network operation.
    ///
    /// On error nothing is left running and any keepalive slot taken here
    /// has been returned; the caller settles the bundle.
    pub(crate) fn fetch(
        &mut self,
        keepalive: &mut KeepaliveLimiter,
        factory: &dyn DriverFactory,
        sink: DriverSink,
    ) -> Result<(), FetchFailure> {
        let Some(context) = self.context.as_ref() else {
            return Err(InitializationError::NotInitialized.into());
        };
        let origin = context.principal.origin().to_string();
        let params = driver_params(&self.args, context);

        tracing::debug!(
            instance = %self.id,
            url = %self.args.request().url(),
            principal = context.principal.ascii_spec(),
            "Starting fetch"
        );

        if self.args.request().keepalive() {
            if let Some(limit) = keepalive.exceeded_limit(&origin) {
                return Err(FetchFailure::AdmissionRejected { limit });
            }
            keepalive.increment(&origin);
            self.keepalive_origin = Some(origin);
        }

        match factory.start(params, sink) {
            Ok(driver) => {
                self.driver = Some(driver);
                self.state = ExecutionState::Executing;
                Ok(())
            }
            Err(e) => {
                self.release_keepalive(keepalive);
                Err(e.into())
            }
        }
    }

    /// Settle everything still pending as a network error. Main-thread and
    /// worker actors are told `ResponseAvailable(network error)` followed by
    /// `ResponseEnd(Aborted)`.
    pub(crate) fn fail_with_network_error(&mut self) {
        if let Some(context) = self.redispatch_context() {
            context.dispatch.dispatch(
                context.actor_id,
                OriginMessage::ResponseAvailable(Response::network_error()),
            );
            context
                .dispatch
                .dispatch(context.actor_id, OriginMessage::ResponseEnd(EndReason::Aborted));
        }
        self.bundle.settle_as_network_error();
        self.state = ExecutionState::Ended;
    }

    pub(crate) fn on_response_available(&mut self, response: Response) {
        tracing::debug!(
            instance = %self.id,
            status = response.status(),
            network_error = response.is_network_error(),
            "Response available"
        );
        if let Some(context) = self.redispatch_context() {
            context.dispatch.dispatch(
                context.actor_id,
                OriginMessage::ResponseAvailable(response.clone()),
            );
        }
        self.response = Some(response.clone());
        self.state = ExecutionState::ResponseAvailable;
        self.bundle.resolve_available(response);
    }

    pub(crate) fn on_data_available(&self) {
        if let Some(context) = self.redispatch_context()
            && context.need_on_data_available
        {
            context
                .dispatch
                .dispatch(context.actor_id, OriginMessage::DataAvailable);
        }
    }

    pub(crate) fn on_report_performance_timing(&mut self, report: Option<TimingReport>) {
        if self.bundle.is_timing_resolved() {
            return;
        }
        let Some(report) = report else {
            self.bundle.resolve_timing(ResponseTiming::empty());
            return;
        };

        let mut timing = ResponseTiming::from_report(report);
        if self.args.is_navigation_preload() {
            timing.set_initiator_type(NAVIGATION_INITIATOR_TYPE);
        } else if let Some(context) = self.redispatch_context() {
            context
                .dispatch
                .dispatch(context.actor_id, OriginMessage::TimingReported(timing.clone()));
        }
        self.state = ExecutionState::TimingReported;
        self.bundle.resolve_timing(timing);
    }

    pub(crate) fn on_console_report(&mut self, report: ConsoleReport) {
        self.console_reports.push(report);
    }

    pub(crate) fn on_network_monitor_alternate_stack(&self, channel_id: u64) {
        if !self.args.is_worker() {
            return;
        }
        if let Some(context) = self.redispatch_context() {
            context.dispatch.dispatch(
                context.actor_id,
                OriginMessage::NetworkMonitorAlternateStack(channel_id),
            );
        }
    }

    pub(crate) fn on_response_end(&mut self, reason: EndReason, keepalive: &mut KeepaliveLimiter) {
        tracing::debug!(
            instance = %self.id,
            reason = reason.as_str(),
            status = self.response.as_ref().map_or(0, Response::status),
            "Response end"
        );
        self.release_keepalive(keepalive);

        let reports = mem::take(&mut self.console_reports);
        if let Some(context) = self.redispatch_context() {
            if !reports.is_empty() {
                context
                    .dispatch
                    .dispatch(context.actor_id, OriginMessage::FlushConsoleReport(reports));
            }
            context
                .dispatch
                .dispatch(context.actor_id, OriginMessage::ResponseEnd(reason));
        }

        match reason {
            EndReason::Aborted => {
                self.bundle.resolve_available(Response::network_error());
                self.bundle.resolve_timing(ResponseTiming::empty());
            }
            EndReason::Normal => {
                debug_assert!(
                    self.bundle.is_available_resolved(),
                    "normal end before response available"
                );
                debug_assert!(
                    self.bundle.is_timing_resolved(),
                    "normal end before timing reported"
                );
                if self.bundle.resolve_available(Response::network_error()) {
                    tracing::warn!(instance = %self.id, "Driver ended without a response");
                }
                self.bundle.resolve_timing(ResponseTiming::empty());
            }
        }
        self.bundle.resolve_end(reason);
        self.driver = None;
        self.state = ExecutionState::Ended;
    }

    /// Cancel the fetch.
    ///
    /// Before the driver runs, all three futures settle as aborted here.
    /// A running keepalive fetch is left alone unless `force_abort`; a
    /// worker's actor association is torn down instead. Otherwise the
    /// driver is aborted and settles the futures through its end event.
    pub(crate) fn cancel(&mut self, force_abort: bool) {
        tracing::debug!(instance = %self.id, force_abort, "Cancel");
        let Some(driver) = self.driver.as_mut() else {
            self.bundle.resolve_available(Response::network_error());
            self.bundle.resolve_timing(ResponseTiming::empty());
            self.bundle.resolve_end(EndReason::Aborted);
            self.state = ExecutionState::Cancelled;
            return;
        };

        if self.args.request().keepalive() && !force_abort {
            if let FetchArgs::Worker(worker) = &mut self.args {
                tracing::debug!(instance = %self.id, "Keepalive fetch outlives its worker actor");
                self.actor_dying = true;
                if let Some(release) = worker.actor_release.take() {
                    release.fire(worker.context.actor_id);
                }
            }
            return;
        }

        driver.abort();
    }

    fn release_keepalive(&mut self, keepalive: &mut KeepaliveLimiter) {
        if let Some(origin) = self.keepalive_origin.take() {
            keepalive.decrement(&origin);
        }
    }

    /// The context to redispatch into, if redispatch applies.
    fn redispatch_context(&self) -> Option<&ContextArgs> {
        if self.actor_dying {
            return None;
        }
        self.args.context()
    }
}

fn resolve_descriptor(args: &ContextArgs) -> Result<ResolvedContext, InitializationError> {
    let principal = Principal::from_info(&args.principal_info)?;
    let load_group = LoadGroup::for_principal(&principal)?;
    let cookie_jar = args
        .cookie_jar_settings
        .as_ref()
        .map(CookieJarSettings::from_serialized)
        .transpose()?;
    Ok(ResolvedContext {
        principal,
        load_group,
        cookie_jar,
        performance_storage: None,
    })
}

fn driver_params(args: &FetchArgs, context: &ResolvedContext) -> DriverParams {
    let worker = match args {
        FetchArgs::Worker(worker) => Some(WorkerContext {
            worker_script: worker.worker_script.clone(),
            client_url: worker.client_info.url.clone(),
            has_controller: worker.controller.is_some(),
            has_csp_event_listener: worker.has_csp_event_listener,
            associated_browsing_context_id: worker.associated_browsing_context_id,
            is_on_3pcb_exception_list: worker.is_on_3pcb_exception_list,
        }),
        FetchArgs::NavigationPreload(_) | FetchArgs::MainThread(_) => None,
    };
    DriverParams {
        request: args.request().clone(),
        principal: context.principal.clone(),
        load_group: context.load_group.clone(),
        cookie_jar: context.cookie_jar.clone(),
        performance_storage: context.performance_storage.clone(),
        is_third_party_context: args.context().map(|context| context.is_third_party_context),
        worker,
    }
}
