//! The fetch service: registry, keepalive admission and network-status
//! handling.
//!
//! A `FetchService` value is owned by exactly one control context. Every
//! operation takes `&mut self`; there is no interior locking. Driver
//! events come back through [`DriverEvents`], which the owner drains into
//! [`FetchService::handle_driver_event`].
//!
//! Two maps track instances. The registry (bundle id to instance id) holds
//! fetches a caller may still cancel; removal from it is the cancellation
//! transition. The instance table holds every instance whose driver has
//! not yet ended, registered or not, so that aborted drivers can still
//! settle their futures.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use serde::Serialize;

use fetchd_config::KeepaliveConfig;
use fetchd_types::{BundleId, InstanceId};

use crate::args::FetchArgs;
use crate::diagnostics::Diagnostics;
use crate::driver::{DriverEvent, DriverEventSender, DriverEvents, DriverFactory, driver_channel};
use crate::error::FetchFailure;
use crate::instance::FetchInstance;
use crate::keepalive::KeepaliveLimiter;
use crate::observer::NetworkStatus;
use crate::promise::PromiseBundle;

/// Point-in-time view of the service, for logging and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSnapshot {
    pub registered: usize,
    pub in_flight: usize,
    pub keepalive_in_flight: u32,
    pub offline: bool,
    pub observing: bool,
    pub diagnostics: Diagnostics,
}

pub struct FetchService {
    registry: HashMap<BundleId, InstanceId>,
    instances: HashMap<InstanceId, FetchInstance>,
    keepalive: KeepaliveLimiter,
    offline: bool,
    observing: bool,
    factory: Arc<dyn DriverFactory>,
    driver_events: DriverEventSender,
    next_instance_id: u64,
    diagnostics: Diagnostics,
}

impl FetchService {
    /// Create a service observing `status` as the current network state.
    /// The returned receiver carries every driver event; hand it back via
    /// [`FetchService::poll_driver_events`] or the control loop.
    #[must_use]
    pub fn new(
        keepalive: KeepaliveConfig,
        factory: Arc<dyn DriverFactory>,
        status: NetworkStatus,
    ) -> (Self, DriverEvents) {
        let (driver_events, events_rx) = driver_channel();
        let service = Self {
            registry: HashMap::new(),
            instances: HashMap::new(),
            keepalive: KeepaliveLimiter::new(keepalive),
            offline: status.is_offline(),
            observing: true,
            factory,
            driver_events,
            next_instance_id: 1,
            diagnostics: Diagnostics::default(),
        };
        (service, events_rx)
    }

    /// Start a fetch. Always returns a bundle; every failure resolves it as
    /// a network error.
    pub fn fetch(&mut self, args: FetchArgs) -> PromiseBundle {
        self.start_instance(args, PromiseBundle::new())
    }

    pub(crate) fn start_instance(&mut self, args: FetchArgs, bundle: PromiseBundle) -> PromiseBundle {
        let id = InstanceId::new(self.next_instance_id);
        self.next_instance_id += 1;
        tracing::debug!(
            instance = %id,
            kind = args.kind().as_str(),
            url = %args.request().url(),
            keepalive = args.request().keepalive(),
            "Fetch"
        );

        let mut instance = FetchInstance::new(id, args, bundle);
        if let Err(e) = instance.initialize() {
            return self.reject(instance, e.into());
        }

        if self.offline && !instance.is_local_host_fetch() {
            return self.reject(instance, FetchFailure::Offline);
        }

        let sink = self.driver_events.sink_for(id);
        if let Err(failure) = instance.fetch(&mut self.keepalive, self.factory.as_ref(), sink) {
            return self.reject(instance, failure);
        }

        let bundle = instance.bundle().clone();
        if !bundle.is_available_resolved() {
            match self.registry.entry(bundle.id()) {
                Entry::Occupied(_) => {
                    tracing::warn!(instance = %id, bundle = %bundle.id(), "Bundle already registered");
                    self.diagnostics.record(&FetchFailure::DuplicateRegistration);
                    // The orphan must not settle the registered fetch's
                    // bundle; it drains through the instance table.
                    instance.detach_bundle();
                    instance.cancel(true);
                    self.instances.insert(id, instance);
                    return PromiseBundle::network_error();
                }
                Entry::Vacant(entry) => {
                    entry.insert(id);
                }
            }
        }
        self.instances.insert(id, instance);
        bundle
    }

    fn reject(&mut self, mut instance: FetchInstance, failure: FetchFailure) -> PromiseBundle {
        tracing::warn!(
            instance = %instance.id(),
            cause = failure.as_str(),
            "Fetch resolved as network error: {failure}"
        );
        self.diagnostics.record(&failure);
        instance.fail_with_network_error();
        instance.bundle().clone()
    }

    /// Cancel the fetch behind `bundle`. Returns false if it is not
    /// registered (already ended, cancelled or never admitted).
    pub fn cancel_fetch(&mut self, bundle: &PromiseBundle, force_abort: bool) -> bool {
        self.cancel_fetch_by_id(bundle.id(), force_abort)
    }

    pub fn cancel_fetch_by_id(&mut self, bundle: BundleId, force_abort: bool) -> bool {
        // Unregister before cancelling: the instance may settle its
        // futures synchronously.
        let Some(instance_id) = self.registry.remove(&bundle) else {
            tracing::trace!(%bundle, "Cancel for unregistered bundle ignored");
            return false;
        };
        tracing::debug!(%bundle, instance = %instance_id, force_abort, "Cancel fetch");
        if let Some(instance) = self.instances.get_mut(&instance_id) {
            instance.cancel(force_abort);
            if instance.state().is_terminal() {
                self.instances.remove(&instance_id);
            }
        }
        true
    }

    /// Apply one driver event to its instance.
    pub fn handle_driver_event(&mut self, instance_id: InstanceId, event: DriverEvent) {
        let Some(instance) = self.instances.get_mut(&instance_id) else {
            tracing::trace!(
                instance = %instance_id,
                kind = event.kind(),
                "Driver event for finished instance dropped"
            );
            return;
        };

        match event {
            DriverEvent::ResponseAvailable(response) => instance.on_response_available(response),
            DriverEvent::DataAvailable => instance.on_data_available(),
            DriverEvent::TimingReady(report) => instance.on_report_performance_timing(report),
            DriverEvent::ConsoleReport(report) => instance.on_console_report(report),
            DriverEvent::NetworkMonitorAlternateStack(channel_id) => {
                instance.on_network_monitor_alternate_stack(channel_id);
            }
            DriverEvent::ResponseEnd(reason) => {
                instance.on_response_end(reason, &mut self.keepalive);
                let bundle = instance.bundle().id();
                // State-as-location: leaving both maps is the end of the fetch.
                self.instances.remove(&instance_id);
                if self.registry.get(&bundle) == Some(&instance_id) {
                    self.registry.remove(&bundle);
                }
            }
        }
    }

    /// Drain pending driver events without blocking, up to `budget`.
    pub fn poll_driver_events(&mut self, events: &mut DriverEvents, budget: usize) -> usize {
        let mut count = 0;
        while count < budget {
            let Some((instance, event)) = events.try_recv() else {
                break;
            };
            self.handle_driver_event(instance, event);
            count += 1;
        }
        count
    }

    /// Network status notification. Going offline force-cancels and
    /// unregisters every fetch that is not to a loopback host.
    pub fn observe_network(&mut self, status: NetworkStatus) {
        if !self.observing {
            tracing::trace!(?status, "Network status ignored after shutdown");
            return;
        }
        match status {
            NetworkStatus::Online => {
                if self.offline {
                    tracing::info!("Network online");
                }
                self.offline = false;
            }
            NetworkStatus::Offline => {
                tracing::info!(registered = self.registry.len(), "Network offline");
                self.offline = true;
                let doomed: Vec<BundleId> = self
                    .registry
                    .iter()
                    .filter(|(_, instance_id)| {
                        !self
                            .instances
                            .get(instance_id)
                            .is_some_and(FetchInstance::is_local_host_fetch)
                    })
                    .map(|(bundle, _)| *bundle)
                    .collect();
                for bundle in doomed {
                    self.cancel_fetch_by_id(bundle, true);
                }
            }
        }
    }

    /// Shutdown notification: stop observing. Running fetches are left to
    /// finish.
    pub fn observe_shutdown(&mut self) {
        if self.observing {
            tracing::info!(in_flight = self.instances.len(), "Fetch service shutting down");
        }
        self.observing = false;
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    #[must_use]
    pub fn is_observing(&self) -> bool {
        self.observing
    }

    #[must_use]
    pub fn is_registered(&self, bundle: &PromiseBundle) -> bool {
        self.registry.contains_key(&bundle.id())
    }

    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }

    /// Instances whose driver has not yet ended.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn keepalive(&self) -> &KeepaliveLimiter {
        &self.keepalive
    }

    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    #[must_use]
    pub fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            registered: self.registry.len(),
            in_flight: self.instances.len(),
            keepalive_in_flight: self.keepalive.total(),
            offline: self.offline,
            observing: self.observing,
            diagnostics: self.diagnostics,
        }
    }

    #[cfg(test)]
    fn instance_for(&self, bundle: &PromiseBundle) -> Option<&FetchInstance> {
        let id = self.registry.get(&bundle.id())?;
        self.instances.get(id)
    }
}
