//! The control loop and the process-wide service singleton.
//!
//! The control loop is a tokio task that owns the [`FetchService`] value.
//! Caller commands, driver events and observer notifications are all
//! serialised through it. Callers hold a cloneable [`ServiceHandle`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use fetchd_config::KeepaliveConfig;
use fetchd_types::BundleId;

use crate::args::FetchArgs;
use crate::driver::{DriverEvents, DriverFactory};
use crate::error::ServiceError;
use crate::observer::{NetworkMonitor, NetworkStatus, ShutdownSignal};
use crate::promise::PromiseBundle;
use crate::service::{FetchService, ServiceSnapshot};

static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);

static GLOBAL_SERVICE: Mutex<Option<ServiceHandle>> = Mutex::new(None);

enum Command {
    Fetch {
        args: FetchArgs,
        reply: oneshot::Sender<PromiseBundle>,
    },
    Cancel {
        bundle: BundleId,
        force_abort: bool,
    },
    Snapshot {
        reply: oneshot::Sender<ServiceSnapshot>,
    },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Fetch { args, .. } => f
                .debug_struct("Fetch")
                .field("kind", &args.kind())
                .finish_non_exhaustive(),
            Command::Cancel {
                bundle,
                force_abort,
            } => f
                .debug_struct("Cancel")
                .field("bundle", bundle)
                .field("force_abort", force_abort)
                .finish(),
            Command::Snapshot { .. } => f.debug_struct("Snapshot").finish_non_exhaustive(),
        }
    }
}

/// Cloneable entry point to a running fetch service.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
}

impl ServiceHandle {
    /// Start a fetch and return its bundle.
    pub async fn fetch(&self, args: FetchArgs) -> Result<PromiseBundle, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Fetch { args, reply })?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    pub fn cancel_fetch(&self, bundle: &PromiseBundle, force_abort: bool) -> Result<(), ServiceError> {
        self.send(Command::Cancel {
            bundle: bundle.id(),
            force_abort,
        })
    }

    pub async fn snapshot(&self) -> Result<ServiceSnapshot, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply })?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command) -> Result<(), ServiceError> {
        self.commands.send(command).map_err(|_| ServiceError::Stopped)
    }
}

/// Everything needed to start a fetch service.
pub struct ServiceBuilder {
    keepalive: KeepaliveConfig,
    factory: Arc<dyn DriverFactory>,
    network: watch::Receiver<NetworkStatus>,
    shutdown: watch::Receiver<bool>,
}

impl ServiceBuilder {
    #[must_use]
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        network: &NetworkMonitor,
        shutdown: &ShutdownSignal,
    ) -> Self {
        Self {
            keepalive: KeepaliveConfig::default(),
            factory,
            network: network.subscribe(),
            shutdown: shutdown.subscribe(),
        }
    }

    #[must_use]
    pub fn keepalive(mut self, keepalive: KeepaliveConfig) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Register the observers and spawn the control loop.
    ///
    /// Fails without spawning anything if there is no tokio runtime or an
    /// observed source is already closed.
    pub fn spawn(self) -> Result<(ServiceHandle, JoinHandle<()>), ServiceError> {
        self.spawn_with_release(None)
    }

    fn spawn_with_release(
        self,
        on_shutdown: Option<fn(u64)>,
    ) -> Result<(ServiceHandle, JoinHandle<()>), ServiceError> {
        let runtime = Handle::try_current().map_err(|_| ServiceError::NoRuntime)?;
        if self.network.has_changed().is_err() {
            return Err(ServiceError::MonitorClosed);
        }
        if self.shutdown.has_changed().is_err() {
            return Err(ServiceError::ShutdownClosed);
        }

        let status = *self.network.borrow();
        let (service, events) = FetchService::new(self.keepalive, self.factory, status);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let handle = ServiceHandle {
            id: NEXT_SERVICE_ID.fetch_add(1, Ordering::Relaxed),
            commands,
        };

        tracing::info!(
            service = handle.id,
            offline = service.is_offline(),
            "Fetch service started"
        );
        let control = ControlLoop {
            id: handle.id,
            service,
            events,
            commands: commands_rx,
            network: self.network,
            shutdown: self.shutdown,
            on_shutdown,
        };
        let task = runtime.spawn(control.run());
        Ok((handle, task))
    }
}

struct ControlLoop {
    id: u64,
    service: FetchService,
    events: DriverEvents,
    commands: mpsc::UnboundedReceiver<Command>,
    network: watch::Receiver<NetworkStatus>,
    shutdown: watch::Receiver<bool>,
    on_shutdown: Option<fn(u64)>,
}

impl ControlLoop {
    /// Every handle is gone, but fetches already started still owe their
    /// bundles a settlement.
    async fn drain(&mut self) {
        let in_flight = self.service.in_flight_count();
        if in_flight > 0 {
            tracing::debug!(service = self.id, in_flight, "Draining fetches after last handle");
        }
        while self.service.in_flight_count() > 0 {
            match self.events.recv().await {
                Some((instance, event)) => self.service.handle_driver_event(instance, event),
                None => break,
            }
        }
    }

    async fn run(mut self) {
        loop {
            let observing = self.service.is_observing();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some((instance, event)) = self.events.recv() => {
                    self.service.handle_driver_event(instance, event);
                }
                changed = self.network.changed(), if observing => match changed {
                    Ok(()) => {
                        let status = *self.network.borrow_and_update();
                        self.service.observe_network(status);
                    }
                    Err(_) => {
                        tracing::warn!(service = self.id, "Network monitor closed");
                        self.stop_observing();
                    }
                },
                changed = self.shutdown.changed(), if observing => {
                    if changed.is_err() || *self.shutdown.borrow_and_update() {
                        self.stop_observing();
                    }
                }
            }
        }
        self.drain().await;
        tracing::info!(
            service = self.id,
            in_flight = self.service.in_flight_count(),
            "Fetch service stopped"
        );
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Fetch { args, reply } => {
                let bundle = self.service.fetch(args);
                if reply.send(bundle).is_err() {
                    tracing::trace!(service = self.id, "Fetch caller went away");
                }
            }
            Command::Cancel {
                bundle,
                force_abort,
            } => {
                self.service.cancel_fetch_by_id(bundle, force_abort);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.service.snapshot());
            }
        }
    }

    fn stop_observing(&mut self) {
        self.service.observe_shutdown();
        if let Some(release) = self.on_shutdown {
            release(self.id);
        }
    }
}

/// The process-wide service, started on first use.
///
/// `init` is only called when no service is running. If it fails, no
/// singleton is left behind and the error is returned.
pub fn global_service<F>(init: F) -> Result<ServiceHandle, ServiceError>
where
    F: FnOnce() -> ServiceBuilder,
{
    let mut global = GLOBAL_SERVICE
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = global.as_ref()
        && !handle.is_closed()
    {
        return Ok(handle.clone());
    }
    *global = None;
    let (handle, _task) = init().spawn_with_release(Some(release_global))?;
    *global = Some(handle.clone());
    Ok(handle)
}

/// The running global service, if any.
#[must_use]
pub fn current_global_service() -> Option<ServiceHandle> {
    GLOBAL_SERVICE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .filter(|handle| !handle.is_closed())
}

fn release_global(service: u64) {
    let mut global = GLOBAL_SERVICE
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if global.as_ref().is_some_and(|handle| handle.id == service) {
        tracing::debug!(service, "Global fetch service released");
        *global = None;
    }
}
