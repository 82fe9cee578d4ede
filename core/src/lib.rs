//! Fetch orchestration for fetchd.
//!
//! A [`FetchService`] accepts fetches from isolated originating contexts
//! (page scripts, workers, navigation preloads), runs each through an
//! [`ExecutionDriver`], and publishes the outcome through a
//! [`PromiseBundle`] of three one-shot futures: Available, Timing and End.
//! Side effects for the originating context are redispatched as
//! [`OriginMessage`]s to its [`ActorRouter`].
//!
//! The service is owned by a single control loop (see [`ServiceBuilder`]);
//! callers talk to it through a [`ServiceHandle`].

mod args;
mod context;
mod diagnostics;
mod dispatch;
mod driver;
mod error;
mod instance;
mod keepalive;
mod observer;
mod promise;
mod runtime;
mod service;

#[cfg(test)]
mod test_support;

pub use args::{
    ActorRelease, ContextArgs, FetchArgs, FetchArgsKind, NavigationPreloadArgs, WorkerArgs,
};
pub use context::{Channel, LoadGroup, PerformanceStorage, ResolvedContext};
pub use diagnostics::{Diagnostics, KeepaliveDiscards};
pub use dispatch::{ActorRouter, ChannelActor, DispatchTarget, Envelope, FetchActor, OriginMessage};
pub use driver::{
    DriverEvent, DriverEventSender, DriverEvents, DriverFactory, DriverParams, DriverSink,
    ExecutionDriver, WorkerContext, driver_channel,
};
pub use error::{
    DriverStartError, FetchFailure, InitializationError, LoadGroupError, ServiceError,
};
pub use instance::ExecutionState;
pub use keepalive::{KeepaliveLimit, KeepaliveLimiter};
pub use observer::{NetworkMonitor, NetworkStatus, ShutdownSignal};
pub use promise::{OneShot, PromiseBundle, Rejection, Settlement};
pub use runtime::{ServiceBuilder, ServiceHandle, current_global_service, global_service};
pub use service::{FetchService, ServiceSnapshot};
