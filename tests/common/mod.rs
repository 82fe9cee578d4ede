//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use url::Url;

use fetchd_config::{HttpConfig, KeepaliveConfig};
use fetchd_core::{
    ActorRouter, ChannelActor, ContextArgs, DispatchTarget, FetchArgs, NetworkMonitor,
    NetworkStatus, OriginMessage, PromiseBundle, ServiceBuilder, ServiceHandle, ShutdownSignal,
};
use fetchd_driver::HttpDriverFactory;
use fetchd_types::{ActorId, EndReason, PrincipalInfo, Request};

const WAIT: Duration = Duration::from_secs(10);

/// A running service plus the sources it observes.
pub struct TestService {
    pub handle: ServiceHandle,
    pub network: NetworkMonitor,
    pub shutdown: ShutdownSignal,
}

pub fn start_service(keepalive: KeepaliveConfig, status: NetworkStatus) -> TestService {
    let network = NetworkMonitor::new(status);
    let shutdown = ShutdownSignal::new();
    let factory = Arc::new(HttpDriverFactory::new(&HttpConfig::default()).unwrap());
    let (handle, _task) = ServiceBuilder::new(factory, &network, &shutdown)
        .keepalive(keepalive)
        .spawn()
        .unwrap();
    TestService {
        handle,
        network,
        shutdown,
    }
}

pub fn default_service() -> TestService {
    start_service(KeepaliveConfig::default(), NetworkStatus::Online)
}

/// An originating context with its router running on its own task.
pub struct TestContext {
    router: Option<ActorRouter>,
    pub dispatch: DispatchTarget,
}

impl TestContext {
    pub fn new() -> Self {
        let (router, dispatch) = ActorRouter::new();
        Self {
            router: Some(router),
            dispatch,
        }
    }

    /// Register a fresh actor. Must be called before [`Self::run`].
    pub fn actor(&mut self) -> (ActorId, mpsc::UnboundedReceiver<OriginMessage>) {
        let id = ActorId::new();
        let (actor, rx) = ChannelActor::new();
        self.router
            .as_mut()
            .expect("router not yet running")
            .register(id, Box::new(actor));
        (id, rx)
    }

    pub fn run(&mut self) {
        let router = self.router.take().expect("router runs once");
        tokio::spawn(router.run());
    }
}

pub fn page_args(url: &str, keepalive: bool, actor: ActorId, dispatch: &DispatchTarget) -> FetchArgs {
    let request = Request::parse(url).unwrap().with_keepalive(keepalive);
    FetchArgs::MainThread(ContextArgs::new(
        request,
        PrincipalInfo::content("https://page.test/"),
        actor,
        dispatch.clone(),
    ))
}

pub async fn wait_end(bundle: &PromiseBundle) -> EndReason {
    tokio::time::timeout(WAIT, bundle.end().wait())
        .await
        .expect("fetch ended in time")
        .expect("end resolved")
}

/// Notifications up to and including `ResponseEnd`.
pub async fn notifications(rx: &mut mpsc::UnboundedReceiver<OriginMessage>) -> Vec<OriginMessage> {
    let mut out = Vec::new();
    loop {
        let message = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("notification in time")
            .expect("actor channel open");
        let is_end = matches!(message, OriginMessage::ResponseEnd(_));
        out.push(message);
        if is_end {
            return out;
        }
    }
}

pub fn kinds(messages: &[OriginMessage]) -> Vec<&'static str> {
    let mut kinds: Vec<&'static str> = messages.iter().map(OriginMessage::kind).collect();
    kinds.dedup();
    kinds
}

pub fn url_of(base: &str, path: &str) -> Url {
    Url::parse(&format!("{base}{path}")).unwrap()
}
