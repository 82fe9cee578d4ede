//! Fetch arguments: one variant per originating-context shape.

use tokio::sync::oneshot;
use url::Url;

use fetchd_types::{
    ActorId, BrowsingContextId, ClientInfo, PrincipalInfo, Request, SerializedCookieJarSettings,
    ServiceWorkerDescriptor,
};

use crate::context::Channel;
use crate::dispatch::DispatchTarget;

/// How a fetch reached the service.
#[derive(Debug)]
pub enum FetchArgs {
    /// A navigation preload on behalf of a service worker. Nothing is
    /// redispatched; results flow only through the bundle.
    NavigationPreload(NavigationPreloadArgs),
    MainThread(ContextArgs),
    Worker(WorkerArgs),
}

/// Discriminant of [`FetchArgs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchArgsKind {
    NavigationPreload,
    MainThread,
    Worker,
}

impl FetchArgsKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FetchArgsKind::NavigationPreload => "navigation_preload",
            FetchArgsKind::MainThread => "main_thread",
            FetchArgsKind::Worker => "worker",
        }
    }
}

impl FetchArgs {
    #[must_use]
    pub fn kind(&self) -> FetchArgsKind {
        match self {
            FetchArgs::NavigationPreload(_) => FetchArgsKind::NavigationPreload,
            FetchArgs::MainThread(_) => FetchArgsKind::MainThread,
            FetchArgs::Worker(_) => FetchArgsKind::Worker,
        }
    }

    #[must_use]
    pub fn request(&self) -> &Request {
        match self {
            FetchArgs::NavigationPreload(args) => &args.request,
            FetchArgs::MainThread(args) => &args.request,
            FetchArgs::Worker(args) => &args.context.request,
        }
    }

    /// Originating-context fields; absent for navigation preloads.
    #[must_use]
    pub fn context(&self) -> Option<&ContextArgs> {
        match self {
            FetchArgs::NavigationPreload(_) => None,
            FetchArgs::MainThread(args) => Some(args),
            FetchArgs::Worker(args) => Some(&args.context),
        }
    }

    #[must_use]
    pub fn is_navigation_preload(&self) -> bool {
        matches!(self, FetchArgs::NavigationPreload(_))
    }

    #[must_use]
    pub fn is_worker(&self) -> bool {
        matches!(self, FetchArgs::Worker(_))
    }
}

#[derive(Debug)]
pub struct NavigationPreloadArgs {
    pub request: Request,
    pub channel: Channel,
}

/// Fields shared by main-thread and worker fetches.
#[derive(Debug)]
pub struct ContextArgs {
    pub request: Request,
    pub principal_info: PrincipalInfo,
    pub cookie_jar_settings: Option<SerializedCookieJarSettings>,
    pub actor_id: ActorId,
    pub dispatch: DispatchTarget,
    /// Redispatch a notification for every received body chunk.
    pub need_on_data_available: bool,
    pub is_third_party_context: bool,
}

impl ContextArgs {
    #[must_use]
    pub fn new(
        request: Request,
        principal_info: PrincipalInfo,
        actor_id: ActorId,
        dispatch: DispatchTarget,
    ) -> Self {
        Self {
            request,
            principal_info,
            cookie_jar_settings: None,
            actor_id,
            dispatch,
            need_on_data_available: false,
            is_third_party_context: false,
        }
    }

    #[must_use]
    pub fn with_cookie_jar_settings(mut self, settings: SerializedCookieJarSettings) -> Self {
        self.cookie_jar_settings = Some(settings);
        self
    }

    #[must_use]
    pub fn with_data_available(mut self, need: bool) -> Self {
        self.need_on_data_available = need;
        self
    }

    #[must_use]
    pub fn with_third_party_context(mut self, third_party: bool) -> Self {
        self.is_third_party_context = third_party;
        self
    }
}

#[derive(Debug)]
pub struct WorkerArgs {
    pub context: ContextArgs,
    pub worker_script: Url,
    pub client_info: ClientInfo,
    pub controller: Option<ServiceWorkerDescriptor>,
    pub has_csp_event_listener: bool,
    pub associated_browsing_context_id: Option<BrowsingContextId>,
    pub is_on_3pcb_exception_list: bool,
    /// Fired once when the service tears down the actor association of a
    /// keepalive request that outlives its worker.
    pub actor_release: Option<ActorRelease>,
}

impl WorkerArgs {
    #[must_use]
    pub fn new(context: ContextArgs, worker_script: Url, client_info: ClientInfo) -> Self {
        Self {
            context,
            worker_script,
            client_info,
            controller: None,
            has_csp_event_listener: false,
            associated_browsing_context_id: None,
            is_on_3pcb_exception_list: false,
            actor_release: None,
        }
    }

    #[must_use]
    pub fn with_controller(mut self, controller: ServiceWorkerDescriptor) -> Self {
        self.controller = Some(controller);
        self
    }

    #[must_use]
    pub fn with_csp_event_listener(mut self, has_listener: bool) -> Self {
        self.has_csp_event_listener = has_listener;
        self
    }

    #[must_use]
    pub fn with_browsing_context(mut self, id: BrowsingContextId) -> Self {
        self.associated_browsing_context_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_3pcb_exception(mut self, on_list: bool) -> Self {
        self.is_on_3pcb_exception_list = on_list;
        self
    }

    #[must_use]
    pub fn with_actor_release(mut self, release: ActorRelease) -> Self {
        self.actor_release = Some(release);
        self
    }
}

/// One-shot notifier telling a worker its fetch actor may be deleted.
#[derive(Debug)]
pub struct ActorRelease {
    tx: oneshot::Sender<ActorId>,
}

impl ActorRelease {
    /// Create the notifier and the receiver the worker waits on.
    #[must_use]
    pub fn new() -> (Self, oneshot::Receiver<ActorId>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub(crate) fn fire(self, actor: ActorId) {
        if self.tx.send(actor).is_err() {
            tracing::trace!(%actor, "Actor release receiver already gone");
        }
    }
}
