//! Core domain types for fetchd.
//!
//! Pure data shared by every layer: identifiers, principals, requests,
//! responses, timing and originating-context descriptors. No IO, no async.

mod context;
mod ids;
mod principal;
mod request;
mod response;
mod timing;

pub use context::{
    ClientInfo, ClientType, ConsoleReport, ContextError, CookieBehavior, CookieJarSettings,
    SerializedCookieJarSettings, ServiceWorkerDescriptor,
};
pub use ids::{ActorId, BrowsingContextId, BundleId, InstanceId, LoadGroupId};
pub use principal::{Principal, PrincipalError, PrincipalInfo, PrincipalKind, is_loopback_url};
pub use request::{Request, RequestError};
pub use response::{EndReason, Response, ResponseType};
pub use timing::{NAVIGATION_INITIATOR_TYPE, ResponseTiming, TimingData, TimingReport};
