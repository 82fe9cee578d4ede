//! One-shot futures and the three-future Promise Bundle.
//!
//! A [`OneShot`] settles at most once. Continuations attached before
//! settlement run when it settles; continuations attached afterwards run
//! immediately with the stored result. Continuations are invoked outside
//! the internal lock, so a continuation may freely touch the same future.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;

use fetchd_types::{BundleId, EndReason, Response, ResponseTiming};

/// Why a future was rejected instead of resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("fetch aborted")]
    Aborted,
    #[error("{0}")]
    Failed(String),
}

pub type Settlement<T> = Result<T, Rejection>;

type Continuation<T> = Box<dyn FnOnce(&Settlement<T>) + Send>;

enum Slot<T> {
    Pending(Vec<Continuation<T>>),
    Settled(Settlement<T>),
}

/// A shared, single-assignment future.
pub struct OneShot<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for OneShot<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for OneShot<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Pending(Vec::new()))),
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for OneShot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneShot")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T: Clone + Send + 'static> OneShot<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve with `value`. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject with `reason`. Returns false if already settled.
    pub fn reject(&self, reason: Rejection) -> bool {
        self.settle(Err(reason))
    }

    fn settle(&self, result: Settlement<T>) -> bool {
        let continuations = {
            let mut slot = self.lock();
            match &mut *slot {
                Slot::Settled(_) => return false,
                Slot::Pending(waiting) => {
                    let waiting = mem::take(waiting);
                    *slot = Slot::Settled(result.clone());
                    waiting
                }
            }
        };
        for continuation in continuations {
            continuation(&result);
        }
        true
    }

    /// Settled either way (resolved or rejected).
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(*self.lock(), Slot::Settled(_))
    }

    /// The stored result, if settled.
    #[must_use]
    pub fn peek(&self) -> Option<Settlement<T>> {
        match &*self.lock() {
            Slot::Settled(result) => Some(result.clone()),
            Slot::Pending(_) => None,
        }
    }

    /// Attach a continuation. Runs immediately when already settled.
    pub fn then<F>(&self, continuation: F)
    where
        F: FnOnce(&Settlement<T>) + Send + 'static,
    {
        let settled = {
            let mut slot = self.lock();
            match &mut *slot {
                Slot::Pending(waiting) => {
                    waiting.push(Box::new(continuation));
                    return;
                }
                Slot::Settled(result) => result.clone(),
            }
        };
        continuation(&settled);
    }

    /// Wait for settlement from any task.
    pub async fn wait(&self) -> Settlement<T> {
        let (tx, rx) = oneshot::channel();
        self.then(move |result| {
            let _ = tx.send(result.clone());
        });
        // The sender only drops unsent if the slot itself is dropped.
        rx.await.unwrap_or(Err(Rejection::Aborted))
    }
}

static NEXT_BUNDLE_ID: AtomicU64 = AtomicU64::new(1);

/// The three futures a fetch publishes: Available, Timing and End.
///
/// Cloning shares the futures; the service keeps one handle and the
/// caller another. Identity is [`BundleId`].
#[derive(Clone, Debug)]
pub struct PromiseBundle {
    id: BundleId,
    available: OneShot<Response>,
    timing: OneShot<ResponseTiming>,
    end: OneShot<EndReason>,
}

impl Default for PromiseBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl PromiseBundle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: BundleId::new(NEXT_BUNDLE_ID.fetch_add(1, Ordering::Relaxed)),
            available: OneShot::new(),
            timing: OneShot::new(),
            end: OneShot::new(),
        }
    }

    /// A bundle already settled as a network error: Available holds the
    /// network-error response, Timing is empty and End is `Aborted`.
    #[must_use]
    pub fn network_error() -> Self {
        let bundle = Self::new();
        bundle.settle_as_network_error();
        bundle
    }

    /// Settle whatever is still pending with the network-error outcome.
    pub(crate) fn settle_as_network_error(&self) {
        self.resolve_available(Response::network_error());
        self.resolve_timing(ResponseTiming::empty());
        self.resolve_end(EndReason::Aborted);
    }

    #[must_use]
    pub fn id(&self) -> BundleId {
        self.id
    }

    #[must_use]
    pub fn available(&self) -> &OneShot<Response> {
        &self.available
    }

    #[must_use]
    pub fn timing(&self) -> &OneShot<ResponseTiming> {
        &self.timing
    }

    #[must_use]
    pub fn end(&self) -> &OneShot<EndReason> {
        &self.end
    }

    pub fn resolve_available(&self, response: Response) -> bool {
        self.available.resolve(response)
    }

    pub fn reject_available(&self, reason: Rejection) -> bool {
        self.available.reject(reason)
    }

    pub fn resolve_timing(&self, timing: ResponseTiming) -> bool {
        self.timing.resolve(timing)
    }

    pub fn reject_timing(&self, reason: Rejection) -> bool {
        self.timing.reject(reason)
    }

    pub fn resolve_end(&self, reason: EndReason) -> bool {
        self.end.resolve(reason)
    }

    pub fn reject_end(&self, reason: Rejection) -> bool {
        self.end.reject(reason)
    }

    #[must_use]
    pub fn is_available_resolved(&self) -> bool {
        self.available.is_settled()
    }

    #[must_use]
    pub fn is_timing_resolved(&self) -> bool {
        self.timing.is_settled()
    }

    #[must_use]
    pub fn is_end_resolved(&self) -> bool {
        self.end.is_settled()
    }
}

impl PartialEq for PromiseBundle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PromiseBundle {}
