//! Redispatch of fetch side effects onto originating contexts.
//!
//! Each originating context (a page, a worker thread) owns an
//! [`ActorRouter`]. The service holds only a [`DispatchTarget`] and an
//! [`ActorId`]; delivery is fire-and-forget. The router looks the actor up
//! when the message arrives, so messages for actors that were torn down in
//! the meantime are dropped silently.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::mpsc;

use fetchd_types::{ActorId, ConsoleReport, EndReason, Response, ResponseTiming};

/// A notification for the actor that issued a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OriginMessage {
    ResponseAvailable(Response),
    DataAvailable,
    TimingReported(ResponseTiming),
    ResponseEnd(EndReason),
    FlushConsoleReport(Vec<ConsoleReport>),
    NetworkMonitorAlternateStack(u64),
}

impl OriginMessage {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            OriginMessage::ResponseAvailable(_) => "response_available",
            OriginMessage::DataAvailable => "data_available",
            OriginMessage::TimingReported(_) => "timing_reported",
            OriginMessage::ResponseEnd(_) => "response_end",
            OriginMessage::FlushConsoleReport(_) => "flush_console_report",
            OriginMessage::NetworkMonitorAlternateStack(_) => "network_monitor_alternate_stack",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub actor: ActorId,
    pub message: OriginMessage,
}

/// Sending half of an originating context's queue.
#[derive(Debug, Clone)]
pub struct DispatchTarget {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl DispatchTarget {
    /// Queue `message` for `actor`. Returns false if the context is gone.
    pub fn dispatch(&self, actor: ActorId, message: OriginMessage) -> bool {
        let kind = message.kind();
        if self.tx.send(Envelope { actor, message }).is_err() {
            tracing::trace!(%actor, kind, "Originating context closed, message dropped");
            return false;
        }
        true
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiver-side interface of a fetch actor.
pub trait FetchActor: Send {
    fn on_response_available(&mut self, response: Response);

    fn on_data_available(&mut self) {}

    fn on_timing_reported(&mut self, timing: ResponseTiming);

    fn on_response_end(&mut self, reason: EndReason);

    fn on_flush_console_report(&mut self, _reports: Vec<ConsoleReport>) {}

    fn on_network_monitor_alternate_stack(&mut self, _channel_id: u64) {}
}

/// Routes queued messages to live actors of one originating context.
pub struct ActorRouter {
    actors: HashMap<ActorId, Box<dyn FetchActor>>,
    inbox: mpsc::UnboundedReceiver<Envelope>,
}

impl ActorRouter {
    /// Create a router and the target the service dispatches into.
    #[must_use]
    pub fn new() -> (Self, DispatchTarget) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let router = Self {
            actors: HashMap::new(),
            inbox,
        };
        (router, DispatchTarget { tx })
    }

    pub fn register(&mut self, id: ActorId, actor: Box<dyn FetchActor>) {
        if self.actors.insert(id, actor).is_some() {
            tracing::warn!("Actor {id} registered twice, replacing");
        }
    }

    /// Tear down an actor. Messages already queued for it are dropped.
    pub fn unregister(&mut self, id: &ActorId) -> bool {
        self.actors.remove(id).is_some()
    }

    #[must_use]
    pub fn is_registered(&self, id: &ActorId) -> bool {
        self.actors.contains_key(id)
    }

    #[must_use]
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Deliver one envelope. Unknown actors are skipped.
    pub fn route(&mut self, envelope: Envelope) -> bool {
        let Envelope { actor, message } = envelope;
        let Some(target) = self.actors.get_mut(&actor) else {
            tracing::trace!(%actor, kind = message.kind(), "No live actor, message dropped");
            return false;
        };
        match message {
            OriginMessage::ResponseAvailable(response) => target.on_response_available(response),
            OriginMessage::DataAvailable => target.on_data_available(),
            OriginMessage::TimingReported(timing) => target.on_timing_reported(timing),
            OriginMessage::ResponseEnd(reason) => target.on_response_end(reason),
            OriginMessage::FlushConsoleReport(reports) => target.on_flush_console_report(reports),
            OriginMessage::NetworkMonitorAlternateStack(channel_id) => {
                target.on_network_monitor_alternate_stack(channel_id);
            }
        }
        true
    }

    /// Drain queued envelopes without blocking, up to `budget`.
    pub fn poll(&mut self, budget: usize) -> usize {
        let mut count = 0;
        while count < budget {
            match self.inbox.try_recv() {
                Ok(envelope) => {
                    self.route(envelope);
                    count += 1;
                }
                Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => {
                    break;
                }
            }
        }
        count
    }

    /// Wait for and deliver the next envelope. Returns false once every
    /// [`DispatchTarget`] has been dropped.
    pub async fn recv(&mut self) -> bool {
        match self.inbox.recv().await {
            Some(envelope) => {
                self.route(envelope);
                true
            }
            None => false,
        }
    }

    /// Deliver until every [`DispatchTarget`] has been dropped.
    pub async fn run(mut self) {
        while self.recv().await {}
    }
}

/// Actor that forwards every notification into a channel.
pub struct ChannelActor {
    tx: mpsc::UnboundedSender<OriginMessage>,
}

impl ChannelActor {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OriginMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, message: OriginMessage) {
        let _ = self.tx.send(message);
    }
}

impl FetchActor for ChannelActor {
    fn on_response_available(&mut self, response: Response) {
        self.forward(OriginMessage::ResponseAvailable(response));
    }

    fn on_data_available(&mut self) {
        self.forward(OriginMessage::DataAvailable);
    }

    fn on_timing_reported(&mut self, timing: ResponseTiming) {
        self.forward(OriginMessage::TimingReported(timing));
    }

    fn on_response_end(&mut self, reason: EndReason) {
        self.forward(OriginMessage::ResponseEnd(reason));
    }

    fn on_flush_console_report(&mut self, reports: Vec<ConsoleReport>) {
        self.forward(OriginMessage::FlushConsoleReport(reports));
    }

    fn on_network_monitor_alternate_stack(&mut self, channel_id: u64) {
        self.forward(OriginMessage::NetworkMonitorAlternateStack(channel_id));
    }
}
