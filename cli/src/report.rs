//! JSON-lines output for notifications and outcomes.

use std::io::{self, Write};

use serde_json::{Value, json};
use url::Url;

use fetchd_core::{FetchActor, OriginMessage, PromiseBundle, Rejection, Settlement};
use fetchd_types::{ConsoleReport, EndReason, Response, ResponseTiming};

/// Prints every notification it receives as one JSON line tagged with the
/// request url.
pub struct PrintActor {
    url: Url,
}

impl PrintActor {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    fn emit(&self, message: &OriginMessage) {
        print_line(&json!({
            "url": self.url.as_str(),
            "notification": message,
        }));
    }
}

impl FetchActor for PrintActor {
    fn on_response_available(&mut self, response: Response) {
        self.emit(&OriginMessage::ResponseAvailable(response));
    }

    fn on_data_available(&mut self) {
        self.emit(&OriginMessage::DataAvailable);
    }

    fn on_timing_reported(&mut self, timing: ResponseTiming) {
        self.emit(&OriginMessage::TimingReported(timing));
    }

    fn on_response_end(&mut self, reason: EndReason) {
        self.emit(&OriginMessage::ResponseEnd(reason));
    }

    fn on_flush_console_report(&mut self, reports: Vec<ConsoleReport>) {
        self.emit(&OriginMessage::FlushConsoleReport(reports));
    }

    fn on_network_monitor_alternate_stack(&mut self, channel_id: u64) {
        self.emit(&OriginMessage::NetworkMonitorAlternateStack(channel_id));
    }
}

/// Summary of a settled bundle.
#[must_use]
pub fn outcome(url: &Url, bundle: &PromiseBundle) -> Value {
    let available = settlement_json(bundle.available().peek(), |response| {
        json!({
            "status": response.status(),
            "status_text": response.status_text(),
            "network_error": response.is_network_error(),
            "final_url": response.url().map(Url::as_str),
        })
    });
    let timing = settlement_json(bundle.timing().peek(), |timing| {
        json!({
            "empty": timing.is_empty(),
            "initiator_type": timing.initiator_type(),
            "response_end_ms": timing.data().map(|d| d.response_end.as_millis() as u64),
        })
    });
    let end = settlement_json(bundle.end().peek(), |reason| json!(reason.as_str()));

    json!({
        "url": url.as_str(),
        "bundle": bundle.id(),
        "available": available,
        "timing": timing,
        "end": end,
    })
}

fn settlement_json<T>(settlement: Option<Settlement<T>>, describe: impl FnOnce(&T) -> Value) -> Value {
    match settlement {
        None => json!("pending"),
        Some(Ok(value)) => describe(&value),
        Some(Err(Rejection::Aborted)) => json!({ "rejected": "aborted" }),
        Some(Err(Rejection::Failed(reason))) => json!({ "rejected": reason }),
    }
}

pub fn print_line(value: &Value) {
    let mut stdout = io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{value}") {
        tracing::warn!("Failed to write output: {e}");
    }
}
