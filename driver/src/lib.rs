//! HTTP execution driver for fetchd.
//!
//! [`HttpDriverFactory`] starts one tokio task per fetch. The task sends the
//! request with a shared `reqwest::Client`, reports the response head as
//! soon as it arrives, drains the body (one data-available event per
//! chunk), then reports timing and the end of the fetch.
//!
//! A transport failure before any response is reported as a network-error
//! response followed by a normal end; only [`ExecutionDriver::abort`]
//! produces an `Aborted` end.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use futures_util::future::{AbortHandle, Abortable};
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, redirect};
use thiserror::Error;
use tokio::runtime::Handle;
use url::Url;

use fetchd_config::HttpConfig;
use fetchd_core::{
    DriverEvent, DriverFactory, DriverParams, DriverSink, DriverStartError, ExecutionDriver,
};
use fetchd_types::{
    ConsoleReport, CookieBehavior, EndReason, Response, ResponseTiming, TimingData, TimingReport,
};

/// Initiator type of timing entries produced by this driver.
pub const FETCH_INITIATOR_TYPE: &str = "fetch";

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum DriverBuildError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Starts [`HttpDriver`]s on the current tokio runtime.
#[derive(Debug, Clone)]
pub struct HttpDriverFactory {
    client: Client,
}

impl HttpDriverFactory {
    pub fn new(config: &HttpConfig) -> Result<Self, DriverBuildError> {
        Ok(Self::with_client(build_client(config)?))
    }

    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn build_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let redirects = if config.max_redirects == 0 {
        redirect::Policy::none()
    } else {
        redirect::Policy::limited(config.max_redirects)
    };
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(redirects);
    if let Some(timeout) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(timeout));
    }
    if let Some(user_agent) = config.resolved_user_agent() {
        builder = builder.user_agent(user_agent);
    }
    builder.build()
}

impl DriverFactory for HttpDriverFactory {
    fn start(
        &self,
        params: DriverParams,
        sink: DriverSink,
    ) -> Result<Box<dyn ExecutionDriver>, DriverStartError> {
        let scheme = params.request.url().scheme();
        if scheme != "http" && scheme != "https" {
            return Err(DriverStartError::UnsupportedScheme(scheme.to_string()));
        }
        let runtime = Handle::try_current().map_err(|_| DriverStartError::NoRuntime)?;

        let ended = Arc::new(AtomicBool::new(false));
        let (abort_handle, registration) = AbortHandle::new_pair();
        let task = run_fetch(
            self.client.clone(),
            params,
            sink.clone(),
            Arc::clone(&ended),
        );
        runtime.spawn(async move {
            let _ = Abortable::new(task, registration).await;
        });

        Ok(Box::new(HttpDriver {
            sink,
            abort_handle,
            ended,
        }))
    }
}

/// One running HTTP fetch.
pub struct HttpDriver {
    sink: DriverSink,
    abort_handle: AbortHandle,
    /// Set by whichever side reports the end first.
    ended: Arc<AtomicBool>,
}

impl ExecutionDriver for HttpDriver {
    fn abort(&mut self) {
        self.abort_handle.abort();
        if !self.ended.swap(true, Ordering::SeqCst) {
            tracing::debug!(instance = %self.sink.instance(), "HTTP fetch aborted");
            self.sink.send(DriverEvent::ResponseEnd(EndReason::Aborted));
        }
    }
}

impl Drop for HttpDriver {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

/// Whether the cookie-jar settings forbid sending cookies on this request.
fn cookies_blocked(params: &DriverParams) -> bool {
    let Some(jar) = params.cookie_jar.as_ref() else {
        return false;
    };
    match jar.cookie_behavior {
        CookieBehavior::RejectAll => true,
        CookieBehavior::RejectForeign => params.is_third_party_context == Some(true),
        CookieBehavior::Accept
        | CookieBehavior::RejectTrackers
        | CookieBehavior::RejectTrackersAndPartitionForeign => false,
    }
}

fn build_request(client: &Client, params: &DriverParams) -> Result<reqwest::Request, String> {
    let request = &params.request;
    let method = Method::from_bytes(request.method().as_bytes()).map_err(|e| e.to_string())?;
    let strip_cookies = cookies_blocked(params);

    let mut headers = HeaderMap::new();
    for (name, value) in request.headers() {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| e.to_string())?;
        if strip_cookies && name == COOKIE {
            continue;
        }
        let value = HeaderValue::from_str(value).map_err(|e| e.to_string())?;
        headers.append(name, value);
    }

    let mut builder = client
        .request(method, request.url().clone())
        .headers(headers);
    if let Some(body) = request.body() {
        builder = builder.body(body.to_vec());
    }
    builder.build().map_err(|e| e.to_string())
}

async fn run_fetch(client: Client, params: DriverParams, sink: DriverSink, ended: Arc<AtomicBool>) {
    let started = Instant::now();
    let url = params.request.url().clone();
    let instance = sink.instance();

    if params.worker.is_some() {
        sink.send(DriverEvent::NetworkMonitorAlternateStack(
            NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
        ));
    }

    let request = match build_request(&client, &params) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(%instance, url = %url, "Invalid request: {e}");
            report_network_error(&sink, &ended);
            return;
        }
    };

    let response = match client.execute(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(%instance, url = %url, "Fetch failed: {e}");
            report_network_error(&sink, &ended);
            return;
        }
    };

    let response_start = started.elapsed();
    let status = response.status();
    let final_url = response.url().clone();
    let redirect_count = u32::from(final_url != url);
    let url_list = if final_url == url {
        vec![url.clone()]
    } else {
        vec![url.clone(), final_url.clone()]
    };
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let content_length = response.content_length();

    tracing::debug!(%instance, url = %url, status = status.as_u16(), "Response head received");
    sink.send(DriverEvent::ResponseAvailable(
        Response::new(
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
            url_list,
        )
        .with_headers(headers),
    ));

    let mut body_bytes = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                body_bytes += chunk.len() as u64;
                sink.send(DriverEvent::DataAvailable);
            }
            Err(e) => {
                tracing::debug!(%instance, url = %url, "Body read failed: {e}");
                sink.send(DriverEvent::ConsoleReport(body_error_report(&final_url, &e)));
                break;
            }
        }
    }

    let report = TimingReport {
        initiator_type: FETCH_INITIATOR_TYPE.to_string(),
        entry_name: url.to_string(),
        data: TimingData {
            request_start: Duration::ZERO,
            response_start,
            response_end: started.elapsed(),
            transfer_size: content_length.unwrap_or(body_bytes),
            encoded_body_size: content_length.unwrap_or(body_bytes),
            decoded_body_size: body_bytes,
            response_status: status.as_u16(),
            redirect_count,
        },
    };
    if let Some(storage) = params.performance_storage.as_ref() {
        storage.add_entry(ResponseTiming::from_report(report.clone()));
    }
    sink.send(DriverEvent::TimingReady(Some(report)));
    finish(&sink, &ended);
}

fn body_error_report(url: &Url, error: &reqwest::Error) -> ConsoleReport {
    ConsoleReport {
        category: "Fetch".to_string(),
        message_name: "BodyReadFailed".to_string(),
        params: vec![error.to_string()],
        source_url: Some(url.clone()),
        line: 0,
        column: 0,
    }
}

fn report_network_error(sink: &DriverSink, ended: &AtomicBool) {
    sink.send(DriverEvent::ResponseAvailable(Response::network_error()));
    sink.send(DriverEvent::TimingReady(None));
    finish(sink, ended);
}

fn finish(sink: &DriverSink, ended: &AtomicBool) {
    if !ended.swap(true, Ordering::SeqCst) {
        sink.send(DriverEvent::ResponseEnd(EndReason::Normal));
    }
}
