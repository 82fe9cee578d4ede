//! fetchd CLI - runs fetches through the fetch service and prints what the
//! originating context would observe.
//!
//! ```text
//! main() -> global_service(HttpDriverFactory) -> fetch(args) per url
//!              |                                      |
//!              v                                      v
//!       ActorRouter task <- notifications      PromiseBundle end -> outcome
//! ```
//!
//! Every notification and every final outcome is one JSON line on stdout.
//! Logs go to stderr, or to the file named in the config.

mod report;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::future::join_all;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use url::Url;

use fetchd_config::{FetchdConfig, LoggingConfig};
use fetchd_core::{
    ActorRelease, ActorRouter, ContextArgs, DispatchTarget, FetchArgs, NetworkMonitor,
    NetworkStatus, PromiseBundle, ServiceBuilder, ShutdownSignal, WorkerArgs,
    global_service,
};
use fetchd_driver::HttpDriverFactory;
use fetchd_types::{
    ActorId, ClientInfo, ClientType, CookieBehavior, CookieJarSettings, PrincipalInfo, Request,
};

use crate::report::{PrintActor, outcome, print_line};

/// How long to keep routing notifications after the last fetch settled.
const ROUTER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(name = "fetchd", version, about = "Run fetches through the fetch service")]
struct Cli {
    /// Config file (defaults to $FETCHD_CONFIG or ~/.fetchd/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Issue keepalive requests.
    #[arg(long)]
    keepalive: bool,

    /// Origin of the issuing context. Defaults to each url's own origin.
    #[arg(long)]
    origin: Option<Url>,

    /// Issue the fetches from a worker context.
    #[arg(long)]
    worker: bool,

    /// Also report data-available notifications.
    #[arg(long)]
    data: bool,

    /// Treat the context as third-party.
    #[arg(long)]
    third_party: bool,

    /// Cookie policy of the issuing context.
    #[arg(long, value_enum, default_value_t = CookiePolicy::Accept)]
    cookies: CookiePolicy,

    /// Start with the network reported offline.
    #[arg(long)]
    offline: bool,

    /// Request method.
    #[arg(long, short = 'X', default_value = "GET")]
    method: String,

    /// Extra request header, `Name: value`. Repeatable.
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,

    /// Request body.
    #[arg(long)]
    body: Option<String>,

    /// Urls to fetch.
    #[arg(required = true)]
    urls: Vec<Url>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CookiePolicy {
    Accept,
    RejectForeign,
    RejectAll,
}

impl From<CookiePolicy> for CookieBehavior {
    fn from(policy: CookiePolicy) -> Self {
        match policy {
            CookiePolicy::Accept => CookieBehavior::Accept,
            CookiePolicy::RejectForeign => CookieBehavior::RejectForeign,
            CookiePolicy::RejectAll => CookieBehavior::RejectAll,
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logging.filter.as_deref().unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    if let Some(path) = logging.file.as_ref() {
        match open_log_file(path) {
            Ok(file) => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                    .with(env_filter)
                    .init();
                tracing::info!(path = %path.display(), "Logging initialized");
                return;
            }
            Err(e) => eprintln!("Failed to open log file {}: {e}", path.display()),
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn load_config(cli: &Cli) -> Result<FetchdConfig> {
    let config = match cli.config.as_deref() {
        Some(path) => FetchdConfig::load_from(path)?,
        None => FetchdConfig::load()?,
    };
    Ok(config)
}

fn build_request(cli: &Cli, url: &Url) -> Result<Request> {
    let mut request = Request::new(url.clone())
        .with_method(&cli.method)?
        .with_keepalive(cli.keepalive);
    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("header '{header}' is not 'Name: value'"))?;
        request = request.with_header(name.trim(), value.trim())?;
    }
    if let Some(body) = cli.body.as_ref() {
        request = request.with_body(body.clone().into_bytes());
    }
    Ok(request)
}

fn build_args(
    cli: &Cli,
    url: &Url,
    actor: ActorId,
    dispatch: &DispatchTarget,
) -> Result<FetchArgs> {
    let origin = cli.origin.clone().unwrap_or_else(|| url.clone());
    let cookie_jar = CookieJarSettings {
        cookie_behavior: cli.cookies.into(),
        ..CookieJarSettings::default()
    };
    let context = ContextArgs::new(
        build_request(cli, url)?,
        PrincipalInfo::content(origin.as_str()),
        actor,
        dispatch.clone(),
    )
    .with_cookie_jar_settings(cookie_jar.to_serialized())
    .with_data_available(cli.data)
    .with_third_party_context(cli.third_party);

    if !cli.worker {
        return Ok(FetchArgs::MainThread(context));
    }

    let (release, released) = ActorRelease::new();
    tokio::spawn(async move {
        if let Ok(actor) = released.await {
            tracing::info!(%actor, "Worker actor released by keepalive cancel");
        }
    });
    let client = ClientInfo {
        client_type: ClientType::Worker,
        url: origin.clone(),
    };
    Ok(FetchArgs::Worker(
        WorkerArgs::new(context, origin, client).with_actor_release(release),
    ))
}

/// A fetch failed if Available did not resolve to a real response.
fn is_failure(bundle: &PromiseBundle) -> bool {
    !matches!(bundle.available().peek(), Some(Ok(response)) if !response.is_network_error())
}

async fn wait_all(bundles: &[(Url, PromiseBundle)]) {
    join_all(bundles.iter().map(|(_, bundle)| bundle.end().wait())).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.logging);

    let initial = if cli.offline {
        NetworkStatus::Offline
    } else {
        NetworkStatus::Online
    };
    let network = NetworkMonitor::new(initial);
    let shutdown = ShutdownSignal::new();
    let factory = Arc::new(HttpDriverFactory::new(&config.http)?);
    let handle = global_service(|| {
        ServiceBuilder::new(factory, &network, &shutdown).keepalive(config.keepalive)
    })?;

    let (mut router, dispatch) = ActorRouter::new();
    let mut fetches = Vec::with_capacity(cli.urls.len());
    for url in &cli.urls {
        let actor = ActorId::new();
        router.register(actor, Box::new(PrintActor::new(url.clone())));
        fetches.push((url.clone(), build_args(&cli, url, actor, &dispatch)?));
    }
    drop(dispatch);
    let router_task = tokio::spawn(router.run());

    let mut bundles = Vec::with_capacity(fetches.len());
    for (url, args) in fetches {
        bundles.push((url, handle.fetch(args).await?));
    }

    tokio::select! {
        () = wait_all(&bundles) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, cancelling fetches");
            shutdown.trigger();
            for (_, bundle) in &bundles {
                handle.cancel_fetch(bundle, true)?;
            }
            wait_all(&bundles).await;
        }
    }

    let mut failed = false;
    for (url, bundle) in &bundles {
        failed |= is_failure(bundle);
        print_line(&outcome(url, bundle));
    }
    print_line(&serde_json::to_value(handle.snapshot().await?)?);

    if tokio::time::timeout(ROUTER_DRAIN_TIMEOUT, router_task)
        .await
        .is_err()
    {
        tracing::debug!("Notification router still open at exit");
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
