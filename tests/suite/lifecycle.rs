//! Full fetch lifecycle through the service and the HTTP driver.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fetchd_core::{Channel, FetchArgs, NavigationPreloadArgs, OriginMessage, PerformanceStorage};
use fetchd_types::{EndReason, NAVIGATION_INITIATOR_TYPE, Principal, Request};

use crate::common::{
    default_service, kinds, notifications, page_args, url_of, wait_end, TestContext,
};

#[tokio::test]
async fn successful_fetch_settles_bundle_and_notifies_actor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hello"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let service = default_service();
    let mut context = TestContext::new();
    let (actor, mut rx) = context.actor();
    context.run();

    let url = format!("{}/hello", server.uri());
    let bundle = service
        .handle
        .fetch(page_args(&url, false, actor, &context.dispatch))
        .await
        .unwrap();

    assert_eq!(wait_end(&bundle).await, EndReason::Normal);
    let response = bundle.available().peek().unwrap().unwrap();
    assert_eq!(response.status(), 200);
    assert!(!response.is_network_error());
    let timing = bundle.timing().peek().unwrap().unwrap();
    assert_eq!(timing.initiator_type(), "fetch");
    assert_eq!(timing.data().map(|d| d.response_status), Some(200));

    let messages = notifications(&mut rx).await;
    assert_eq!(
        kinds(&messages),
        vec!["response_available", "timing_reported", "response_end"]
    );
    assert_eq!(
        messages.last(),
        Some(&OriginMessage::ResponseEnd(EndReason::Normal))
    );

    let snapshot = service.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.registered, 0);
    assert_eq!(snapshot.in_flight, 0);
}

#[tokio::test]
async fn error_status_is_not_a_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let service = default_service();
    let mut context = TestContext::new();
    let (actor, _rx) = context.actor();
    context.run();

    let bundle = service
        .handle
        .fetch(page_args(&server.uri(), false, actor, &context.dispatch))
        .await
        .unwrap();
    assert_eq!(wait_end(&bundle).await, EndReason::Normal);
    let response = bundle.available().peek().unwrap().unwrap();
    assert_eq!(response.status(), 503);
    assert!(!response.ok());
}

#[tokio::test]
async fn unreachable_host_resolves_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let service = default_service();
    let mut context = TestContext::new();
    let (actor, mut rx) = context.actor();
    context.run();

    let url = format!("http://127.0.0.1:{port}/");
    let bundle = service
        .handle
        .fetch(page_args(&url, false, actor, &context.dispatch))
        .await
        .unwrap();

    assert_eq!(wait_end(&bundle).await, EndReason::Normal);
    assert!(bundle.available().peek().unwrap().unwrap().is_network_error());
    assert!(bundle.timing().peek().unwrap().unwrap().is_empty());

    let messages = notifications(&mut rx).await;
    assert_eq!(kinds(&messages), vec!["response_available", "response_end"]);
}

#[tokio::test]
async fn data_available_is_redispatched_on_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("body"))
        .mount(&server)
        .await;

    let service = default_service();
    let mut context = TestContext::new();
    let (actor, mut rx) = context.actor();
    context.run();

    let args = match page_args(&server.uri(), false, actor, &context.dispatch) {
        FetchArgs::MainThread(args) => FetchArgs::MainThread(args.with_data_available(true)),
        _ => unreachable!(),
    };
    let bundle = service.handle.fetch(args).await.unwrap();
    wait_end(&bundle).await;

    let messages = notifications(&mut rx).await;
    assert_eq!(
        kinds(&messages),
        vec![
            "response_available",
            "data_available",
            "timing_reported",
            "response_end"
        ]
    );
}

#[tokio::test]
async fn navigation_preload_uses_navigation_timing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("page")
                .set_delay(Duration::from_millis(10)),
        )
        .mount(&server)
        .await;

    let service = default_service();
    let storage = PerformanceStorage::new();
    let target = url_of(&server.uri(), "/page");
    let channel = Channel::new(target.clone())
        .with_result_principal(Principal::content(target.clone()).unwrap())
        .with_performance_storage(storage.clone());
    let args = FetchArgs::NavigationPreload(NavigationPreloadArgs {
        request: Request::new(target),
        channel,
    });

    let bundle = service.handle.fetch(args).await.unwrap();
    assert_eq!(wait_end(&bundle).await, EndReason::Normal);
    let timing = bundle.timing().peek().unwrap().unwrap();
    assert_eq!(timing.initiator_type(), NAVIGATION_INITIATOR_TYPE);
    assert_eq!(storage.len(), 1);
}

#[tokio::test]
async fn preload_without_channel_principal_fails() {
    let service = default_service();
    let target = url_of("https://nav.test", "/");
    let args = FetchArgs::NavigationPreload(NavigationPreloadArgs {
        request: Request::new(target.clone()),
        channel: Channel::new(target),
    });

    let bundle = service.handle.fetch(args).await.unwrap();
    assert_eq!(wait_end(&bundle).await, EndReason::Aborted);
    assert!(bundle.available().peek().unwrap().unwrap().is_network_error());

    let snapshot = service.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.diagnostics.initialization_failures, 1);
}
