//! Cancelling in-flight fetches.

use std::time::Duration;

use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use fetchd_core::{ActorRelease, FetchArgs, OriginMessage, PromiseBundle, WorkerArgs};
use fetchd_types::{ClientInfo, ClientType, EndReason};

use crate::common::{default_service, notifications, page_args, url_of, wait_end, TestContext};

async fn slow_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn cancel_aborts_in_flight_fetch() {
    let server = slow_server().await;
    let service = default_service();
    let mut context = TestContext::new();
    let (actor, mut rx) = context.actor();
    context.run();

    let bundle = service
        .handle
        .fetch(page_args(&server.uri(), false, actor, &context.dispatch))
        .await
        .unwrap();
    service.handle.cancel_fetch(&bundle, false).unwrap();

    assert_eq!(wait_end(&bundle).await, EndReason::Aborted);
    assert!(bundle.available().peek().unwrap().unwrap().is_network_error());
    assert!(bundle.timing().peek().unwrap().unwrap().is_empty());
    assert_eq!(
        notifications(&mut rx).await,
        vec![OriginMessage::ResponseEnd(EndReason::Aborted)]
    );

    let snapshot = service.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.registered, 0);
    assert_eq!(snapshot.in_flight, 0);
}

#[tokio::test]
async fn keepalive_fetch_survives_soft_cancel() {
    let server = slow_server().await;
    let service = default_service();
    let mut context = TestContext::new();
    let (actor, _rx) = context.actor();
    context.run();

    let bundle = service
        .handle
        .fetch(page_args(&server.uri(), true, actor, &context.dispatch))
        .await
        .unwrap();
    service.handle.cancel_fetch(&bundle, false).unwrap();

    assert_eq!(wait_end(&bundle).await, EndReason::Normal);
    assert_eq!(bundle.available().peek().unwrap().unwrap().status(), 200);
}

#[tokio::test]
async fn keepalive_fetch_aborts_on_forced_cancel() {
    let server = slow_server().await;
    let service = default_service();
    let mut context = TestContext::new();
    let (actor, _rx) = context.actor();
    context.run();

    let bundle = service
        .handle
        .fetch(page_args(&server.uri(), true, actor, &context.dispatch))
        .await
        .unwrap();
    service.handle.cancel_fetch(&bundle, true).unwrap();

    assert_eq!(wait_end(&bundle).await, EndReason::Aborted);
    let snapshot = service.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.keepalive_in_flight, 0);
}

#[tokio::test]
async fn worker_keepalive_cancel_releases_actor() {
    let server = slow_server().await;
    let service = default_service();
    let mut context = TestContext::new();
    let (actor, mut rx) = context.actor();
    context.run();

    let script = url_of("https://page.test", "/worker.js");
    let (release, released) = ActorRelease::new();
    let FetchArgs::MainThread(args) = page_args(&server.uri(), true, actor, &context.dispatch)
    else {
        unreachable!();
    };
    let worker = WorkerArgs::new(
        args,
        script.clone(),
        ClientInfo {
            client_type: ClientType::Worker,
            url: script,
        },
    )
    .with_actor_release(release);

    let bundle = service.handle.fetch(FetchArgs::Worker(worker)).await.unwrap();
    service.handle.cancel_fetch(&bundle, false).unwrap();

    assert_eq!(released.await.unwrap(), actor);
    assert_eq!(wait_end(&bundle).await, EndReason::Normal);

    // Only the alternate-stack notice went out before the actor was released.
    let mut seen = Vec::new();
    while let Ok(message) = rx.try_recv() {
        seen.push(message.kind());
    }
    assert!(seen.iter().all(|kind| *kind == "network_monitor_alternate_stack"));
}

#[tokio::test]
async fn cancel_of_unknown_bundle_is_ignored() {
    let service = default_service();
    let bundle = PromiseBundle::new();
    service.handle.cancel_fetch(&bundle, true).unwrap();
    let snapshot = service.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.registered, 0);
    assert!(!bundle.end().is_settled());
}
