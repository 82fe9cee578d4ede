//! Offline handling and shutdown.

use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use fetchd_config::KeepaliveConfig;
use fetchd_core::{NetworkStatus, OriginMessage};
use fetchd_types::EndReason;

use crate::common::{notifications, page_args, start_service, wait_end, TestContext};

#[tokio::test]
async fn offline_rejects_remote_fetches() {
    let service = start_service(KeepaliveConfig::default(), NetworkStatus::Offline);
    let mut context = TestContext::new();
    let (actor, mut rx) = context.actor();
    context.run();

    let bundle = service
        .handle
        .fetch(page_args("https://remote.test/", false, actor, &context.dispatch))
        .await
        .unwrap();

    assert_eq!(wait_end(&bundle).await, EndReason::Aborted);
    assert!(bundle.available().peek().unwrap().unwrap().is_network_error());
    let messages = notifications(&mut rx).await;
    assert!(matches!(
        messages.as_slice(),
        [
            OriginMessage::ResponseAvailable(response),
            OriginMessage::ResponseEnd(EndReason::Aborted),
        ] if response.is_network_error()
    ));
    let snapshot = service.handle.snapshot().await.unwrap();
    assert!(snapshot.offline);
    assert_eq!(snapshot.diagnostics.offline_rejections, 1);
}

#[tokio::test]
async fn offline_still_allows_loopback_fetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let service = start_service(KeepaliveConfig::default(), NetworkStatus::Offline);
    let mut context = TestContext::new();
    let (actor, _rx) = context.actor();
    context.run();

    let bundle = service
        .handle
        .fetch(page_args(&server.uri(), false, actor, &context.dispatch))
        .await
        .unwrap();
    assert_eq!(wait_end(&bundle).await, EndReason::Normal);
    assert_eq!(bundle.available().peek().unwrap().unwrap().status(), 200);
}

#[tokio::test]
async fn coming_back_online_clears_offline_state() {
    let service = start_service(KeepaliveConfig::default(), NetworkStatus::Offline);
    service.network.set_online();

    // Status changes reach the control loop asynchronously.
    let mut online = false;
    for _ in 0..100 {
        if !service.handle.snapshot().await.unwrap().offline {
            online = true;
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(online);
}

#[tokio::test]
async fn shutdown_stops_observing_network() {
    let service = start_service(KeepaliveConfig::default(), NetworkStatus::Online);
    service.shutdown.trigger();

    let mut stopped = false;
    for _ in 0..100 {
        if !service.handle.snapshot().await.unwrap().observing {
            stopped = true;
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(stopped);

    service.network.set_offline();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!service.handle.snapshot().await.unwrap().offline);
}
