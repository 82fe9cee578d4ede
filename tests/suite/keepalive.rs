//! Keepalive admission control against a live server.

use std::time::Duration;

use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use fetchd_config::{FetchdConfig, KeepaliveConfig};
use fetchd_core::NetworkStatus;
use fetchd_types::EndReason;

use crate::common::{page_args, start_service, wait_end, TestContext};

#[tokio::test]
async fn per_origin_limit_rejects_excess_keepalive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;

    let service = start_service(
        KeepaliveConfig {
            total_request_limit: 10,
            request_limit_per_origin: 1,
        },
        NetworkStatus::Online,
    );
    let mut context = TestContext::new();
    let (first_actor, _first) = context.actor();
    let (second_actor, _second) = context.actor();
    let (third_actor, _third) = context.actor();
    context.run();

    let first = service
        .handle
        .fetch(page_args(&server.uri(), true, first_actor, &context.dispatch))
        .await
        .unwrap();
    let second = service
        .handle
        .fetch(page_args(&server.uri(), true, second_actor, &context.dispatch))
        .await
        .unwrap();

    assert_eq!(wait_end(&second).await, EndReason::Aborted);
    assert!(second.available().peek().unwrap().unwrap().is_network_error());
    let snapshot = service.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.diagnostics.keepalive_discards.per_origin_limit, 1);
    assert_eq!(snapshot.keepalive_in_flight, 1);

    assert_eq!(wait_end(&first).await, EndReason::Normal);
    let third = service
        .handle
        .fetch(page_args(&server.uri(), true, third_actor, &context.dispatch))
        .await
        .unwrap();
    assert_eq!(wait_end(&third).await, EndReason::Normal);
    assert_eq!(service.handle.snapshot().await.unwrap().keepalive_in_flight, 0);
}

#[tokio::test]
async fn limits_from_config_file_apply() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[keepalive]\ntotal_request_limit = 0\nrequest_limit_per_origin = 5\n",
    )
    .unwrap();
    let config = FetchdConfig::load_from(&path).unwrap();

    let service = start_service(config.keepalive, NetworkStatus::Online);
    let mut context = TestContext::new();
    let (actor, _rx) = context.actor();
    context.run();

    let bundle = service
        .handle
        .fetch(page_args("http://127.0.0.1:9/", true, actor, &context.dispatch))
        .await
        .unwrap();
    assert_eq!(wait_end(&bundle).await, EndReason::Aborted);
    let snapshot = service.handle.snapshot().await.unwrap();
    assert_eq!(
        snapshot.diagnostics.keepalive_discards.total_keepalive_limit,
        1
    );
}
