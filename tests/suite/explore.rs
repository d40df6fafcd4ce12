//! Exploration against the HTTP generator

use std::sync::Arc;
use std::time::Duration;

use kiln_engine::{ExploreError, ExploreSettings, Explorer, StopReason};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{memory_store, service_for};

fn quick() -> ExploreSettings {
    ExploreSettings {
        interval: Duration::ZERO,
        max_consecutive_failures: 2,
    }
}

#[tokio::test]
async fn inert_world_is_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pair"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": "Nothing"})),
        )
        .mount(&server)
        .await;

    let store = memory_store();
    store.seed_starting_elements().unwrap();
    let explorer = Explorer::new(Arc::new(service_for(&server, Arc::clone(&store))), quick());

    let report = explorer.run(None).await.unwrap();
    assert_eq!(report.stop, StopReason::Exhausted);
    assert_eq!(report.attempts, 10, "four elements give ten unordered pairs");
    assert_eq!(server.received_requests().await.unwrap().len(), 10);
    assert_eq!(store.stats().unwrap().barren_pairs, 10);
}

#[tokio::test]
async fn unreachable_generator_stops_exploration() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pair"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = memory_store();
    store.seed_starting_elements().unwrap();
    let explorer = Explorer::new(Arc::new(service_for(&server, Arc::clone(&store))), quick());

    let err = explorer.run(Some(10)).await.unwrap_err();
    assert!(matches!(err, ExploreError::TooManyFailures { failures: 2, .. }));
    assert_eq!(store.stats().unwrap().pairs, 0);
}
