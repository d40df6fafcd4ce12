//! Combining through the HTTP generator

use std::sync::Arc;
use std::time::Duration;

use kiln_engine::{CombinationOutcome, CombineError, ComputeError};
use kiln_store::Store;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{memory_store, mount_pair, service_for};

#[tokio::test]
async fn water_and_fire_make_steam() {
    let server = MockServer::start().await;
    mount_pair(&server, "Fire", "Water", "Steam", "💨").await;

    let store = memory_store();
    store.seed_starting_elements().unwrap();
    let service = service_for(&server, Arc::clone(&store));

    let first = service.combine("Water", "Fire").await.unwrap();
    assert!(first.is_new_discovery());
    assert_eq!(first.element().unwrap().to_string(), "💨 Steam");

    let second = service.combine("Fire", "Water").await.unwrap();
    assert!(!second.is_new_discovery());
    assert_eq!(second.element(), first.element());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1, "second call is served from the cache");

    let stats = store.stats().unwrap();
    assert_eq!(stats.elements, 5);
    assert_eq!(stats.pairs, 1);
}

#[tokio::test]
async fn nothing_is_cached_as_no_combination() {
    let server = MockServer::start().await;
    mount_pair(&server, "Earth", "Earth", "Nothing", "").await;

    let service = service_for(&server, memory_store());
    for _ in 0..3 {
        assert_eq!(
            service.combine("Earth", "Earth").await.unwrap(),
            CombinationOutcome::NoCombination
        );
    }

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(service.store().stats().unwrap().barren_pairs, 1);
}

#[tokio::test]
async fn server_error_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pair"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_pair(&server, "Fire", "Water", "Steam", "💨").await;

    let service = service_for(&server, memory_store());

    let err = service.combine("Water", "Fire").await.unwrap_err();
    match err {
        CombineError::Compute(ComputeError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "overloaded");
        }
        other => panic!("expected a status error, got {other:?}"),
    }
    assert_eq!(service.store().stats().unwrap().pairs, 0);

    let retried = service.combine("Water", "Fire").await.unwrap();
    assert!(retried.is_new_discovery());
}

#[tokio::test]
async fn results_survive_reopening_the_database() {
    let server = MockServer::start().await;
    mount_pair(&server, "Fire", "Water", "Steam", "💨").await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("kiln.db");

    {
        let store = Arc::new(Store::open(&db).unwrap());
        let service = service_for(&server, store);
        assert!(service.combine("Water", "Fire").await.unwrap().is_new_discovery());
    }

    let store = Arc::new(Store::open(&db).unwrap());
    let service = service_for(&server, store);
    let again = service.combine("Fire", "Water").await.unwrap();
    assert!(!again.is_new_discovery());
    assert_eq!(again.element().unwrap().name.as_str(), "Steam");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_handles_share_one_discovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pair"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"result": "Steam", "emoji": "💨"}))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("kiln.db");

    // Each handle has its own connection, like separate kiln processes.
    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let service = service_for(&server, Arc::new(Store::open(&db).unwrap()));
            tokio::spawn(async move { service.combine("Water", "Fire").await })
        })
        .collect();

    let mut discoveries = 0;
    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.element().unwrap().name.as_str(), "Steam");
        if outcome.is_new_discovery() {
            discoveries += 1;
        }
    }
    assert_eq!(discoveries, 1);

    let stats = Store::open(&db).unwrap().stats().unwrap();
    assert_eq!(stats.pairs, 1);
    assert_eq!(stats.elements, 1);
    assert_eq!(stats.dangling_results, 0);
}

#[tokio::test]
async fn invalid_name_never_reaches_the_server() {
    let server = MockServer::start().await;
    let service = service_for(&server, memory_store());

    let err = service.combine("Water", "Fire\n").await.unwrap_err();
    assert!(matches!(err, CombineError::InvalidIdentifier(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}
