//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use kiln_engine::CombinationService;
use kiln_providers::{HttpGenerator, HttpGeneratorConfig, RetryConfig};
use kiln_store::Store;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mount a `/pair` answer for one canonical pair.
///
/// `first` must sort before or equal to `second`, as the generator always
/// sends the canonical order.
pub async fn mount_pair(server: &MockServer, first: &str, second: &str, result: &str, emoji: &str) {
    Mock::given(method("GET"))
        .and(path("/pair"))
        .and(query_param("first", first))
        .and(query_param("second", second))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": result,
            "emoji": emoji,
            "isNew": false
        })))
        .mount(server)
        .await;
}

/// Generator config pointed at a mock server, with millisecond retries.
pub fn generator_config(server: &MockServer) -> HttpGeneratorConfig {
    HttpGeneratorConfig {
        base_url: Url::parse(&server.uri()).expect("mock server URI"),
        timeout: Duration::from_secs(2),
        retry: RetryConfig {
            max_retries: 0,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_factor: 0.0,
        },
        ..HttpGeneratorConfig::default()
    }
}

pub fn service_for(server: &MockServer, store: Arc<Store>) -> CombinationService {
    let generator = HttpGenerator::new(generator_config(server)).expect("build generator");
    CombinationService::new(store, Arc::new(generator))
}

pub fn memory_store() -> Arc<Store> {
    Arc::new(Store::open_in_memory().expect("open store"))
}
