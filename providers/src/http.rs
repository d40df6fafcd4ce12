//! Client for the game's public pair endpoint.
//!
//! `GET {base_url}/pair?first={left}&second={right}` answers with
//! `{"result": "Steam", "emoji": "💨", "isNew": false}`. A result of
//! `"Nothing"` means the pair does not combine.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use serde::Deserialize;
use url::Url;

use kiln_types::{ElementName, PairKey};

use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};
use crate::{ComputeError, ComputeFut, Generated, Generator};

/// Result text the game uses for "no combination".
const NOTHING: &str = "Nothing";

/// Longest error body kept in [`ComputeError::Status`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpGeneratorConfig {
    /// Endpoint prefix; `/pair` is appended.
    pub base_url: Url,
    pub user_agent: String,
    pub referer: Option<String>,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl HttpGeneratorConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://neal.fun/api/infinite-craft";
    pub const DEFAULT_REFERER: &'static str = "https://neal.fun/infinite-craft/";
    pub const DEFAULT_USER_AGENT: &'static str =
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:122.0) Gecko/20100101 Firefox/122.0";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
}

impl Default for HttpGeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(Self::DEFAULT_BASE_URL).expect("default base URL is valid"),
            user_agent: Self::DEFAULT_USER_AGENT.to_string(),
            referer: Some(Self::DEFAULT_REFERER.to_string()),
            timeout: Self::DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairResponse {
    result: String,
    #[serde(default)]
    emoji: String,
    /// The game's own global first-discovery flag. Logged only.
    #[serde(default)]
    is_new: bool,
}

/// [`Generator`] backed by the game's HTTP API.
pub struct HttpGenerator {
    client: reqwest::Client,
    pair_url: Url,
    retry: RetryConfig,
    timeout: Duration,
}

impl HttpGenerator {
    pub fn new(config: HttpGeneratorConfig) -> Result<Self> {
        let mut pair_url = config.base_url.clone();
        match pair_url.path_segments_mut() {
            Ok(mut segments) => {
                segments.pop_if_empty().push("pair");
            }
            Err(()) => bail!("Generator base URL cannot have a path: {}", config.base_url),
        }

        let mut headers = HeaderMap::new();
        if let Some(referer) = &config.referer {
            let value = HeaderValue::from_str(referer)
                .with_context(|| format!("Invalid referer header: {referer}"))?;
            headers.insert(REFERER, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent)
            .default_headers(headers)
            .http1_title_case_headers()
            .timeout(config.timeout)
            .build()
            .context("Failed to build generator HTTP client")?;

        Ok(Self {
            client,
            pair_url,
            retry: config.retry,
            timeout: config.timeout,
        })
    }

    fn request_url(&self, pair: &PairKey) -> Url {
        let mut url = self.pair_url.clone();
        url.query_pairs_mut()
            .append_pair("first", pair.left())
            .append_pair("second", pair.right());
        url
    }

    async fn fetch(&self, pair: &PairKey) -> Result<Generated, ComputeError> {
        let url = self.request_url(pair);
        let started = Instant::now();

        let response = match send_with_retry(|| self.client.get(url.clone()), &self.retry).await {
            RetryOutcome::Success(response) => response,
            RetryOutcome::HttpError(response) => {
                let status = response.status().as_u16();
                let mut body = response.text().await.unwrap_or_default();
                truncate_on_char_boundary(&mut body, MAX_ERROR_BODY);
                return Err(ComputeError::Status { status, body });
            }
            RetryOutcome::ConnectionError { attempts, source } => {
                if source.is_timeout() {
                    return Err(ComputeError::Timeout {
                        elapsed: started.elapsed().max(self.timeout),
                    });
                }
                return Err(ComputeError::Transport {
                    message: format!("{source} (after {attempts} attempts)"),
                });
            }
        };

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ComputeError::Timeout {
                    elapsed: started.elapsed(),
                }
            } else {
                ComputeError::Transport {
                    message: e.to_string(),
                }
            }
        })?;
        let parsed: PairResponse =
            serde_json::from_str(&body).map_err(|e| ComputeError::Malformed {
                message: format!("{e}: {body}"),
            })?;

        if parsed.result == NOTHING {
            tracing::debug!(pair = %pair, "Generator: nothing");
            return Ok(Generated::NoResult);
        }

        let name = ElementName::new(parsed.result).map_err(|e| ComputeError::Malformed {
            message: e.to_string(),
        })?;
        tracing::debug!(
            pair = %pair,
            result = %name,
            remote_first_discovery = parsed.is_new,
            "Generator: produced"
        );
        Ok(Generated::Produced {
            name,
            icon: parsed.emoji,
        })
    }
}

impl Generator for HttpGenerator {
    fn name(&self) -> &'static str {
        "http"
    }

    fn compute<'a>(&'a self, pair: &'a PairKey) -> ComputeFut<'a> {
        Box::pin(self.fetch(pair))
    }
}

fn truncate_on_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn pair(a: &str, b: &str) -> PairKey {
        PairKey::new(ElementName::new(a).unwrap(), ElementName::new(b).unwrap())
    }

    fn test_config(server: &MockServer) -> HttpGeneratorConfig {
        HttpGeneratorConfig {
            base_url: Url::parse(&format!("{}/api/infinite-craft", server.uri())).unwrap(),
            user_agent: "kiln-test/1.0".to_string(),
            referer: Some("https://example.test/craft/".to_string()),
            timeout: Duration::from_secs(5),
            retry: RetryConfig {
                max_retries: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                jitter_factor: 0.0,
            },
        }
    }

    #[test]
    fn request_url_uses_canonical_order_and_escapes() {
        let generator = HttpGenerator::new(HttpGeneratorConfig::default()).unwrap();
        let url = generator.request_url(&pair("Water", "Fire & Ice"));
        assert_eq!(
            url.as_str(),
            "https://neal.fun/api/infinite-craft/pair?first=Fire+%26+Ice&second=Water"
        );
    }

    #[test]
    fn base_url_trailing_slash_is_tolerated() {
        let config = HttpGeneratorConfig {
            base_url: Url::parse("https://example.test/api/").unwrap(),
            ..HttpGeneratorConfig::default()
        };
        let generator = HttpGenerator::new(config).unwrap();
        assert_eq!(generator.pair_url.as_str(), "https://example.test/api/pair");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut text = "ab💨".to_string();
        truncate_on_char_boundary(&mut text, 3);
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn produced_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/infinite-craft/pair"))
            .and(query_param("first", "Fire"))
            .and(query_param("second", "Water"))
            .and(header("referer", "https://example.test/craft/"))
            .and(header("user-agent", "kiln-test/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"result":"Steam","emoji":"💨","isNew":false}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(test_config(&server)).unwrap();
        let generated = generator.compute(&pair("Water", "Fire")).await.unwrap();
        assert_eq!(
            generated,
            Generated::Produced {
                name: ElementName::new("Steam").unwrap(),
                icon: "💨".to_string()
            }
        );
    }

    #[tokio::test]
    async fn nothing_is_no_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/infinite-craft/pair"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"result":"Nothing","emoji":"","isNew":false}"#),
            )
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(test_config(&server)).unwrap();
        let generated = generator.compute(&pair("Water", "Water")).await.unwrap();
        assert_eq!(generated, Generated::NoResult);
    }

    #[tokio::test]
    async fn server_error_is_retried() {
        let server = MockServer::start().await;
        let attempt = AtomicU32::new(0);
        Mock::given(method("GET"))
            .and(path("/api/infinite-craft/pair"))
            .respond_with(move |_: &wiremock::Request| {
                if attempt.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(502)
                } else {
                    ResponseTemplate::new(200)
                        .set_body_string(r#"{"result":"Lava","emoji":"🌋","isNew":true}"#)
                }
            })
            .expect(2)
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(test_config(&server)).unwrap();
        let generated = generator.compute(&pair("Earth", "Fire")).await.unwrap();
        assert!(matches!(generated, Generated::Produced { ref name, .. } if name.as_str() == "Lava"));
    }

    #[tokio::test]
    async fn client_error_is_a_status_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/infinite-craft/pair"))
            .respond_with(ResponseTemplate::new(403).set_body_string("blocked"))
            .expect(1)
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(test_config(&server)).unwrap();
        let err = generator.compute(&pair("Earth", "Fire")).await.unwrap_err();
        match err {
            ComputeError::Status { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "blocked");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/infinite-craft/pair"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"result":"Steam","emoji":"💨"}"#)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.timeout = Duration::from_millis(100);
        config.retry.max_retries = 0;
        let generator = HttpGenerator::new(config).unwrap();

        let err = generator.compute(&pair("Water", "Fire")).await.unwrap_err();
        assert!(matches!(err, ComputeError::Timeout { .. }), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/infinite-craft/pair"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(test_config(&server)).unwrap();
        let err = generator.compute(&pair("Water", "Fire")).await.unwrap_err();
        assert!(matches!(err, ComputeError::Malformed { .. }));
    }

    #[tokio::test]
    async fn invalid_generated_name_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/infinite-craft/pair"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"result":"","emoji":"?"}"#),
            )
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(test_config(&server)).unwrap();
        let err = generator.compute(&pair("Water", "Fire")).await.unwrap_err();
        assert!(matches!(err, ComputeError::Malformed { .. }));
    }
}
