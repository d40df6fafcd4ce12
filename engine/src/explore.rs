//! Random exploration: combine known elements until stopped.

use std::sync::Arc;
use std::time::Duration;

use kiln_providers::ComputeError;
use kiln_store::Store;
use kiln_types::{CombinationOutcome, Element, ElementName, PairKey};

use crate::service::{CombinationService, CombineError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExploreSettings {
    /// Pause after each generator call.
    pub interval: Duration,
    /// Consecutive compute failures tolerated before giving up.
    pub max_consecutive_failures: u32,
}

impl ExploreSettings {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);
    pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;
}

impl Default for ExploreSettings {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            max_consecutive_failures: Self::DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    #[default]
    RoundsCompleted,
    /// Every pair of known elements is resolved.
    Exhausted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExploreReport {
    /// Generator-bound combinations attempted.
    pub attempts: u64,
    pub combined: u64,
    pub barren: u64,
    pub failures: u64,
    /// Random picks that were already resolved and skipped.
    pub skipped: u64,
    /// First discoveries, in order.
    pub discoveries: Vec<Element>,
    pub stop: StopReason,
}

#[derive(Debug, thiserror::Error)]
pub enum ExploreError {
    #[error("No elements to combine; seed or import some first")]
    NoElements,
    #[error("Giving up after {failures} consecutive generator failures")]
    TooManyFailures {
        failures: u32,
        #[source]
        last: ComputeError,
    },
    /// Retrying cannot help, e.g. rejected credentials.
    #[error("Stopping on a non-retryable generator failure")]
    Permanent {
        #[source]
        error: ComputeError,
    },
    #[error(transparent)]
    Combine(CombineError),
}

pub struct Explorer {
    service: Arc<CombinationService>,
    settings: ExploreSettings,
}

impl Explorer {
    pub fn new(service: Arc<CombinationService>, settings: ExploreSettings) -> Self {
        Self { service, settings }
    }

    /// Run `rounds` generator-bound combinations, or until exhausted when
    /// `rounds` is `None`.
    ///
    /// Cancel by dropping the future; every combination is recorded
    /// atomically, so an interrupted run loses at most the in-flight call.
    pub async fn run(&self, rounds: Option<u64>) -> Result<ExploreReport, ExploreError> {
        let mut report = ExploreReport::default();
        let mut consecutive_failures = 0;
        let mut names = self.known_names()?;
        if names.is_empty() {
            return Err(ExploreError::NoElements);
        }

        loop {
            if rounds.is_some_and(|limit| report.attempts >= limit) {
                report.stop = StopReason::RoundsCompleted;
                return Ok(report);
            }

            let key = PairKey::new(pick(&names), pick(&names));
            if self.store_call(|store| store.pairs().lookup(&key))?.is_some() {
                report.skipped += 1;
                if self.exhausted(names.len())? {
                    // Another writer may have added elements since the last refresh.
                    let fresh = self.known_names()?;
                    if fresh.len() == names.len() {
                        tracing::info!(elements = names.len(), "Every known pair is resolved");
                        report.stop = StopReason::Exhausted;
                        return Ok(report);
                    }
                    names = fresh;
                }
                tokio::task::yield_now().await;
                continue;
            }

            report.attempts += 1;
            match self.service.combine_pair(&key).await {
                Ok(CombinationOutcome::Combined {
                    element,
                    is_new_discovery,
                }) => {
                    consecutive_failures = 0;
                    report.combined += 1;
                    if is_new_discovery {
                        tracing::info!("Discovered {element} from {key}");
                        report.discoveries.push(element);
                    } else {
                        tracing::debug!("{key} = {element}");
                    }
                    names = self.known_names()?;
                }
                Ok(CombinationOutcome::NoCombination) => {
                    consecutive_failures = 0;
                    report.barren += 1;
                    tracing::debug!("{key} = nothing");
                }
                Err(CombineError::Compute(e)) => {
                    consecutive_failures += 1;
                    report.failures += 1;
                    tracing::warn!(
                        pair = %key,
                        failures = consecutive_failures,
                        "Combination failed: {e}"
                    );
                    if !e.is_retryable() {
                        return Err(ExploreError::Permanent { error: e });
                    }
                    if consecutive_failures >= self.settings.max_consecutive_failures {
                        return Err(ExploreError::TooManyFailures {
                            failures: consecutive_failures,
                            last: e,
                        });
                    }
                }
                Err(e) => return Err(ExploreError::Combine(e)),
            }

            tokio::time::sleep(self.settings.interval).await;
        }
    }

    fn known_names(&self) -> Result<Vec<ElementName>, ExploreError> {
        self.store_call(|store| store.elements().names())
    }

    fn exhausted(&self, known: usize) -> Result<bool, ExploreError> {
        let known = known as u64;
        let resolved = self.store_call(|store| store.pairs().count_between_known())?;
        Ok(resolved >= known * (known + 1) / 2)
    }

    fn store_call<T>(
        &self,
        f: impl FnOnce(&Store) -> anyhow::Result<T>,
    ) -> Result<T, ExploreError> {
        let store: &Store = self.service.store();
        f(store).map_err(|e| ExploreError::Combine(CombineError::Storage(e)))
    }
}

fn pick(names: &[ElementName]) -> ElementName {
    names[rand::random_range(0..names.len())].clone()
}
