//! Combination Service: lookup, compute on miss, record, report discovery.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;

use kiln_providers::{ComputeError, Generated, Generator};
use kiln_store::{Recorded, Store};
use kiln_types::{
    CombinationOutcome, Element, ElementName, InvalidIdentifier, PairKey, PairRecord, Resolution,
};

/// Why a `combine` request failed.
#[derive(Debug, thiserror::Error)]
pub enum CombineError {
    /// Bad input; fix it rather than retrying.
    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),
    /// The generator failed. Nothing was written, so retrying is safe.
    #[error(transparent)]
    Compute(#[from] ComputeError),
    #[error("Storage failure: {0:#}")]
    Storage(anyhow::Error),
}

/// Memoizes a [`Generator`] over a [`Store`].
///
/// Each canonical pair moves from unseen to resolved exactly once, and the
/// resolution is never revisited. Concurrent misses on one pair may all call
/// the generator; whichever records first decides the result and takes any
/// first-discovery credit.
pub struct CombinationService {
    store: Arc<Store>,
    generator: Arc<dyn Generator>,
    compute_timeout: Option<Duration>,
}

impl CombinationService {
    pub fn new(store: Arc<Store>, generator: Arc<dyn Generator>) -> Self {
        Self {
            store,
            generator,
            compute_timeout: None,
        }
    }

    /// Fail a generator call that runs longer than `timeout`.
    #[must_use]
    pub fn with_compute_timeout(mut self, timeout: Duration) -> Self {
        self.compute_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Combine two elements by name, in either order.
    pub async fn combine(&self, a: &str, b: &str) -> Result<CombinationOutcome, CombineError> {
        let key = PairKey::new(ElementName::new(a)?, ElementName::new(b)?);
        self.combine_pair(&key).await
    }

    pub async fn combine_pair(&self, key: &PairKey) -> Result<CombinationOutcome, CombineError> {
        if let Some(record) = self.store.pairs().lookup(key).map_err(CombineError::Storage)? {
            tracing::debug!(pair = %key, "Cache hit");
            return self.resolve_existing(record);
        }

        tracing::debug!(pair = %key, generator = self.generator.name(), "Cache miss");
        match self.compute(key).await? {
            Generated::Produced { name, icon } => {
                let element = Element::new(name, icon);
                self.record_produced(key, element)
            }
            Generated::NoResult => self.record_barren(key),
        }
    }

    async fn compute(&self, key: &PairKey) -> Result<Generated, ComputeError> {
        let call = self.generator.compute(key);
        match self.compute_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ComputeError::Timeout { elapsed: limit })?,
            None => call.await,
        }
    }

    fn record_produced(
        &self,
        key: &PairKey,
        element: Element,
    ) -> Result<CombinationOutcome, CombineError> {
        match self
            .store
            .record_combination(key, &element)
            .map_err(CombineError::Storage)?
        {
            Recorded::Won {
                element,
                first_discovery,
            } => {
                if first_discovery {
                    tracing::info!(pair = %key, element = %element, "New discovery");
                } else {
                    tracing::debug!(pair = %key, element = %element, "Recorded pair");
                }
                Ok(CombinationOutcome::Combined {
                    element,
                    is_new_discovery: first_discovery,
                })
            }
            Recorded::Lost(record) => {
                if record.resolution.result() != Some(&element.name) {
                    warn_discarded(key, Some(&element.name), &record.resolution);
                }
                self.resolve_existing(record)
            }
        }
    }

    fn record_barren(&self, key: &PairKey) -> Result<CombinationOutcome, CombineError> {
        let (record, won) = self
            .store
            .pairs()
            .insert_if_absent(key, &Resolution::Barren)
            .map_err(CombineError::Storage)?;
        if won {
            tracing::debug!(pair = %key, "Recorded barren pair");
        } else if record.resolution != Resolution::Barren {
            warn_discarded(key, None, &record.resolution);
        }
        self.resolve_existing(record)
    }

    /// Outcome for a record that is already durable. Never a discovery.
    fn resolve_existing(&self, record: PairRecord) -> Result<CombinationOutcome, CombineError> {
        match record.resolution {
            Resolution::Barren => Ok(CombinationOutcome::NoCombination),
            Resolution::Produced(name) => {
                let element = self
                    .store
                    .elements()
                    .get(&name)
                    .map_err(CombineError::Storage)?
                    .ok_or_else(|| {
                        CombineError::Storage(anyhow!(
                            "Pair {} references missing element {name}",
                            record.key
                        ))
                    })?;
                Ok(CombinationOutcome::Combined {
                    element,
                    is_new_discovery: false,
                })
            }
        }
    }
}

/// The first recorded result stands; a different later one is dropped.
fn warn_discarded(key: &PairKey, computed: Option<&ElementName>, kept: &Resolution) {
    let computed = computed.map_or("nothing", ElementName::as_str);
    let kept = kept.result().map_or("nothing", ElementName::as_str);
    tracing::warn!(
        pair = %key,
        computed,
        kept,
        "Discarding conflicting result; keeping the first recorded one"
    );
}
