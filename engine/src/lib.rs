//! Kiln engine: the Combination Service and what drives it.
//!
//! [`CombinationService`] is the cache proper. [`Explorer`] feeds it random
//! pairs of known elements, and [`config`] resolves `~/.kiln/config.toml`
//! into concrete settings for both.

pub mod config;
mod explore;
mod service;

pub use config::{ConfigError, KilnConfig, ResolvedConfig};
pub use explore::{ExploreError, ExploreReport, ExploreSettings, Explorer, StopReason};
pub use service::{CombinationService, CombineError};

pub use kiln_providers::{ComputeError, Generated, Generator, HttpGenerator};
pub use kiln_store::{Store, StoreStats};
pub use kiln_types::{CombinationOutcome, Element, ElementName, PairKey};
