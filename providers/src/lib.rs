//! Combination result providers.
//!
//! A [`Generator`] decides what combining two elements yields. The cache calls
//! it only on a miss, so implementations may be slow or remote. Failures are
//! transient: nothing about a failed call is persisted.
//!
//! [`HttpGenerator`] talks to the game's public pair endpoint.

mod http;
pub mod retry;

pub use http::{HttpGenerator, HttpGeneratorConfig};
pub use retry::RetryConfig;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use kiln_types::{ElementName, PairKey};

/// Generator future type alias.
pub type ComputeFut<'a> = Pin<Box<dyn Future<Output = Result<Generated, ComputeError>> + Send + 'a>>;

/// What a generator produced for a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated {
    Produced { name: ElementName, icon: String },
    NoResult,
}

/// A generator call failed. Safe to retry later.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("Generator timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    #[error("Generator request failed: {message}")]
    Transport { message: String },
    #[error("Generator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Generator response was malformed: {message}")]
    Malformed { message: String },
}

impl ComputeError {
    /// Whether an immediate retry of the same call could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::Status { status, .. } => retry::is_retryable_status(*status),
            Self::Malformed { .. } => false,
        }
    }
}

/// Decides the result of combining two elements.
pub trait Generator: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn compute<'a>(&'a self, pair: &'a PairKey) -> ComputeFut<'a>;
}
