use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ElementName;

/// Order-independent key for a pair of elements.
///
/// `left <= right` under byte-wise ordering of the names, so
/// `PairKey::new(a, b) == PairKey::new(b, a)` for every `a` and `b`.
/// An element may be paired with itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "RawPairKey")]
pub struct PairKey {
    left: ElementName,
    right: ElementName,
}

/// Wire shape of [`PairKey`]; deserialized keys are re-canonicalized.
#[derive(Deserialize)]
struct RawPairKey {
    left: ElementName,
    right: ElementName,
}

impl From<RawPairKey> for PairKey {
    fn from(raw: RawPairKey) -> Self {
        Self::new(raw.left, raw.right)
    }
}

impl PairKey {
    #[must_use]
    pub fn new(a: ElementName, b: ElementName) -> Self {
        if a <= b {
            Self { left: a, right: b }
        } else {
            Self { left: b, right: a }
        }
    }

    #[must_use]
    pub fn left(&self) -> &ElementName {
        &self.left
    }

    #[must_use]
    pub fn right(&self) -> &ElementName {
        &self.right
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} + {}", self.left, self.right)
    }
}

/// How a pair was resolved.
///
/// A pair that has never been combined has no record at all; there is no
/// "pending" variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "element", rename_all = "snake_case")]
pub enum Resolution {
    /// Combining the pair yields this element.
    Produced(ElementName),
    /// Combining the pair yields nothing.
    Barren,
}

impl Resolution {
    #[must_use]
    pub fn result(&self) -> Option<&ElementName> {
        match self {
            Self::Produced(name) => Some(name),
            Self::Barren => None,
        }
    }
}

/// A durable pair cache entry. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRecord {
    pub key: PairKey,
    pub resolution: Resolution,
}
