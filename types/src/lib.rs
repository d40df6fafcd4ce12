//! Core domain types for Kiln.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod pair;

pub use pair::{PairKey, PairRecord, Resolution};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Element Names
// ============================================================================

/// Why an element name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdentifierProblem {
    #[error("name must not be empty")]
    Empty,
    #[error("name must not start or end with whitespace")]
    SurroundingWhitespace,
    #[error("name must not contain control characters")]
    ControlCharacter,
    #[error("name is {len} bytes, limit is {max}", max = ElementName::MAX_LEN)]
    TooLong { len: usize },
}

/// An element name failed validation.
///
/// Raised before any store access; callers must fix the input rather than retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid element name {name:?}: {problem}")]
pub struct InvalidIdentifier {
    name: String,
    problem: IdentifierProblem,
}

impl InvalidIdentifier {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn problem(&self) -> IdentifierProblem {
        self.problem
    }
}

/// A validated element name.
///
/// Names are stored and compared verbatim (case-sensitive). Ordering is
/// byte-wise over the UTF-8 encoding, which is the order [`PairKey`] uses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ElementName(String);

impl ElementName {
    /// Longest accepted name, in bytes.
    pub const MAX_LEN: usize = 256;

    pub fn new(value: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let value = value.into();
        match Self::check(&value) {
            Ok(()) => Ok(Self(value)),
            Err(problem) => Err(InvalidIdentifier {
                name: value,
                problem,
            }),
        }
    }

    fn check(value: &str) -> Result<(), IdentifierProblem> {
        if value.trim().is_empty() {
            return Err(IdentifierProblem::Empty);
        }
        if value.trim() != value {
            return Err(IdentifierProblem::SurroundingWhitespace);
        }
        if value.chars().any(char::is_control) {
            return Err(IdentifierProblem::ControlCharacter);
        }
        if value.len() > Self::MAX_LEN {
            return Err(IdentifierProblem::TooLong { len: value.len() });
        }
        Ok(())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for ElementName {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ElementName {
    type Error = InvalidIdentifier;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ElementName> for String {
    fn from(value: ElementName) -> Self {
        value.0
    }
}

impl std::ops::Deref for ElementName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for ElementName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ElementName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Elements & Outcomes
// ============================================================================

/// A discovered element. Both fields are fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub name: ElementName,
    pub icon: String,
}

impl Element {
    #[must_use]
    pub fn new(name: ElementName, icon: impl Into<String>) -> Self {
        Self {
            name,
            icon: icon.into(),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.icon.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} {}", self.icon, self.name)
        }
    }
}

/// Result of a single `combine` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombinationOutcome {
    /// The pair produces `element`.
    ///
    /// `is_new_discovery` is true only for the one request whose recording
    /// inserted `element` into the store for the first time.
    Combined {
        element: Element,
        is_new_discovery: bool,
    },
    /// The pair is resolved and produces nothing.
    NoCombination,
}

impl CombinationOutcome {
    #[must_use]
    pub fn element(&self) -> Option<&Element> {
        match self {
            Self::Combined { element, .. } => Some(element),
            Self::NoCombination => None,
        }
    }

    #[must_use]
    pub fn is_new_discovery(&self) -> bool {
        matches!(
            self,
            Self::Combined {
                is_new_discovery: true,
                ..
            }
        )
    }
}
