//! Identifier Primitives
//!
//! Opaque validated string identities with stable equality, hashing, and
//! lexicographic ordering. Validation happens at construction; values are
//! immutable afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IdentError;

/// Shared contract for validated string identifiers.
pub trait Identifier {
    /// The backing string value.
    fn value(&self) -> &str;
}

/// Validate that an identifier value is non-empty and not all whitespace.
pub fn check_identifier_value(value: &str) -> Result<(), IdentError> {
    if value.trim().is_empty() {
        return Err(IdentError::Empty);
    }
    Ok(())
}

/// Top-level identity of a trading node, of the form `NAME-TAG`.
///
/// Both parts must be non-empty; the tag is everything after the final
/// hyphen (so names themselves may contain hyphens).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TraderId(String);

impl TraderId {
    /// Create a validated trader ID.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentError> {
        let value = value.into();
        check_identifier_value(&value)?;
        match value.rsplit_once('-') {
            Some((name, tag)) if !name.is_empty() && !tag.is_empty() => Ok(Self(value)),
            _ => Err(IdentError::MissingTag(value)),
        }
    }

    /// The tag suffix after the final hyphen.
    pub fn get_tag(&self) -> &str {
        // Validated at construction: a hyphen is always present
        self.0.rsplit('-').next().unwrap_or_default()
    }
}

impl Identifier for TraderId {
    fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TraderId {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TraderId {
    type Error = IdentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TraderId> for String {
    fn from(id: TraderId) -> Self {
        id.0
    }
}

/// Identity of a component within a trading node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentId(String);

impl ComponentId {
    /// Create a validated component ID.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentError> {
        let value = value.into();
        check_identifier_value(&value)?;
        Ok(Self(value))
    }
}

impl Identifier for ComponentId {
    fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ComponentId {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ComponentId {
    type Error = IdentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ComponentId> for String {
    fn from(id: ComponentId) -> Self {
        id.0
    }
}

/// A random 128-bit identifier (UUID version 4), canonical hyphenated
/// 36-character form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UUID4(Uuid);

impl UUID4 {
    /// Generate a new random UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the canonical hyphenated string form.
    pub fn parse(value: &str) -> Result<Self, IdentError> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|_| IdentError::InvalidUuid(value.to_string()))
    }
}

impl Default for UUID4 {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UUID4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for UUID4 {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
