//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`ResourceId`] - Opaque internal identifier assigned by a store
//! - [`ResourceType`] - Discriminator naming a resource's concrete kind
//! - [`LinkType`] - Name of a directed relationship between two resources
//! - [`TagName`] - Free-form label attached to a resource
//! - [`Fingerprint`] - Store state hash used to compare snapshots
//!
//! # Validation
//!
//! Names enforce validity at construction time. Invalid values
//! cannot be represented, so a store never holds an empty link type
//! or a tag made of whitespace.
//!
//! # Examples
//!
//! ```
//! use infragraph::core::types::{LinkType, ResourceType, TagName};
//!
//! let machine = ResourceType::new("Machine").unwrap();
//! let link = LinkType::new("INSTALLED_ON").unwrap();
//! let tag = TagName::new("production").unwrap();
//! assert_eq!(machine.as_str(), "Machine");
//!
//! assert!(LinkType::new("").is_err());
//! assert!(TagName::new(" padded ").is_err());
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid resource type: {0}")]
    InvalidResourceType(String),

    #[error("invalid link type: {0}")]
    InvalidLinkType(String),

    #[error("invalid tag name: {0}")]
    InvalidTagName(String),
}

/// Shared rules for every name-like type.
///
/// Returns a human readable reason on failure.
fn check_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("cannot be empty".into());
    }
    if name.trim() != name {
        return Err(format!("'{}' has leading or trailing whitespace", name));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(format!("'{}' contains control characters", name.escape_debug()));
    }
    Ok(())
}

/// An opaque internal resource identifier.
///
/// Ids are assigned by the store when a resource is first persisted and
/// never change afterwards. Stores hand them out in increasing order, but
/// callers must not rely on any arithmetic relation between two ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Wrap a raw identifier.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl std::str::FromStr for ResourceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches('#').parse().map(Self)
    }
}

/// The concrete kind of a resource (e.g. `Machine`, `Website`).
///
/// Handlers and primary-key descriptors are registered against this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceType(String);

impl ResourceType {
    /// Create a validated resource type.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidResourceType` for empty or padded names.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        check_name(&name).map_err(TypeError::InvalidResourceType)?;
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourceType {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.0
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The name of a directed relationship (e.g. `MANAGER`, `INSTALLED_ON`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LinkType(String);

impl LinkType {
    /// Create a validated link type.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidLinkType` for empty or padded names.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        check_name(&name).map_err(TypeError::InvalidLinkType)?;
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LinkType {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LinkType> for String {
    fn from(value: LinkType) -> Self {
        value.0
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A free-form label attached to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagName(String);

impl TagName {
    /// Create a validated tag name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidTagName` for empty or padded names.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        check_name(&name).map_err(TypeError::InvalidTagName)?;
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TagName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TagName> for String {
    fn from(value: TagName) -> Self {
        value.0
    }
}

impl std::fmt::Display for TagName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A hash of the full store state.
///
/// Two snapshots with identical resources, links and tags produce the same
/// fingerprint. Used to prove that a rolled back transaction left no trace.
///
/// # Example
///
/// ```
/// use infragraph::core::types::Fingerprint;
///
/// let a = Fingerprint::compute(b"state");
/// let b = Fingerprint::compute(b"state");
/// assert_eq!(a, b);
/// assert_ne!(a, Fingerprint::compute(b"other"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint over a canonical byte encoding.
    pub fn compute(canonical: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical);
        Self(hex::encode(hasher.finalize()))
    }

    /// Get the fingerprint as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod names {
        use super::*;

        #[test]
        fn valid_names() {
            assert!(ResourceType::new("Machine").is_ok());
            assert!(ResourceType::new("Unix User").is_ok());
            assert!(LinkType::new("INSTALLED_ON").is_ok());
            assert!(TagName::new("env:prod").is_ok());
        }

        #[test]
        fn empty_rejected() {
            assert_eq!(
                ResourceType::new(""),
                Err(TypeError::InvalidResourceType("cannot be empty".into()))
            );
            assert!(LinkType::new("").is_err());
            assert!(TagName::new("").is_err());
        }

        #[test]
        fn padding_rejected() {
            assert!(LinkType::new(" MANAGER").is_err());
            assert!(TagName::new("prod\t").is_err());
        }

        #[test]
        fn control_chars_rejected() {
            assert!(TagName::new("a\u{7}b").is_err());
        }

        #[test]
        fn serde_validates() {
            let ok: LinkType = serde_json::from_str("\"MANAGER\"").unwrap();
            assert_eq!(ok.as_str(), "MANAGER");
            assert!(serde_json::from_str::<LinkType>("\"\"").is_err());
        }
    }

    mod resource_id {
        use super::*;

        #[test]
        fn display_and_parse() {
            let id = ResourceId::new(42);
            assert_eq!(id.to_string(), "#42");
            assert_eq!("#42".parse::<ResourceId>().unwrap(), id);
            assert_eq!("42".parse::<ResourceId>().unwrap(), id);
            assert!("abc".parse::<ResourceId>().is_err());
        }

        #[test]
        fn serializes_as_number() {
            let json = serde_json::to_string(&ResourceId::new(7)).unwrap();
            assert_eq!(json, "7");
        }
    }

    mod fingerprint {
        use super::*;

        #[test]
        fn is_hex_sha256() {
            let fp = Fingerprint::compute(b"");
            assert_eq!(fp.as_str().len(), 64);
            assert_eq!(
                fp.as_str(),
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            );
        }
    }
}
