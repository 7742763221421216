//! Perspective identifier types.

use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Identifier of a perspective such as `security` or `frontend`.
///
/// The vocabulary is open: any non-empty identifier is legal. Identifiers are
/// trimmed and lower-cased so `Security` and ` security ` name the same
/// perspective.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerspectiveId(String);

impl PerspectiveId {
    /// Creates a normalised identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPerspectiveId`] when the identifier is empty or
    /// whitespace only.
    pub fn new(id: impl AsRef<str>) -> Result<Self, Error> {
        let raw = id.as_ref();
        let normalised = raw.trim().to_lowercase();
        if normalised.is_empty() {
            return Err(Error::InvalidPerspectiveId {
                id: raw.to_owned(),
                reason: "identifier cannot be empty",
            });
        }
        Ok(Self(normalised))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PerspectiveId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PerspectiveId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PerspectiveId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for PerspectiveId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PerspectiveId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PerspectiveId> for String {
    fn from(value: PerspectiveId) -> Self {
        value.0
    }
}

impl PartialEq<str> for PerspectiveId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PerspectiveId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_normalised() {
        let id = PerspectiveId::new("  Security ").expect("valid");
        assert_eq!(id, "security");
        assert_eq!(id.to_string(), "security");
    }

    #[test]
    fn empty_identifier_is_rejected() {
        let err = "   ".parse::<PerspectiveId>().unwrap_err();
        assert!(matches!(err, Error::InvalidPerspectiveId { .. }));
    }

    #[test]
    fn unknown_identifiers_are_legal() {
        let id: PerspectiveId = "data-steward".parse().expect("open vocabulary");
        assert_eq!(id.as_str(), "data-steward");
    }

    #[test]
    fn deserialisation_validates() {
        let parsed: PerspectiveId = serde_json::from_str("\"QA\"").expect("parse");
        assert_eq!(parsed, "qa");
        assert!(serde_json::from_str::<PerspectiveId>("\"\"").is_err());
    }
}
