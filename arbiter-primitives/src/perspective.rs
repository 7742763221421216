//! Perspectives submitted for arbitration.

use serde::{Deserialize, Serialize};

use crate::{PerspectiveId, Result};

/// A named viewpoint taking part in a resolution request.
///
/// Priority is normally looked up from the priority matrix; `priority` only
/// carries an explicit caller override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perspective {
    id: PerspectiveId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<i32>,
    #[serde(default = "active_default")]
    active: bool,
}

const fn active_default() -> bool {
    true
}

impl Perspective {
    /// Creates an active perspective without a priority override.
    #[must_use]
    pub fn new(id: PerspectiveId) -> Self {
        Self {
            id,
            priority: None,
            active: true,
        }
    }

    /// Parses an identifier and creates an active perspective.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidPerspectiveId`] for empty identifiers.
    pub fn named(id: impl AsRef<str>) -> Result<Self> {
        PerspectiveId::new(id).map(Self::new)
    }

    /// Builds a list of active perspectives from identifiers.
    ///
    /// # Errors
    ///
    /// Returns the first identifier validation error encountered.
    pub fn parse_list<I, S>(ids: I) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter().map(Self::named).collect()
    }

    /// Sets an explicit priority that takes precedence over the matrix.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Marks the perspective inactive so it is ignored during resolution.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Returns the identifier.
    #[must_use]
    pub fn id(&self) -> &PerspectiveId {
        &self.id
    }

    /// Returns the explicit priority override, if any.
    #[must_use]
    pub fn priority_override(&self) -> Option<i32> {
        self.priority
    }

    /// Returns `true` when the perspective takes part in resolution.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_apply_overrides() {
        let perspective = Perspective::named("mentor")
            .unwrap()
            .with_priority(11)
            .inactive();
        assert_eq!(perspective.id(), &PerspectiveId::new("mentor").unwrap());
        assert_eq!(perspective.priority_override(), Some(11));
        assert!(!perspective.is_active());
    }

    #[test]
    fn parse_list_rejects_blank_entries() {
        assert_eq!(Perspective::parse_list(["qa", "devops"]).unwrap().len(), 2);
        assert!(Perspective::parse_list(["qa", " "]).is_err());
    }

    #[test]
    fn deserialises_with_defaults() {
        let perspective: Perspective = serde_json::from_str(r#"{"id":"scribe"}"#).unwrap();
        assert!(perspective.is_active());
        assert_eq!(perspective.priority_override(), None);
    }
}
