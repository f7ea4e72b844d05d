//! Capability Sets
//!
//! Capabilities describe what a resource can currently do (e.g. "assemble",
//! "transport", "scan"). External consumers query the graph by required
//! capabilities instead of concrete types, so a resource can gain or lose
//! abilities at runtime without changing its type.
//!
//! The `Null` variant is an explicit sentinel: a resource whose capability
//! set is `Null` provides nothing and is invisible to capability queries,
//! even when it is part of the externally visible subset. This is distinct
//! from an empty provided set, which makes the resource visible but
//! satisfies only empty requirements.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Capability set of a resource, or a requirement against one.
///
/// # Examples
///
/// ```rust
/// use plantgraph_core::models::Capabilities;
///
/// let provided = Capabilities::of(["assemble", "scan"]);
/// let required = Capabilities::single("scan");
/// assert!(required.provided_by(&provided));
///
/// // The Null sentinel never satisfies and is never satisfied.
/// assert!(!Capabilities::Null.provided_by(&provided));
/// assert!(!required.provided_by(&Capabilities::Null));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Capabilities {
    /// Explicit "no capability" sentinel.
    Null,
    /// A concrete set of capability tags.
    Provided { tags: BTreeSet<String> },
}

impl Capabilities {
    /// An empty provided set. Unlike [`Capabilities::Null`] this satisfies
    /// empty requirements and keeps the resource visible to queries.
    pub fn none() -> Self {
        Capabilities::Provided {
            tags: BTreeSet::new(),
        }
    }

    /// A single capability tag.
    pub fn single(tag: impl Into<String>) -> Self {
        Capabilities::Provided {
            tags: BTreeSet::from([tag.into()]),
        }
    }

    /// A set of capability tags.
    pub fn of<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Capabilities::Provided {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this is the explicit "no capability" sentinel.
    pub fn is_null(&self) -> bool {
        matches!(self, Capabilities::Null)
    }

    /// Treats `self` as a requirement and checks whether `provided`
    /// covers every required tag. `Null` on either side never satisfies.
    pub fn provided_by(&self, provided: &Capabilities) -> bool {
        match (self, provided) {
            (Capabilities::Null, _) | (_, Capabilities::Null) => false,
            (
                Capabilities::Provided { tags: required },
                Capabilities::Provided { tags: provided },
            ) => required.is_subset(provided),
        }
    }
}

impl Default for Capabilities {
    /// Resources start without capabilities until their behavior or an
    /// operator assigns some.
    fn default() -> Self {
        Capabilities::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_check() {
        let provided = Capabilities::of(["assemble", "scan", "transport"]);
        assert!(Capabilities::single("scan").provided_by(&provided));
        assert!(Capabilities::of(["scan", "assemble"]).provided_by(&provided));
        assert!(!Capabilities::single("weld").provided_by(&provided));
    }

    #[test]
    fn empty_requirement_is_satisfied_by_any_provided_set() {
        assert!(Capabilities::none().provided_by(&Capabilities::none()));
        assert!(Capabilities::none().provided_by(&Capabilities::single("scan")));
    }

    #[test]
    fn null_never_satisfies() {
        assert!(!Capabilities::Null.provided_by(&Capabilities::single("scan")));
        assert!(!Capabilities::single("scan").provided_by(&Capabilities::Null));
        assert!(!Capabilities::Null.provided_by(&Capabilities::Null));
        // Even the empty requirement is not satisfied by the sentinel.
        assert!(!Capabilities::none().provided_by(&Capabilities::Null));
    }

    #[test]
    fn null_is_distinct_from_empty() {
        assert!(Capabilities::Null.is_null());
        assert!(!Capabilities::none().is_null());
        assert_ne!(Capabilities::Null, Capabilities::none());
    }
}
