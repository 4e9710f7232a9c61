//! Filter definition: predicate, action and optional grace period.

use std::sync::Arc;
use std::time::Duration;

use super::Predicate;
use crate::events::Severity;

/// What a matching filter does to an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterAction {
    /// Drop the event before any subscriber sees it.
    Suppress,
    /// Deliver the event with this severity instead.
    ChangeSeverity(Severity),
}

/// A filter ready to be activated in a [`FilterRegistry`](super::FilterRegistry).
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub predicate: Predicate,
    pub action: FilterAction,
    /// Grace after deactivation. `None` uses the registry default.
    pub grace: Option<Duration>,
    /// When set, release waits for this node's log to pass the release time
    /// instead of a grace period.
    pub release_on_node: Option<Arc<str>>,
}

impl Filter {
    pub fn suppress(predicate: Predicate) -> Self {
        Self {
            predicate,
            action: FilterAction::Suppress,
            grace: None,
            release_on_node: None,
        }
    }

    pub fn change_severity(predicate: Predicate, severity: Severity) -> Self {
        Self {
            predicate,
            action: FilterAction::ChangeSeverity(severity),
            grace: None,
            release_on_node: None,
        }
    }

    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = Some(grace);
        self
    }

    #[must_use]
    pub fn release_on_node(mut self, node: impl Into<Arc<str>>) -> Self {
        self.release_on_node = Some(node.into());
        self
    }
}
