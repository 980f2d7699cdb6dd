//! Per-selector event filters.

use crate::reference::NormalizedReference;
use input_resources::ResourceSelector;

/// Predicate deciding whether a change to an object should be forwarded.
///
/// One filter exists per selector; all filters of a kind hang off the same
/// watch stream and are evaluated first-match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    owner: String,
    selector: ResourceSelector,
}

impl EventFilter {
    /// Filter for `selector`, declared by `owner`
    pub fn new(owner: impl Into<String>, selector: ResourceSelector) -> Self {
        Self {
            owner: owner.into(),
            selector,
        }
    }

    /// Owner that declared the selector
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Selector this filter evaluates
    pub fn selector(&self) -> &ResourceSelector {
        &self.selector
    }

    /// Whether `reference` should be forwarded
    pub fn matches(&self, reference: &NormalizedReference) -> bool {
        self.selector.matches(&reference.namespace, &reference.name)
    }
}
