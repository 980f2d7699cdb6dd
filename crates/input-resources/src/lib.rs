//! Input Resource Selectors
//!
//! Declarative description of the resources an owning entity (typically an
//! operator) needs to observe. Each owner lists exact resources by kind plus
//! optional namespace/name narrowing; the watch engine turns these into
//! deduplicated watch registrations.
//!
//! # Example
//!
//! ```
//! use input_resources::{InputResourceSet, ResourceKindIdentifier, ResourceSelector};
//!
//! let selector = ResourceSelector::new(
//!     ResourceKindIdentifier::core("v1", "configmaps"),
//!     Some("kube-system"),
//!     Some("kube-root-ca.crt"),
//! );
//! assert!(selector.matches("kube-system", "kube-root-ca.crt"));
//! assert!(!selector.matches("kube-system", "other"));
//!
//! let set = InputResourceSet::builtin();
//! assert_eq!(set.selector_count(), 4);
//! ```

pub mod error;
pub mod input;
pub mod selector;

pub use error::InputResourceError;
pub use input::{InputResourceSet, InputResources};
pub use selector::{ResourceKindIdentifier, ResourceSelector};
