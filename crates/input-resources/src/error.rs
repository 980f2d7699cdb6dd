//! Input resource errors

use thiserror::Error;

/// Errors raised while loading or validating input resources
#[derive(Debug, Error)]
pub enum InputResourceError {
    /// Reading the input resource file failed
    #[error("IO error reading {path}: {source}")]
    Io {
        /// Path that could not be read
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The document is not a valid input resource set
    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A selector cannot be watched as declared
    #[error("Unsupported input resource {selector} for owner {owner}: {reason}")]
    Unsupported {
        /// Owning entity that declared the selector
        owner: String,
        /// Rendered selector
        selector: String,
        /// Why the selector was rejected
        reason: String,
    },

    /// No owner declares any selector, so there is nothing to watch
    #[error("No input resources declared: at least one selector is required")]
    Empty,
}
