//! Controller-specific error types.
//!
//! This module defines the errors of the input watch controller that are
//! not covered by the watch engine or upstream library errors.

use input_resources::InputResourceError;
use kube::Error as KubeError;
use thiserror::Error;
use watch_engine::WatchError;

/// Errors that can occur in the Input Watch Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Watch engine error (registration, sync, codec)
    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),

    /// Input resources could not be loaded
    #[error("Input resources error: {0}")]
    InputResources(#[from] InputResourceError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// A background task ended unexpectedly
    #[error("Task failed: {0}")]
    Task(String),
}
