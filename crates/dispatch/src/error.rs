//! Dispatch error types

use crate::engine::Action;
use thiserror::Error;

/// A destination call failed for one (event, destination) pair
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{action} of {remote_path} failed: {cause:#}")]
    Destination {
        action: Action,
        remote_path: String,
        cause: anyhow::Error,
    },

    /// The destination task panicked or was cancelled
    #[error("{action} of {remote_path} aborted: {reason}")]
    Aborted {
        action: Action,
        remote_path: String,
        reason: String,
    },
}

impl DispatchError {
    pub fn action(&self) -> Action {
        match self {
            DispatchError::Destination { action, .. } | DispatchError::Aborted { action, .. } => *action,
        }
    }

    pub fn remote_path(&self) -> &str {
        match self {
            DispatchError::Destination { remote_path, .. }
            | DispatchError::Aborted { remote_path, .. } => remote_path,
        }
    }
}
