//! Error hierarchy for the configuration node store.
//!
//! Errors are grouped by the layer that raises them: structural and
//! optimistic-concurrency failures from the node store, lifecycle failures
//! from the session, and the wrapped update error surfaced to config
//! consumers.

use std::time::Duration;

use config::ConfigError;

use crate::SessionState;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Node tree failures (missing nodes, version conflicts, bad paths)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Session lifecycle failures (handshake, gating)
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A configuration update failed; carries the node path for callers
    #[error("Config update error at {path}: {source}")]
    ConfigUpdate {
        path: String,
        #[source]
        source: Box<Error>,
    },

    /// Configuration file / environment parsing failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration values that parsed but are not usable
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No node at {0}")]
    NoNode(String),

    #[error("Node already exists at {0}")]
    NodeExists(String),

    #[error("Parent of {0} does not exist")]
    NoParent(String),

    #[error("Node {0} has children")]
    HasChildren(String),

    /// Optimistic concurrency failure; retry with a fresh read
    #[error("Version mismatch at {path}: expected {expected}, actual {actual}")]
    VersionMismatch { path: String, expected: u64, actual: u64 },

    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Handshake retries exhausted
    #[error("Connection to {target} failed after {attempts} attempts")]
    ConnectionFailure { target: String, attempts: usize },

    /// A single handshake attempt exceeded the connect timeout
    #[error("Handshake with {target} timed out after {timeout:?}")]
    HandshakeTimeout { target: String, timeout: Duration },

    /// The handshake itself was rejected by the backend
    #[error("Handshake with {target} rejected: {reason}")]
    HandshakeRejected { target: String, reason: String },

    /// Operation issued while the session is not usable
    #[error("Session is not connected (state: {state:?})")]
    NotConnected { state: SessionState },
}

impl Error {
    /// Wraps `self` with the node path of a failed config update.
    pub fn into_config_update(
        self,
        path: impl Into<String>,
    ) -> Self {
        Error::ConfigUpdate {
            path: path.into(),
            source: Box::new(self),
        }
    }

    pub fn is_version_mismatch(&self) -> bool {
        match self {
            Error::Store(StoreError::VersionMismatch { .. }) => true,
            Error::ConfigUpdate { source, .. } => source.is_version_mismatch(),
            _ => false,
        }
    }

    pub fn is_no_node(&self) -> bool {
        match self {
            Error::Store(StoreError::NoNode(_)) => true,
            Error::ConfigUpdate { source, .. } => source.is_no_node(),
            _ => false,
        }
    }

    pub fn is_not_connected(&self) -> bool {
        match self {
            Error::Session(SessionError::NotConnected { .. }) => true,
            Error::ConfigUpdate { source, .. } => source.is_not_connected(),
            _ => false,
        }
    }

    /// Structural errors can be handled locally by probe-before-create/delete callers.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::Store(
                StoreError::NoNode(_)
                    | StoreError::NodeExists(_)
                    | StoreError::NoParent(_)
                    | StoreError::HasChildren(_)
            )
        )
    }
}
