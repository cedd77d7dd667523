//! Unified error types for the Stratum workspace.
//!
//! Every error in this enum is raised while a component graph is being
//! composed. Failures that happen later, while the provisioning backend
//! materializes resources, travel inside deferred values instead and are
//! never converted into a [`StratumError`].

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum StratumError {
    /// A component argument is invalid, obsolete, or cannot be bound.
    #[error("component \"{component}\": invalid argument `{argument}`: {message} (hint: {hint})")]
    Config {
        /// Name of the component being constructed.
        component: String,
        /// Argument that caused the failure.
        argument: String,
        /// Description of the problem.
        message: String,
        /// Actionable remediation for the operator.
        hint: String,
    },

    /// A transform override is not valid for the resource kind it targets.
    #[error("component \"{component}\": invalid transform for `{kind}`: {message}")]
    Override {
        /// Name of the component being constructed.
        component: String,
        /// Transform key of the targeted resource kind.
        kind: String,
        /// Description of the problem.
        message: String,
    },

    /// A name is already taken within its scope.
    #[error("duplicate name \"{name}\" in {scope}")]
    DuplicateName {
        /// Scope in which the collision occurred.
        scope: String,
        /// The colliding name.
        name: String,
    },

    /// A required entity was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing entity.
        kind: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// The provisioning backend rejected a request.
    #[error("backend error: {message}")]
    Backend {
        /// Description reported by the backend.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl StratumError {
    /// Builds a configuration error for `component`.
    pub fn config(
        component: impl Into<String>,
        argument: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self::Config {
            component: component.into(),
            argument: argument.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Builds a transform override error for `component`.
    pub fn override_error(
        component: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Override {
            component: component.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Returns whether retrying the failed operation could succeed.
    ///
    /// Composition errors are deterministic in their inputs; only the
    /// backend may fail transiently.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, StratumError>;
