//! Application error types.
//!
//! Every bootstrap error is fatal: the site never starts serving with a
//! partially initialized module set. Messages name the offending module or
//! setting so the fix is obvious from the log line alone.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::bootstrap::Phase;
use crate::module::PackageLoadError;

/// Invalid or missing site configuration, detected before any I/O.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("specify the `{field}` option: {hint}")]
    Missing {
        field: &'static str,
        hint: &'static str,
    },

    #[error("option `{field}` is malformed: {details}")]
    Malformed { field: String, details: String },

    #[error(
        "`modules` must be a table with one entry per module, keyed by module name \
         (e.g. `[modules.keystone-blog]`); an empty table is acceptable for modules without options"
    )]
    ModulesNotTable,

    #[error("invalid module name '{name}': {reason}")]
    InvalidModuleName { name: String, reason: &'static str },

    #[error("failed to read {path}: {details}")]
    Unreadable { path: String, details: String },
}

/// Errors that abort the bootstrap sequence.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A module's implementation could not be located.
    #[error("module '{module}': {details}")]
    Resolution { module: String, details: String },

    /// The package exists but could not be loaded, e.g. one of its own
    /// requirements is missing.
    #[error("module '{module}': package '{package}' is present but failed to load: {source}")]
    DependencyResolution {
        module: String,
        package: String,
        #[source]
        source: PackageLoadError,
    },

    /// A module's factory reported failure.
    #[error("error configuring module '{module}': {source}")]
    ModuleInit {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    /// Any other bootstrap phase failed.
    #[error("bootstrap phase '{phase}' failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },

    #[error("unknown task '{name}'. Available tasks: {available}")]
    UnknownTask { name: String, available: String },
}

impl BootstrapError {
    /// Wrap a phase failure.
    pub fn phase(phase: Phase, source: impl Into<anyhow::Error>) -> Self {
        Self::Phase {
            phase,
            source: source.into(),
        }
    }

    /// Wrap a module construction failure.
    pub fn module_init(module: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::ModuleInit {
            module: module.into(),
            source: source.into(),
        }
    }
}

/// HTTP handler errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let AppError::Internal(e) = &self;
        tracing::error!(error = %e, "internal server error");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_the_option() {
        let err = ConfigError::Missing {
            field: "admin_password",
            hint: "set it to a secure password for admin access",
        };
        let msg = err.to_string();
        assert!(msg.contains("admin_password"));
        assert!(msg.contains("secure password"));
    }

    #[test]
    fn module_init_names_the_module() {
        let err = BootstrapError::module_init("keystone-blog", anyhow::anyhow!("boom"));
        let msg = err.to_string();
        assert!(msg.contains("keystone-blog"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn handler_errors_hide_their_cause() {
        let response = AppError::from(anyhow::anyhow!("db password rejected")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn phase_error_names_the_phase() {
        let err = BootstrapError::phase(Phase::InitCore, anyhow::anyhow!("no database"));
        assert!(err.to_string().contains("init_core"));
    }
}
