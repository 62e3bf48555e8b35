//! CLI error types with miette diagnostics.
//!
//! Maps `DataError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use deckathlon_config::ConfigError;
use deckathlon_core::DataError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the server at {url}")]
    #[diagnostic(
        code(deckathlon::connection_failed),
        help(
            "Check that the server is running and the root URL is right.\n\
             Cause: {message}"
        )
    )]
    ConnectionFailed { url: String, message: String },

    #[error("Could not set up the HTTP client: {0}")]
    #[diagnostic(code(deckathlon::transport))]
    Transport(#[from] deckathlon_api::Error),

    // ── Authentication ───────────────────────────────────────────────
    #[error("Not authorized for {url}")]
    #[diagnostic(
        code(deckathlon::auth_failed),
        help(
            "Set username and password in your profile, or export\n\
             DECKATHLON_USERNAME and DECKATHLON_PASSWORD."
        )
    )]
    AuthFailed { url: String },

    // ── Data ─────────────────────────────────────────────────────────
    #[error("{type_name} #{id} not found")]
    #[diagnostic(
        code(deckathlon::not_found),
        help("Run: deckathlon list {type_name}")
    )]
    NotFound { type_name: String, id: String },

    #[error("Unknown type '{type_name}'")]
    #[diagnostic(
        code(deckathlon::unknown_type),
        help("Known types: {available}")
    )]
    UnknownType { type_name: String, available: String },

    #[error("{message}")]
    #[diagnostic(code(deckathlon::conflict))]
    Conflict { message: String },

    #[error("{message}")]
    #[diagnostic(code(deckathlon::api_error))]
    Api { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(deckathlon::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No backend or schema configured")]
    #[diagnostic(
        code(deckathlon::no_config),
        help(
            "Pass --root-url and/or --schema, or create a profile in\n\
             {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(deckathlon::config))]
    Config(#[from] ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(deckathlon::json), help("Check the JSON and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Transport(_) => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::UnknownType { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── DataError → CliError mapping ─────────────────────────────────────

impl From<DataError> for CliError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Transport { url, message } => CliError::ConnectionFailed { url, message },
            DataError::Unauthorized { url } => CliError::AuthFailed { url },
            DataError::Integrity { .. } => CliError::Conflict {
                message: err.to_string(),
            },
            DataError::UnknownType { type_name } => CliError::UnknownType {
                type_name,
                available: String::new(),
            },
            DataError::Server { .. } | DataError::Batch { .. } | DataError::InvalidPayload { .. } => {
                CliError::Api {
                    message: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_errors_map_to_exit_codes() {
        let integrity = CliError::from(DataError::Integrity {
            type_name: "tables".into(),
            ids: vec!["3".into()],
        });
        assert_eq!(integrity.exit_code(), exit_code::CONFLICT);
        assert_eq!(
            integrity.to_string(),
            "Cannot delete tables item #3: there are related rows."
        );

        let auth = CliError::from(DataError::Unauthorized { url: "u".into() });
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let batch = CliError::from(DataError::Batch {
            messages: vec!["A.".into(), "B.".into()],
        });
        assert_eq!(batch.to_string(), "A. B.");
        assert_eq!(batch.exit_code(), exit_code::GENERAL);
    }
}
