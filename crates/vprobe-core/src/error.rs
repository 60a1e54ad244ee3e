//! Error types for probe operations.
//!
//! A single error hierarchy is shared by every crate in the workspace so that
//! discovery, remote execution and control-connection failures can be matched
//! uniformly by callers.

use serde::Serialize;
use thiserror::Error;

/// Main error type for probe operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Discovery was requested with no providers registered
    #[error("No providers available")]
    NoProviders,

    /// A provider with the same name is already registered
    #[error("Provider '{0}' already added")]
    DuplicateProvider(String),

    /// Discovery finished without a single live instance
    #[error("No instances discovered: {0}")]
    NoInstances(String),

    /// Instance liveness probe failed
    #[error("Instance probe failed: {0}")]
    ProbeFailed(String),

    /// A command stream was bound before a call that allocates it
    #[error("{0} already set")]
    StreamAlreadyBound(String),

    /// Remote command exited with a non-zero status
    #[error("Command failed (exit code {code})")]
    ExitStatus {
        /// Exit code reported by the environment
        code: i64,
    },

    /// Remote command failed, with the standard error it produced
    #[error("{source}: {stderr}")]
    CommandFailed {
        /// Underlying execution error
        source: Box<Error>,
        /// Captured standard error of the command
        stderr: String,
    },

    /// Remote execution transport failed
    #[error("Remote exec failed: {0}")]
    ExecFailed(String),

    /// Control endpoint could not be reached
    #[error("Connecting to control endpoint failed: {0}")]
    ConnectionFailed(String),

    /// Handler was already closed
    #[error("Handler closed: {0}")]
    HandlerClosed(String),

    /// Environment backend is unavailable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Failed to parse a backend response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Invalid endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Specialized result type for probe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for serialization.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoProviders => "NO_PROVIDERS",
            Self::DuplicateProvider(_) => "DUPLICATE_PROVIDER",
            Self::NoInstances(_) => "NO_INSTANCES",
            Self::ProbeFailed(_) => "PROBE_FAILED",
            Self::StreamAlreadyBound(_) => "STREAM_ALREADY_BOUND",
            Self::ExitStatus { .. } => "EXIT_STATUS",
            Self::CommandFailed { .. } => "COMMAND_FAILED",
            Self::ExecFailed(_) => "EXEC_FAILED",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::HandlerClosed(_) => "HANDLER_CLOSED",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::HttpError(_) => "HTTP_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidQuery(_) => "INVALID_QUERY",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::Io(_) => "IO_ERROR",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Converts the error into an `ErrorResponse`.
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }

    /// Returns true for configuration problems, as opposed to an environment
    /// that simply has nothing running.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoProviders
                | Self::DuplicateProvider(_)
                | Self::ConfigError(_)
                | Self::ValidationError(_)
        )
    }

    /// Exit code of a failed remote command, looking through captured stderr.
    #[must_use]
    pub fn exit_code(&self) -> Option<i64> {
        match self {
            Self::ExitStatus { code } => Some(*code),
            Self::CommandFailed { source, .. } => source.exit_code(),
            _ => None,
        }
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::ServiceUnavailable(err.to_string())
        } else {
            Self::HttpError(err.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}
