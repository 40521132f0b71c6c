//! Error types for fixture operations.
//!
//! A single error type covers the local server, the LDIF codec and the remote
//! control proxy, so test code can match on the same variants whichever
//! backend it drives. The control protocol maps these variants onto HTTP
//! status codes and back (see [`Error::http_status`]).

use thiserror::Error;

/// Main error type for fixture operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A required binary or schema is missing, or the rendered configuration was rejected
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The directory server exited or never became reachable during startup
    #[error("Startup failed: {0}")]
    StartupFailed(String),

    /// An external command-line tool exited with an unexpected status
    #[error("{tool} failed with code {}: {stdout} {stderr}", .code.map_or_else(|| "<signal>".to_string(), |c| c.to_string()))]
    ToolFailed {
        /// Name of the tool that failed
        tool: String,
        /// Exit code, if the tool exited normally
        code: Option<i32>,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// The requested entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Malformed LDIF input
    #[error("Invalid LDIF: {0}")]
    LdifFormat(String),

    /// The operation is not valid in the server's current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The control endpoint answered with an unexpected status
    #[error("Remote failure ({status}): {message}")]
    RemoteFailure {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Control endpoint is unreachable or its server is gone
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Filesystem or process-spawning failure
    #[error("I/O error: {0}")]
    Io(String),
}

/// Specialized result type for fixture operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::StartupFailed(_) => "STARTUP_FAILED",
            Self::ToolFailed { .. } => "TOOL_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Timeout(_) => "TIMEOUT",
            Self::LdifFormat(_) => "LDIF_FORMAT",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::RemoteFailure { .. } => "REMOTE_FAILURE",
            Self::HttpError(_) => "HTTP_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// HTTP status used by the control protocol to report this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Timeout(_) => 504,
            Self::LdifFormat(_) => 400,
            Self::ServiceUnavailable(_) => 503,
            _ => 500,
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_) | Self::StartupFailed(_) | Self::ToolFailed { .. } | Self::Io(_)
        )
    }

    /// Returns true for the not-found condition, whichever backend raised it.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true for the timeout condition, whichever backend raised it.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

// Conversions from external error types
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

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

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid URL: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::HttpError(format!("invalid JSON payload: {err}"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Self::LdifFormat(format!("invalid base64 value: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_failure(code: Option<i32>) -> Error {
        Error::ToolFailed {
            tool: "ldapadd".to_string(),
            code,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::ConfigError("test".to_string()).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(
            Error::StartupFailed("test".to_string()).error_code(),
            "STARTUP_FAILED"
        );
        assert_eq!(tool_failure(Some(1)).error_code(), "TOOL_FAILED");
        assert_eq!(
            Error::NotFound("test".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(Error::Timeout("test".to_string()).error_code(), "TIMEOUT");
        assert_eq!(
            Error::LdifFormat("test".to_string()).error_code(),
            "LDIF_FORMAT"
        );
        assert_eq!(
            Error::InvalidState("test".to_string()).error_code(),
            "INVALID_STATE"
        );
        assert_eq!(
            Error::RemoteFailure {
                status: 500,
                message: "boom".to_string()
            }
            .error_code(),
            "REMOTE_FAILURE"
        );
        assert_eq!(
            Error::HttpError("test".to_string()).error_code(),
            "HTTP_ERROR"
        );
        assert_eq!(
            Error::ServiceUnavailable("test".to_string()).error_code(),
            "SERVICE_UNAVAILABLE"
        );
        assert_eq!(Error::Io("test".to_string()).error_code(), "IO_ERROR");
    }

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("ou=test,dc=example,dc=org".to_string());
        assert_eq!(err.to_string(), "Not found: ou=test,dc=example,dc=org");

        assert_eq!(
            tool_failure(Some(68)).to_string(),
            "ldapadd failed with code 68: out err"
        );
        assert_eq!(
            tool_failure(None).to_string(),
            "ldapadd failed with code <signal>: out err"
        );
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Error::NotFound("x".to_string()).http_status(), 404);
        assert_eq!(Error::Timeout("x".to_string()).http_status(), 504);
        assert_eq!(Error::LdifFormat("x".to_string()).http_status(), 400);
        assert_eq!(
            Error::ServiceUnavailable("x".to_string()).http_status(),
            503
        );
        assert_eq!(tool_failure(Some(1)).http_status(), 500);
        assert_eq!(Error::InvalidState("x".to_string()).http_status(), 500);
    }

    #[test]
    fn test_should_log() {
        assert!(Error::ConfigError("test".to_string()).should_log());
        assert!(Error::StartupFailed("test".to_string()).should_log());
        assert!(tool_failure(Some(1)).should_log());

        assert!(!Error::NotFound("test".to_string()).should_log());
        assert!(!Error::Timeout("test".to_string()).should_log());
    }

    #[test]
    fn test_condition_helpers() {
        assert!(Error::NotFound("x".to_string()).is_not_found());
        assert!(!Error::Timeout("x".to_string()).is_not_found());
        assert!(Error::Timeout("x".to_string()).is_timeout());
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let converted: Error = err.into();
        assert!(matches!(converted, Error::Io(_)));
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::ConfigError(_)));
    }

    #[test]
    fn test_from_base64_error() {
        use base64::Engine;
        let err = base64::engine::general_purpose::STANDARD
            .decode("***")
            .unwrap_err();
        let converted: Error = err.into();
        assert_eq!(converted.error_code(), "LDIF_FORMAT");
    }
}
