//! Error types for directory operations.
//!
//! Failures reported by a connection arrive as an [`LdapStatus`] and are turned into an
//! [`Error`] exactly once, at the client boundary. Negative codes become
//! [`Error::Transport`], server codes become [`Error::Protocol`]; both keep the numeric code so
//! callers can branch on well-known values such as 34 or 49.

use crate::status::{self, LdapStatus};
use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed or incomplete settings
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The directory server could not be reached or the transport broke
    #[error("Transport error ({code}): {message}")]
    Transport {
        /// Client-side result code (negative)
        code: i32,
        /// Description of the code
        message: String,
    },

    /// The server rejected the operation
    #[error("Directory error ({code}): {message}")]
    Protocol {
        /// Server result code
        code: i32,
        /// Description of the code
        message: String,
    },

    /// A query was built with an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Username or password missing from an authentication request
    #[error("Invalid credentials input: {0}")]
    InvalidCredentialsInput(String),

    /// A distinguished name could not be parsed
    #[error("Invalid distinguished name: {0}")]
    InvalidDn(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Builds the error matching a failed status.
    ///
    /// Negative codes map to [`Error::Transport`], everything else to [`Error::Protocol`].
    /// The server's diagnostic text, when present, follows the standard description.
    #[must_use]
    pub fn from_status(status: &LdapStatus) -> Self {
        let code = status.code();
        let message = match status.diagnostic() {
            Some(diagnostic) => format!("{}: {diagnostic}", status.message()),
            None => status.message().to_string(),
        };
        if status.is_transport() {
            Self::Transport { code, message }
        } else {
            Self::Protocol { code, message }
        }
    }

    /// Returns the protocol result code carried by this error, if any.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::Transport { code, .. } | Self::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns the error code for this error type.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Protocol { .. } => "PROTOCOL_ERROR",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::InvalidCredentialsInput(_) => "INVALID_CREDENTIALS_INPUT",
            Self::InvalidDn(_) => "INVALID_DN",
        }
    }

    /// Returns true for transport-level failures.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns true when the server rejected a bind with invalid credentials.
    #[must_use]
    pub const fn is_invalid_credentials(&self) -> bool {
        matches!(
            self,
            Self::Protocol {
                code: status::INVALID_CREDENTIALS,
                ..
            }
        )
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(self, Self::ConfigError(_) | Self::Transport { .. })
    }
}

impl From<LdapStatus> for Error {
    fn from(status: LdapStatus) -> Self {
        Self::from_status(&status)
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid directory endpoint: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}
