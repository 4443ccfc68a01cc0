//! Protocol result codes and connection status.
//!
//! Directory servers answer every operation with a numeric result code. Positive codes come
//! from the server, negative codes are produced client-side when the transport itself fails.

use serde::Serialize;
use std::fmt;

/// Operation completed successfully.
pub const SUCCESS: i32 = 0;
/// Generic server-side operations error.
pub const OPERATIONS_ERROR: i32 = 1;
/// The server could not decode or did not accept the request.
pub const PROTOCOL_ERROR: i32 = 2;
/// Server-side time limit exceeded.
pub const TIME_LIMIT_EXCEEDED: i32 = 3;
/// Server-side size limit exceeded; the result set is partial.
pub const SIZE_LIMIT_EXCEEDED: i32 = 4;
/// Requested entry does not exist.
pub const NO_SUCH_OBJECT: i32 = 32;
/// The DN is syntactically invalid.
pub const INVALID_DN_SYNTAX: i32 = 34;
/// Wrong DN or password during bind.
pub const INVALID_CREDENTIALS: i32 = 49;
/// Caller lacks access rights.
pub const INSUFFICIENT_ACCESS: i32 = 50;
/// Server refused to perform the operation.
pub const UNWILLING_TO_PERFORM: i32 = 53;
/// The server could not be reached.
pub const SERVER_DOWN: i32 = -1;
/// Client-side failure unrelated to the server.
pub const LOCAL_ERROR: i32 = -2;
/// The operation timed out client-side.
pub const TIMEOUT: i32 = -5;
/// The search filter could not be parsed.
pub const FILTER_ERROR: i32 = -7;
/// Connection setup (including StartTLS) failed.
pub const CONNECT_ERROR: i32 = -11;

/// Returns the standard description for a result code.
#[must_use]
pub const fn describe(code: i32) -> &'static str {
    match code {
        SUCCESS => "Success",
        OPERATIONS_ERROR => "Operations error",
        PROTOCOL_ERROR => "Protocol error",
        TIME_LIMIT_EXCEEDED => "Time limit exceeded",
        SIZE_LIMIT_EXCEEDED => "Size limit exceeded",
        7 => "Auth method not supported",
        8 => "Strong(er) authentication required",
        10 => "Referral",
        11 => "Administrative limit exceeded",
        16 => "No such attribute",
        17 => "Undefined attribute type",
        21 => "Invalid syntax",
        NO_SUCH_OBJECT => "No such object",
        INVALID_DN_SYNTAX => "Invalid DN syntax",
        48 => "Inappropriate authentication",
        INVALID_CREDENTIALS => "Invalid credentials",
        INSUFFICIENT_ACCESS => "Insufficient access",
        51 => "Server is busy",
        52 => "Server is unavailable",
        UNWILLING_TO_PERFORM => "Server is unwilling to perform",
        80 => "Internal (implementation specific) error",
        SERVER_DOWN => "Can't contact LDAP server",
        LOCAL_ERROR => "Local error",
        TIMEOUT => "Timed out",
        FILTER_ERROR => "Bad search filter",
        CONNECT_ERROR => "Connect error",
        _ => "Unknown error",
    }
}

/// Status of the most recent operation on a connection.
///
/// `message` always holds the standard description of `code`; the server's diagnostic text,
/// when it sent one, is kept separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LdapStatus {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostic: Option<String>,
}

impl LdapStatus {
    /// Status of a successful operation.
    #[must_use]
    pub fn success() -> Self {
        Self::from_code(SUCCESS)
    }

    /// Status for the given code with its standard description.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        Self {
            code,
            message: describe(code).to_string(),
            diagnostic: None,
        }
    }

    /// Status reported when the server cannot be contacted.
    #[must_use]
    pub fn server_down() -> Self {
        Self::from_code(SERVER_DOWN)
    }

    /// Attaches the server (or transport) diagnostic text.
    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        self.diagnostic = (!diagnostic.is_empty()).then_some(diagnostic);
        self
    }

    /// Numeric result code.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// Standard description of the result code.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Diagnostic text supplied alongside the code, if any.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    /// Returns true when the code is [`SUCCESS`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == SUCCESS
    }

    /// Returns true for client-side (transport) codes.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        self.code < 0
    }
}

impl Default for LdapStatus {
    fn default() -> Self {
        Self::success()
    }
}

impl fmt::Display for LdapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.diagnostic {
            Some(diagnostic) => write!(f, "{} ({}): {diagnostic}", self.message, self.code),
            None => write!(f, "{} ({})", self.message, self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_codes_have_descriptions() {
        assert_eq!(describe(INVALID_DN_SYNTAX), "Invalid DN syntax");
        assert_eq!(describe(INVALID_CREDENTIALS), "Invalid credentials");
        assert_eq!(describe(SERVER_DOWN), "Can't contact LDAP server");
        assert_eq!(describe(12345), "Unknown error");
    }

    #[test]
    fn status_classification() {
        assert!(LdapStatus::success().is_success());
        assert!(LdapStatus::server_down().is_transport());

        let status = LdapStatus::from_code(INVALID_CREDENTIALS);
        assert!(!status.is_success());
        assert!(!status.is_transport());
        assert_eq!(status.message(), "Invalid credentials");
    }

    #[test]
    fn empty_diagnostic_is_dropped() {
        let status = LdapStatus::from_code(NO_SUCH_OBJECT).with_diagnostic("");
        assert!(status.diagnostic().is_none());
        assert_eq!(status.to_string(), "No such object (32)");

        let status = status.with_diagnostic("entry ou=missing not found");
        assert_eq!(
            status.to_string(),
            "No such object (32): entry ou=missing not found"
        );
    }
}
