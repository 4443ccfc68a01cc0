//! Connection primitives and raw result types.
//!
//! A [`DirectoryConnection`] models one sequential conversation with one server. Its
//! primitives never raise errors of their own: a failing call returns the [`LdapStatus`] the
//! server (or transport) reported and records it as the connection's current status. Turning
//! that status into an [`ldap_utility_core::Error`] is left to
//! [`DirectoryClient`](crate::DirectoryClient).

use async_trait::async_trait;
use ldap_utility_core::LdapStatus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Protocol-level options accepted by [`DirectoryConnection::set_option`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOption {
    /// Protocol version to speak.
    ProtocolVersion(u8),
    /// Maximum number of entries the server should return per search.
    SizeLimit(i32),
}

/// How a connection reports failing primitives in the logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorVisibility {
    /// Failures are logged as warnings.
    #[default]
    Shown,
    /// Failures are only logged at debug level.
    Suppressed,
}

impl ErrorVisibility {
    /// Maps the `suppressErrors` setting to a visibility mode.
    #[must_use]
    pub const fn from_suppressed(suppressed: bool) -> Self {
        if suppressed {
            Self::Suppressed
        } else {
            Self::Shown
        }
    }
}

/// Everything a connector needs to open a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Server URL (`ldap://host:port`, `ldaps://host`).
    pub url: String,
    /// Negotiate StartTLS right after connecting.
    pub start_tls: bool,
    /// Verify the server certificate.
    pub tls_verify: bool,
    /// Extra CA certificate trusted for verification.
    pub tls_ca_cert: Option<PathBuf>,
    /// Transport connection timeout.
    pub connect_timeout: Duration,
}

/// One attribute of a raw entry: a name and `count` values in server order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAttribute {
    /// Attribute name as returned by the server.
    pub name: String,
    /// Values in server order.
    #[serde(default)]
    pub values: Vec<String>,
}

impl RawAttribute {
    /// Creates an attribute from its name and values.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of values the server sent.
    #[must_use]
    pub fn count(&self) -> usize {
        self.values.len()
    }
}

/// Entry as returned by the server, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attributes in server order.
    #[serde(default)]
    pub attributes: Vec<RawAttribute>,
}

impl RawEntry {
    /// Creates an entry without attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    /// Appends an attribute.
    #[must_use]
    pub fn with_attribute<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.push(RawAttribute::new(name, values));
        self
    }

    /// All attributes of the entry.
    #[must_use]
    pub fn attributes(&self) -> &[RawAttribute] {
        &self.attributes
    }
}

/// Entries produced by one search or read, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    entries: Vec<RawEntry>,
}

impl ResultSet {
    /// Wraps the entries returned by the server.
    #[must_use]
    pub fn new(entries: Vec<RawEntry>) -> Self {
        Self { entries }
    }

    /// Number of entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// All entries.
    #[must_use]
    pub fn entries(&self) -> &[RawEntry] {
        &self.entries
    }

    /// First entry, if the operation matched anything.
    #[must_use]
    pub fn first_entry(&self) -> Option<&RawEntry> {
        self.entries.first()
    }

    /// Consumes the set and returns its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<RawEntry> {
        self.entries
    }
}

impl From<Vec<RawEntry>> for ResultSet {
    fn from(entries: Vec<RawEntry>) -> Self {
        Self::new(entries)
    }
}

/// Primitive operations over a single connection handle.
///
/// Calls are sequential; implementations may assume `&mut self` exclusivity. After
/// [`close`](Self::close) every primitive fails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Selects how failing primitives are logged.
    fn set_error_visibility(&mut self, visibility: ErrorVisibility);

    /// Applies a protocol option; returns false if it was not accepted.
    async fn set_option(&mut self, option: SessionOption) -> bool;

    /// Upgrades the connection to TLS.
    async fn start_tls(&mut self) -> Result<(), LdapStatus>;

    /// Simple bind with a DN and password.
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), LdapStatus>;

    /// Subtree search rooted at `base_dn`. An empty attribute list requests all attributes.
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<ResultSet, LdapStatus>;

    /// Reads the single entry named by `base_dn`, if it matches `filter`.
    async fn read(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<ResultSet, LdapStatus>;

    /// Status of the most recent primitive (code 0 after a success).
    fn last_status(&self) -> LdapStatus;

    /// Releases the handle.
    async fn close(&mut self) -> Result<(), LdapStatus>;
}

/// Opens connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Connects to the target, returning the handle or the status describing the failure.
    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Box<dyn DirectoryConnection>, LdapStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_set_accessors() {
        let set = ResultSet::from(vec![
            RawEntry::new("cn=a,dc=test,dc=com").with_attribute("cn", ["a"]),
            RawEntry::new("cn=b,dc=test,dc=com"),
        ]);
        assert_eq!(set.count(), 2);
        assert_eq!(set.first_entry().unwrap().dn, "cn=a,dc=test,dc=com");
        assert_eq!(set.entries()[0].attributes()[0].count(), 1);
        assert!(ResultSet::default().first_entry().is_none());
    }

    #[test]
    fn visibility_from_setting() {
        assert_eq!(
            ErrorVisibility::from_suppressed(true),
            ErrorVisibility::Suppressed
        );
        assert_eq!(ErrorVisibility::from_suppressed(false), ErrorVisibility::Shown);
    }
}
