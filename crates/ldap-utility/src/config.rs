//! Configuration for directory clients and the authentication adapter.

use crate::{dn::DistinguishedName, Result};
use ldap_utility_core::Error;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Default directory port.
pub const DEFAULT_PORT: u16 = 389;
/// Default protocol version.
pub const DEFAULT_PROTOCOL_VERSION: u8 = 3;
/// Default connection timeout (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Naming rules used to turn a username into a DN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FieldMapping {
    /// Attribute prefixed to the username (`cn` gives `cn=<username>`).
    #[serde(default, alias = "usernameAttribute")]
    pub username: Option<String>,
    /// Container appended to the relative DN (`ou=people,dc=example,dc=com`).
    #[serde(default, alias = "dnSuffix")]
    pub suffix: Option<String>,
}

/// Connection and naming settings.
///
/// Deserializes from the camelCase keys (`baseDn`, `startSecureTransport`, ...) and also
/// accepts the legacy spellings `protocol_version`, `baseDN`, `startTLS`, `hideErrors`,
/// `commonBindDn` and `commonBindPassword`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LdapConfig {
    #[validate(length(min = 1, message = "host is required"))]
    host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    port: u16,

    #[serde(default = "default_protocol_version", alias = "protocol_version")]
    #[validate(range(min = 2, max = 3))]
    protocol_version: u8,

    #[serde(default, alias = "baseDN")]
    base_dn: String,

    #[serde(default, alias = "startTLS")]
    start_secure_transport: bool,

    #[serde(default, alias = "commonBindDn")]
    service_bind_dn: Option<String>,

    #[serde(
        default,
        alias = "commonBindPassword",
        deserialize_with = "deserialize_secret"
    )]
    service_bind_password: Option<SecretString>,

    #[serde(default, alias = "hideErrors")]
    suppress_errors: bool,

    #[serde(default)]
    fields: FieldMapping,

    #[serde(default = "default_tls_verify")]
    tls_verify: bool,

    #[serde(default)]
    tls_ca_cert: Option<PathBuf>,

    #[serde(default = "default_connect_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    connect_timeout_secs: u64,

    #[serde(default)]
    #[validate(range(min = 0))]
    size_limit: Option<i32>,
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_protocol_version() -> u8 {
    DEFAULT_PROTOCOL_VERSION
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|value| !value.is_empty())
        .map(SecretString::from))
}

impl LdapConfig {
    /// Creates a configuration for `host` with every other option at its default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the host is empty.
    pub fn new(host: impl Into<String>) -> Result<Self> {
        let config = Self {
            host: host.into(),
            port: DEFAULT_PORT,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            base_dn: String::new(),
            start_secure_transport: false,
            service_bind_dn: None,
            service_bind_password: None,
            suppress_errors: false,
            fields: FieldMapping::default(),
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            size_limit: None,
        };
        config.check()?;
        Ok(config)
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] on malformed JSON or invalid settings.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// Builds and validates a configuration from an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] on invalid settings.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)?;
        config.check()?;
        Ok(config)
    }

    /// Validates every setting, including the DN syntax of `baseDn` and the DN suffix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first problem found.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if self.host.trim().is_empty() {
            return Err(Error::ConfigError("host is required".to_string()));
        }
        if !self.base_dn.is_empty() {
            DistinguishedName::parse(&self.base_dn)
                .map_err(|err| Error::ConfigError(format!("invalid baseDn: {err}")))?;
        }
        if let Some(suffix) = self.dn_suffix() {
            DistinguishedName::parse(suffix)
                .map_err(|err| Error::ConfigError(format!("invalid DN suffix: {err}")))?;
        }
        if self.service_bind_password.is_some() && self.service_bind_dn().is_none() {
            return Err(Error::ConfigError(
                "service bind password given without a service bind DN".to_string(),
            ));
        }
        self.endpoint().map(|_| ())
    }

    /// Returns the `ldap://` or `ldaps://` URL to connect to.
    ///
    /// A host given as a URL keeps its scheme, and its port when present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the endpoint cannot be parsed.
    pub fn endpoint(&self) -> Result<Url> {
        let host = self.host.trim();
        let mut url = if host.contains("://") {
            Url::parse(host)?
        } else if host.contains(':') && !host.starts_with('[') {
            Url::parse(&format!("ldap://[{host}]"))?
        } else {
            Url::parse(&format!("ldap://{host}"))?
        };

        match url.scheme() {
            "ldap" | "ldaps" | "ldapi" => {}
            other => {
                return Err(Error::ConfigError(format!(
                    "unsupported directory URL scheme `{other}`"
                )))
            }
        }
        if url.scheme() != "ldapi" && url.host_str().map_or(true, str::is_empty) {
            return Err(Error::ConfigError(format!("no host in `{host}`")));
        }
        if url.port().is_none() && url.scheme() == "ldap" {
            url.set_port(Some(self.port))
                .map_err(|()| Error::ConfigError(format!("cannot set port on `{host}`")))?;
        }
        Ok(url)
    }

    /// Directory host as configured.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Directory port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Protocol version to request.
    #[must_use]
    pub const fn protocol_version(&self) -> u8 {
        self.protocol_version
    }

    /// Fallback search root for queries without their own base DN.
    #[must_use]
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// Whether the connection is upgraded with StartTLS.
    #[must_use]
    pub const fn start_secure_transport(&self) -> bool {
        self.start_secure_transport
    }

    /// DN used for unattended binds.
    #[must_use]
    pub fn service_bind_dn(&self) -> Option<&str> {
        self.service_bind_dn.as_deref().filter(|dn| !dn.is_empty())
    }

    /// Password used for unattended binds.
    #[must_use]
    pub fn service_bind_password(&self) -> Option<&str> {
        self.service_bind_password
            .as_ref()
            .map(ExposeSecret::expose_secret)
    }

    /// Whether primitive-level failure diagnostics are demoted to debug logs.
    #[must_use]
    pub const fn suppress_errors(&self) -> bool {
        self.suppress_errors
    }

    /// Attribute used to build a user's RDN.
    #[must_use]
    pub fn username_attribute(&self) -> Option<&str> {
        self.fields.username.as_deref().filter(|attr| !attr.is_empty())
    }

    /// Container DN appended to user RDNs.
    #[must_use]
    pub fn dn_suffix(&self) -> Option<&str> {
        self.fields.suffix.as_deref().filter(|suffix| !suffix.is_empty())
    }

    /// Whether TLS certificates are verified.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Transport connection timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Maximum number of entries requested per search.
    #[must_use]
    pub const fn size_limit(&self) -> Option<i32> {
        self.size_limit
    }

    /// Overrides the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Overrides the protocol version.
    #[must_use]
    pub const fn with_protocol_version(mut self, version: u8) -> Self {
        self.protocol_version = version;
        self
    }

    /// Sets the fallback base DN.
    #[must_use]
    pub fn with_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        self.base_dn = base_dn.into();
        self
    }

    /// Enables or disables StartTLS.
    #[must_use]
    pub const fn with_start_secure_transport(mut self, enabled: bool) -> Self {
        self.start_secure_transport = enabled;
        self
    }

    /// Sets the service account used by unattended binds.
    #[must_use]
    pub fn with_service_credentials(
        mut self,
        bind_dn: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.service_bind_dn = Some(bind_dn.into());
        self.service_bind_password = Some(SecretString::from(password.into()));
        self
    }

    /// Demotes primitive-level failure diagnostics to debug logs.
    #[must_use]
    pub const fn with_suppress_errors(mut self, suppress: bool) -> Self {
        self.suppress_errors = suppress;
        self
    }

    /// Sets the naming rules for user DNs.
    #[must_use]
    pub fn with_fields(
        mut self,
        username_attribute: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        self.fields = FieldMapping {
            username: Some(username_attribute.into()),
            suffix: Some(suffix.into()),
        };
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connect_timeout_secs(mut self, seconds: u64) -> Self {
        self.connect_timeout_secs = seconds;
        self
    }

    /// Caps the number of entries returned per search.
    #[must_use]
    pub const fn with_size_limit(mut self, limit: i32) -> Self {
        self.size_limit = Some(limit);
        self
    }
}
