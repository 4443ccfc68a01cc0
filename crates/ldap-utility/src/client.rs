//! Directory client owning one connection.

use crate::{
    backend::Ldap3Connector,
    config::LdapConfig,
    connection::{
        ConnectTarget, DirectoryConnection, DirectoryConnector, ErrorVisibility, ResultSet,
        SessionOption,
    },
    query::{Query, QueryKind, QuerySpec},
    Result,
};
use ldap_utility_core::status::OPERATIONS_ERROR;
use ldap_utility_core::{Error, LdapStatus};
use std::sync::Arc;
use tracing::{debug, warn};

/// Client over a single directory connection.
///
/// The client applies the startup policy from [`LdapConfig`] when it connects, performs
/// binds and hands out [`Query`] builders. It is the only place where a failing connection
/// status becomes an [`Error`]. Dropping the client without [`close`](Self::close) leaves the
/// unbind to the backend.
pub struct DirectoryClient {
    config: Arc<LdapConfig>,
    connection: Box<dyn DirectoryConnection>,
    bound: bool,
}

impl DirectoryClient {
    /// Connects with the `ldap3` backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for invalid settings, [`Error::Transport`] when the
    /// server cannot be reached, or the error produced by a failed StartTLS upgrade.
    pub async fn connect(config: Arc<LdapConfig>) -> Result<Self> {
        Self::connect_with(config, &Ldap3Connector::new()).await
    }

    /// Connects through the given connector.
    ///
    /// The connection is configured in this order: error visibility, protocol version,
    /// size limit, then StartTLS when enabled. A protocol version the connection rejects
    /// fails the connect with [`Error::ConfigError`].
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn connect_with(
        config: Arc<LdapConfig>,
        connector: &dyn DirectoryConnector,
    ) -> Result<Self> {
        config.check()?;
        let target = connect_target(&config)?;
        let connection = connector
            .connect(&target)
            .await
            .map_err(|failure| Error::from_status(&failure))?;

        let mut client = Self {
            config,
            connection,
            bound: false,
        };
        if let Err(err) = client.apply_startup_policy().await {
            client.release().await;
            return Err(err);
        }
        Ok(client)
    }

    #[cfg(test)]
    pub(crate) fn with_connection(
        config: LdapConfig,
        connection: Box<dyn DirectoryConnection>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connection,
            bound: false,
        }
    }

    async fn apply_startup_policy(&mut self) -> Result<()> {
        self.connection
            .set_error_visibility(ErrorVisibility::from_suppressed(
                self.config.suppress_errors(),
            ));

        let version = self.config.protocol_version();
        if !self
            .connection
            .set_option(SessionOption::ProtocolVersion(version))
            .await
        {
            warn!(version, "directory connection rejected the protocol version");
            return Err(Error::ConfigError(format!(
                "protocol version {version} is not supported by the directory connection"
            )));
        }

        if let Some(limit) = self.config.size_limit() {
            if !self
                .connection
                .set_option(SessionOption::SizeLimit(limit))
                .await
            {
                warn!(limit, "directory connection rejected the size limit");
            }
        }

        if self.config.start_secure_transport() {
            if let Err(failure) = self.connection.start_tls().await {
                return Err(self.escalate(&failure));
            }
            self.raise_if_error()?;
            debug!("secure transport established");
        }
        Ok(())
    }

    /// Binds with an explicit DN and password.
    ///
    /// # Errors
    ///
    /// Returns the error built from the connection's status, e.g. code 49 for invalid
    /// credentials, 34 for a malformed DN or -1 when the server is unreachable.
    pub async fn bind_with_credentials(&mut self, dn: &str, password: &str) -> Result<()> {
        match self.connection.bind(dn, password).await {
            Ok(()) => {
                self.bound = true;
                debug!(dn, "bind succeeded");
                Ok(())
            }
            Err(failure) => {
                self.bound = false;
                let err = self.escalate(&failure);
                debug!(dn, code = ?err.code(), "bind failed");
                Err(err)
            }
        }
    }

    /// Binds with the configured service account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when no service DN is configured, otherwise the same
    /// errors as [`bind_with_credentials`](Self::bind_with_credentials).
    pub async fn bind_with_service_credentials(&mut self) -> Result<()> {
        let config = Arc::clone(&self.config);
        let dn = config
            .service_bind_dn()
            .ok_or_else(|| Error::ConfigError("no service bind DN configured".to_string()))?;
        let password = config.service_bind_password().unwrap_or_default();
        self.bind_with_credentials(dn, password).await
    }

    /// Starts a subtree search.
    pub fn search(&mut self) -> Query<'_> {
        Query::new(self, QueryKind::Search)
    }

    /// Starts a single-entry read.
    pub fn read(&mut self) -> Query<'_> {
        Query::new(self, QueryKind::Read)
    }

    /// Base DN used by queries that do not set their own.
    #[must_use]
    pub fn default_base_dn(&self) -> &str {
        self.config.base_dn()
    }

    /// Returns an error if the connection's current status is a failure.
    ///
    /// # Errors
    ///
    /// Returns the error matching the current non-zero code. Code 0 never raises.
    pub fn raise_if_error(&self) -> Result<()> {
        let status = self.connection.last_status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::from_status(&status))
        }
    }

    /// True after a successful bind on this connection.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.bound
    }

    /// Configuration the client was built from.
    #[must_use]
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the connection while unbinding.
    pub async fn close(mut self) -> Result<()> {
        match self.connection.close().await {
            Ok(()) => Ok(()),
            Err(failure) => Err(self.escalate(&failure)),
        }
    }

    pub(crate) async fn execute(&mut self, spec: &QuerySpec) -> Result<ResultSet> {
        let base_dn = spec.resolve_base_dn(self.default_base_dn()).to_string();
        debug!(kind = ?spec.kind(), base_dn = %base_dn, filter = spec.filter(), "executing directory query");

        let outcome = match spec.kind() {
            QueryKind::Search => {
                self.connection
                    .search(&base_dn, spec.filter(), spec.attributes())
                    .await
            }
            QueryKind::Read => {
                self.connection
                    .read(&base_dn, spec.filter(), spec.attributes())
                    .await
            }
        };
        outcome.map_err(|failure| self.escalate(&failure))
    }

    // The connection's current status wins; the returned failure only fills in when the
    // backend did not record one.
    fn escalate(&self, failure: &LdapStatus) -> Error {
        let current = self.connection.last_status();
        if !current.is_success() {
            Error::from_status(&current)
        } else if !failure.is_success() {
            Error::from_status(failure)
        } else {
            Error::from_status(&LdapStatus::from_code(OPERATIONS_ERROR))
        }
    }

    async fn release(&mut self) {
        if let Err(failure) = self.connection.close().await {
            debug!(code = failure.code(), "closing directory connection failed: {failure}");
        }
    }
}

fn connect_target(config: &LdapConfig) -> Result<ConnectTarget> {
    Ok(ConnectTarget {
        url: config.endpoint()?.to_string(),
        start_tls: config.start_secure_transport(),
        tls_verify: config.tls_verify(),
        tls_ca_cert: config.tls_ca_cert().cloned(),
        connect_timeout: config.connect_timeout(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{MockDirectoryConnection, MockDirectoryConnector};
    use ldap_utility_core::status::{CONNECT_ERROR, INVALID_CREDENTIALS, SERVER_DOWN};

    fn sample_config() -> LdapConfig {
        LdapConfig::new("localhost")
            .unwrap()
            .with_base_dn("dc=test,dc=com")
            .with_suppress_errors(true)
    }

    fn startup_expectations(connection: &mut MockDirectoryConnection) {
        connection
            .expect_set_error_visibility()
            .times(1)
            .returning(|visibility| assert_eq!(visibility, ErrorVisibility::Suppressed));
        connection
            .expect_set_option()
            .times(1)
            .returning(|option| {
                assert_eq!(option, SessionOption::ProtocolVersion(3));
                true
            });
    }

    #[tokio::test]
    async fn connect_applies_startup_policy() {
        let mut connection = MockDirectoryConnection::new();
        startup_expectations(&mut connection);

        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().times(1).return_once(move |target| {
            assert_eq!(target.url, "ldap://localhost:389");
            assert!(!target.start_tls);
            Ok(Box::new(connection))
        });

        let client = DirectoryClient::connect_with(Arc::new(sample_config()), &connector)
            .await
            .unwrap();
        assert!(!client.is_bound());
        assert_eq!(client.default_base_dn(), "dc=test,dc=com");
    }

    #[tokio::test]
    async fn failed_start_tls_is_fatal_and_releases_connection() {
        let mut connection = MockDirectoryConnection::new();
        startup_expectations(&mut connection);
        connection
            .expect_start_tls()
            .times(1)
            .returning(|| Err(LdapStatus::from_code(CONNECT_ERROR)));
        connection
            .expect_last_status()
            .returning(|| LdapStatus::from_code(CONNECT_ERROR));
        connection.expect_close().times(1).returning(|| Ok(()));

        let mut connector = MockDirectoryConnector::new();
        connector
            .expect_connect()
            .return_once(move |_| Ok(Box::new(connection)));

        let config = sample_config().with_start_secure_transport(true);
        let result = DirectoryClient::connect_with(Arc::new(config), &connector).await;
        match result {
            Err(err) => {
                assert!(err.is_transport());
                assert_eq!(err.code(), Some(CONNECT_ERROR));
            }
            Ok(_) => panic!("expected StartTLS failure"),
        }
    }

    #[tokio::test]
    async fn rejected_protocol_version_is_a_configuration_error() {
        let mut connection = MockDirectoryConnection::new();
        connection.expect_set_error_visibility().return_const(());
        connection
            .expect_set_option()
            .times(1)
            .returning(|option| {
                assert_eq!(option, SessionOption::ProtocolVersion(2));
                false
            });
        connection.expect_start_tls().never();
        connection.expect_close().times(1).returning(|| Ok(()));

        let mut connector = MockDirectoryConnector::new();
        connector
            .expect_connect()
            .return_once(move |_| Ok(Box::new(connection)));

        let config = sample_config().with_protocol_version(2);
        let result = DirectoryClient::connect_with(Arc::new(config), &connector).await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let mut connector = MockDirectoryConnector::new();
        connector
            .expect_connect()
            .return_once(|_| Err(LdapStatus::server_down()));

        let result = DirectoryClient::connect_with(Arc::new(sample_config()), &connector).await;
        match result {
            Err(err) => assert_eq!(
                err,
                Error::Transport {
                    code: SERVER_DOWN,
                    message: "Can't contact LDAP server".to_string()
                }
            ),
            Ok(_) => panic!("expected transport failure"),
        }
    }

    #[tokio::test]
    async fn invalid_configuration_never_connects() {
        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().never();

        let config = sample_config().with_protocol_version(7);
        let result = DirectoryClient::connect_with(Arc::new(config), &connector).await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn bind_success_marks_client_bound() {
        let mut connection = MockDirectoryConnection::new();
        connection.expect_bind().times(1).returning(|dn, password| {
            assert_eq!(dn, "cn=test.user,ou=people,dc=test,dc=com");
            assert_eq!(password, "test");
            Ok(())
        });
        connection
            .expect_last_status()
            .returning(LdapStatus::success);

        let mut client = DirectoryClient::with_connection(sample_config(), Box::new(connection));
        client
            .bind_with_credentials("cn=test.user,ou=people,dc=test,dc=com", "test")
            .await
            .unwrap();
        assert!(client.is_bound());
        assert!(client.raise_if_error().is_ok());
    }

    #[tokio::test]
    async fn bind_failure_carries_server_code() {
        let mut connection = MockDirectoryConnection::new();
        connection
            .expect_bind()
            .returning(|_, _| Err(LdapStatus::from_code(INVALID_CREDENTIALS)));
        connection
            .expect_last_status()
            .returning(|| LdapStatus::from_code(INVALID_CREDENTIALS));

        let mut client = DirectoryClient::with_connection(sample_config(), Box::new(connection));
        let err = client
            .bind_with_credentials("cn=invalid.user", "testasdfs")
            .await
            .unwrap_err();
        assert!(err.is_invalid_credentials());
        assert_eq!(err.code(), Some(49));
        assert!(!client.is_bound());
        assert_eq!(client.raise_if_error().unwrap_err().code(), Some(49));
    }

    #[tokio::test]
    async fn bind_failure_without_recorded_status_uses_returned_status() {
        let mut connection = MockDirectoryConnection::new();
        connection
            .expect_bind()
            .returning(|_, _| Err(LdapStatus::server_down()));
        connection
            .expect_last_status()
            .returning(LdapStatus::success);

        let mut client = DirectoryClient::with_connection(sample_config(), Box::new(connection));
        let err = client
            .bind_with_credentials("cn=test.user,dc=test,dc=com", "test")
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(err.code(), Some(SERVER_DOWN));
    }

    #[tokio::test]
    async fn service_bind_uses_configured_account() {
        let mut connection = MockDirectoryConnection::new();
        connection.expect_bind().times(1).returning(|dn, password| {
            assert_eq!(dn, "cn=admin,dc=test,dc=com");
            assert_eq!(password, "secret");
            Ok(())
        });

        let config = sample_config().with_service_credentials("cn=admin,dc=test,dc=com", "secret");
        let mut client = DirectoryClient::with_connection(config, Box::new(connection));
        client.bind_with_service_credentials().await.unwrap();
        assert!(client.is_bound());
    }

    #[tokio::test]
    async fn service_bind_requires_configured_dn() {
        let connection = MockDirectoryConnection::new();
        let mut client = DirectoryClient::with_connection(sample_config(), Box::new(connection));
        let err = client.bind_with_service_credentials().await.unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[tokio::test]
    async fn close_releases_connection() {
        let mut connection = MockDirectoryConnection::new();
        connection.expect_close().times(1).returning(|| Ok(()));

        let client = DirectoryClient::with_connection(sample_config(), Box::new(connection));
        client.close().await.unwrap();
    }
}
