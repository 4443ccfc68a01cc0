//! Username/password authentication against the directory.

use crate::{
    backend::Ldap3Connector,
    client::DirectoryClient,
    config::LdapConfig,
    connection::DirectoryConnector,
    dn::{escape_filter_value, escape_value},
    entry::NormalizedEntry,
    Result,
};
use ldap_utility_core::status::NO_SUCH_OBJECT;
use ldap_utility_core::Error;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of an authentication attempt that reached the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Bind succeeded; carries the user's profile, which is empty when the entry could not
    /// be read back.
    Authenticated(NormalizedEntry),
    /// The directory refused the credentials.
    Failed,
}

impl AuthOutcome {
    /// True for [`AuthOutcome::Authenticated`].
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Profile of an authenticated user.
    #[must_use]
    pub const fn profile(&self) -> Option<&NormalizedEntry> {
        match self {
            Self::Authenticated(profile) => Some(profile),
            Self::Failed => None,
        }
    }
}

/// Authenticates users by binding as them.
///
/// User DNs are composed from the configured username attribute and suffix:
/// `cn=test.user` with suffix `ou=people,dc=test,dc=com` binds as
/// `cn=test.user,ou=people,dc=test,dc=com`. Without a username attribute the username is
/// used as the relative DN as is, and the suffix is still appended when configured.
///
/// Each attempt opens its own connection and closes it before returning, so one
/// authenticator can serve concurrent attempts.
pub struct LdapAuthenticator {
    config: Arc<LdapConfig>,
    connector: Arc<dyn DirectoryConnector>,
}

impl LdapAuthenticator {
    /// Creates an authenticator using the `ldap3` backend.
    #[must_use]
    pub fn new(config: Arc<LdapConfig>) -> Self {
        Self::with_connector(config, Arc::new(Ldap3Connector::new()))
    }

    /// Creates an authenticator using a custom connector.
    #[must_use]
    pub fn with_connector(
        config: Arc<LdapConfig>,
        connector: Arc<dyn DirectoryConnector>,
    ) -> Self {
        Self { config, connector }
    }

    /// Verifies the credentials and returns the user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCredentialsInput`] for an empty username or password, without
    /// contacting the directory. Configuration and transport errors propagate, as does any
    /// failure while reading the profile. Directory errors during the bind produce
    /// [`AuthOutcome::Failed`] instead.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<AuthOutcome> {
        if username.is_empty() {
            return Err(Error::InvalidCredentialsInput(
                "username must not be empty".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(Error::InvalidCredentialsInput(
                "password must not be empty".to_string(),
            ));
        }

        let mut client =
            DirectoryClient::connect_with(Arc::clone(&self.config), self.connector.as_ref())
                .await?;
        let outcome = self.attempt(&mut client, username, password).await;
        if let Err(err) = client.close().await {
            warn!(error = %err, "failed to close directory connection after authentication");
        }
        outcome
    }

    async fn attempt(
        &self,
        client: &mut DirectoryClient,
        username: &str,
        password: &str,
    ) -> Result<AuthOutcome> {
        let bind_dn = self.bind_dn(username);
        match client.bind_with_credentials(&bind_dn, password).await {
            Ok(()) => {}
            Err(err @ Error::Protocol { .. }) => {
                info!(username, code = ?err.code(), "authentication rejected by directory");
                return Ok(AuthOutcome::Failed);
            }
            Err(err) => return Err(err),
        }

        let profile = match client
            .read()
            .with_base_dn(bind_dn)
            .filter(self.user_filter(username))
            .first()
            .await
        {
            Ok(profile) => profile,
            // The entry can disappear between the bind and the read.
            Err(Error::Protocol {
                code: NO_SUCH_OBJECT,
                ..
            }) => NormalizedEntry::default(),
            Err(err) => return Err(err),
        };
        if profile.is_empty() {
            debug!(username, "authenticated user has no readable entry");
        }
        info!(username, "user authenticated");
        Ok(AuthOutcome::Authenticated(profile))
    }

    /// DN the user binds as: the relative DN followed by the configured suffix, if any.
    #[must_use]
    pub fn bind_dn(&self, username: &str) -> String {
        let relative = self.relative_dn(username);
        match self.config.dn_suffix() {
            Some(suffix) => format!("{relative},{suffix}"),
            None => relative,
        }
    }

    /// The user's RDN, or the username itself when no username attribute is configured.
    #[must_use]
    pub fn relative_dn(&self, username: &str) -> String {
        match self.config.username_attribute() {
            Some(attribute) => format!("{attribute}={}", escape_value(username)),
            None => username.to_string(),
        }
    }

    /// Filter matching the user's own entry.
    #[must_use]
    pub fn user_filter(&self, username: &str) -> String {
        match self.config.username_attribute() {
            Some(attribute) => format!("({attribute}={})", escape_filter_value(username)),
            None => "(objectClass=*)".to_string(),
        }
    }
}
