//! Connection primitives backed by `ldap3`.

use crate::connection::{
    ConnectTarget, DirectoryConnection, DirectoryConnector, ErrorVisibility, RawAttribute,
    RawEntry, ResultSet, SessionOption,
};
use async_trait::async_trait;
use ldap3::{
    Ldap, LdapConnAsync, LdapConnSettings, LdapError, ResultEntry, Scope, SearchEntry,
    SearchOptions, SearchResult,
};
use ldap_utility_core::status::{
    self, CONNECT_ERROR, FILTER_ERROR, LOCAL_ERROR, SIZE_LIMIT_EXCEEDED, SUCCESS, TIMEOUT,
};
use ldap_utility_core::LdapStatus;
use native_tls::{Certificate, TlsConnector};
use std::fs;
use tracing::{debug, warn};

const MATCH_ALL_FILTER: &str = "(objectClass=*)";

/// Connector that opens real connections with `ldap3`.
///
/// StartTLS is negotiated during the connection handshake when the target asks for it;
/// [`DirectoryConnection::start_tls`] then only confirms the upgrade took place.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ldap3Connector;

impl Ldap3Connector {
    /// Creates a new connector instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Box<dyn DirectoryConnection>, LdapStatus> {
        let settings = build_ldap_settings(target)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &target.url)
            .await
            .map_err(|err| connect_failure(target, &err))?;
        ldap3::drive!(conn);
        debug!(url = %target.url, start_tls = target.start_tls, "connected to directory server");

        Ok(Box::new(Ldap3Connection::new(ldap, target.start_tls)))
    }
}

/// A single `ldap3` connection handle.
pub struct Ldap3Connection {
    inner: Ldap,
    tls_active: bool,
    visibility: ErrorVisibility,
    size_limit: Option<i32>,
    status: LdapStatus,
    closed: bool,
}

impl Ldap3Connection {
    fn new(inner: Ldap, tls_active: bool) -> Self {
        Self {
            inner,
            tls_active,
            visibility: ErrorVisibility::default(),
            size_limit: None,
            status: LdapStatus::success(),
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), LdapStatus> {
        if self.closed {
            Err(LdapStatus::server_down().with_diagnostic("connection already closed"))
        } else {
            Ok(())
        }
    }

    // Stores the outcome as the current status and logs failures per the visibility mode.
    fn record<T>(
        &mut self,
        operation: &'static str,
        outcome: Result<T, LdapStatus>,
    ) -> Result<T, LdapStatus> {
        match &outcome {
            Ok(_) => self.status = LdapStatus::success(),
            Err(failure) => {
                match self.visibility {
                    ErrorVisibility::Shown => {
                        warn!(operation, code = failure.code(), "directory operation failed: {failure}");
                    }
                    ErrorVisibility::Suppressed => {
                        debug!(operation, code = failure.code(), "directory operation failed: {failure}");
                    }
                }
                self.status = failure.clone();
            }
        }
        outcome
    }

    async fn run_search(
        &mut self,
        scope: Scope,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<ResultSet, LdapStatus> {
        self.ensure_open()?;
        if let Some(limit) = self.size_limit {
            self.inner
                .with_search_options(SearchOptions::new().sizelimit(limit));
        }

        let filter = effective_filter(filter);
        let SearchResult(entries, result) = self
            .inner
            .search(base_dn, scope, &filter, attributes.to_vec())
            .await
            .map_err(|err| status_from_error(&err))?;

        match i32::try_from(result.rc).unwrap_or(status::OPERATIONS_ERROR) {
            SUCCESS => {}
            SIZE_LIMIT_EXCEEDED => {
                warn!(base_dn, returned = entries.len(), "size limit exceeded, result is partial");
            }
            _ => return Err(status_from_result(&result)),
        }

        Ok(ResultSet::new(entries.into_iter().map(raw_entry).collect()))
    }
}

#[async_trait]
impl DirectoryConnection for Ldap3Connection {
    fn set_error_visibility(&mut self, visibility: ErrorVisibility) {
        self.visibility = visibility;
    }

    async fn set_option(&mut self, option: SessionOption) -> bool {
        match option {
            // ldap3 only speaks version 3.
            SessionOption::ProtocolVersion(version) => version == 3,
            SessionOption::SizeLimit(limit) if limit >= 0 => {
                self.size_limit = (limit > 0).then_some(limit);
                true
            }
            SessionOption::SizeLimit(_) => false,
        }
    }

    async fn start_tls(&mut self) -> Result<(), LdapStatus> {
        let outcome = self.ensure_open().and_then(|()| {
            if self.tls_active {
                Ok(())
            } else {
                Err(LdapStatus::from_code(CONNECT_ERROR)
                    .with_diagnostic("StartTLS was not negotiated on this connection"))
            }
        });
        self.record("start_tls", outcome)
    }

    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), LdapStatus> {
        let outcome = match self.ensure_open() {
            Ok(()) => match self.inner.simple_bind(dn, password).await {
                Ok(result) if result.rc == 0 => Ok(()),
                Ok(result) => Err(status_from_result(&result)),
                Err(err) => Err(status_from_error(&err)),
            },
            Err(failure) => Err(failure),
        };
        self.record("bind", outcome)
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<ResultSet, LdapStatus> {
        let outcome = self
            .run_search(Scope::Subtree, base_dn, filter, attributes)
            .await;
        self.record("search", outcome)
    }

    async fn read(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<ResultSet, LdapStatus> {
        let outcome = self
            .run_search(Scope::Base, base_dn, filter, attributes)
            .await;
        self.record("read", outcome)
    }

    fn last_status(&self) -> LdapStatus {
        self.status.clone()
    }

    async fn close(&mut self) -> Result<(), LdapStatus> {
        let outcome = match self.ensure_open() {
            Ok(()) => {
                self.closed = true;
                self.inner
                    .unbind()
                    .await
                    .map_err(|err| status_from_error(&err))
            }
            Err(failure) => Err(failure),
        };
        self.record("close", outcome)
    }
}

fn build_ldap_settings(target: &ConnectTarget) -> Result<LdapConnSettings, LdapStatus> {
    let mut settings = LdapConnSettings::new()
        .set_conn_timeout(target.connect_timeout)
        .set_starttls(target.start_tls);

    if !target.tls_verify {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| local_error(format!("failed to construct TLS connector: {err}")))?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = &target.tls_ca_cert {
        let pem = fs::read(cert_path).map_err(|err| {
            local_error(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| local_error(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| local_error(format!("failed to load CA certificate: {err}")))?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

// An unreachable server is -1 even with StartTLS; any other handshake failure is -11.
fn connect_failure(target: &ConnectTarget, err: &LdapError) -> LdapStatus {
    match err {
        LdapError::Io { .. } => LdapStatus::server_down().with_diagnostic(err.to_string()),
        _ if target.start_tls => {
            LdapStatus::from_code(CONNECT_ERROR).with_diagnostic(err.to_string())
        }
        _ => status_from_error(err),
    }
}

fn local_error(diagnostic: String) -> LdapStatus {
    LdapStatus::from_code(LOCAL_ERROR).with_diagnostic(diagnostic)
}

fn effective_filter(filter: &str) -> String {
    let filter = filter.trim();
    if filter.is_empty() {
        MATCH_ALL_FILTER.to_string()
    } else if filter.starts_with('(') {
        filter.to_string()
    } else {
        format!("({filter})")
    }
}

fn status_from_result(result: &ldap3::LdapResult) -> LdapStatus {
    let code = i32::try_from(result.rc).unwrap_or(status::OPERATIONS_ERROR);
    LdapStatus::from_code(code).with_diagnostic(result.text.clone())
}

fn status_from_error(err: &LdapError) -> LdapStatus {
    let base = match err {
        LdapError::LdapResult { result } => return status_from_result(result),
        LdapError::FilterParsing => LdapStatus::from_code(FILTER_ERROR),
        LdapError::Timeout { .. } => LdapStatus::from_code(TIMEOUT),
        _ => LdapStatus::server_down(),
    };
    base.with_diagnostic(err.to_string())
}

fn raw_entry(entry: ResultEntry) -> RawEntry {
    let entry = SearchEntry::construct(entry);
    if !entry.bin_attrs.is_empty() {
        debug!(dn = %entry.dn, skipped = entry.bin_attrs.len(), "binary attribute values are not carried");
    }

    let mut attributes = entry
        .attrs
        .into_iter()
        .map(|(name, values)| RawAttribute { name, values })
        .collect::<Vec<_>>();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));

    RawEntry {
        dn: entry.dn,
        attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldap_utility_core::status::{INVALID_DN_SYNTAX, SERVER_DOWN};
    use std::time::Duration;

    fn ldap_result(rc: u32, text: &str) -> ldap3::LdapResult {
        ldap3::LdapResult {
            rc,
            matched: String::new(),
            text: text.to_string(),
            refs: Vec::new(),
            ctrls: Vec::new(),
        }
    }

    #[test]
    fn filters_are_normalized() {
        assert_eq!(effective_filter(""), "(objectClass=*)");
        assert_eq!(effective_filter("  "), "(objectClass=*)");
        assert_eq!(effective_filter("cn=test.user*"), "(cn=test.user*)");
        assert_eq!(
            effective_filter("(&(objectClass=person)(cn=x))"),
            "(&(objectClass=person)(cn=x))"
        );
    }

    #[test]
    fn server_codes_are_kept() {
        let status = status_from_result(&ldap_result(34, "invalid DN"));
        assert_eq!(status.code(), INVALID_DN_SYNTAX);
        assert_eq!(status.message(), "Invalid DN syntax");
        assert_eq!(status.diagnostic(), Some("invalid DN"));

        let err = LdapError::LdapResult {
            result: ldap_result(49, ""),
        };
        assert_eq!(status_from_error(&err).code(), 49);
    }

    #[test]
    fn transport_failures_map_to_negative_codes() {
        assert_eq!(status_from_error(&LdapError::FilterParsing).code(), FILTER_ERROR);
        let io = LdapError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert_eq!(status_from_error(&io).code(), SERVER_DOWN);
    }

    #[test]
    fn settings_fail_on_missing_ca_file() {
        let target = ConnectTarget {
            url: "ldap://localhost:389".to_string(),
            start_tls: true,
            tls_verify: true,
            tls_ca_cert: Some("/nonexistent/ca.pem".into()),
            connect_timeout: Duration::from_secs(1),
        };
        let status = build_ldap_settings(&target).err().unwrap();
        assert_eq!(status.code(), LOCAL_ERROR);
    }

    #[tokio::test]
    async fn unreachable_server_reports_server_down() {
        let target = ConnectTarget {
            url: "ldap://127.0.0.1:1".to_string(),
            start_tls: false,
            tls_verify: true,
            tls_ca_cert: None,
            connect_timeout: Duration::from_secs(2),
        };
        let status = Ldap3Connector::new().connect(&target).await.err().unwrap();
        assert_eq!(status.code(), SERVER_DOWN);
    }
}
