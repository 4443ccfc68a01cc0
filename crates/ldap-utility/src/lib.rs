//! Directory (LDAP) client utilities.
//!
//! This crate provides a directory client with a fluent query builder, normalization of
//! multi-valued attribute results and a username/password authenticator built on top of it.
//! Connections are abstracted behind [`DirectoryConnection`], with an `ldap3`-backed
//! implementation in [`Ldap3Connector`].

#![deny(missing_docs)]

mod auth;
mod backend;
mod client;
mod config;
mod connection;
mod dn;
mod entry;
mod query;

pub use auth::{AuthOutcome, LdapAuthenticator};
pub use backend::{Ldap3Connection, Ldap3Connector};
pub use client::DirectoryClient;
pub use config::{
    FieldMapping, LdapConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_PORT,
    DEFAULT_PROTOCOL_VERSION,
};
pub use connection::{
    ConnectTarget, DirectoryConnection, DirectoryConnector, ErrorVisibility, RawAttribute,
    RawEntry, ResultSet, SessionOption,
};
pub use dn::{DistinguishedName, DnError, Rdn};
pub use entry::{AttributeValue, NormalizedEntry};
pub use ldap_utility_core::{Error, LdapStatus};
pub use query::{Query, QueryKind, QuerySpec};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = ldap_utility_core::Result<T>;
