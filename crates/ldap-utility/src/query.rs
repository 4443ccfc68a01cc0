//! Fluent query builder over search and read operations.

use crate::{client::DirectoryClient, connection::ResultSet, entry::NormalizedEntry, Result};
use ldap_utility_core::Error;

/// Which primitive a query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Subtree search below the base DN.
    Search,
    /// Read of exactly the entry named by the base DN.
    Read,
}

/// Builder state of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    kind: QueryKind,
    base_dn: Option<String>,
    filter: String,
    attributes: Vec<String>,
}

impl QuerySpec {
    /// Empty spec for the given kind: no base DN override, empty filter, all attributes.
    #[must_use]
    pub const fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            base_dn: None,
            filter: String::new(),
            attributes: Vec::new(),
        }
    }

    /// Operation kind, fixed at construction.
    #[must_use]
    pub const fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Explicit base DN, if one was set.
    #[must_use]
    pub fn base_dn(&self) -> Option<&str> {
        self.base_dn.as_deref()
    }

    /// Explicit base DN, else `default`.
    #[must_use]
    pub fn resolve_base_dn<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_dn.as_deref().unwrap_or(default)
    }

    /// Search filter (empty matches everything).
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Requested attributes (empty requests all).
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    fn check(&self) -> Result<()> {
        if self.attributes.iter().any(|name| name.trim().is_empty()) {
            return Err(Error::InvalidArgument(
                "attribute names must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Single-use query bound to a [`DirectoryClient`].
///
/// Builder calls overwrite earlier values. The base DN falls back to the client's default
/// at execution time, so the order of builder calls does not matter. Terminal calls consume
/// the query.
///
/// ```no_run
/// # async fn example(client: &mut ldap_utility::DirectoryClient) -> ldap_utility::Result<()> {
/// let people = client
///     .search()
///     .with_base_dn("ou=people,dc=test,dc=com")
///     .filter("cn=test.user*")
///     .select(["cn", "mail"])
///     .all()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Query<'a> {
    client: &'a mut DirectoryClient,
    spec: QuerySpec,
}

impl<'a> Query<'a> {
    pub(crate) fn new(client: &'a mut DirectoryClient, kind: QueryKind) -> Self {
        Self {
            client,
            spec: QuerySpec::new(kind),
        }
    }

    /// Sets the base DN.
    #[must_use]
    pub fn with_base_dn(mut self, dn: impl Into<String>) -> Self {
        self.spec.base_dn = Some(dn.into());
        self
    }

    /// Sets the filter.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.spec.filter = filter.into();
        self
    }

    /// Replaces the list of attributes to fetch.
    #[must_use]
    pub fn select<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Operation kind.
    #[must_use]
    pub fn kind(&self) -> QueryKind {
        self.spec.kind()
    }

    /// Current builder state.
    #[must_use]
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Base DN the query would run against right now.
    #[must_use]
    pub fn base_dn(&self) -> &str {
        self.spec.resolve_base_dn(self.client.default_base_dn())
    }

    /// Runs the operation and returns the raw result set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for empty attribute names, otherwise the error
    /// built from the connection's status when the operation fails.
    pub async fn execute(self) -> Result<ResultSet> {
        self.spec.check()?;
        self.client.execute(&self.spec).await
    }

    /// Returns the first matching entry, or an empty entry when nothing matched.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn first(self) -> Result<NormalizedEntry> {
        let results = self.execute().await?;
        Ok(results
            .first_entry()
            .map(NormalizedEntry::from_raw)
            .unwrap_or_default())
    }

    /// Returns every matching entry in server order.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn all(self) -> Result<Vec<NormalizedEntry>> {
        let results = self.execute().await?;
        Ok(NormalizedEntry::from_result_set(&results))
    }
}
