//! Distinguished name parsing and composition.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use ldap_utility_core::Error as CoreError;

/// Errors raised while parsing a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    /// The input was empty or whitespace.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component had no `=` separator or was empty.
    #[error("invalid distinguished name component `{0}`")]
    InvalidComponent(String),
    /// A component had nothing on the left of `=`.
    #[error("distinguished name component `{0}` has no attribute")]
    MissingAttribute(String),
    /// A component had nothing on the right of `=`.
    #[error("distinguished name attribute `{0}` has no value")]
    MissingValue(String),
    /// The input ended inside an escape sequence.
    #[error("distinguished name ends with an unterminated escape")]
    UnterminatedEscape,
    /// Hex escapes in a value did not decode to UTF-8.
    #[error("distinguished name value `{0}` has escapes that are not valid UTF-8")]
    InvalidEscape(String),
}

impl From<DnError> for CoreError {
    fn from(err: DnError) -> Self {
        CoreError::InvalidDn(err.to_string())
    }
}

/// One `attribute=value` pair of a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rdn {
    attribute: String,
    value: String,
}

impl Rdn {
    /// Creates an RDN from an attribute name and an unescaped value.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute name (e.g. `cn`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    fn matches(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape_value(&self.value))
    }
}

/// Parsed distinguished name.
///
/// Only the syntax is checked; whether the entry exists is the server's business. The
/// canonical string form re-escapes values, so `cn=Smith\, J` round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    canonical: String,
    rdns: Vec<Vec<Rdn>>,
}

impl DistinguishedName {
    /// Parses a distinguished name.
    ///
    /// # Errors
    ///
    /// Returns [`DnError`] when the input is empty or a component is malformed.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, DnError> {
        let input = input.as_ref().trim();
        if input.is_empty() {
            return Err(DnError::Empty);
        }

        let rdns = split_unescaped(input, ',')?
            .into_iter()
            .map(|component| {
                split_unescaped(component, '+')?
                    .into_iter()
                    .map(parse_pair)
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            canonical: render(&rdns),
            rdns,
        })
    }

    /// Canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Number of RDNs (depth in the tree).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// Iterates every attribute/value pair, leaf first.
    pub fn components(&self) -> impl Iterator<Item = &Rdn> + '_ {
        self.rdns.iter().flatten()
    }

    /// Value of the first component with the given attribute (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.components()
            .find(|rdn| rdn.matches(attribute))
            .map(Rdn::value)
    }

    /// True if some component has this attribute and value (both case-insensitive).
    #[must_use]
    pub fn contains(&self, attribute: &str, value: &str) -> bool {
        self.components()
            .any(|rdn| rdn.matches(attribute) && rdn.value.eq_ignore_ascii_case(value))
    }

    /// Returns the DN of a child entry named by `rdn`.
    #[must_use]
    pub fn child(&self, rdn: Rdn) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(vec![rdn]);
        rdns.extend(self.rdns.iter().cloned());
        Self {
            canonical: render(&rdns),
            rdns,
        }
    }

    /// True when `self` lies at or below `ancestor` in the tree.
    #[must_use]
    pub fn is_within(&self, ancestor: &DistinguishedName) -> bool {
        if ancestor.rdns.len() > self.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - ancestor.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(&ancestor.rdns)
            .all(|(ours, theirs)| {
                ours.len() == theirs.len()
                    && ours.iter().zip(theirs).all(|(a, b)| {
                        a.matches(&b.attribute) && a.value.eq_ignore_ascii_case(&b.value)
                    })
            })
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for DistinguishedName {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.canonical
    }
}

/// Escapes a value for use inside a DN component.
pub(crate) fn escape_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());
    for (idx, ch) in value.chars().enumerate() {
        let special = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && matches!(ch, ' ' | '#'))
            || (idx == last && ch == ' ');
        if special {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Escapes a value for use inside a search filter assertion.
pub(crate) fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

// Splits on `delimiter` outside escape sequences; the returned slices keep their escapes.
fn split_unescaped(input: &str, delimiter: char) -> Result<Vec<&str>, DnError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (idx, ch) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == delimiter {
            parts.push(input[start..idx].trim());
            start = idx + ch.len_utf8();
        }
    }
    if escaped {
        return Err(DnError::UnterminatedEscape);
    }
    parts.push(input[start..].trim());

    if parts.iter().any(|part| part.is_empty()) {
        return Err(DnError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn parse_pair(component: &str) -> Result<Rdn, DnError> {
    let (attribute, value) = component
        .split_once('=')
        .ok_or_else(|| DnError::InvalidComponent(component.to_string()))?;
    let attribute = attribute.trim();
    let value = value.trim_start();

    // An escaped `=` before the first separator means the attribute itself is malformed.
    if attribute.is_empty() || attribute.contains('\\') {
        return Err(DnError::MissingAttribute(component.to_string()));
    }
    if value.is_empty() {
        return Err(DnError::MissingValue(attribute.to_string()));
    }
    Ok(Rdn::new(attribute, unescape(value)?))
}

// `\XX` hex pairs decode to raw bytes, so multi-byte UTF-8 may span several pairs.
fn unescape(value: &str) -> Result<String, DnError> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            push_char(&mut bytes, ch);
            continue;
        }
        let first = chars.next().ok_or(DnError::UnterminatedEscape)?;
        match (first.to_digit(16), chars.peek().and_then(|next| next.to_digit(16))) {
            (Some(high), Some(low)) => {
                chars.next();
                // Both digits are below 16, so the pair always fits in a byte.
                bytes.push(u8::try_from(high * 16 + low).unwrap_or_default());
            }
            _ => push_char(&mut bytes, first),
        }
    }
    String::from_utf8(bytes).map_err(|_| DnError::InvalidEscape(value.to_string()))
}

fn push_char(bytes: &mut Vec<u8>, ch: char) {
    let mut buf = [0; 4];
    bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
}

fn render(rdns: &[Vec<Rdn>]) -> String {
    rdns.iter()
        .map(|set| {
            set.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_people_dn() {
        let dn = DistinguishedName::parse("cn=test.user,ou=people,dc=test,dc=com").unwrap();
        assert_eq!(dn.get("CN"), Some("test.user"));
        assert_eq!(dn.get("ou"), Some("people"));
        assert!(dn.contains("dc", "TEST"));
        assert_eq!(dn.depth(), 4);
        assert_eq!(dn.to_string(), "cn=test.user,ou=people,dc=test,dc=com");
    }

    #[test]
    fn escaped_comma_stays_in_value() {
        let dn = DistinguishedName::parse("cn=Smith\\, John,ou=people,dc=test,dc=com").unwrap();
        assert_eq!(dn.get("cn"), Some("Smith, John"));
        assert!(dn.as_str().starts_with("cn=Smith\\, John,ou=people"));
    }

    #[test]
    fn hex_escapes_are_decoded() {
        let dn = DistinguishedName::parse("cn=a\\2Cb,ou=people,dc=test,dc=com").unwrap();
        assert_eq!(dn.get("cn"), Some("a,b"));
        assert_eq!(dn.as_str(), "cn=a\\,b,ou=people,dc=test,dc=com");
        assert_eq!(
            dn,
            DistinguishedName::parse("cn=a\\,b,ou=people,dc=test,dc=com").unwrap()
        );

        let dn = DistinguishedName::parse("cn=Jos\\C3\\A9,dc=test,dc=com").unwrap();
        assert_eq!(dn.get("cn"), Some("Jos\u{e9}"));
        assert!(matches!(
            DistinguishedName::parse("cn=\\FF,dc=com"),
            Err(DnError::InvalidEscape(_))
        ));
    }

    #[test]
    fn multi_valued_rdn() {
        let dn = DistinguishedName::parse("cn=John+uid=1234,dc=test,dc=com").unwrap();
        assert!(dn.contains("uid", "1234"));
        assert_eq!(dn.depth(), 3);
        assert_eq!(dn.to_string(), "cn=John+uid=1234,dc=test,dc=com");
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(DistinguishedName::parse("  "), Err(DnError::Empty));
        assert!(matches!(
            DistinguishedName::parse("dsdfasdfla"),
            Err(DnError::InvalidComponent(_))
        ));
        assert!(matches!(
            DistinguishedName::parse("cn=test,"),
            Err(DnError::InvalidComponent(_))
        ));
        assert!(matches!(
            DistinguishedName::parse("=value,dc=com"),
            Err(DnError::MissingAttribute(_))
        ));
        assert!(matches!(
            DistinguishedName::parse("cn=,dc=com"),
            Err(DnError::MissingValue(_))
        ));
        assert_eq!(
            DistinguishedName::parse("cn=test\\"),
            Err(DnError::UnterminatedEscape)
        );
    }

    #[test]
    fn child_and_ancestry() {
        let base = DistinguishedName::parse("ou=people,dc=test,dc=com").unwrap();
        let user = base.child(Rdn::new("cn", "Doe, Jane"));
        assert_eq!(user.to_string(), "cn=Doe\\, Jane,ou=people,dc=test,dc=com");
        assert!(user.is_within(&base));
        assert!(user.is_within(&user));
        assert!(!base.is_within(&user));

        let other = DistinguishedName::parse("ou=groups,dc=test,dc=com").unwrap();
        assert!(!user.is_within(&other));
    }

    #[test]
    fn escaping_helpers() {
        assert_eq!(escape_value(" #lead"), "\\ #lead");
        assert_eq!(escape_value("a=b+c"), "a\\=b\\+c");
        assert_eq!(escape_filter_value("test*(x)"), "test\\2a\\28x\\29");
        assert_eq!(Rdn::new("cn", "plain").to_string(), "cn=plain");
    }
}
