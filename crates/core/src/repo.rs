//! Repository identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A forge repository identified as `org/name`.
///
/// Both segments are non-empty and contain no further `/`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId {
    org: String,
    name: String,
}

impl RepoId {
    /// Parse an `org/name` string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(org), Some(name), None) if !org.is_empty() && !name.is_empty() => Ok(Self {
                org: org.to_string(),
                name: name.to_string(),
            }),
            _ => Err(crate::Error::InvalidRepoId(format!(
                "expected exactly 2 parts separated by '/', got {s:?}"
            ))),
        }
    }

    /// Parse a repository URL by stripping the forge base URL prefix.
    ///
    /// `https://forge.example/acme/widgets` with base `https://forge.example/`
    /// becomes `acme/widgets`.
    pub fn from_url(base_url: &str, url: &str) -> crate::Result<Self> {
        let rest = url.strip_prefix(base_url).ok_or_else(|| {
            crate::Error::InvalidRepoId(format!("{url} does not start with {base_url}"))
        })?;
        Self::parse(rest.trim_end_matches('/'))
    }

    /// Organization (owner) segment.
    pub fn org(&self) -> &str {
        &self.org
    }

    /// Repository name segment.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.name)
    }
}

impl fmt::Debug for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoId({self})")
    }
}

impl TryFrom<String> for RepoId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<RepoId> for String {
    fn from(value: RepoId) -> Self {
        value.to_string()
    }
}

impl std::str::FromStr for RepoId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}
