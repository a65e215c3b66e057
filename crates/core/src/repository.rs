//! Repository names (`owner/name`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A repository identified by owner and name, rendered as `owner/name`.
///
/// Used both for allowlist rows and for repository claims carried by
/// credentials. Both parts are non-empty and contain no `/`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryName {
    owner: String,
    name: String,
}

impl RepositoryName {
    /// Build a repository name from its two parts.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> crate::Result<Self> {
        let owner = owner.into();
        let name = name.into();
        validate_part("owner", &owner)?;
        validate_part("name", &name)?;
        Ok(Self { owner, name })
    }

    /// Parse `owner/name`.
    pub fn parse(full_name: &str) -> crate::Result<Self> {
        let (owner, name) = full_name.split_once('/').ok_or_else(|| {
            crate::Error::InvalidRepository(format!("expected owner/name, got {full_name:?}"))
        })?;
        Self::new(owner, name)
    }

    /// Build from URL path segments, dropping a trailing `.git` on the name.
    pub fn from_path(owner: &str, name: &str) -> crate::Result<Self> {
        let name = name.strip_suffix(".git").unwrap_or(name);
        Self::new(owner, name)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

fn validate_part(label: &str, value: &str) -> crate::Result<()> {
    if value.is_empty() {
        return Err(crate::Error::InvalidRepository(format!(
            "{label} must not be empty"
        )));
    }
    if value.contains('/') {
        return Err(crate::Error::InvalidRepository(format!(
            "{label} must not contain '/'"
        )));
    }
    if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(crate::Error::InvalidRepository(format!(
            "{label} contains whitespace or control characters"
        )));
    }
    Ok(())
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryName {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RepositoryName {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<RepositoryName> for String {
    fn from(repo: RepositoryName) -> Self {
        repo.full_name()
    }
}
