//! # Repository locations
//!
//! Splits a Subversion URL into the module, branch kind and instance that
//! archive names are derived from:
//!
//! - `.../blog/trunk` → `blog`, trunk, `trunk`
//! - `.../blog/tags/0.2.2` → `blog`, tags, `0.2.2`
//! - `.../blog/branches/0.2.2` → `blog`, branches, `0.2.2`
//! - `.../blog/tags/rc/0.2.2-rc1` → `blog`, tags, `0.2.2-rc1`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// A remote repository subtree. Compared by exact URL string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryTarget {
    url: String,
}

impl RepositoryTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Accept a URL supplied by a client.
    ///
    /// The string is kept verbatim; it is only rejected when it could be
    /// mistaken for a command-line option or carries characters no svn URL
    /// contains.
    pub fn from_untrusted(raw: &str) -> Result<Self, ArchiveError> {
        if raw.is_empty() {
            return Err(ArchiveError::InvalidTarget("empty URL".to_string()));
        }
        if raw.starts_with('-') {
            return Err(ArchiveError::InvalidTarget(format!(
                "{raw:?} looks like an option"
            )));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ArchiveError::InvalidTarget(format!(
                "{raw:?} contains whitespace or control characters"
            )));
        }
        match raw.split_once("://") {
            Some((scheme, _))
                if !scheme.is_empty()
                    && scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
            {
                Ok(Self::new(raw))
            }
            _ => Err(ArchiveError::InvalidTarget(format!(
                "{raw:?} has no scheme"
            ))),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RepositoryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    Trunk,
    Tags,
    Branches,
    Sandbox,
}

impl BranchKind {
    pub const ALL: [BranchKind; 4] = [
        BranchKind::Branches,
        BranchKind::Tags,
        BranchKind::Trunk,
        BranchKind::Sandbox,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BranchKind::Trunk => "trunk",
            BranchKind::Tags => "tags",
            BranchKind::Branches => "branches",
            BranchKind::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BranchKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BranchKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedLocation {
    pub module: String,
    pub kind: BranchKind,
    pub instance: String,
}

impl ParsedLocation {
    pub fn parse(target: &RepositoryTarget) -> Self {
        parse(target.url())
    }
}

/// Decompose `url` into module, kind and instance. Never fails.
///
/// The first `{module}/{kind}` segment pair wins, the authority counting as a
/// candidate module. Without a kind keyword the location is treated as trunk
/// of the first path segment after the authority.
pub fn parse(url: &str) -> ParsedLocation {
    let (authority, path) = split_authority(url);

    let segments: Vec<&str> = authority
        .into_iter()
        .chain(path.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect();

    let instance = segments.last().copied().unwrap_or_default().to_string();

    let keyword_pair = segments.windows(2).find_map(|pair| {
        pair[1]
            .parse::<BranchKind>()
            .ok()
            .map(|kind| (pair[0], kind))
    });

    let (module, kind) = match keyword_pair {
        Some((module, kind)) => (module, kind),
        None => {
            let path_start = usize::from(authority.is_some_and(|a| !a.is_empty()));
            let module = segments
                .get(path_start)
                .or_else(|| segments.first())
                .copied()
                .unwrap_or_default();
            (module, BranchKind::Trunk)
        }
    };

    ParsedLocation {
        module: module.to_string(),
        kind,
        instance,
    }
}

/// Split `scheme://authority/path` into `(Some(authority), path)`.
/// URLs without a scheme are all path.
fn split_authority(url: &str) -> (Option<&str>, &str) {
    match url.split_once("://") {
        Some((_, rest)) => match rest.split_once('/') {
            Some((authority, path)) => (Some(authority), path),
            None => (Some(rest), ""),
        },
        None => (None, url),
    }
}
