//! What the host CI system tells us about a build.
//!
//! The host owns the build lifecycle; this crate only reads from it through
//! [`BuildContext`]. Every accessor may come back empty and callers degrade
//! instead of failing.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Final result of a build as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildResult {
    Success,
    /// Built, but tests or quality gates flagged problems.
    Unstable,
    Failure,
    Aborted,
    NotBuilt,
}

impl BuildResult {
    pub fn is_success(self) -> bool {
        matches!(self, BuildResult::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildResult::Success => "success",
            BuildResult::Unstable => "unstable",
            BuildResult::Failure => "failure",
            BuildResult::Aborted => "aborted",
            BuildResult::NotBuilt => "not_built",
        }
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown build result {0:?} (expected success, unstable, failure, aborted or not_built)")]
pub struct UnknownBuildResult(pub String);

impl FromStr for BuildResult {
    type Err = UnknownBuildResult;

    /// Accepts the lowercase names plus the uppercase spellings CI servers
    /// commonly export (`SUCCESS`, `NOT_BUILT`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "success" => Ok(BuildResult::Success),
            "unstable" => Ok(BuildResult::Unstable),
            "failure" | "failed" => Ok(BuildResult::Failure),
            "aborted" => Ok(BuildResult::Aborted),
            "not_built" => Ok(BuildResult::NotBuilt),
            _ => Err(UnknownBuildResult(s.to_string())),
        }
    }
}

/// Kind of source control the build checked out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScmKind {
    Git,
    /// Any other SCM; notes publishing is skipped for these.
    Other(String),
}

/// Source control configuration of the build's working copy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScmConfig {
    pub kind: Option<ScmKind>,
    /// Remote name to URIs. Only meaningful for git.
    pub remotes: BTreeMap<String, Vec<String>>,
}

impl ScmConfig {
    /// A git configuration with no remotes.
    pub fn git() -> Self {
        ScmConfig {
            kind: Some(ScmKind::Git),
            remotes: BTreeMap::new(),
        }
    }

    /// Adds a remote with the given URIs.
    pub fn with_remote<I, S>(mut self, name: impl Into<String>, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remotes
            .insert(name.into(), uris.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_git(&self) -> bool {
        matches!(self.kind, Some(ScmKind::Git))
    }

    /// First URI configured for `name`, if any.
    pub fn remote_uri(&self, name: &str) -> Option<&str> {
        self.remotes
            .get(name)?
            .iter()
            .map(String::as_str)
            .find(|uri| !uri.is_empty())
    }
}

/// Read-only view of a running build.
pub trait BuildContext {
    /// The build result, or `None` while it is still unknown.
    fn result(&self) -> Option<BuildResult>;

    /// The build's URL relative to the CI server root. May be empty.
    fn url(&self) -> Option<&str>;

    /// Absolute base URL of the CI server, if configured.
    fn root_url(&self) -> Option<&str>;

    /// SCM configuration of the working copy.
    fn scm(&self) -> ScmConfig;
}

/// A [`BuildContext`] assembled from plain values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticBuildContext {
    pub result: Option<BuildResult>,
    pub url: Option<String>,
    pub root_url: Option<String>,
    pub scm: ScmConfig,
}

impl BuildContext for StaticBuildContext {
    fn result(&self) -> Option<BuildResult> {
        self.result
    }

    fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn root_url(&self) -> Option<&str> {
        self.root_url.as_deref()
    }

    fn scm(&self) -> ScmConfig {
        self.scm.clone()
    }
}
