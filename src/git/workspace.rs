//! A [`BuildContext`] for a build running in a local working copy.
//!
//! The CI job passes the result and URLs in; SCM kind and remotes are read
//! from the working copy itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::git_command;
use crate::types::{BuildContext, BuildResult, ScmConfig, ScmKind};

/// Whether `dir` is inside a git work tree.
pub fn is_git_work_tree(dir: &Path, isolated: bool) -> bool {
    git_command(dir, isolated)
        .args(["rev-parse", "--is-inside-work-tree"])
        .output()
        .map(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).trim() == "true")
        .unwrap_or(false)
}

/// Every URL configured for `remote` (`remote.<name>.url`), in config order.
///
/// An unconfigured remote yields an empty list.
pub fn remote_urls(dir: &Path, remote: &str, isolated: bool) -> Vec<String> {
    let key = format!("remote.{remote}.url");
    match git_command(dir, isolated)
        .args(["config", "--get-all", key.as_str()])
        .output()
    {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        Ok(_) => Vec::new(),
        Err(e) => {
            debug!(error = %e, "could not run git config");
            Vec::new()
        }
    }
}

/// Build context for the working copy at `workdir`.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceContext {
    pub workdir: PathBuf,
    pub remote_name: String,
    pub result: Option<BuildResult>,
    pub url: Option<String>,
    pub root_url: Option<String>,
    pub isolated: bool,
}

impl BuildContext for WorkspaceContext {
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
        if !is_git_work_tree(&self.workdir, self.isolated) {
            return ScmConfig {
                kind: None,
                remotes: BTreeMap::new(),
            };
        }
        let urls = remote_urls(&self.workdir, &self.remote_name, self.isolated);
        let mut scm = ScmConfig {
            kind: Some(ScmKind::Git),
            remotes: BTreeMap::new(),
        };
        if !urls.is_empty() {
            scm.remotes.insert(self.remote_name.clone(), urls);
        }
        scm
    }
}
