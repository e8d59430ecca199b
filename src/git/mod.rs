//! Local git operations for publishing build notes.
//!
//! Everything here drives the `git` binary in a working copy:
//! - [`client::GitCli`] implements [`VcsClient`](crate::sync::VcsClient)
//!   (fetch, ref create/delete, push, notes append) plus a note reader
//! - [`workspace`] discovers whether a directory is a git work tree and
//!   which URLs its remotes point at
//!
//! Commands never prompt: a remote that wants credentials we do not have
//! fails immediately instead of hanging the build.

pub mod client;
pub mod workspace;

use std::path::Path;
use std::process::{Command, Output};

use thiserror::Error;

use crate::types::InvalidSha;

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command failed.
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Push was rejected by the remote (non-fast-forward or a ref update hook).
    #[error("push of {refname} rejected: {details}")]
    PushRejected { refname: String, details: String },

    /// Failed to fetch a ref.
    #[error("failed to fetch {refspec}: {details}")]
    FetchFailed { refspec: String, details: String },

    /// Git printed something we could not interpret.
    #[error("unexpected output from {command}: {output:?}")]
    UnexpectedOutput { command: String, output: String },

    /// Invalid SHA format.
    #[error(transparent)]
    InvalidSha(#[from] InvalidSha),

    /// IO error, usually git missing from `PATH`.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Identity used for the commits `git notes` creates.
///
/// Passed via `-c` flags so notes can be written on build agents that have
/// no `user.name` configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    /// The committer/author name (git `user.name`).
    pub name: String,

    /// The committer/author email (git `user.email`).
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        CommitIdentity {
            name: "ci-notes".to_string(),
            email: "ci-notes@localhost".to_string(),
        }
    }
}

/// Create a git Command that never prompts.
///
/// With `isolated` set, system and global git configuration are ignored too.
/// Tests use that for reproducible behavior; real builds usually need the
/// agent's credential helpers and keep it off.
pub(crate) fn git_command(workdir: &Path, isolated: bool) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(workdir);

    if isolated {
        cmd.env("GIT_CONFIG_NOSYSTEM", "1");
        cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
    }

    // Disable terminal prompts
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    // Never let an inherited override redirect notes commands
    cmd.env_remove("GIT_NOTES_REF");

    cmd
}

/// Create a git Command configured for commands that write commits.
///
/// Identity is passed per command (`-c user.name=... -c user.email=...`), so
/// no `.git/config` changes are needed.
pub(crate) fn git_commit_command(
    workdir: &Path,
    isolated: bool,
    identity: &CommitIdentity,
) -> Command {
    let mut cmd = git_command(workdir, isolated);
    cmd.arg("-c");
    cmd.arg(format!("user.name={}", identity.name));
    cmd.arg("-c");
    cmd.arg(format!("user.email={}", identity.email));
    cmd
}

/// Run a prepared git command, turning a non-zero exit into [`GitError::CommandFailed`].
pub(crate) fn run(mut cmd: Command, args: &[&str]) -> GitResult<Output> {
    let output = cmd.args(args).output()?;

    if output.status.success() {
        Ok(output)
    } else {
        Err(GitError::CommandFailed {
            command: format!("git {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Run a git command in the given working directory with isolated configuration.
pub fn run_git_sync(workdir: &Path, args: &[&str]) -> GitResult<Output> {
    run(git_command(workdir, true), args)
}

/// Run a git command and return stdout as a trimmed string.
pub fn run_git_stdout(workdir: &Path, args: &[&str]) -> GitResult<String> {
    let output = run_git_sync(workdir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}


#[cfg(test)]
mod tests {
    use super::test_repo::TestRemote;
    use super::*;

    #[test]
    fn run_git_sync_reports_command_and_stderr() {
        let remote = TestRemote::new();
        let err = run_git_sync(&remote.remote_dir, &["rev-parse", "--verify", "nope"]).unwrap_err();
        match err {
            GitError::CommandFailed { command, stderr } => {
                assert_eq!(command, "git rev-parse --verify nope");
                assert!(!stderr.is_empty());
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn run_git_stdout_trims_output() {
        let remote = TestRemote::new();
        let head = run_git_stdout(&remote.remote_dir, &["rev-parse", "refs/heads/main"]).unwrap();
        assert_eq!(head.len(), 40);
        assert!(!head.ends_with('\n'));
    }

    #[test]
    fn commit_command_carries_identity() {
        let identity = CommitIdentity {
            name: "Build Bot".to_string(),
            email: "bot@example.com".to_string(),
        };
        let cmd = git_commit_command(Path::new("."), true, &identity);
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-c",
                "user.name=Build Bot",
                "-c",
                "user.email=bot@example.com"
            ]
        );
    }
}
