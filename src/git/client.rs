//! [`VcsClient`] implementation backed by the `git` command line.
//!
//! A freshly created notes ref points at a parentless commit with an empty
//! tree, which `git notes` reads as "no notes yet". Appends then build on
//! that commit, so the remote only ever sees fast-forwards from us.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, instrument};

use super::{CommitIdentity, GitError, GitResult, git_command, git_commit_command, run};
use crate::sync::VcsClient;
use crate::types::{NotesRef, Sha};

/// Message of the commit a new notes ref starts from.
const CREATE_REF_MESSAGE: &str = "Notes ref created by ci-notes";

/// A git working copy driven through the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
    identity: CommitIdentity,
    isolated: bool,
}

impl GitCli {
    /// Operates on `workdir` using the agent's own git configuration.
    pub fn new(workdir: impl Into<PathBuf>, identity: CommitIdentity) -> Self {
        GitCli {
            workdir: workdir.into(),
            identity,
            isolated: false,
        }
    }

    /// Ignores system and global git configuration.
    pub fn isolated(mut self) -> Self {
        self.isolated = true;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn command(&self) -> Command {
        git_command(&self.workdir, self.isolated)
    }

    fn commit_command(&self) -> Command {
        git_commit_command(&self.workdir, self.isolated, &self.identity)
    }

    fn stdout(&self, cmd: Command, args: &[&str]) -> GitResult<String> {
        let output = run(cmd, args)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Resolves a revision of this working copy to a SHA.
    pub fn rev_parse(&self, rev: &str) -> GitResult<Sha> {
        let stdout = self.stdout(self.command(), &["rev-parse", "--verify", rev])?;
        Ok(Sha::parse(stdout)?)
    }

    /// Reads the note `notes_ref` holds for `commit`.
    ///
    /// Returns `None` when the commit has no note or the ref does not exist.
    pub fn read_note(&self, notes_ref: &NotesRef, commit: &str) -> GitResult<Option<String>> {
        if !self.ref_exists(notes_ref)? {
            return Ok(None);
        }
        let args = ["notes", "--ref", notes_ref.as_str(), "show", commit];
        let output = self.command().args(args).output()?;
        if output.status.success() {
            return Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no note found") {
            return Ok(None);
        }
        Err(GitError::CommandFailed {
            command: format!("git {}", args.join(" ")),
            stderr: stderr.trim().to_string(),
        })
    }
}

impl VcsClient for GitCli {
    #[instrument(skip(self), fields(workdir = %self.workdir.display()))]
    fn fetch(&self, remote_uri: &str, refspecs: &[String]) -> GitResult<()> {
        let mut args = vec!["fetch", "--no-tags", remote_uri];
        args.extend(refspecs.iter().map(String::as_str));
        run(self.command(), &args).map_err(|e| GitError::FetchFailed {
            refspec: refspecs.join(" "),
            details: match e {
                GitError::CommandFailed { stderr, .. } => stderr,
                other => other.to_string(),
            },
        })?;
        debug!("fetched");
        Ok(())
    }

    fn ref_exists(&self, notes_ref: &NotesRef) -> GitResult<bool> {
        let args = ["show-ref", "--verify", "--quiet", notes_ref.as_str()];
        let output = self.command().args(args).output()?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    #[instrument(skip(self), fields(workdir = %self.workdir.display()))]
    fn create_ref(&self, notes_ref: &NotesRef) -> GitResult<()> {
        // mktree reads an empty stdin and writes the empty tree
        let tree = self.stdout(self.command(), &["mktree"])?;
        let tree = Sha::parse(&tree).map_err(|_| GitError::UnexpectedOutput {
            command: "git mktree".to_string(),
            output: tree,
        })?;
        let commit = self.stdout(
            self.commit_command(),
            &["commit-tree", tree.as_str(), "-m", CREATE_REF_MESSAGE],
        )?;
        let commit = Sha::parse(commit)?;
        // Empty old value: refuse to clobber a ref that appeared meanwhile
        run(
            self.command(),
            &[
                "update-ref",
                "-m",
                CREATE_REF_MESSAGE,
                notes_ref.as_str(),
                commit.as_str(),
                "",
            ],
        )?;
        debug!(commit = %commit.short(), "created notes ref");
        Ok(())
    }

    #[instrument(skip(self), fields(workdir = %self.workdir.display()))]
    fn delete_ref(&self, notes_ref: &NotesRef) -> GitResult<()> {
        run(self.command(), &["update-ref", "-d", notes_ref.as_str()])?;
        Ok(())
    }

    /// Pushes without force; a remote that moved on rejects the push.
    #[instrument(skip(self), fields(workdir = %self.workdir.display()))]
    fn push(&self, remote_uri: &str, notes_ref: &NotesRef) -> GitResult<()> {
        let refspec = format!("{0}:{0}", notes_ref.as_str());
        let output = self
            .command()
            .args(["push", "--porcelain", remote_uri, refspec.as_str()])
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            debug!(up_to_date = stdout.contains("[up to date]"), "pushed");
            return Ok(());
        }

        // Porcelain status lines start with `!` for rejected refs
        if stdout.lines().any(|l| l.starts_with('!'))
            || stderr.contains("non-fast-forward")
            || stderr.contains("rejected")
            || stderr.contains("fetch first")
        {
            return Err(GitError::PushRejected {
                refname: notes_ref.to_string(),
                details: format!("{} {}", stdout.trim(), stderr.trim()).trim().to_string(),
            });
        }

        Err(GitError::CommandFailed {
            command: format!("git push --porcelain {remote_uri} {refspec}"),
            stderr: stderr.trim().to_string(),
        })
    }

    #[instrument(skip(self, text), fields(workdir = %self.workdir.display()))]
    fn append_note(&self, text: &str, notes_ref: &NotesRef) -> GitResult<()> {
        run(
            self.commit_command(),
            &["notes", "--ref", notes_ref.as_str(), "append", "-m", text, "HEAD"],
        )?;
        Ok(())
    }
}
