//! Publishing build records to a shared notes ref.
//!
//! One call to [`NotesSyncEngine::sync`] runs the whole protocol against the
//! configured remote:
//!
//! ```text
//! START -> FETCHED -> REF_MISSING -> REF_CREATED -> REF_PUSHED -> APPENDED -> PUBLISHED -> DONE
//!                  \-> REF_PRESENT ---------------------------/
//! ```
//!
//! - The remote ref is fetched with a forced refspec, so whatever the local
//!   copy held before is replaced by the remote's value. A failed fetch is
//!   expected while nobody has published yet and is only logged.
//! - A missing ref is created empty and pushed on its own before anything is
//!   appended. If that push fails the local ref is deleted again
//!   (`ROLLED_BACK`), so a later run does not mistake a local-only ref for
//!   a published one.
//! - The append and the final push are plain fast-forwards. A push the remote
//!   rejects because another agent got there first fails this call; there is
//!   no retry, the record is simply not published.
//!
//! No lock is taken anywhere: concurrent publishers are ordered by the
//! remote's own ref update rules.
//!
//! Errors come back as [`SyncError`]. Turning them into log lines is the
//! caller's job (see [`crate::hook`]).

pub mod vcs;


use std::fmt;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::git::GitError;
use crate::message::BuildRecord;
use crate::sink::LogSink;
use crate::types::{NotesRef, ScmConfig};

pub use vcs::VcsClient;

/// Remote whose notes ref is published unless configured otherwise.
pub const DEFAULT_REMOTE: &str = "origin";

/// Where notes are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Name of the remote in the build's SCM configuration.
    pub remote_name: String,

    /// The notes ref records are appended to.
    pub notes_ref: NotesRef,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            remote_name: DEFAULT_REMOTE.to_string(),
            notes_ref: NotesRef::default(),
        }
    }
}

/// Protocol states, in the order a successful run passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Start,
    Fetched,
    RefMissing,
    RefCreated,
    RefPushed,
    RefPresent,
    Appended,
    Published,
    Done,
    /// The locally created ref was deleted after its push failed.
    RolledBack,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncState::Start => "START",
            SyncState::Fetched => "FETCHED",
            SyncState::RefMissing => "REF_MISSING",
            SyncState::RefCreated => "REF_CREATED",
            SyncState::RefPushed => "REF_PUSHED",
            SyncState::RefPresent => "REF_PRESENT",
            SyncState::Appended => "APPENDED",
            SyncState::Published => "PUBLISHED",
            SyncState::Done => "DONE",
            SyncState::RolledBack => "ROLLED_BACK",
        })
    }
}

/// Why a call published nothing without failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The build does not use git.
    NotGit,
    /// The build's git configuration has no URI for the remote.
    NoRemote { remote_name: String },
}

/// What a successful call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing was attempted.
    Skipped(SkipReason),

    /// The record was appended and pushed.
    Published {
        /// This call created the notes ref on the remote.
        created_ref: bool,
        /// Why the initial fetch failed, if it did.
        fetch_error: Option<String>,
        /// Every state the run passed through, `START` to `DONE`.
        path: Vec<SyncState>,
    },
}

/// A failed synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A git operation failed.
    #[error("git operation failed in state {state}")]
    Vcs {
        /// Last state reached before the failure.
        state: SyncState,
        #[source]
        source: GitError,
    },

    /// Publishing a newly created notes ref failed; the local ref was deleted.
    #[error("failed to publish new notes ref {notes_ref}; local ref rolled back")]
    CreateRolledBack {
        notes_ref: NotesRef,
        #[source]
        source: GitError,
    },

    /// Publishing a newly created notes ref failed and so did deleting it.
    #[error(
        "failed to publish new notes ref {notes_ref}, and removing the local ref failed too: {rollback}"
    )]
    RollbackFailed {
        notes_ref: NotesRef,
        #[source]
        source: GitError,
        rollback: GitError,
    },
}

impl SyncError {
    /// The state the protocol was in when it failed.
    pub fn state(&self) -> SyncState {
        match self {
            SyncError::Vcs { state, .. } => *state,
            SyncError::CreateRolledBack { .. } => SyncState::RolledBack,
            SyncError::RollbackFailed { .. } => SyncState::RefCreated,
        }
    }

    /// The git failure that stopped the protocol.
    pub fn git_error(&self) -> &GitError {
        match self {
            SyncError::Vcs { source, .. }
            | SyncError::CreateRolledBack { source, .. }
            | SyncError::RollbackFailed { source, .. } => source,
        }
    }
}

/// Appends build records to the shared notes ref through a [`VcsClient`].
///
/// Holds no state between calls; every call re-fetches the remote.
#[derive(Debug, Clone)]
pub struct NotesSyncEngine<C> {
    client: C,
    config: SyncConfig,
}

/// States visited so far in one run.
struct Progress {
    path: Vec<SyncState>,
}

impl Progress {
    fn new() -> Self {
        Progress {
            path: vec![SyncState::Start],
        }
    }

    fn current(&self) -> SyncState {
        self.path.last().copied().unwrap_or(SyncState::Start)
    }

    fn enter(&mut self, next: SyncState) {
        debug!(from = %self.current(), to = %next, "sync state");
        self.path.push(next);
    }

    fn fail(&self, source: GitError) -> SyncError {
        SyncError::Vcs {
            state: self.current(),
            source,
        }
    }
}

impl<C: VcsClient> NotesSyncEngine<C> {
    pub fn new(client: C, config: SyncConfig) -> Self {
        NotesSyncEngine { client, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Appends `record` to the notes ref and publishes it on the remote.
    ///
    /// Builds without git or without the configured remote are skipped
    /// before any VCS call is made. Every skip and every swallowed fetch
    /// failure writes a line to `log`.
    #[instrument(
        skip_all,
        fields(remote = %self.config.remote_name, notes_ref = %self.config.notes_ref)
    )]
    pub fn sync(
        &self,
        record: &BuildRecord,
        scm: &ScmConfig,
        log: &mut dyn LogSink,
    ) -> Result<SyncOutcome, SyncError> {
        if !scm.is_git() {
            info!("build does not use git, skipping notes");
            log.println("No Git SCM detected; not recording build in git notes.");
            return Ok(SyncOutcome::Skipped(SkipReason::NotGit));
        }

        let remote_name = &self.config.remote_name;
        let Some(remote_uri) = scm.remote_uri(remote_name) else {
            info!("remote not configured, skipping notes");
            log.println(&format!(
                "Failed to find Git repository {remote_name}; not recording build in git notes."
            ));
            return Ok(SyncOutcome::Skipped(SkipReason::NoRemote {
                remote_name: remote_name.clone(),
            }));
        };

        let notes_ref = &self.config.notes_ref;
        let mut progress = Progress::new();

        let fetch_error = match self.client.fetch(remote_uri, &[notes_ref.forced_refspec()]) {
            Ok(()) => None,
            Err(e) => {
                // Indistinguishable from "nobody has published notes yet"
                warn!(error = %e, "fetch of notes ref failed");
                log.println(&format!(
                    "Caught git error: {e}. Most likely remote doesn't have git notes reference {notes_ref}"
                ));
                Some(e.to_string())
            }
        };
        progress.enter(SyncState::Fetched);

        let exists = self
            .client
            .ref_exists(notes_ref)
            .map_err(|e| progress.fail(e))?;

        let created_ref = if exists {
            progress.enter(SyncState::RefPresent);
            false
        } else {
            progress.enter(SyncState::RefMissing);
            self.create_and_publish(remote_uri, &mut progress, log)?;
            true
        };

        self.client
            .append_note(&record.serialize(), notes_ref)
            .map_err(|e| progress.fail(e))?;
        progress.enter(SyncState::Appended);

        self.client
            .push(remote_uri, notes_ref)
            .map_err(|e| progress.fail(e))?;
        progress.enter(SyncState::Published);
        progress.enter(SyncState::Done);

        info!(created_ref, "build note published");
        Ok(SyncOutcome::Published {
            created_ref,
            fetch_error,
            path: progress.path,
        })
    }

    /// Creates the notes ref locally and pushes it, deleting it again if the
    /// push fails.
    fn create_and_publish(
        &self,
        remote_uri: &str,
        progress: &mut Progress,
        log: &mut dyn LogSink,
    ) -> Result<(), SyncError> {
        let notes_ref = &self.config.notes_ref;

        self.client
            .create_ref(notes_ref)
            .map_err(|e| progress.fail(e))?;
        progress.enter(SyncState::RefCreated);

        match self.client.push(remote_uri, notes_ref) {
            Ok(()) => {
                progress.enter(SyncState::RefPushed);
                Ok(())
            }
            Err(source) => {
                warn!(error = %source, "push of new notes ref failed, rolling back");
                log.println(&format!(
                    "Failed to push {notes_ref}, removing locally created notes ref"
                ));
                match self.client.delete_ref(notes_ref) {
                    Ok(()) => {
                        progress.enter(SyncState::RolledBack);
                        Err(SyncError::CreateRolledBack {
                            notes_ref: notes_ref.clone(),
                            source,
                        })
                    }
                    Err(rollback) => Err(SyncError::RollbackFailed {
                        notes_ref: notes_ref.clone(),
                        source,
                        rollback,
                    }),
                }
            }
        }
    }
}
