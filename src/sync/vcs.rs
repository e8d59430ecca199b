//! The version-control operations the sync protocol is built from.
//!
//! Implementations are bound to one working copy; every method acts on that
//! working copy and, for `fetch`/`push`, the remote URI it is given.
//! [`GitCli`](crate::git::client::GitCli) drives the `git` binary; tests use
//! a scripted mock.

use crate::git::GitResult;
use crate::types::NotesRef;

/// Version-control primitives used by [`NotesSyncEngine`](super::NotesSyncEngine).
///
/// All calls block until the underlying operation finishes.
pub trait VcsClient {
    /// Fetches `refspecs` from `remote_uri`.
    ///
    /// A missing remote ref is reported like any other failure.
    fn fetch(&self, remote_uri: &str, refspecs: &[String]) -> GitResult<()>;

    /// Whether the local working copy has `notes_ref`.
    fn ref_exists(&self, notes_ref: &NotesRef) -> GitResult<bool>;

    /// Creates `notes_ref` locally with no notes in it.
    fn create_ref(&self, notes_ref: &NotesRef) -> GitResult<()>;

    /// Deletes the local `notes_ref`.
    fn delete_ref(&self, notes_ref: &NotesRef) -> GitResult<()>;

    /// Pushes the local `notes_ref` to the same name on `remote_uri`.
    fn push(&self, remote_uri: &str, notes_ref: &NotesRef) -> GitResult<()>;

    /// Appends `text` to the note `notes_ref` holds for the current commit.
    fn append_note(&self, text: &str, notes_ref: &NotesRef) -> GitResult<()>;
}

impl<C: VcsClient + ?Sized> VcsClient for &C {
    fn fetch(&self, remote_uri: &str, refspecs: &[String]) -> GitResult<()> {
        (**self).fetch(remote_uri, refspecs)
    }

    fn ref_exists(&self, notes_ref: &NotesRef) -> GitResult<bool> {
        (**self).ref_exists(notes_ref)
    }

    fn create_ref(&self, notes_ref: &NotesRef) -> GitResult<()> {
        (**self).create_ref(notes_ref)
    }

    fn delete_ref(&self, notes_ref: &NotesRef) -> GitResult<()> {
        (**self).delete_ref(notes_ref)
    }

    fn push(&self, remote_uri: &str, notes_ref: &NotesRef) -> GitResult<()> {
        (**self).push(remote_uri, notes_ref)
    }

    fn append_note(&self, text: &str, notes_ref: &NotesRef) -> GitResult<()> {
        (**self).append_note(text, notes_ref)
    }
}
