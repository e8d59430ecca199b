//! Shared test utilities: a scripted [`VcsClient`] and proptest generators.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use crate::git::{GitError, GitResult};
use crate::sync::VcsClient;
use crate::types::{BuildResult, NotesRef};

pub fn arb_build_result() -> impl Strategy<Value = BuildResult> {
    prop_oneof![
        Just(BuildResult::Success),
        Just(BuildResult::Unstable),
        Just(BuildResult::Failure),
        Just(BuildResult::Aborted),
        Just(BuildResult::NotBuilt),
    ]
}

/// Non-empty URL fragments, e.g. `http://ci/` or `job/x/12/`.
pub fn arb_url_part() -> impl Strategy<Value = String> {
    "[a-z0-9:/._-]{1,30}".prop_map(String::from)
}

/// One call made against a [`MockVcs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsCall {
    Fetch {
        remote_uri: String,
        refspecs: Vec<String>,
    },
    RefExists(String),
    CreateRef(String),
    DeleteRef(String),
    Push {
        remote_uri: String,
        refname: String,
    },
    AppendNote {
        text: String,
        refname: String,
    },
}

/// Which operation a scripted failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsOp {
    Fetch,
    RefExists,
    CreateRef,
    DeleteRef,
    Push,
    AppendNote,
}

/// An in-memory [`VcsClient`] that records every call.
///
/// The remote either has the notes ref or not; a successful fetch copies
/// that onto the local ref, like the forced refspec does. Individual calls
/// can be scripted to fail with [`MockVcs::failing`].
#[derive(Debug, Default)]
pub struct MockVcs {
    remote_has_ref: bool,
    local_ref: Cell<bool>,
    calls: RefCell<Vec<VcsCall>>,
    counts: RefCell<HashMap<VcsOp, usize>>,
    failures: HashSet<(VcsOp, usize)>,
    reject_pushes: bool,
}

impl MockVcs {
    /// A remote that has never seen the notes ref.
    pub fn new() -> Self {
        Self::default()
    }

    /// A remote that already has the notes ref.
    pub fn with_remote_ref() -> Self {
        MockVcs {
            remote_has_ref: true,
            ..Self::default()
        }
    }

    /// Starts with a local notes ref, as left behind by an earlier run.
    pub fn with_local_ref(self) -> Self {
        self.local_ref.set(true);
        self
    }

    /// Makes the `nth` (1-based) call of `op` fail.
    pub fn failing(mut self, op: VcsOp, nth: usize) -> Self {
        self.failures.insert((op, nth));
        self
    }

    /// Failed pushes report a rejection instead of a generic failure.
    pub fn rejecting_pushes(mut self) -> Self {
        self.reject_pushes = true;
        self
    }

    pub fn calls(&self) -> Vec<VcsCall> {
        self.calls.borrow().clone()
    }

    pub fn local_ref_exists(&self) -> bool {
        self.local_ref.get()
    }

    /// Texts appended so far, in order.
    pub fn appended(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                VcsCall::AppendNote { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, op: VcsOp) -> usize {
        self.counts.borrow().get(&op).copied().unwrap_or(0)
    }

    fn record(&self, op: VcsOp, call: VcsCall) -> GitResult<()> {
        self.calls.borrow_mut().push(call);
        let mut counts = self.counts.borrow_mut();
        let n = counts.entry(op).or_insert(0);
        *n += 1;
        if !self.failures.contains(&(op, *n)) {
            return Ok(());
        }
        let command = format!("{op:?} #{n}");
        Err(match op {
            VcsOp::Fetch => GitError::FetchFailed {
                refspec: command,
                details: "scripted failure".to_string(),
            },
            VcsOp::Push if self.reject_pushes => GitError::PushRejected {
                refname: command,
                details: "[rejected] (fetch first)".to_string(),
            },
            _ => GitError::CommandFailed {
                command,
                stderr: "scripted failure".to_string(),
            },
        })
    }
}

impl VcsClient for MockVcs {
    fn fetch(&self, remote_uri: &str, refspecs: &[String]) -> GitResult<()> {
        self.record(
            VcsOp::Fetch,
            VcsCall::Fetch {
                remote_uri: remote_uri.to_string(),
                refspecs: refspecs.to_vec(),
            },
        )?;
        if !self.remote_has_ref {
            return Err(GitError::FetchFailed {
                refspec: refspecs.join(" "),
                details: "fatal: couldn't find remote ref".to_string(),
            });
        }
        self.local_ref.set(true);
        Ok(())
    }

    fn ref_exists(&self, notes_ref: &NotesRef) -> GitResult<bool> {
        self.record(VcsOp::RefExists, VcsCall::RefExists(notes_ref.to_string()))?;
        Ok(self.local_ref.get())
    }

    fn create_ref(&self, notes_ref: &NotesRef) -> GitResult<()> {
        self.record(VcsOp::CreateRef, VcsCall::CreateRef(notes_ref.to_string()))?;
        self.local_ref.set(true);
        Ok(())
    }

    fn delete_ref(&self, notes_ref: &NotesRef) -> GitResult<()> {
        self.record(VcsOp::DeleteRef, VcsCall::DeleteRef(notes_ref.to_string()))?;
        self.local_ref.set(false);
        Ok(())
    }

    fn push(&self, remote_uri: &str, notes_ref: &NotesRef) -> GitResult<()> {
        self.record(
            VcsOp::Push,
            VcsCall::Push {
                remote_uri: remote_uri.to_string(),
                refname: notes_ref.to_string(),
            },
        )
    }

    fn append_note(&self, text: &str, notes_ref: &NotesRef) -> GitResult<()> {
        self.record(
            VcsOp::AppendNote,
            VcsCall::AppendNote {
                text: text.to_string(),
                refname: notes_ref.to_string(),
            },
        )
    }
}
