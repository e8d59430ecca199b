//! ci-notes - records CI build outcomes as git notes on the built commit.
//!
//! Each build event becomes one JSON line appended to a shared notes ref
//! (`refs/notes/devtools/ci` by default) and pushed back to the remote, so
//! every clone that fetches the ref can see which builds ran on a commit.

pub mod git;
pub mod hook;
pub mod message;
pub mod sink;
pub mod sync;
pub mod types;

#[cfg(test)]
mod test_utils;
