//! Newtype wrappers for git identifiers.
//!
//! These keep commit ids and notes refs from being mixed up with arbitrary
//! strings on the way into git command lines.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A git commit SHA (40 hex characters for SHA-1, 64 for SHA-256 repositories).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha(String);

/// Error returned when a string is not a full hex object id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid SHA: {0:?}")]
pub struct InvalidSha(pub String);

impl Sha {
    /// Parses a full hex object id, normalising to lowercase.
    pub fn parse(s: impl AsRef<str>) -> Result<Self, InvalidSha> {
        let s = s.as_ref().trim();
        let valid_len = s.len() == 40 || s.len() == 64;
        if valid_len && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Sha(s.to_ascii_lowercase()))
        } else {
            Err(InvalidSha(s.to_string()))
        }
    }

    /// Returns the SHA as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short (7-character) version of the SHA for display.
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The notes namespace every [`NotesRef`] lives under.
pub const NOTES_NAMESPACE: &str = "refs/notes/";

/// A fully qualified notes ref, e.g. `refs/notes/devtools/ci`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NotesRef(String);

/// Error returned when a ref name is not usable as a notes ref.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid notes ref {name:?}: {reason}")]
pub struct InvalidNotesRef {
    pub name: String,
    pub reason: &'static str,
}

impl NotesRef {
    /// The ref CI build notes are published to unless configured otherwise.
    pub const DEFAULT: &'static str = "refs/notes/devtools/ci";

    /// Validates a notes ref name.
    ///
    /// The name must be fully qualified under `refs/notes/` and must not
    /// contain characters git rejects in ref names or that would change the
    /// meaning of a refspec (`+`, `:`).
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNotesRef> {
        let name = name.into();
        let reason = match name.strip_prefix(NOTES_NAMESPACE) {
            None => Some("must start with refs/notes/"),
            Some("") => Some("missing name after refs/notes/"),
            Some(rest) if rest.starts_with('/') || rest.ends_with('/') => {
                Some("empty path component")
            }
            Some(rest) if rest.contains("//") || rest.contains("..") => {
                Some("empty path component")
            }
            Some(rest)
                if rest.chars().any(|c| {
                    c.is_ascii_control()
                        || c.is_whitespace()
                        || matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\' | '+')
                }) =>
            {
                Some("contains a character not allowed in ref names")
            }
            Some(rest) if rest.ends_with(".lock") || rest.contains("@{") => {
                Some("reserved ref name syntax")
            }
            Some(_) => None,
        };
        match reason {
            Some(reason) => Err(InvalidNotesRef { name, reason }),
            None => Ok(NotesRef(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Forced refspec mirroring the remote ref onto the local ref of the same name.
    pub fn forced_refspec(&self) -> String {
        format!("+{0}:{0}", self.0)
    }
}

impl Default for NotesRef {
    fn default() -> Self {
        NotesRef(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for NotesRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for NotesRef {
    type Error = InvalidNotesRef;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        NotesRef::new(s)
    }
}

impl From<NotesRef> for String {
    fn from(r: NotesRef) -> Self {
        r.0
    }
}

impl std::str::FromStr for NotesRef {
    type Err = InvalidNotesRef;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotesRef::new(s)
    }
}
