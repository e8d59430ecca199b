//! Core domain types for build notes.

pub mod build;
pub mod ids;

pub use build::{
    BuildContext, BuildResult, ScmConfig, ScmKind, StaticBuildContext, UnknownBuildResult,
};
pub use ids::{InvalidNotesRef, InvalidSha, NotesRef, Sha};
