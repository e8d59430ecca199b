//! Build records written into git notes.
//!
//! A record is a small flat JSON object: when it was made, by what, for which
//! build, and (once known) how the build ended. One note blob holds every
//! record appended for its commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sink::LogSink;
use crate::types::BuildResult;

/// Schema version written when nobody overrides it.
pub const DEFAULT_VERSION: i64 = 0;

/// Value of `url` when the build URL could not be determined.
pub const BUILD_URL_NOT_AVAILABLE: &str = "unavailable";

/// Identity of the producing system, fixed at compile time.
pub const AGENT: &str = concat!(
    "ci-notes(",
    env!("CARGO_PKG_VERSION"),
    ") GitNotesRecorder"
);

/// Build outcome as recorded in a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Success,
    Failure,
}

impl BuildStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Success => "success",
            BuildStatus::Failure => "failure",
        }
    }
}

impl From<BuildResult> for BuildStatus {
    fn from(result: BuildResult) -> Self {
        if result.is_success() {
            BuildStatus::Success
        } else {
            BuildStatus::Failure
        }
    }
}

/// One build event, serialized as a single line of JSON.
///
/// `timestamp`, `v` and `agent` are set on construction; `url` and `status`
/// only appear once the matching setter ran. Setters never clear a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    timestamp: String,
    v: i64,
    agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<BuildStatus>,
}

impl Default for BuildRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildRecord {
    /// A record stamped with the current time.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// A record stamped with `instant`.
    ///
    /// Instants before the epoch clamp to zero.
    pub fn at(instant: DateTime<Utc>) -> Self {
        BuildRecord {
            timestamp: format!("{:010}", instant.timestamp().max(0)),
            v: DEFAULT_VERSION,
            agent: AGENT.to_string(),
            url: None,
            status: None,
        }
    }

    /// Records the build status, or logs that there is none yet.
    pub fn add_status(&mut self, result: Option<BuildResult>, log: &mut dyn LogSink) -> &mut Self {
        match result {
            Some(result) => self.status = Some(result.into()),
            None => log.error("No build result found."),
        }
        self
    }

    /// Records the build URL, joined onto the CI server's root URL when one
    /// is configured.
    pub fn add_build_log_url(
        &mut self,
        root_url: Option<&str>,
        relative_url: Option<&str>,
        log: &mut dyn LogSink,
    ) -> &mut Self {
        let url = match relative_url.filter(|u| !u.is_empty()) {
            None => {
                log.println("Git notes recorder: no build URL found.");
                BUILD_URL_NOT_AVAILABLE.to_string()
            }
            Some(relative) => match root_url.filter(|r| !r.is_empty()) {
                Some(root) => format!("{root}{relative}"),
                None => relative.to_string(),
            },
        };
        self.url = Some(url);
        self
    }

    pub fn add_version(&mut self, version: i64) -> &mut Self {
        self.v = version;
        self
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn version(&self) -> i64 {
        self.v
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn status(&self) -> Option<BuildStatus> {
        self.status
    }

    /// Compact single-line JSON with a fixed key order.
    pub fn serialize(&self) -> String {
        // A struct of strings, an integer and unit enums always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A line of a note blob that did not parse as a [`BuildRecord`].
#[derive(Debug)]
pub struct UnparsedLine {
    pub line: String,
    pub error: serde_json::Error,
}

/// Splits a note blob into records.
///
/// Appends may be separated by blank lines; those are skipped. Lines written
/// by other tools are returned as [`UnparsedLine`] rather than dropped.
pub fn parse_note(blob: &str) -> Vec<Result<BuildRecord, UnparsedLine>> {
    blob.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|error| UnparsedLine {
                line: line.to_string(),
                error,
            })
        })
        .collect()
}
