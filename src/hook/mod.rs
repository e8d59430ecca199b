//! Build lifecycle events that publish notes.
//!
//! A CI host calls [`BuildLifecycleHook::on_start`] when a build begins and
//! [`BuildLifecycleHook::on_finish`] once its result is known. Each call runs
//! one complete publish; nothing is carried over from start to finish.
//!
//! This is the outermost boundary: a failed publish is written to the build
//! log and otherwise ignored, so recording notes can never fail a build.

use tracing::{debug, instrument, warn};

use crate::message::{BuildRecord, DEFAULT_VERSION};
use crate::sink::{LogSink, error_chain};
use crate::sync::{NotesSyncEngine, SyncOutcome, VcsClient};
use crate::types::BuildContext;

/// Receives build lifecycle events.
pub trait BuildLifecycleHook {
    /// The build has started.
    fn on_start(&mut self, ctx: &dyn BuildContext);

    /// The build has finished and its result is available from `ctx`.
    fn on_finish(&mut self, ctx: &dyn BuildContext);
}

/// Publishes a start record and a finish record for every build.
#[derive(Debug)]
pub struct GitNotesRecorder<C, L> {
    engine: NotesSyncEngine<C>,
    log: L,
    version: i64,
}

impl<C: VcsClient, L: LogSink> GitNotesRecorder<C, L> {
    pub fn new(engine: NotesSyncEngine<C>, log: L) -> Self {
        GitNotesRecorder {
            engine,
            log,
            version: DEFAULT_VERSION,
        }
    }

    /// Overrides the schema version written into every record.
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn engine(&self) -> &NotesSyncEngine<C> {
        &self.engine
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn into_log(self) -> L {
        self.log
    }

    /// Record shared by both events: version and build URL.
    fn base_record(&mut self, ctx: &dyn BuildContext) -> BuildRecord {
        let mut record = BuildRecord::new();
        record
            .add_version(self.version)
            .add_build_log_url(ctx.root_url(), ctx.url(), &mut self.log);
        record
    }

    /// Publishes `record`, logging instead of returning any failure.
    fn publish(&mut self, record: &BuildRecord, ctx: &dyn BuildContext) {
        match self.engine.sync(record, &ctx.scm(), &mut self.log) {
            Ok(SyncOutcome::Skipped(reason)) => debug!(?reason, "publish skipped"),
            Ok(SyncOutcome::Published { created_ref, .. }) => {
                debug!(created_ref, "publish complete")
            }
            Err(e) => {
                warn!(state = %e.state(), error = %e, "publishing build note failed");
                self.log
                    .error(&format!("Caught git-notes exception. {}", error_chain(&e)));
            }
        }
    }
}

impl<C: VcsClient, L: LogSink> BuildLifecycleHook for GitNotesRecorder<C, L> {
    #[instrument(skip_all, fields(event = "start"))]
    fn on_start(&mut self, ctx: &dyn BuildContext) {
        let record = self.base_record(ctx);
        self.publish(&record, ctx);
    }

    #[instrument(skip_all, fields(event = "finish"))]
    fn on_finish(&mut self, ctx: &dyn BuildContext) {
        let mut record = self.base_record(ctx);
        record.add_status(ctx.result(), &mut self.log);
        self.publish(&record, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AGENT, BuildStatus, parse_note};
    use crate::sync::SyncConfig;
    use crate::test_utils::{MockVcs, VcsCall, VcsOp};
    use crate::types::{BuildResult, ScmConfig, StaticBuildContext};

    fn recorder(client: &MockVcs) -> GitNotesRecorder<&MockVcs, Vec<String>> {
        GitNotesRecorder::new(
            NotesSyncEngine::new(client, SyncConfig::default()),
            Vec::new(),
        )
    }

    fn git_build(result: Option<BuildResult>) -> StaticBuildContext {
        StaticBuildContext {
            result,
            url: Some("job/x/1/".to_string()),
            root_url: Some("http://h/".to_string()),
            scm: ScmConfig::git().with_remote("origin", ["git@example.com:repo.git"]),
        }
    }

    fn appended_records(client: &MockVcs) -> Vec<BuildRecord> {
        client
            .appended()
            .iter()
            .flat_map(|text| parse_note(text))
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn start_record_has_url_but_no_status() {
        let client = MockVcs::with_remote_ref();
        let mut hook = recorder(&client);

        hook.on_start(&git_build(None));

        let records = appended_records(&client);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url(), Some("http://h/job/x/1/"));
        assert_eq!(records[0].status(), None);
        assert_eq!(records[0].agent(), AGENT);
        assert!(hook.log().is_empty());
    }

    #[test]
    fn finish_record_carries_status() {
        let client = MockVcs::with_remote_ref();
        let mut hook = recorder(&client);

        hook.on_finish(&git_build(Some(BuildResult::Unstable)));

        let records = appended_records(&client);
        assert_eq!(records[0].status(), Some(BuildStatus::Failure));
        assert_eq!(records[0].url(), Some("http://h/job/x/1/"));
    }

    #[test]
    fn finish_without_result_logs_and_still_publishes() {
        let client = MockVcs::with_remote_ref();
        let mut hook = recorder(&client);

        hook.on_finish(&git_build(None));

        assert_eq!(hook.log(), &vec!["ERROR: No build result found.".to_string()]);
        assert_eq!(appended_records(&client)[0].status(), None);
        assert_eq!(client.count(VcsOp::Push), 1);
    }

    #[test]
    fn custom_version_is_written() {
        let client = MockVcs::with_remote_ref();
        let mut hook = recorder(&client).with_version(5);

        hook.on_start(&git_build(None));

        assert_eq!(appended_records(&client)[0].version(), 5);
    }

    #[test]
    fn missing_url_is_recorded_as_unavailable() {
        let client = MockVcs::with_remote_ref();
        let mut hook = recorder(&client);
        let ctx = StaticBuildContext {
            url: Some(String::new()),
            ..git_build(None)
        };

        hook.on_start(&ctx);

        assert_eq!(appended_records(&client)[0].url(), Some("unavailable"));
        assert_eq!(
            hook.log(),
            &vec!["Git notes recorder: no build URL found.".to_string()]
        );
    }

    #[test]
    fn build_without_git_makes_no_calls() {
        let client = MockVcs::new();
        let mut hook = recorder(&client);
        let ctx = StaticBuildContext {
            scm: ScmConfig::default(),
            ..git_build(Some(BuildResult::Success))
        };

        hook.on_start(&ctx);
        hook.on_finish(&ctx);

        assert!(client.calls().is_empty());
        assert_eq!(hook.log().len(), 2);
    }

    #[test]
    fn failures_are_logged_not_raised() {
        let client = MockVcs::with_remote_ref()
            .rejecting_pushes()
            .failing(VcsOp::Push, 1);
        let mut hook = recorder(&client);

        hook.on_finish(&git_build(Some(BuildResult::Success)));

        let log = hook.into_log();
        assert_eq!(log.len(), 1);
        assert!(
            log[0].starts_with("ERROR: Caught git-notes exception. git operation failed in state APPENDED"),
            "{log:?}"
        );
        assert!(log[0].contains("caused by: push of"), "{log:?}");
    }

    #[test]
    fn rollback_is_reported_in_the_build_log() {
        let client = MockVcs::new().failing(VcsOp::Push, 1);
        let mut hook = recorder(&client);

        hook.on_start(&git_build(None));

        let log = hook.log();
        assert_eq!(log.len(), 3, "{log:?}");
        assert!(log[0].starts_with("Caught git error:"));
        assert_eq!(
            log[1],
            "Failed to push refs/notes/devtools/ci, removing locally created notes ref"
        );
        assert!(log[2].starts_with("ERROR: Caught git-notes exception. failed to publish new notes ref"));
        assert!(!client.local_ref_exists());
    }

    #[test]
    fn start_and_finish_are_independent_runs() {
        let client = MockVcs::new();
        let mut hook = recorder(&client);
        let ctx = git_build(Some(BuildResult::Success));

        hook.on_start(&ctx);
        hook.on_finish(&ctx);

        // the second run finds the ref the first one created
        assert_eq!(client.count(VcsOp::CreateRef), 1);
        assert_eq!(client.count(VcsOp::Fetch), 2);
        let records = appended_records(&client);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status(), None);
        assert_eq!(records[1].status(), Some(BuildStatus::Success));
    }

    #[test]
    fn end_to_end_finish_on_existing_ref() {
        let client = MockVcs::with_remote_ref();
        let mut hook = recorder(&client);

        hook.on_finish(&git_build(Some(BuildResult::Success)));

        let calls = client.calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(
            &calls[3],
            VcsCall::Push { remote_uri, refname }
                if remote_uri == "git@example.com:repo.git" && refname == "refs/notes/devtools/ci"
        ));
        let records = appended_records(&client);
        assert_eq!(records[0].status(), Some(BuildStatus::Success));
        assert_eq!(records[0].version(), 0);
        assert!(hook.log().is_empty());
    }
}
