use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ci_notes::git::CommitIdentity;
use ci_notes::git::client::GitCli;
use ci_notes::git::workspace::WorkspaceContext;
use ci_notes::hook::{BuildLifecycleHook, GitNotesRecorder};
use ci_notes::message::parse_note;
use ci_notes::sink::WriterSink;
use ci_notes::sync::{DEFAULT_REMOTE, NotesSyncEngine, SyncConfig, VcsClient};
use ci_notes::types::{BuildContext, BuildResult, NotesRef};

#[derive(Parser)]
#[command(name = "ci-notes", version, about = "Record CI build outcomes in git notes")]
struct Cli {
    #[command(flatten)]
    repo: RepoArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct RepoArgs {
    /// Working copy of the build
    #[arg(long, global = true, env = "CI_NOTES_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Remote the notes are published to
    #[arg(long, global = true, env = "CI_NOTES_REMOTE", default_value = DEFAULT_REMOTE)]
    remote: String,

    /// Notes ref records are appended to
    #[arg(long, global = true, env = "CI_NOTES_REF", default_value = NotesRef::DEFAULT)]
    notes_ref: NotesRef,

    /// Committer name for notes commits
    #[arg(long, global = true, env = "CI_NOTES_AUTHOR_NAME")]
    author_name: Option<String>,

    /// Committer email for notes commits
    #[arg(long, global = true, env = "CI_NOTES_AUTHOR_EMAIL")]
    author_email: Option<String>,
}

#[derive(Args)]
struct BuildArgs {
    /// Build URL relative to the CI server root
    #[arg(long, env = "CI_NOTES_BUILD_URL")]
    build_url: Option<String>,

    /// Absolute base URL of the CI server
    #[arg(long, env = "CI_NOTES_ROOT_URL")]
    root_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Record that a build started on the checked-out commit
    Start {
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Record a finished build and its result
    Finish {
        #[command(flatten)]
        build: BuildArgs,

        /// success, unstable, failure, aborted or not_built
        #[arg(long, env = "CI_NOTES_RESULT")]
        result: Option<BuildResult>,
    },
    /// Print the build records stored for a commit
    Show {
        #[arg(default_value = "HEAD")]
        commit: String,
    },
}

impl RepoArgs {
    fn identity(&self) -> CommitIdentity {
        let default = CommitIdentity::default();
        CommitIdentity {
            name: self.author_name.clone().unwrap_or(default.name),
            email: self.author_email.clone().unwrap_or(default.email),
        }
    }

    fn git(&self) -> GitCli {
        GitCli::new(&self.workspace, self.identity())
    }

    fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            remote_name: self.remote.clone(),
            notes_ref: self.notes_ref.clone(),
        }
    }

    fn context(&self, build: BuildArgs, result: Option<BuildResult>) -> WorkspaceContext {
        WorkspaceContext {
            workdir: self.workspace.clone(),
            remote_name: self.remote.clone(),
            result,
            url: build.build_url,
            root_url: build.root_url,
            isolated: false,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // stdout is the build log; diagnostics go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ci_notes=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let Cli { repo, command } = Cli::parse();

    match command {
        Command::Start { build } => {
            let ctx = repo.context(build, None);
            recorder(&repo).on_start(&ctx);
        }
        Command::Finish { build, result } => {
            let ctx = repo.context(build, result);
            recorder(&repo).on_finish(&ctx);
        }
        Command::Show { commit } => show(&repo, &commit)?,
    }

    Ok(())
}

fn recorder(repo: &RepoArgs) -> GitNotesRecorder<GitCli, WriterSink<io::Stdout>> {
    let engine = NotesSyncEngine::new(repo.git(), repo.sync_config());
    GitNotesRecorder::new(engine, WriterSink::new(io::stdout()))
}

/// Fetches the notes ref if the remote is reachable, then prints every
/// record attached to `commit`.
fn show(repo: &RepoArgs, commit: &str) -> anyhow::Result<()> {
    let git = repo.git();
    let ctx = repo.context(
        BuildArgs {
            build_url: None,
            root_url: None,
        },
        None,
    );

    let scm = ctx.scm();
    if let Some(uri) = scm.remote_uri(&repo.remote) {
        if let Err(e) = git.fetch(uri, &[repo.notes_ref.forced_refspec()]) {
            tracing::warn!(error = %e, "could not fetch notes, showing local copy");
        }
    }

    let sha = git
        .rev_parse(commit)
        .with_context(|| format!("cannot resolve {commit}"))?;
    let Some(blob) = git
        .read_note(&repo.notes_ref, sha.as_str())
        .with_context(|| format!("cannot read {} for {sha}", repo.notes_ref))?
    else {
        println!("No build records for {}", sha.short());
        return Ok(());
    };

    for entry in parse_note(&blob) {
        match entry {
            Ok(record) => println!(
                "{} v{} {} {} {}",
                record.timestamp(),
                record.version(),
                record.status().map_or("-", |s| s.as_str()),
                record.url().unwrap_or("-"),
                record.agent(),
            ),
            Err(unparsed) => {
                tracing::warn!(line = %unparsed.line, error = %unparsed.error, "skipping unparsable note line")
            }
        }
    }
    Ok(())
}
