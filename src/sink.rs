//! Line-oriented diagnostics written into the build's own log.
//!
//! This is the only output a build owner sees from notes publishing, so
//! every skipped publish and every swallowed failure ends up here. Lines are
//! also mirrored to `tracing` for whoever runs the process.

use std::error::Error;
use std::io::Write;

use tracing::{error, info};

/// A sink the build log lines are written to.
pub trait LogSink {
    /// Writes one informational line.
    fn println(&mut self, line: &str);

    /// Writes one error line.
    fn error(&mut self, line: &str) {
        self.println(&format!("ERROR: {line}"));
    }
}

impl LogSink for Vec<String> {
    fn println(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

impl<S: LogSink + ?Sized> LogSink for &mut S {
    fn println(&mut self, line: &str) {
        (**self).println(line);
    }

    fn error(&mut self, line: &str) {
        (**self).error(line);
    }
}

/// Writes lines to any [`Write`], e.g. the build's stdout.
///
/// Write failures are dropped: losing a diagnostic line must not fail the
/// build either.
#[derive(Debug)]
pub struct WriterSink<W> {
    out: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(out: W) -> Self {
        WriterSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> LogSink for WriterSink<W> {
    fn println(&mut self, line: &str) {
        info!(target: "ci_notes::build_log", "{line}");
        let _ = writeln!(self.out, "{line}");
        let _ = self.out.flush();
    }

    fn error(&mut self, line: &str) {
        error!(target: "ci_notes::build_log", "{line}");
        let _ = writeln!(self.out, "ERROR: {line}");
        let _ = self.out.flush();
    }
}

/// Renders an error and its whole `source()` chain, one cause per line.
pub fn error_chain(err: &dyn Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
