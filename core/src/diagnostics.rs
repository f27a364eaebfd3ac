//! Plain-text echo of commands and their output.

use std::io::Write;

use crate::config::Verbosity;

/// Sink for the runner's human-readable echo.
///
/// This is separate from `tracing` logs: it mirrors what a user would see
/// running the command in a terminal.
pub trait Diagnostics: Send + Sync {
    fn write(&self, bytes: &[u8]);
}

/// Writes diagnostics to the process's standard error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrDiagnostics;

impl Diagnostics for StderrDiagnostics {
    fn write(&self, bytes: &[u8]) {
        let mut stderr = std::io::stderr().lock();
        // Echo is best effort; a closed stderr must not fail the command.
        let _ = stderr.write_all(bytes);
        let _ = stderr.flush();
    }
}

/// Verbosity-aware helpers over a [`Diagnostics`] sink.
pub(crate) struct Echo<'a> {
    pub sink: &'a dyn Diagnostics,
    pub verbosity: Verbosity,
}

impl Echo<'_> {
    pub fn command(&self, command: &str) {
        if self.verbosity >= Verbosity::Normal {
            self.sink.write(format!("$ {command}\n").as_bytes());
        }
    }

    pub fn detail(&self, detail: std::fmt::Arguments<'_>) {
        if self.verbosity >= Verbosity::Verbose {
            self.sink.write(format!("  {detail}\n").as_bytes());
        }
    }

    pub fn failure(&self, err: &crate::Error) {
        if self.verbosity >= Verbosity::Normal {
            self.sink.write(format!("! {err}\n").as_bytes());
        }
    }

    pub fn output(&self, bytes: &[u8]) {
        if self.verbosity >= Verbosity::Normal && !bytes.is_empty() {
            self.sink.write(bytes);
        }
    }
}
