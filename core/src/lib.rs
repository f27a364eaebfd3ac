//! Core crate for `shellstep`: run a templated shell command and turn its
//! output into a [`File`] that can flow through a file-processing pipeline.

pub mod config;
pub mod diagnostics;
pub mod file;
pub mod pipeline;
pub mod process;
pub mod runner;
pub mod template;

pub use config::{load_options, Options, Verbosity};
pub use diagnostics::{Diagnostics, StderrDiagnostics};
pub use file::{ByteStream, Contents, File};
pub use pipeline::{PipelineStep, Transform};
pub use runner::{CommandRunner, FileStream};
pub use template::{Context, Template, TemplateError};

use std::io;

use thiserror::Error;

/// Common error type for the command runner.
#[derive(Debug, Error)]
pub enum Error {
    /// The command template could not be rendered.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The command ran and exited unsuccessfully.
    #[error("command `{command}` failed with {}", describe_exit(.code))]
    CommandFailed {
        command: String,
        /// `None` when the process was terminated by a signal.
        code: Option<i32>,
        stderr: String,
    },

    /// The shell could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Reading the input file's streamed contents failed.
    #[error("failed to read input contents: {0}")]
    Input(#[source] io::Error),

    #[error("I/O error while running command: {0}")]
    Io(#[from] io::Error),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("failed to parse options: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Exit code of a failed command, if this error carries one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::CommandFailed { code, .. } => *code,
            _ => None,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Convenient alias for results returned by the core crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_message_includes_code() {
        let err = Error::CommandFailed {
            command: "exit 3".into(),
            code: Some(3),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "command `exit 3` failed with exit code 3");
        assert_eq!(err.exit_code(), Some(3));
    }

    #[test]
    fn signal_termination_has_no_code() {
        let err = Error::CommandFailed {
            command: "kill -9 $$".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("terminated by signal"));
        assert_eq!(err.exit_code(), None);
    }
}
