//! The command runner: template, spawn, adapt stdout into a [`File`].

use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};

use crate::config::Options;
use crate::diagnostics::{Diagnostics, Echo, StderrDiagnostics};
use crate::file::{Contents, File};
use crate::pipeline::PipelineStep;
use crate::process;
use crate::template::{Context, Template};
use crate::{Error, Result};

/// Stream of output files; each invocation yields exactly one item.
pub type FileStream = BoxStream<'static, Result<File>>;

/// An immutable command template plus the options it runs with.
///
/// Cloning is cheap and clones share nothing mutable, so a runner can be
/// invoked concurrently.
#[derive(Clone)]
pub struct CommandRunner {
    template: Arc<str>,
    options: Arc<Options>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl std::fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRunner")
            .field("template", &self.template)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl CommandRunner {
    /// Create a runner. Fails only on malformed option values; template
    /// problems are reported when the command runs.
    pub fn new(template: impl Into<String>, options: Options) -> Result<Self> {
        options.validate()?;
        let template: String = template.into();
        Ok(Self {
            template: Arc::from(template),
            options: Arc::new(options),
            diagnostics: Arc::new(StderrDiagnostics),
        })
    }

    /// Send the command echo somewhere other than stderr.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// A transform that runs the command once per incoming file.
    pub fn as_pipeline_step(&self) -> PipelineStep {
        PipelineStep::new(self.clone())
    }

    /// Run the command without an input file.
    ///
    /// Nothing happens until the stream is polled. It then yields the stdout
    /// file, or the error, once the process has exited.
    pub fn exec(&self) -> FileStream {
        let runner = self.clone();
        stream::once(async move { runner.run(None).await }).boxed()
    }

    /// Like [`CommandRunner::exec`], calling `done` once the outcome is known
    /// and before it is yielded.
    pub fn exec_with_callback<F>(&self, done: F) -> FileStream
    where
        F: FnOnce(Option<&Error>) + Send + 'static,
    {
        let runner = self.clone();
        stream::once(async move {
            let result = runner.run(None).await;
            done(result.as_ref().err());
            result
        })
        .boxed()
    }

    /// Run the command once, optionally on `input`.
    ///
    /// With an input file the template sees it as `file.*`, its contents are
    /// written to the command's stdin, and the returned file keeps its path.
    /// Streamed input produces streamed output.
    pub async fn run(&self, input: Option<File>) -> Result<File> {
        let template = Template::parse(&self.template)?;
        let command_line = {
            let mut ctx = Context::new(&self.options.template_data);
            ctx.file = input.as_ref();
            template.render(&ctx)?
        };

        let echo = Echo {
            sink: self.diagnostics.as_ref(),
            verbosity: self.options.verbosity,
        };

        let (file, contents) = match input {
            Some(mut file) => {
                let contents = std::mem::take(&mut file.contents);
                (Some(file), Some(contents))
            }
            None => (None, None),
        };
        let streamed = contents.as_ref().map_or(false, Contents::is_streamed);

        let output = process::run(&command_line, &self.options, contents, &echo).await?;

        if !output.status.success() {
            let err = Error::CommandFailed {
                command: command_line.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            };
            if !self.options.ignore_errors {
                return Err(err);
            }
            tracing::warn!(error = %err, "ignoring command failure");
            echo.failure(&err);
        }

        let stdout = output.stdout;
        Ok(match file {
            Some(mut file) => {
                file.contents = if streamed {
                    Contents::stream(std::io::Cursor::new(stdout))
                } else {
                    Contents::Buffered(stdout)
                };
                file
            }
            None => {
                let cwd = process::resolve_cwd(&self.options)?;
                File::new(cwd.join(output_name(&command_line)), stdout)
                    .with_base(&cwd)
                    .with_cwd(&cwd)
            }
        })
    }
}

/// File name for direct-execution output, derived from the command line.
fn output_name(command_line: &str) -> PathBuf {
    let mut name: String = command_line
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .take(64)
        .collect();
    name = name.trim_matches(|c| c == '_' || c == '.').to_string();
    if name.is_empty() {
        name.push_str("stdout");
    }
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::testing::Recorder;
    use crate::Verbosity;

    fn quiet(template: &str) -> CommandRunner {
        CommandRunner::new(template, Options::default().with_verbosity(Verbosity::Quiet)).unwrap()
    }

    #[test]
    fn output_names_are_sanitised() {
        assert_eq!(output_name("echo hello"), PathBuf::from("echo_hello"));
        assert_eq!(output_name("ls -la ./src"), PathBuf::from("ls_-la_._src"));
        assert_eq!(output_name("   "), PathBuf::from("stdout"));
        assert_eq!(output_name(&"x".repeat(100)).as_os_str().len(), 64);
    }

    #[test]
    fn malformed_options_fail_construction() {
        let err = CommandRunner::new("echo", Options::default().with_shell(Vec::<String>::new()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn exec_yields_stdout_file() {
        let mut stream = quiet("echo hello").exec();
        let file = stream.next().await.unwrap().unwrap();
        assert!(stream.next().await.is_none());
        assert_eq!(file.basename(), "echo_hello");
        assert_eq!(file.contents.into_bytes().await.unwrap(), b"hello\n");
    }

    #[tokio::test]
    async fn bad_template_surfaces_on_the_stream() {
        let runner = quiet("echo <%= file.path");
        let mut stream = runner.exec();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }

    #[tokio::test]
    async fn nonzero_exit_carries_code_and_stderr() {
        let mut stream = quiet("echo oops >&2; exit 3").exec();
        match stream.next().await.unwrap() {
            Err(Error::CommandFailed { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "oops\n");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ignore_errors_still_emits_output() {
        let options = Options::default()
            .with_verbosity(Verbosity::Quiet)
            .with_ignore_errors(true);
        let runner = CommandRunner::new("echo partial; exit 2", options).unwrap();
        let file = runner.run(None).await.unwrap();
        assert_eq!(file.contents.into_bytes().await.unwrap(), b"partial\n");
    }

    #[tokio::test]
    async fn template_data_is_interpolated() {
        let options = Options::default()
            .with_verbosity(Verbosity::Quiet)
            .with_template_data("who", "world");
        let runner = CommandRunner::new("echo hello <%= data.who %>", options).unwrap();
        let file = runner.run(None).await.unwrap();
        assert_eq!(file.contents.into_bytes().await.unwrap(), b"hello world\n");
    }

    #[tokio::test]
    async fn env_overrides_reach_the_command() {
        let options = Options::default()
            .with_verbosity(Verbosity::Quiet)
            .with_env("SHELLSTEP_GREETING", "bonjour");
        let runner = CommandRunner::new("printf %s \"$SHELLSTEP_GREETING\"", options).unwrap();
        let file = runner.run(None).await.unwrap();
        assert_eq!(file.contents.into_bytes().await.unwrap(), b"bonjour");
    }

    #[tokio::test]
    async fn missing_shell_is_a_spawn_error() {
        let options = Options::default()
            .with_verbosity(Verbosity::Quiet)
            .with_shell(["shellstep-no-such-shell", "-c"]);
        let runner = CommandRunner::new("true", options).unwrap();
        let err = runner.run(None).await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }), "{err}");
    }

    #[tokio::test]
    async fn echo_respects_verbosity() {
        let recorder = Arc::new(Recorder::default());
        let runner = CommandRunner::new("echo hi", Options::default())
            .unwrap()
            .with_diagnostics(recorder.clone());
        runner.run(None).await.unwrap();
        assert_eq!(recorder.text(), "$ echo hi\nhi\n");

        let silent = Arc::new(Recorder::default());
        quiet("echo hi").with_diagnostics(silent.clone()).run(None).await.unwrap();
        assert_eq!(silent.text(), "");
    }
}
