//! Spawning the shell and collecting its output.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};

use crate::config::Options;
use crate::diagnostics::Echo;
use crate::file::Contents;
use crate::{Error, Result};

#[cfg(windows)]
const SHELL: &[&str] = &["cmd", "/C"];
#[cfg(not(windows))]
const SHELL: &[&str] = &["sh", "-c"];

const PIPE_CHUNK_SIZE: usize = 8192;

/// Working directory a command runs in: `cwd` resolved against the process's own.
pub fn resolve_cwd(options: &Options) -> Result<PathBuf> {
    let current = std::env::current_dir()?;
    Ok(match &options.cwd {
        Some(cwd) => current.join(cwd),
        None => current,
    })
}

/// Build the `PATH` for a spawned command.
///
/// `local_bin` under `cwd` and under every ancestor of `cwd` come first,
/// nearest first, followed by the entries of `inherited`.
pub fn search_path(cwd: &Path, local_bin: &Path, inherited: Option<&OsStr>) -> Result<OsString> {
    let local = cwd.ancestors().map(|dir| dir.join(local_bin));
    let system = inherited.map(|path| std::env::split_paths(path).collect::<Vec<_>>());
    std::env::join_paths(local.chain(system.into_iter().flatten()))
        .map_err(|err| Error::InvalidOptions(format!("cannot build PATH: {err}")))
}

/// Run `command_line` through the configured shell, feeding `input` to stdin.
///
/// Resolves only once the child has exited and both output pipes are drained.
pub(crate) async fn run(
    command_line: &str,
    options: &Options,
    input: Option<Contents>,
    echo: &Echo<'_>,
) -> Result<Output> {
    let cwd = resolve_cwd(options)?;
    let inherited = match options.env.get("PATH") {
        Some(path) => Some(OsString::from(path)),
        None => std::env::var_os("PATH"),
    };
    let path = search_path(&cwd, &options.local_bin, inherited.as_deref())?;

    let shell: Vec<&str> = match &options.shell {
        Some(shell) => shell.iter().map(String::as_str).collect(),
        None => SHELL.to_vec(),
    };
    let (program, shell_args) = shell
        .split_first()
        .ok_or_else(|| Error::InvalidOptions("`shell` needs a program name".into()))?;

    let mut command = Command::new(program);
    command
        .args(shell_args)
        .arg(command_line)
        .current_dir(&cwd)
        .envs(&options.env)
        .env("PATH", &path)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    echo.command(command_line);
    echo.detail(format_args!("cwd: {}", cwd.display()));
    tracing::debug!(command = %command_line, cwd = %cwd.display(), "spawning command");

    let mut child = command.spawn().map_err(|source| Error::Spawn {
        command: command_line.to_string(),
        source,
    })?;

    let stdin = child.stdin.take();
    let (fed, output) = tokio::join!(feed_stdin(stdin, input), child.wait_with_output());
    fed?;
    let output = output?;

    tracing::debug!(
        command = %command_line,
        status = ?output.status,
        stdout_bytes = output.stdout.len(),
        stderr_bytes = output.stderr.len(),
        "command exited"
    );
    echo.output(&output.stdout);
    echo.output(&output.stderr);
    echo.detail(format_args!("{}", output.status));

    Ok(output)
}

/// Copy the input contents into the child's stdin, then close it.
///
/// A command that exits without reading all of its input is not an error.
async fn feed_stdin(stdin: Option<ChildStdin>, input: Option<Contents>) -> Result<()> {
    let (Some(mut stdin), Some(contents)) = (stdin, input) else {
        return Ok(());
    };

    match contents {
        Contents::Buffered(bytes) => ignore_broken_pipe(stdin.write_all(&bytes).await)?,
        Contents::Streamed(mut reader) => {
            let mut buf = vec![0u8; PIPE_CHUNK_SIZE];
            loop {
                let n = reader.read(&mut buf).await.map_err(Error::Input)?;
                if n == 0 {
                    break;
                }
                if let Err(err) = stdin.write_all(&buf[..n]).await {
                    if err.kind() == io::ErrorKind::BrokenPipe {
                        tracing::trace!("command closed stdin early");
                        break;
                    }
                    return Err(err.into());
                }
            }
        }
    }
    ignore_broken_pipe(stdin.shutdown().await)?;
    Ok(())
}

fn ignore_broken_pipe(result: io::Result<()>) -> Result<()> {
    match result {
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => Ok(other?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn local_bins_precede_inherited_path() {
        let path = search_path(
            Path::new("/work/project"),
            Path::new("node_modules/.bin"),
            Some(OsStr::new("/usr/bin:/bin")),
        )
        .unwrap();
        let entries: Vec<PathBuf> = std::env::split_paths(&path).collect();
        assert_eq!(
            entries,
            vec![
                PathBuf::from("/work/project/node_modules/.bin"),
                PathBuf::from("/work/node_modules/.bin"),
                PathBuf::from("/node_modules/.bin"),
                PathBuf::from("/usr/bin"),
                PathBuf::from("/bin"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn missing_inherited_path_keeps_local_bins() {
        let path = search_path(Path::new("/p"), Path::new(".bin"), None).unwrap();
        let entries: Vec<PathBuf> = std::env::split_paths(&path).collect();
        assert_eq!(entries, vec![PathBuf::from("/p/.bin"), PathBuf::from("/.bin")]);
    }

    #[test]
    fn relative_cwd_resolves_against_current_dir() {
        let options = Options::default().with_cwd("sub");
        let cwd = resolve_cwd(&options).unwrap();
        assert_eq!(cwd, std::env::current_dir().unwrap().join("sub"));
    }
}
