use clap::Parser;
use futures::stream::{self, StreamExt};
use shellstep_core::{
    load_options, CommandRunner, Contents, File, FileStream, Options, PipelineStep, Transform,
    Verbosity,
};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

/// Run a templated shell command, directly or once per input file.
#[derive(Debug, Parser)]
#[command(name = "shellstep", about = "Run a templated shell command over files")]
struct Cli {
    /// Path to a TOML options file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Working directory for the command.
    #[arg(long)]
    cwd: Option<PathBuf>,
    /// Environment override for the command, repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    env: Vec<(String, String)>,
    /// Template value exposed as `<%= data.KEY %>`, repeatable.
    #[arg(long = "data", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    data: Vec<(String, String)>,
    /// 0 is silent, 1 echoes the command and its output, 2 adds details.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    verbosity: Option<u8>,
    /// Keep the output of commands that exit unsuccessfully.
    #[arg(long)]
    ignore_errors: bool,
    /// Stream input files into the command instead of reading them first.
    #[arg(long)]
    stream: bool,
    /// Directory that `file.relative` and output paths are computed from.
    #[arg(long)]
    base: Option<PathBuf>,
    /// Write each output under this directory instead of to stdout.
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,
    /// Command template, e.g. `wc -l <%= file.path %>`.
    command: String,
    /// Input files; without any the command runs once on its own.
    files: Vec<PathBuf>,
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failures) => {
            eprintln!("shellstep: {failures} invocation(s) failed");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("shellstep: {err}");
            ExitCode::FAILURE
        }
    }
}

fn build_options(cli: &Cli) -> shellstep_core::Result<Options> {
    let mut options = match &cli.config {
        Some(path) => load_options(path)?,
        None => Options::default(),
    };
    if let Some(cwd) = &cli.cwd {
        options.cwd = Some(cwd.clone());
    }
    options.env.extend(cli.env.iter().cloned());
    options.template_data.extend(cli.data.iter().cloned());
    if let Some(level) = cli.verbosity {
        options.verbosity = Verbosity::try_from(level)
            .map_err(|err| shellstep_core::Error::InvalidOptions(err.to_string()))?;
    }
    options.ignore_errors |= cli.ignore_errors;
    Ok(options)
}

/// Returns the number of failed invocations.
async fn run(cli: Cli) -> shellstep_core::Result<usize> {
    let options = build_options(&cli)?;
    let runner = CommandRunner::new(cli.command.clone(), options)?;

    let outputs = if cli.files.is_empty() {
        runner.exec()
    } else {
        run_inputs(
            runner.as_pipeline_step(),
            cli.files.clone(),
            cli.base.clone(),
            cli.stream,
        )
    };
    Ok(drain(outputs, cli.out_dir.as_deref()).await)
}

/// Run `step` over `paths`, opening each file only when its turn comes.
fn run_inputs(
    step: PipelineStep,
    paths: Vec<PathBuf>,
    base: Option<PathBuf>,
    streamed: bool,
) -> FileStream {
    stream::iter(paths)
        .then(move |path| {
            let step = step.clone();
            let base = base.clone();
            async move {
                match open_input(&path, base.as_deref(), streamed).await {
                    Ok(file) => step.transform(file).await,
                    Err(err) => Err(shellstep_core::Error::Input(io::Error::new(
                        err.kind(),
                        format!("{}: {err}", path.display()),
                    ))),
                }
            }
        })
        .boxed()
}

/// Write every output, reporting each failure and carrying on.
async fn drain(mut outputs: FileStream, out_dir: Option<&Path>) -> usize {
    let mut failures = 0;
    while let Some(result) = outputs.next().await {
        let written = match result {
            Ok(file) => {
                let path = file.path.clone();
                write_output(file, out_dir)
                    .await
                    .map_err(|err| format!("{}: cannot write output: {err}", path.display()))
            }
            Err(err) => Err(err.to_string()),
        };
        if let Err(message) = written {
            eprintln!("shellstep: {message}");
            failures += 1;
        }
    }
    failures
}

async fn open_input(path: &Path, base: Option<&Path>, streamed: bool) -> io::Result<File> {
    let contents = if streamed {
        Contents::stream(tokio::fs::File::open(path).await?)
    } else {
        Contents::Buffered(tokio::fs::read(path).await?)
    };
    let file = File::new(path, contents);
    Ok(match base {
        Some(base) => file.with_base(base),
        None => file,
    })
}

/// Where an output lands under `dir`.
///
/// Uses the file's relative path when it stays inside `dir`, else its basename.
fn output_target(dir: &Path, file: &File) -> PathBuf {
    let mut relative = PathBuf::new();
    for component in file.relative().components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                relative.clear();
                break;
            }
        }
    }
    if relative.as_os_str().is_empty() {
        relative = match file.basename() {
            "" => PathBuf::from("output"),
            name => PathBuf::from(name),
        };
    }
    dir.join(relative)
}

async fn write_output(file: File, out_dir: Option<&Path>) -> io::Result<()> {
    match out_dir {
        Some(dir) => {
            let target = output_target(dir, &file);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tracing::info!(path = %target.display(), "writing output");
            let mut out = tokio::fs::File::create(&target).await?;
            copy_contents(file.contents, &mut out).await
        }
        None => copy_contents(file.contents, &mut tokio::io::stdout()).await,
    }
}

async fn copy_contents<W>(contents: Contents, out: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match contents {
        Contents::Buffered(bytes) => out.write_all(&bytes).await?,
        Contents::Streamed(mut reader) => {
            tokio::io::copy(&mut reader, out).await?;
        }
    }
    out.flush().await
}
