use clap::Parser;
use std::process::{Command, ExitCode};

#[derive(Debug, Parser)]
#[command(about = "Utility tasks for developing shellstep")]
struct Xtask {
    /// Task name (format, build, check)
    task: Option<String>,
}

fn cargo(args: &[&str]) -> bool {
    println!("$ cargo {}", args.join(" "));
    let cargo = std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    match Command::new(cargo).args(args).status() {
        Ok(status) => status.success(),
        Err(err) => {
            eprintln!("failed to run cargo: {err}");
            false
        }
    }
}

fn main() -> ExitCode {
    let cli = Xtask::parse();

    let ok = match cli.task.as_deref() {
        Some("format") => cargo(&["fmt", "--all"]),
        Some("build") => cargo(&["build", "--workspace"]),
        Some("check") => {
            cargo(&["fmt", "--all", "--check"])
                && cargo(&["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])
                && cargo(&["test", "--workspace"])
        }
        Some(other) => {
            eprintln!("Unknown task `{other}`. Try format, build, or check.");
            false
        }
        None => {
            println!("Available tasks: format, build, check.");
            true
        }
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
