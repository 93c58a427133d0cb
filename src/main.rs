//! CLI entry point (A4).
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use supervisor::config;
use supervisor::logging::Logger;
use supervisor::shell::line::LineEditor;
use supervisor::supervisor::{signals, term, Supervisor};

/// Foreground interactive supervisor for long-running child processes.
#[derive(Parser, Debug)]
#[command(name = "supervisor")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short = 'f', long = "config")]
    config: PathBuf,
}

const LOG_PATH: &str = "/var/log/supervisor.log";

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("supervisor: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let defs = config::load(&cli.config)?;

    let foreground = term::acquire_foreground()?;
    Logger::install("supervisor", std::path::Path::new(LOG_PATH))?;
    signals::install()?;

    let mut supervisor = Supervisor::new(cli.config, defs, foreground);
    let mut editor = LineEditor::new();
    supervisor.run(&mut editor)?;

    Ok(())
}
