//! `jobsh` binary entry point.
//!
//! A minimal interactive shell with job control. The shell reads one
//! command line at a time, runs external programs in the foreground or
//! background, and tracks every child in a job table that the `jobs`
//! builtin can list.
//!
//! ```bash
//! jobsh                # interactive session with a prompt
//! jobsh -p             # suppress the prompt (for scripted driving)
//! jobsh -v             # enable verbose diagnostics
//! ```

use std::io::{self, BufRead, Write};
use std::os::fd::AsRawFd;

use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing_subscriber::EnvFilter;

use jobsh_core::{
    eval, ignore_terminal_signals, spawn_bridge, EvalOutcome, SharedJobs, PROMPT,
};

/// Command-line interface for the shell.
#[derive(Parser, Debug)]
#[command(name = "jobsh")]
#[command(about = "Minimal interactive shell with job control", version)]
struct Cli {
    /// Print additional diagnostic information.
    #[arg(short, long)]
    verbose: bool,

    /// Do not emit a command prompt.
    #[arg(short = 'p', long)]
    no_prompt: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    // Fold stderr into stdout so a driving harness reads a single stream.
    nix::unistd::dup2(io::stdout().as_raw_fd(), io::stderr().as_raw_fd())
        .into_diagnostic()
        .wrap_err("redirecting standard error onto standard output")?;

    ignore_terminal_signals()?;

    let jobs = SharedJobs::new();
    let _bridge = spawn_bridge(jobs.clone())?;
    tracing::debug!("signal bridge running");

    read_eval_loop(&jobs, !cli.no_prompt)
}

/// Read one line at a time and evaluate it until end of input or `quit`.
fn read_eval_loop(jobs: &SharedJobs, emit_prompt: bool) -> Result<()> {
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        if emit_prompt {
            print!("{PROMPT}");
            io::stdout().flush().into_diagnostic()?;
        }

        line.clear();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .into_diagnostic()
            .wrap_err("reading standard input")?;
        if read == 0 {
            break;
        }

        if eval(&line, jobs)? == EvalOutcome::Quit {
            break;
        }
        io::stdout().flush().into_diagnostic()?;
    }

    io::stdout().flush().into_diagnostic()?;
    Ok(())
}

// ===========================================================================
//  Tests
// ===========================================================================
