//! Evaluator.
//!
//! Runs one command line end to end:
//! - Tokenize, then dispatch built-ins without forking
//! - Otherwise fork, exec the program in the child, and register the
//!   job as foreground or background
//! - Foreground jobs are waited on by polling the job table until the
//!   signal bridge moves them out of the foreground state
//!
//! The notification mask is blocked across fork and registration and the
//! two run under a single table guard, so the bridge can never observe
//! the child before its table entry exists. The child restores the mask
//! before exec since the blocked set is inherited.

use std::ffi::CString;
use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::SigSet;
use nix::unistd::{execvp, fork, ForkResult, Pid};

use crate::builtins::{self, Builtin};
use crate::jobs::{JobError, JobState, SharedJobs};
use crate::signals::{block_notifications, notification_set, unblock_notifications, SignalError};
use crate::tokenizer::{tokenize, CommandLine};

/// Poll interval for the foreground wait.
pub const FOREGROUND_POLL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
//  Errors
// ---------------------------------------------------------------------------

/// Fatal evaluator failures; user-level problems never surface here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum EvalError {
    /// Forking the child failed.
    #[error("fork error: {errno}")]
    Fork { errno: Errno },

    /// Manipulating the notification mask failed.
    #[error(transparent)]
    Signal {
        #[from]
        source: SignalError,
    },
}

// ---------------------------------------------------------------------------
//  Outcome
// ---------------------------------------------------------------------------

/// What the read loop should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalOutcome {
    /// Keep reading.
    Continue,
    /// `quit` was dispatched; exit cleanly.
    Quit,
}

// ---------------------------------------------------------------------------
//  Evaluation
// ---------------------------------------------------------------------------

/// Evaluate one raw command line.
///
/// Tokenizer rejections and a full job table are user errors: reported
/// on the shared output stream, the shell keeps running. The returned
/// error is reserved for OS-call failures the shell cannot survive.
pub fn eval(line: &str, jobs: &SharedJobs) -> Result<EvalOutcome, EvalError> {
    let cmd = match tokenize(line) {
        Ok(cmd) => cmd,
        Err(err) => {
            println!("{err}");
            return Ok(EvalOutcome::Continue);
        }
    };
    if cmd.is_empty() {
        return Ok(EvalOutcome::Continue);
    }

    match Builtin::from_name(&cmd.tokens[0]) {
        Some(Builtin::Quit) => return Ok(EvalOutcome::Quit),
        Some(Builtin::Jobs) => {
            print!("{}", builtins::render_jobs(jobs));
            let _ = io::stdout().flush();
            return Ok(EvalOutcome::Continue);
        }
        None => {}
    }

    launch(line, &cmd, jobs)
}

/// Fork a child for a non-builtin command and register it.
fn launch(line: &str, cmd: &CommandLine, jobs: &SharedJobs) -> Result<EvalOutcome, EvalError> {
    let mask = notification_set();
    block_notifications(&mask)?;

    let state = if cmd.background {
        JobState::Background
    } else {
        JobState::Foreground
    };

    // Fork and register under one table guard: the bridge thread cannot
    // reap a child whose entry does not exist yet.
    let registered = {
        let mut table = jobs.lock();
        match unsafe { fork() } {
            Err(errno) => {
                drop(table);
                let _ = unblock_notifications(&mask);
                return Err(EvalError::Fork { errno });
            }
            Ok(ForkResult::Child) => exec_child(&cmd.tokens, &mask),
            Ok(ForkResult::Parent { child }) => {
                table.add(child, state, line).map(|jid| (jid, child))
            }
        }
    };

    unblock_notifications(&mask)?;

    match registered {
        Ok((jid, child)) => {
            if cmd.background {
                print!("({jid}) ({child}) {line}");
                let _ = io::stdout().flush();
            } else {
                waitfg(jobs, child);
            }
        }
        Err(JobError::TableFull { .. }) => {
            // The child runs untracked; refusing the slot is not fatal.
            println!("Tried to create too many jobs");
        }
        Err(err) => println!("{err}"),
    }
    Ok(EvalOutcome::Continue)
}

/// Child side: restore the mask, then replace the image.
///
/// On exec failure the child reports the program name and exits with
/// success status so the failure never surfaces as a shell error.
fn exec_child(tokens: &[String], mask: &SigSet) -> ! {
    let _ = unblock_notifications(mask);
    if let Some(args) = to_cstrings(tokens) {
        // Returns only on failure.
        let _ = execvp(&args[0], &args);
    }
    println!("{}, Command not found.", tokens[0]);
    let _ = io::stdout().flush();
    std::process::exit(0);
}

/// Argument vector for exec; `None` if a token carries an interior NUL.
fn to_cstrings(tokens: &[String]) -> Option<Vec<CString>> {
    tokens
        .iter()
        .map(|t| CString::new(t.as_str()).ok())
        .collect()
}

// ---------------------------------------------------------------------------
//  Foreground wait
// ---------------------------------------------------------------------------

/// Block until the job with this pid is no longer in the foreground.
///
/// A polling wait by contract: the state transition happens on the
/// bridge thread, and the two contexts share only the job table. A job
/// already gone from the table counts as "no longer foreground".
pub fn waitfg(jobs: &SharedJobs, pid: Pid) {
    poll_foreground(jobs, pid, FOREGROUND_POLL);
}

fn poll_foreground(jobs: &SharedJobs, pid: Pid, interval: Duration) {
    loop {
        match jobs.find_by_pid(pid) {
            Some(job) if job.state == JobState::Foreground => thread::sleep(interval),
            _ => break,
        }
    }
    tracing::debug!(pid = %pid, "foreground wait complete");
}

// ===========================================================================
//  Tests
// ===========================================================================
