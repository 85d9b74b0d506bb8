//! Signal bridge.
//!
//! The boundary between OS signal delivery and the job table:
//! - Child-status changes (SIGCHLD) reap every ready child and mutate
//!   the table: exits remove the job, kills remove it with a report,
//!   stops flip it to Stopped
//! - Keyboard interrupt and suspend (SIGINT, SIGTSTP) are forwarded to
//!   the foreground job; the shell itself never takes them
//! - SIGQUIT terminates the shell on request of a driving harness
//! - Mask helpers bracket the evaluator's fork-and-register step
//!
//! Handlers proper stay inside signal-hook's async-signal-safe core; the
//! notifications are consumed on one dedicated bridge thread that talks
//! to the rest of the shell only through the shared job table.

use std::io::Write;
use std::thread;

use nix::errno::Errno;
use nix::sys::signal::{
    kill, sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use signal_hook::consts::signal::{SIGCHLD, SIGINT, SIGQUIT, SIGTSTP};
use signal_hook::iterator::Signals;

use crate::jobs::{JobState, JobTable, SharedJobs};

// ---------------------------------------------------------------------------
//  Errors
// ---------------------------------------------------------------------------

/// Errors for signal-bridge operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum SignalError {
    /// Registering the handled signal set failed.
    #[error("installing signal handlers: {detail}")]
    Install { detail: String },

    /// Changing the signal mask failed.
    #[error("sigprocmask error: {errno}")]
    Mask { errno: Errno },

    /// Setting a signal disposition failed.
    #[error("sigaction error: {errno}")]
    Disposition { errno: Errno },
}

// ---------------------------------------------------------------------------
//  Mask helpers
// ---------------------------------------------------------------------------

/// The three notifications the evaluator blocks around registration.
pub fn notification_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGCHLD);
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTSTP);
    set
}

/// Block the given signals in the calling context.
pub fn block_notifications(set: &SigSet) -> Result<(), SignalError> {
    sigprocmask(SigmaskHow::SIG_BLOCK, Some(set), None)
        .map_err(|errno| SignalError::Mask { errno })
}

/// Unblock the given signals in the calling context.
///
/// A forked child calls this before replacing its image: the blocked
/// mask is inherited across fork and must not leak into the program.
pub fn unblock_notifications(set: &SigSet) -> Result<(), SignalError> {
    sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(set), None)
        .map_err(|errno| SignalError::Mask { errno })
}

/// Ignore SIGTTIN and SIGTTOU so background terminal access never stops
/// the shell.
pub fn ignore_terminal_signals() -> Result<(), SignalError> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::SA_RESTART, SigSet::empty());
    for sig in [Signal::SIGTTIN, Signal::SIGTTOU] {
        unsafe { sigaction(sig, &ignore) }.map_err(|errno| SignalError::Disposition { errno })?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
//  Bridge thread
// ---------------------------------------------------------------------------

/// Install the handled signal set and start the bridge thread.
///
/// The thread runs for the life of the shell, turning each delivered
/// signal into job-table actions. All of its table work happens under
/// bounded lock scopes; reports are printed after the guard is dropped.
pub fn spawn_bridge(jobs: SharedJobs) -> Result<thread::JoinHandle<()>, SignalError> {
    let mut signals =
        Signals::new([SIGCHLD, SIGINT, SIGTSTP, SIGQUIT]).map_err(|e| SignalError::Install {
            detail: e.to_string(),
        })?;

    let handle = thread::spawn(move || {
        for signal in signals.forever() {
            tracing::debug!(signal, "notification received");
            match signal {
                SIGCHLD => reap_children(&jobs),
                SIGINT => forward_to_foreground(&jobs, Signal::SIGINT),
                SIGTSTP => forward_to_foreground(&jobs, Signal::SIGTSTP),
                SIGQUIT => {
                    println!("Terminating after receipt of SIGQUIT signal");
                    let _ = std::io::stdout().flush();
                    std::process::exit(1);
                }
                _ => unreachable!("unrequested signal {signal}"),
            }
        }
    });
    Ok(handle)
}

/// Reap every child whose status is ready, without blocking.
///
/// Runs the whole loop under one table guard so the main context never
/// observes a half-applied batch; the loop is bounded because each
/// iteration either consumes one ready status or ends the loop.
fn reap_children(jobs: &SharedJobs) {
    let mut reports = Vec::new();
    {
        let mut table = jobs.lock();
        loop {
            match waitpid(
                Pid::from_raw(-1),
                Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED),
            ) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => {
                    if let Some(report) = apply_status(&mut table, status) {
                        reports.push(report);
                    }
                }
                // Out of children: the normal end of the loop.
                Err(Errno::ECHILD) => break,
                Err(errno) => {
                    drop(table);
                    fatal_reap_error(errno);
                }
            }
        }
    }
    for report in reports {
        println!("{report}");
    }
    let _ = std::io::stdout().flush();
}

/// Apply one reaped status to the table, returning the report to print.
///
/// Normal exits are silent removals. Signal kills are removals with a
/// termination report naming the actual signal. Stops keep the job and
/// flip its state.
fn apply_status(table: &mut JobTable, status: WaitStatus) -> Option<String> {
    match status {
        WaitStatus::Exited(pid, _code) => {
            let _ = table.remove(pid);
            None
        }
        WaitStatus::Signaled(pid, signal, _core_dumped) => {
            let jid = table.pid_to_jid(pid);
            let _ = table.remove(pid);
            Some(format!(
                "Job [{jid}] ({pid}) terminated by signal {}",
                signal as i32
            ))
        }
        WaitStatus::Stopped(pid, signal) => {
            let jid = table.pid_to_jid(pid);
            let _ = table.set_state(pid, JobState::Stopped);
            Some(format!(
                "Job [{jid}] ({pid}) stopped by signal {}",
                signal as i32
            ))
        }
        _ => None,
    }
}

/// Forward a keyboard signal to the foreground job, if one exists.
fn forward_to_foreground(jobs: &SharedJobs, signal: Signal) {
    let Some(pid) = jobs.foreground_pid() else {
        return;
    };
    if let Err(errno) = kill(pid, signal) {
        // The job can exit between the lookup and the kill.
        tracing::debug!(pid = %pid, %signal, %errno, "forwarding failed");
    }
}

/// Report an unexpected reap failure and terminate the shell.
///
/// Continuing without trusted knowledge of child state would corrupt
/// the job model, so this mirrors a fatal OS-call failure.
fn fatal_reap_error(errno: Errno) -> ! {
    println!("waitpid error: {errno}");
    let _ = std::io::stdout().flush();
    std::process::exit(1);
}

// ===========================================================================
//  Tests
// ===========================================================================
