//! Job-control core for the jobsh shell.
//!
//! This crate provides:
//!
//! - **Tokenizer** — space-delimited argument vectors with single-quote
//!   grouping and the trailing `&` background flag
//! - **Job Table** — fixed-capacity registry of child processes with
//!   recycled job ids and foreground/background/stopped state
//! - **Signal Bridge** — SIGCHLD reaping, SIGINT/SIGTSTP forwarding to
//!   the foreground job, SIGQUIT shutdown, mask bracketing helpers
//! - **Evaluator** — built-in dispatch, fork/exec launch, registration,
//!   and the polling foreground wait
//! - **Built-ins** — `quit` and `jobs`

pub mod builtins;
pub mod eval;
pub mod jobs;
pub mod signals;
pub mod tokenizer;

// Re-export key types from each module.

pub use builtins::{render_jobs, Builtin};
pub use eval::{eval, waitfg, EvalError, EvalOutcome, FOREGROUND_POLL};
pub use jobs::{
    format_job_line, Job, JobError, JobState, JobTable, SharedJobs, MAX_JOBS,
};
pub use signals::{
    block_notifications, ignore_terminal_signals, notification_set, spawn_bridge,
    unblock_notifications, SignalError,
};
pub use tokenizer::{tokenize, CommandLine, TokenizeError, MAX_ARGS, MAX_LINE};

/// Prompt written before each read when prompting is enabled.
pub const PROMPT: &str = "jobsh> ";
