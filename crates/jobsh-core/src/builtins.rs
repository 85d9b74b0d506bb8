//! Built-in commands.
//!
//! Two built-ins, matched against the first token only: `quit` ends the
//! shell, `jobs` prints the job listing. Everything else goes to the
//! fork-and-exec path. Deliberately no `fg`, `bg`, or `kill`.

use crate::jobs::{format_job_line, SharedJobs};

/// A shell built-in command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// quit
    Quit,
    /// jobs
    Jobs,
}

impl Builtin {
    /// Recognize a built-in by name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "quit" => Some(Self::Quit),
            "jobs" => Some(Self::Jobs),
            _ => None,
        }
    }
}

/// Render the full job listing, one line per live job in slot order.
///
/// Lines end with the newline carried by each stored command line, so
/// the result prints verbatim.
pub fn render_jobs(jobs: &SharedJobs) -> String {
    jobs.list().iter().map(format_job_line).collect()
}

// ===========================================================================
//  Tests
// ===========================================================================
