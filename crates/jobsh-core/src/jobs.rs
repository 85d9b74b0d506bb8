//! Job table.
//!
//! A fixed-capacity registry of the shell's child processes:
//! - One slot per job, first-free-slot allocation
//! - Shell-assigned job ids, recycled once the table drains
//! - Foreground/background/stopped state tracking
//! - A clonable shared handle for the evaluator and the signal bridge

use std::sync::{Arc, Mutex, MutexGuard};

use nix::unistd::Pid;

/// Table capacity, which is also the job-id ceiling for recycling.
pub const MAX_JOBS: usize = 16;

// ---------------------------------------------------------------------------
//  Errors
// ---------------------------------------------------------------------------

/// Errors for job-table operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum JobError {
    /// Process ids must be positive.
    #[error("invalid process id: {pid}")]
    InvalidPid { pid: i32 },

    /// Every slot is occupied.
    #[error("job table full: capacity {capacity} reached")]
    TableFull { capacity: usize },

    /// The pid is already registered.
    #[error("process {pid} is already registered")]
    AlreadyRegistered { pid: i32 },

    /// No live job with this pid.
    #[error("no job with process id {pid}")]
    NoSuchPid { pid: i32 },
}

// ---------------------------------------------------------------------------
//  Job state
// ---------------------------------------------------------------------------

/// State of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Cleared slot value; never held by a live job.
    Undefined,
    /// Running and owning the terminal; the shell waits on it.
    Foreground,
    /// Running without blocking the read loop.
    Background,
    /// Suspended by a stop signal, still in the table.
    Stopped,
}

impl JobState {
    /// Fixed-width label used by the job listing.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Undefined => "Undefined  ",
            Self::Foreground => "Foreground ",
            Self::Background => "Running    ",
            Self::Stopped => "Stopped    ",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => write!(f, "Undefined"),
            Self::Foreground => write!(f, "Foreground"),
            Self::Background => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

// ---------------------------------------------------------------------------
//  Job
// ---------------------------------------------------------------------------

/// One process known to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Shell-assigned job id, unique among live jobs.
    pub jid: u32,
    /// OS process id.
    pub pid: Pid,
    /// Job state.
    pub state: JobState,
    /// Command line as entered, trailing newline included.
    pub cmdline: String,
}

/// Render one job-listing line: `(<jid>) (<pid>) <label><cmdline>`.
///
/// The command line carries its own trailing newline, so the result is
/// printed without appending one.
pub fn format_job_line(job: &Job) -> String {
    format!(
        "({}) ({}) {}{}",
        job.jid,
        job.pid,
        job.state.label(),
        job.cmdline
    )
}

// ---------------------------------------------------------------------------
//  Job table
// ---------------------------------------------------------------------------

/// Fixed-capacity table of live jobs.
///
/// The single source of truth for job state. Lookups and mutations are
/// linear scans over the slots, bounded by the capacity.
#[derive(Debug)]
pub struct JobTable {
    /// Slots; `None` marks a free slot.
    slots: Vec<Option<Job>>,
    /// Next job id to hand out, recycled per [`JobTable::recycle_jid`].
    next_jid: u32,
}

impl JobTable {
    /// Create a table with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAX_JOBS)
    }

    /// Create a table with an explicit capacity.
    ///
    /// The capacity doubles as the job-id ceiling: ids wrap back to 1
    /// rather than growing past it.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            next_jid: 1,
        }
    }

    /// Table capacity.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live jobs.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// True if no job is live.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    /// Register a job in the first free slot.
    ///
    /// Returns the assigned job id. Fails without mutating the table when
    /// the pid is non-positive or already registered, or when every slot
    /// is occupied.
    pub fn add(&mut self, pid: Pid, state: JobState, cmdline: &str) -> Result<u32, JobError> {
        if pid.as_raw() <= 0 {
            return Err(JobError::InvalidPid { pid: pid.as_raw() });
        }
        if self.find_by_pid(pid).is_some() {
            return Err(JobError::AlreadyRegistered { pid: pid.as_raw() });
        }
        let slot = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(JobError::TableFull {
                capacity: self.capacity(),
            })?;

        let jid = self.assign_jid();
        self.next_jid = self.recycle_jid(jid + 1);
        self.slots[slot] = Some(Job {
            jid,
            pid,
            state,
            cmdline: cmdline.to_string(),
        });
        tracing::debug!(jid, pid = %pid, cmdline = cmdline.trim_end(), "added job");
        Ok(jid)
    }

    /// Remove the job with this pid and clear its slot.
    ///
    /// The next job id is recomputed as the maximum live id plus one, so
    /// ids are reused once the table drains.
    pub fn remove(&mut self, pid: Pid) -> Result<Job, JobError> {
        if pid.as_raw() <= 0 {
            return Err(JobError::InvalidPid { pid: pid.as_raw() });
        }
        let slot = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|j| j.pid == pid))
            .ok_or(JobError::NoSuchPid { pid: pid.as_raw() })?;

        let job = self.slots[slot].take().ok_or(JobError::NoSuchPid {
            pid: pid.as_raw(),
        })?;
        self.next_jid = self.recycle_jid(self.max_live_jid() + 1);
        tracing::debug!(jid = job.jid, pid = %pid, "removed job");
        Ok(job)
    }

    /// Look up a live job by pid.
    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        if pid.as_raw() <= 0 {
            return None;
        }
        self.live().find(|j| j.pid == pid)
    }

    /// Look up a live job by job id.
    pub fn find_by_jid(&self, jid: u32) -> Option<&Job> {
        if jid == 0 {
            return None;
        }
        self.live().find(|j| j.jid == jid)
    }

    /// Pid of the foreground job, if any.
    ///
    /// At most one job is foreground at a time; should that ever not
    /// hold, the first match wins.
    pub fn foreground_pid(&self) -> Option<Pid> {
        self.live()
            .find(|j| j.state == JobState::Foreground)
            .map(|j| j.pid)
    }

    /// Job id for a pid, or 0 when the pid is not registered.
    pub fn pid_to_jid(&self, pid: Pid) -> u32 {
        self.find_by_pid(pid).map(|j| j.jid).unwrap_or(0)
    }

    /// Set the state of the job with this pid.
    pub fn set_state(&mut self, pid: Pid, state: JobState) -> Result<(), JobError> {
        if pid.as_raw() <= 0 {
            return Err(JobError::InvalidPid { pid: pid.as_raw() });
        }
        let job = self
            .slots
            .iter_mut()
            .flatten()
            .find(|j| j.pid == pid)
            .ok_or(JobError::NoSuchPid { pid: pid.as_raw() })?;
        job.state = state;
        Ok(())
    }

    /// Iterate over live jobs in slot order.
    pub fn list(&self) -> impl Iterator<Item = &Job> + '_ {
        self.live()
    }

    fn live(&self) -> impl Iterator<Item = &Job> + '_ {
        self.slots.iter().flatten()
    }

    /// Pick the next free job id starting from the recycling counter.
    ///
    /// The counter itself can point at a live id after wrapping around;
    /// scanning forward keeps ids unique among live jobs.
    fn assign_jid(&self) -> u32 {
        let mut candidate = self.next_jid;
        while self.find_by_jid(candidate).is_some() {
            candidate = self.recycle_jid(candidate + 1);
        }
        candidate
    }

    /// Wrap a job id back to 1 past the ceiling.
    fn recycle_jid(&self, jid: u32) -> u32 {
        if jid > self.capacity() as u32 {
            1
        } else {
            jid
        }
    }

    fn max_live_jid(&self) -> u32 {
        self.live().map(|j| j.jid).max().unwrap_or(0)
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
//  Shared handle
// ---------------------------------------------------------------------------

/// Clonable handle to the one job table, shared between the evaluator
/// and the signal bridge.
///
/// Each operation takes the table lock for its own bounded duration.
/// The evaluator's fork-and-register step runs under a single guard via
/// [`SharedJobs::lock`] so the bridge can never reap between the two.
#[derive(Debug, Clone)]
pub struct SharedJobs {
    inner: Arc<Mutex<JobTable>>,
}

impl SharedJobs {
    /// Create a handle owning a fresh table with the default capacity.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(JobTable::new())),
        }
    }

    /// Lock the table for a compound operation.
    ///
    /// A poisoned lock is recovered: the table's invariants hold after
    /// every individual mutation, so the state is usable regardless of
    /// where another thread panicked.
    pub(crate) fn lock(&self) -> MutexGuard<'_, JobTable> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a job; see [`JobTable::add`].
    pub fn add(&self, pid: Pid, state: JobState, cmdline: &str) -> Result<u32, JobError> {
        self.lock().add(pid, state, cmdline)
    }

    /// Remove a job; see [`JobTable::remove`].
    pub fn remove(&self, pid: Pid) -> Result<Job, JobError> {
        self.lock().remove(pid)
    }

    /// Snapshot of the job with this pid.
    pub fn find_by_pid(&self, pid: Pid) -> Option<Job> {
        self.lock().find_by_pid(pid).cloned()
    }

    /// Snapshot of the job with this job id.
    pub fn find_by_jid(&self, jid: u32) -> Option<Job> {
        self.lock().find_by_jid(jid).cloned()
    }

    /// Pid of the foreground job, if any.
    pub fn foreground_pid(&self) -> Option<Pid> {
        self.lock().foreground_pid()
    }

    /// Job id for a pid, or 0 when the pid is not registered.
    pub fn pid_to_jid(&self, pid: Pid) -> u32 {
        self.lock().pid_to_jid(pid)
    }

    /// Set the state of the job with this pid.
    pub fn set_state(&self, pid: Pid, state: JobState) -> Result<(), JobError> {
        self.lock().set_state(pid, state)
    }

    /// Snapshot of all live jobs in slot order.
    pub fn list(&self) -> Vec<Job> {
        self.lock().list().cloned().collect()
    }
}

impl Default for SharedJobs {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
//  Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: i32) -> Pid {
        Pid::from_raw(n)
    }

    #[test]
    fn test_add_assigns_sequential_jids() {
        let mut table = JobTable::new();
        assert_eq!(table.add(pid(100), JobState::Background, "a &\n").unwrap(), 1);
        assert_eq!(table.add(pid(200), JobState::Background, "b &\n").unwrap(), 2);
        assert_eq!(table.add(pid(300), JobState::Foreground, "c\n").unwrap(), 3);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_add_rejects_nonpositive_pid() {
        let mut table = JobTable::new();
        assert_eq!(
            table.add(pid(0), JobState::Background, "x\n").unwrap_err(),
            JobError::InvalidPid { pid: 0 }
        );
        assert_eq!(
            table.add(pid(-5), JobState::Background, "x\n").unwrap_err(),
            JobError::InvalidPid { pid: -5 }
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_add_rejects_duplicate_pid() {
        let mut table = JobTable::new();
        table.add(pid(100), JobState::Background, "a\n").unwrap();
        assert_eq!(
            table.add(pid(100), JobState::Foreground, "b\n").unwrap_err(),
            JobError::AlreadyRegistered { pid: 100 }
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_table_full_leaves_table_unchanged() {
        let mut table = JobTable::with_capacity(2);
        table.add(pid(1), JobState::Background, "a\n").unwrap();
        table.add(pid(2), JobState::Background, "b\n").unwrap();
        let before: Vec<Job> = table.list().cloned().collect();

        let err = table.add(pid(3), JobState::Background, "c\n").unwrap_err();
        assert_eq!(err, JobError::TableFull { capacity: 2 });

        let after: Vec<Job> = table.list().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_remove_returns_job_and_clears_slot() {
        let mut table = JobTable::new();
        table.add(pid(100), JobState::Background, "a &\n").unwrap();
        let job = table.remove(pid(100)).unwrap();
        assert_eq!(job.jid, 1);
        assert_eq!(job.pid, pid(100));
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_unknown_pid_fails() {
        let mut table = JobTable::new();
        assert_eq!(
            table.remove(pid(42)).unwrap_err(),
            JobError::NoSuchPid { pid: 42 }
        );
        assert_eq!(
            table.remove(pid(-1)).unwrap_err(),
            JobError::InvalidPid { pid: -1 }
        );
    }

    #[test]
    fn test_jid_restarts_at_one_after_drain() {
        let mut table = JobTable::new();
        table.add(pid(100), JobState::Background, "a\n").unwrap();
        table.add(pid(200), JobState::Background, "b\n").unwrap();
        table.remove(pid(100)).unwrap();
        table.remove(pid(200)).unwrap();
        assert_eq!(table.add(pid(300), JobState::Background, "c\n").unwrap(), 1);
    }

    #[test]
    fn test_jid_recomputed_from_max_live_on_remove() {
        let mut table = JobTable::new();
        table.add(pid(100), JobState::Background, "a\n").unwrap(); // jid 1
        table.add(pid(200), JobState::Background, "b\n").unwrap(); // jid 2
        table.add(pid(300), JobState::Background, "c\n").unwrap(); // jid 3
        table.remove(pid(300)).unwrap();
        // Max live id is 2, so the next assignment is 3 again.
        assert_eq!(table.add(pid(400), JobState::Background, "d\n").unwrap(), 3);
    }

    #[test]
    fn test_jid_wraps_at_capacity() {
        let mut table = JobTable::with_capacity(2);
        table.add(pid(1), JobState::Background, "a\n").unwrap(); // jid 1
        table.add(pid(2), JobState::Background, "b\n").unwrap(); // jid 2
        table.remove(pid(1)).unwrap(); // max live 2, counter wraps to 1
        assert_eq!(table.add(pid(3), JobState::Background, "c\n").unwrap(), 1);
    }

    #[test]
    fn test_jid_wraparound_skips_live_ids() {
        let mut table = JobTable::with_capacity(3);
        table.add(pid(1), JobState::Background, "a\n").unwrap(); // jid 1
        table.add(pid(2), JobState::Background, "b\n").unwrap(); // jid 2
        table.remove(pid(1)).unwrap(); // next = 3
        table.add(pid(3), JobState::Background, "c\n").unwrap(); // jid 3
        table.add(pid(4), JobState::Background, "d\n").unwrap(); // wrapped, jid 1
        table.remove(pid(2)).unwrap(); // max live 3, next wraps to 1 (live)
        // Candidate 1 is taken by pid 4, so the scan lands on 2.
        assert_eq!(table.add(pid(5), JobState::Background, "e\n").unwrap(), 2);

        let mut jids: Vec<u32> = table.list().map(|j| j.jid).collect();
        jids.sort_unstable();
        jids.dedup();
        assert_eq!(jids.len(), table.len());
    }

    #[test]
    fn test_find_by_pid_and_jid() {
        let mut table = JobTable::new();
        table.add(pid(100), JobState::Background, "a &\n").unwrap();
        assert_eq!(table.find_by_pid(pid(100)).unwrap().jid, 1);
        assert_eq!(table.find_by_jid(1).unwrap().pid, pid(100));
        assert!(table.find_by_pid(pid(999)).is_none());
        assert!(table.find_by_jid(2).is_none());
        assert!(table.find_by_pid(pid(-1)).is_none());
        assert!(table.find_by_jid(0).is_none());
    }

    #[test]
    fn test_foreground_pid() {
        let mut table = JobTable::new();
        assert!(table.foreground_pid().is_none());

        table.add(pid(100), JobState::Background, "a &\n").unwrap();
        assert!(table.foreground_pid().is_none());

        table.add(pid(200), JobState::Foreground, "b\n").unwrap();
        assert_eq!(table.foreground_pid(), Some(pid(200)));

        table.set_state(pid(200), JobState::Stopped).unwrap();
        assert!(table.foreground_pid().is_none());
    }

    #[test]
    fn test_foreground_pid_first_match_wins() {
        // Not a reachable state in normal operation; the lookup still
        // answers deterministically.
        let mut table = JobTable::new();
        table.add(pid(100), JobState::Foreground, "a\n").unwrap();
        table.add(pid(200), JobState::Foreground, "b\n").unwrap();
        assert_eq!(table.foreground_pid(), Some(pid(100)));
    }

    #[test]
    fn test_pid_to_jid_sentinel() {
        let mut table = JobTable::new();
        table.add(pid(100), JobState::Background, "a\n").unwrap();
        assert_eq!(table.pid_to_jid(pid(100)), 1);
        assert_eq!(table.pid_to_jid(pid(999)), 0);
    }

    #[test]
    fn test_set_state() {
        let mut table = JobTable::new();
        table.add(pid(100), JobState::Foreground, "a\n").unwrap();
        table.set_state(pid(100), JobState::Stopped).unwrap();
        assert_eq!(table.find_by_pid(pid(100)).unwrap().state, JobState::Stopped);
        assert_eq!(
            table.set_state(pid(999), JobState::Stopped).unwrap_err(),
            JobError::NoSuchPid { pid: 999 }
        );
    }

    #[test]
    fn test_list_in_slot_order() {
        let mut table = JobTable::new();
        table.add(pid(100), JobState::Background, "a\n").unwrap(); // slot 0
        table.add(pid(200), JobState::Background, "b\n").unwrap(); // slot 1
        table.add(pid(300), JobState::Background, "c\n").unwrap(); // slot 2
        table.remove(pid(100)).unwrap();
        table.add(pid(400), JobState::Background, "d\n").unwrap(); // refills slot 0

        let pids: Vec<Pid> = table.list().map(|j| j.pid).collect();
        assert_eq!(pids, vec![pid(400), pid(200), pid(300)]);
    }

    #[test]
    fn test_list_is_restartable() {
        let mut table = JobTable::new();
        table.add(pid(100), JobState::Background, "a\n").unwrap();
        assert_eq!(table.list().count(), 1);
        assert_eq!(table.list().count(), 1);
    }

    #[test]
    fn test_unique_ids_across_churn() {
        let mut table = JobTable::new();
        for i in 1..=10 {
            table.add(pid(i), JobState::Background, "x\n").unwrap();
        }
        for i in (1..=10).step_by(2) {
            table.remove(pid(i)).unwrap();
        }
        for i in 11..=15 {
            table.add(pid(i), JobState::Background, "y\n").unwrap();
        }

        let mut pids: Vec<i32> = table.list().map(|j| j.pid.as_raw()).collect();
        let mut jids: Vec<u32> = table.list().map(|j| j.jid).collect();
        let n = table.len();
        pids.sort_unstable();
        pids.dedup();
        jids.sort_unstable();
        jids.dedup();
        assert_eq!(pids.len(), n);
        assert_eq!(jids.len(), n);
    }

    #[test]
    fn test_format_job_line() {
        let job = Job {
            jid: 2,
            pid: pid(31410),
            state: JobState::Background,
            cmdline: "./spin 10 &\n".to_string(),
        };
        assert_eq!(format_job_line(&job), "(2) (31410) Running    ./spin 10 &\n");

        let job = Job {
            jid: 1,
            pid: pid(31407),
            state: JobState::Stopped,
            cmdline: "./slow\n".to_string(),
        };
        assert_eq!(format_job_line(&job), "(1) (31407) Stopped    ./slow\n");
    }

    #[test]
    fn test_job_state_labels() {
        assert_eq!(JobState::Background.label(), "Running    ");
        assert_eq!(JobState::Foreground.label(), "Foreground ");
        assert_eq!(JobState::Stopped.label(), "Stopped    ");
    }

    #[test]
    fn test_job_state_display() {
        assert_eq!(JobState::Background.to_string(), "Running");
        assert_eq!(JobState::Foreground.to_string(), "Foreground");
        assert_eq!(JobState::Stopped.to_string(), "Stopped");
    }

    #[test]
    fn test_shared_handle_operations() {
        let jobs = SharedJobs::new();
        jobs.add(pid(100), JobState::Background, "a &\n").unwrap();
        assert_eq!(jobs.pid_to_jid(pid(100)), 1);
        assert!(jobs.foreground_pid().is_none());

        jobs.set_state(pid(100), JobState::Stopped).unwrap();
        assert_eq!(jobs.find_by_pid(pid(100)).unwrap().state, JobState::Stopped);

        let listed = jobs.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].jid, 1);

        jobs.remove(pid(100)).unwrap();
        assert!(jobs.list().is_empty());
    }

    #[test]
    fn test_shared_handle_clones_share_state() {
        let jobs = SharedJobs::new();
        let other = jobs.clone();
        jobs.add(pid(100), JobState::Background, "a\n").unwrap();
        assert_eq!(other.pid_to_jid(pid(100)), 1);
    }
}
