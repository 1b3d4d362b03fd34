//! Regex evaluation with a hard wall-clock deadline.
//!
//! Rule patterns are user-authored and run against sender-controlled header
//! values. Every match goes through a [`RegexEvaluator`], which hands the work
//! to a small fixed pool of worker threads and waits at most `deadline` for
//! the answer. A match still running when the deadline passes is abandoned;
//! its worker stays busy until the match finishes on its own.
//!
//! The pool never grows. At most `workers` matches can be in flight and at
//! most `workers * QUEUE_PER_WORKER` can be waiting. Waiting jobs whose
//! deadline has already passed are discarded without running, so a pool
//! clogged by slow matches degrades into fast timeouts instead of piling up
//! threads.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use regex::{Regex, RegexBuilder};
use tracing::{trace, warn};

use crate::error::RegexError;

/// Time allowed for one evaluation, from invocation to result.
pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(100);

/// Worker threads in the shared pool.
pub const DEFAULT_WORKERS: usize = 4;

const QUEUE_PER_WORKER: usize = 4;

/// Upper bound on the compiled program size of a rule pattern.
const COMPILED_SIZE_LIMIT: usize = 1 << 20;

/// Compile a rule pattern the way the evaluator will run it (case-insensitive).
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(COMPILED_SIZE_LIMIT)
        .build()
}

/// What to compute from a pattern and an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegexOp {
    /// Whether the pattern matches anywhere in the input.
    Find,
    /// Text of the given group in the first match (0 = whole match).
    Capture(usize),
}

/// Result of a successful evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegexOutcome {
    Found(bool),
    Captured(String),
}

struct Task {
    deadline: Instant,
    job: Box<dyn FnOnce() + Send>,
}

/// Fixed-size pool of regex workers with per-call deadlines.
pub struct RegexEvaluator {
    queue: Sender<Task>,
    workers: usize,
    deadline: Duration,
}

impl std::fmt::Debug for RegexEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegexEvaluator")
            .field("workers", &self.workers)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl RegexEvaluator {
    /// Start a pool of `workers` threads enforcing `deadline` per evaluation.
    ///
    /// Threads exit once the evaluator is dropped and their current match is
    /// done. If a thread cannot be spawned the pool runs with fewer; with
    /// none at all every evaluation times out.
    pub fn new(workers: usize, deadline: Duration) -> Self {
        let workers = workers.max(1);
        let (queue, jobs) = channel::bounded(workers * QUEUE_PER_WORKER);

        let mut started = 0;
        for i in 0..workers {
            let jobs = jobs.clone();
            match std::thread::Builder::new()
                .name(format!("regex-worker-{i}"))
                .spawn(move || worker_loop(jobs))
            {
                Ok(_) => started += 1,
                Err(e) => warn!(error = %e, "Failed to spawn regex worker"),
            }
        }

        Self {
            queue,
            workers: started,
            deadline,
        }
    }

    /// The process-wide pool ([`DEFAULT_WORKERS`] threads, [`DEFAULT_DEADLINE`]).
    pub fn shared() -> Arc<RegexEvaluator> {
        static SHARED: OnceLock<Arc<RegexEvaluator>> = OnceLock::new();
        SHARED
            .get_or_init(|| Arc::new(RegexEvaluator::new(DEFAULT_WORKERS, DEFAULT_DEADLINE)))
            .clone()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Compile `pattern` case-insensitively and apply `op` to `input`.
    pub fn evaluate(
        &self,
        pattern: &str,
        input: &str,
        op: RegexOp,
    ) -> Result<RegexOutcome, RegexError> {
        let pattern = pattern.to_string();
        let input = input.to_string();
        self.run_bounded(move || apply(&pattern, &input, op))
    }

    /// Bounded find-match.
    pub fn is_match(&self, pattern: &str, input: &str) -> Result<bool, RegexError> {
        match self.evaluate(pattern, input, RegexOp::Find)? {
            RegexOutcome::Found(found) => Ok(found),
            RegexOutcome::Captured(_) => Ok(true),
        }
    }

    /// Bounded capture of `group` from the first match.
    pub fn capture(&self, pattern: &str, input: &str, group: usize) -> Result<String, RegexError> {
        match self.evaluate(pattern, input, RegexOp::Capture(group))? {
            RegexOutcome::Captured(text) => Ok(text),
            RegexOutcome::Found(_) => Err(RegexError::NoCapturingGroup(group)),
        }
    }

    /// Run `work` on the pool, giving up once the deadline passes.
    fn run_bounded<T, F>(&self, work: F) -> Result<T, RegexError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, RegexError> + Send + 'static,
    {
        let deadline = Instant::now() + self.deadline;
        let (reply, answer) = channel::bounded(1);
        let task = Task {
            deadline,
            job: Box::new(move || {
                // The caller may have given up already; nobody to tell then.
                let _ = reply.send(work());
            }),
        };

        if self.queue.send_deadline(task, deadline).is_err() {
            warn!(deadline = ?self.deadline, "Regex pool saturated, giving up");
            return Err(RegexError::Timeout(self.deadline));
        }

        match answer.recv_deadline(deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(deadline = ?self.deadline, "Regex evaluation timed out, abandoning it");
                Err(RegexError::Timeout(self.deadline))
            }
            // The job expired in the queue and was dropped unrun.
            Err(RecvTimeoutError::Disconnected) => Err(RegexError::Timeout(self.deadline)),
        }
    }
}

fn worker_loop(jobs: Receiver<Task>) {
    for task in jobs.iter() {
        if Instant::now() >= task.deadline {
            trace!("Dropping expired regex job");
            continue;
        }
        if catch_unwind(AssertUnwindSafe(task.job)).is_err() {
            warn!("Regex job panicked");
        }
    }
}

fn apply(pattern: &str, input: &str, op: RegexOp) -> Result<RegexOutcome, RegexError> {
    let re = compile_pattern(pattern).map_err(|source| RegexError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })?;

    match op {
        RegexOp::Find => Ok(RegexOutcome::Found(re.is_match(input))),
        RegexOp::Capture(group) => {
            let caps = re.captures(input).ok_or(RegexError::NoMatch)?;
            caps.get(group)
                .map(|m| RegexOutcome::Captured(m.as_str().to_string()))
                .ok_or(RegexError::NoCapturingGroup(group))
        }
    }
}
