//! Core data model.
//!
//! Nothing here is durable. The only durable state is the key/value pairs in
//! the store; these types describe what a value means and what a call
//! decided.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Lock Value
// ---------------------------------------------------------------------------

/// Stored value for a lock taken without a timeout.
pub const HELD_SENTINEL: &str = "held";

/// What a lock key's stored value means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockValue {
    /// Held with no expiry. Only a release (or an operator) clears it.
    Held,
    /// Lease valid through this timestamp (seconds since epoch).
    Until(i64),
}

impl LockValue {
    /// Value to write for a lock taken at `now` with `timeout_seconds`.
    pub fn for_timeout(now: i64, timeout_seconds: u64) -> Self {
        if timeout_seconds == 0 {
            LockValue::Held
        } else {
            LockValue::Until(lease_end(now, timeout_seconds))
        }
    }

    /// Parse a stored value.
    pub fn parse(raw: &str) -> Self {
        if raw == HELD_SENTINEL {
            LockValue::Held
        } else {
            LockValue::Until(expiry_of(raw))
        }
    }

    /// The lease expiry, if any.
    pub fn lock_until(self) -> Option<i64> {
        match self {
            LockValue::Held => None,
            LockValue::Until(ts) => Some(ts),
        }
    }

    /// A lease has lapsed once its expiry is strictly in the past.
    pub fn is_expired(self, now: i64) -> bool {
        match self {
            LockValue::Held => false,
            LockValue::Until(ts) => ts < now,
        }
    }
}

impl std::fmt::Display for LockValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockValue::Held => write!(f, "{HELD_SENTINEL}"),
            LockValue::Until(ts) => write!(f, "{ts}"),
        }
    }
}

/// `now + timeout_seconds`, saturating at `i64::MAX` instead of wrapping.
pub fn lease_end(now: i64, timeout_seconds: u64) -> i64 {
    now.saturating_add(i64::try_from(timeout_seconds).unwrap_or(i64::MAX))
}

/// Read a stored value as an expiry timestamp.
///
/// Anything that is not an integer (including the no-timeout sentinel) reads
/// as `0`, i.e. long expired.
pub fn expiry_of(raw: &str) -> i64 {
    raw.trim().parse().unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Outcome of one acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockResult {
    /// The caller holds the lock. `lock_until` is `None` for no-timeout locks.
    Acquired { lock_until: Option<i64> },
    /// Someone else holds a live lock.
    Denied,
}

impl LockResult {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockResult::Acquired { .. })
    }
}

/// Outcome of submitting a job for queuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Forward the job to the queue.
    Admitted,
    /// Already queued or running. Do not forward.
    Denied,
}

/// Proof that the execution lock was obtained. Handed back to
/// `on_execute_end` after the job body completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPermit {
    pub lock_key: String,
    /// Lease expiry, or `None` when the job type has no timeout.
    pub lock_until: Option<i64>,
    /// When the lock was obtained (milliseconds since epoch).
    pub acquired_at_ms: i64,
}

impl ExecutionPermit {
    /// Has this permit's own lease lapsed at `now`?
    pub fn is_expired(&self, now: i64) -> bool {
        self.lock_until.is_some_and(|until| until < now)
    }
}

/// Outcome of the pre-execution lock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionDecision {
    Permit(ExecutionPermit),
    /// Lock held elsewhere. Skip the job body.
    Denied,
}

/// What happened to the execution lock after the body finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Key deleted.
    Released,
    /// Our lease had already lapsed; the key was left for whoever may hold it now.
    ExpiredSkipped,
}

/// Result of running a job body through the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Performed<T> {
    Ran(T),
    /// Execution lock denied; the body never ran.
    Skipped,
}

// ---------------------------------------------------------------------------
// Job State
// ---------------------------------------------------------------------------

/// Where one job invocation is in the locking lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Admitted,
    AdmissionDenied,
    Dequeued,
    AttemptingLock,
    Locked,
    LockDenied,
    Executing,
    Finished,
    ReleasedLock,
    LockExpiredSkipped,
    /// Terminal for a denied lock: the body never runs.
    Aborted,
}

impl JobState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Submitted, Admitted)
                | (Submitted, AdmissionDenied)
                | (Admitted, Dequeued)
                | (Dequeued, AttemptingLock)
                | (AttemptingLock, Locked)
                | (AttemptingLock, LockDenied)
                | (Locked, Executing)
                | (Executing, Finished)
                | (Finished, ReleasedLock)
                | (Finished, LockExpiredSkipped)
                | (LockDenied, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::AdmissionDenied
                | JobState::ReleasedLock
                | JobState::LockExpiredSkipped
                | JobState::Aborted
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Submitted => "submitted",
            JobState::Admitted => "admitted",
            JobState::AdmissionDenied => "admission_denied",
            JobState::Dequeued => "dequeued",
            JobState::AttemptingLock => "attempting_lock",
            JobState::Locked => "locked",
            JobState::LockDenied => "lock_denied",
            JobState::Executing => "executing",
            JobState::Finished => "finished",
            JobState::ReleasedLock => "released_lock",
            JobState::LockExpiredSkipped => "lock_expired_skipped",
            JobState::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}
