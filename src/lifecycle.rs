//! Job lifecycle adapter. The public API a job-queue framework calls.
//!
//! Two integration points: [`Lifecycle::on_submit`] before a job is queued,
//! and [`Lifecycle::on_execute_begin`] / [`Lifecycle::on_execute_end`]
//! around the job body ([`Lifecycle::perform`] wraps both). Contention is
//! reported through return values and the job type's hooks; only store
//! failures come back as `Err`.

use std::future::Future;
use std::sync::Arc;

use opentelemetry::KeyValue;
use serde_json::Value;
use tracing::{Instrument, Span, info, warn};

use crate::admission::AdmissionGate;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::job::{Hooks, JobRegistry};
use crate::keys;
use crate::model::*;
use crate::mutex::ExpiringMutex;
use crate::store::Store;
use crate::telemetry::job::{record_state_transition, start_job_span};
use crate::telemetry::metrics;

/// Sequences admission and execution locking for registered job types.
pub struct Lifecycle<S> {
    registry: Arc<JobRegistry>,
    mutex: ExpiringMutex<S>,
    gate: AdmissionGate<S>,
}

impl<S> Clone for Lifecycle<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            mutex: self.mutex.clone(),
            gate: self.gate.clone(),
        }
    }
}

/// Record a state change on the span and return the new state.
fn transition(span: &Span, from: JobState, to: JobState) -> JobState {
    debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
    record_state_transition(span, from, to);
    to
}

fn labels(job_type: &str, result: &'static str) -> [KeyValue; 2] {
    [
        KeyValue::new("job_type", job_type.to_string()),
        KeyValue::new("result", result),
    ]
}

impl<S: Store> Lifecycle<S> {
    /// Lifecycle over `store` using the host wall clock.
    pub fn new(store: S, registry: JobRegistry) -> Self {
        Self::with_clock(Arc::new(store), registry, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, registry: JobRegistry, clock: Arc<dyn Clock>) -> Self {
        let mutex = ExpiringMutex::new(store, clock);
        Self {
            registry: Arc::new(registry),
            gate: AdmissionGate::new(mutex.clone()),
            mutex,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn mutex(&self) -> &ExpiringMutex<S> {
        &self.mutex
    }

    /// Decide whether a job may be queued.
    ///
    /// Non-singleton job types are always admitted without touching the
    /// store. On denial the admission-failed hook fires and the caller must
    /// not enqueue.
    pub async fn on_submit(&self, job_type: &str, args: &[Value]) -> Result<AdmissionDecision> {
        let config = self.registry.get(job_type)?;
        if !config.singleton {
            return Ok(AdmissionDecision::Admitted);
        }

        let identifier = config.identifier_for(args);
        let span = start_job_span(job_type, &keys::lock_key(job_type, &identifier));
        let admitted = self
            .gate
            .admit(job_type, &identifier, config.timeout_seconds)
            .instrument(span.clone())
            .await?;

        if admitted {
            transition(&span, JobState::Submitted, JobState::Admitted);
            metrics::admission_attempts().add(1, &labels(job_type, "admitted"));
            Ok(AdmissionDecision::Admitted)
        } else {
            transition(&span, JobState::Submitted, JobState::AdmissionDenied);
            metrics::admission_attempts().add(1, &labels(job_type, "denied"));
            info!(job_type, identifier, "already queued or running, not admitted");
            Hooks::fire(&config.hooks.admission_failed, job_type, args);
            Ok(AdmissionDecision::Denied)
        }
    }

    /// Called right before the job body runs.
    ///
    /// Drops the admission key first, whatever happens next: admission only
    /// covers the queued interval. Then tries the execution lock. A denial
    /// fires the lock-failed hook and the body must be skipped.
    pub async fn on_execute_begin(
        &self,
        job_type: &str,
        args: &[Value],
    ) -> Result<ExecutionDecision> {
        let config = self.registry.get(job_type)?;
        let identifier = config.identifier_for(args);
        let lock_key = keys::lock_key(job_type, &identifier);
        let span = start_job_span(job_type, &lock_key);

        self.gate
            .release(job_type, &identifier)
            .instrument(span.clone())
            .await?;
        let state = transition(&span, JobState::Admitted, JobState::Dequeued);
        let state = transition(&span, state, JobState::AttemptingLock);

        let result = self
            .mutex
            .acquire(&lock_key, config.timeout_seconds)
            .instrument(span.clone())
            .await?;

        match result {
            LockResult::Acquired { lock_until } => {
                let state = transition(&span, state, JobState::Locked);
                transition(&span, state, JobState::Executing);
                metrics::lock_attempts().add(1, &labels(job_type, "acquired"));
                Ok(ExecutionDecision::Permit(ExecutionPermit {
                    lock_key,
                    lock_until,
                    acquired_at_ms: self.mutex.now_millis(),
                }))
            }
            LockResult::Denied => {
                let state = transition(&span, state, JobState::LockDenied);
                transition(&span, state, JobState::Aborted);
                metrics::lock_attempts().add(1, &labels(job_type, "denied"));
                info!(job_type, lock_key, "execution lock held elsewhere, skipping");
                Hooks::fire(&config.hooks.lock_failed, job_type, args);
                Ok(ExecutionDecision::Denied)
            }
        }
    }

    /// Called after the job body, whatever its outcome.
    ///
    /// Releases the lock unless this worker's lease already lapsed, in which
    /// case another worker may hold the key now: it is left alone and the
    /// lock-expired hook fires instead.
    pub async fn on_execute_end(
        &self,
        job_type: &str,
        args: &[Value],
        permit: ExecutionPermit,
    ) -> Result<ReleaseOutcome> {
        let config = self.registry.get(job_type)?;
        let span = start_job_span(job_type, &permit.lock_key);
        let state = transition(&span, JobState::Executing, JobState::Finished);

        let held_ms = self.mutex.now_millis().saturating_sub(permit.acquired_at_ms).max(0);
        metrics::lock_held_ms().record(
            held_ms as f64,
            &[KeyValue::new("job_type", job_type.to_string())],
        );

        let now = self.mutex.now();
        if permit.is_expired(now) {
            transition(&span, state, JobState::LockExpiredSkipped);
            metrics::lock_releases().add(1, &labels(job_type, "expired"));
            warn!(
                job_type,
                lock_key = %permit.lock_key,
                lock_until = ?permit.lock_until,
                now,
                "lease lapsed before release, leaving lock in place"
            );
            Hooks::fire(&config.hooks.lock_expired, job_type, args);
            return Ok(ReleaseOutcome::ExpiredSkipped);
        }

        self.mutex
            .release(&permit.lock_key)
            .instrument(span.clone())
            .await?;
        transition(&span, state, JobState::ReleasedLock);
        metrics::lock_releases().add(1, &labels(job_type, "released"));
        Ok(ReleaseOutcome::Released)
    }

    /// Run `body` under the execution lock.
    ///
    /// Returns [`Performed::Skipped`] without calling `body` when the lock is
    /// held elsewhere. `body`'s own failures are part of its output; the lock
    /// is settled either way.
    pub async fn perform<F, Fut, T>(
        &self,
        job_type: &str,
        args: &[Value],
        body: F,
    ) -> Result<Performed<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let permit = match self.on_execute_begin(job_type, args).await? {
            ExecutionDecision::Permit(permit) => permit,
            ExecutionDecision::Denied => return Ok(Performed::Skipped),
        };
        let output = body().await;
        self.on_execute_end(job_type, args, permit).await?;
        Ok(Performed::Ran(output))
    }

    /// Extend a held lease by the job type's timeout from now.
    ///
    /// Updates `permit` so the end-of-job check judges the new lease.
    pub async fn refresh_lock(&self, job_type: &str, permit: &mut ExecutionPermit) -> Result<()> {
        let config = self.registry.get(job_type)?;
        let value = self
            .mutex
            .refresh(&permit.lock_key, config.timeout_seconds)
            .await?;
        permit.lock_until = value.lock_until();
        Ok(())
    }

    /// Is the execution lock for these args held (and live)?
    pub async fn is_locked(&self, job_type: &str, args: &[Value]) -> Result<bool> {
        let config = self.registry.get(job_type)?;
        self.mutex
            .is_locked(&config.lock_key(args), config.timeout_seconds)
            .await
    }

    /// Is a job with these args admitted and waiting in the queue?
    pub async fn is_enqueued(&self, job_type: &str, args: &[Value]) -> Result<bool> {
        let config = self.registry.get(job_type)?;
        self.gate
            .is_enqueued(job_type, &config.identifier_for(args), config.timeout_seconds)
            .await
    }
}
