//! Admission gate for singleton jobs.
//!
//! A second expiring mutex over the admission key. Holding it means "queued";
//! it is dropped the moment the job starts executing, at which point the
//! execution lock takes over the job of keeping duplicates out.

use tracing::debug;

use crate::error::Result;
use crate::keys;
use crate::mutex::ExpiringMutex;
use crate::store::Store;

pub struct AdmissionGate<S> {
    mutex: ExpiringMutex<S>,
}

impl<S> Clone for AdmissionGate<S> {
    fn clone(&self) -> Self {
        Self {
            mutex: self.mutex.clone(),
        }
    }
}

impl<S: Store> AdmissionGate<S> {
    pub fn new(mutex: ExpiringMutex<S>) -> Self {
        Self { mutex }
    }

    /// Admit the job iff it is neither running nor already queued.
    ///
    /// A held execution lock denies admission without touching the
    /// admission key.
    pub async fn admit(
        &self,
        job_type: &str,
        identifier: &str,
        timeout_seconds: u64,
    ) -> Result<bool> {
        let lock_key = keys::lock_key(job_type, identifier);
        if self.mutex.is_locked(&lock_key, timeout_seconds).await? {
            debug!(job_type, identifier, "admission denied: running");
            return Ok(false);
        }

        let admission_key = keys::admission_key(job_type, identifier);
        let admitted = self
            .mutex
            .acquire(&admission_key, timeout_seconds)
            .await?
            .is_acquired();
        debug!(job_type, identifier, admitted, "admission attempt");
        Ok(admitted)
    }

    /// Drop the admission key. Harmless if it was never set.
    pub async fn release(&self, job_type: &str, identifier: &str) -> Result<()> {
        self.mutex
            .release(&keys::admission_key(job_type, identifier))
            .await
    }

    /// Is an admission currently recorded (and, with a timeout, unexpired)?
    pub async fn is_enqueued(
        &self,
        job_type: &str,
        identifier: &str,
        timeout_seconds: u64,
    ) -> Result<bool> {
        self.mutex
            .is_locked(&keys::admission_key(job_type, identifier), timeout_seconds)
            .await
    }
}
