//! # joblock
//!
//! Distributed mutual exclusion for background jobs.
//!
//! Guarantees that at most one worker executes a given unit of work at a
//! time (execution lock), and optionally that at most one instance of it is
//! queued or running (singleton admission). All coordination goes through a
//! key-value [`store::Store`] offering set-if-absent, get, get-and-replace
//! and delete. Leases are absolute expiry timestamps compared against
//! worker wall clocks; the store never expires anything by itself.

pub mod admission;
pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod keys;
pub mod lifecycle;
pub mod model;
pub mod mutex;
pub mod store;
pub mod telemetry;

pub use admission::AdmissionGate;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use job::{JobConfig, JobRegistry};
pub use lifecycle::Lifecycle;
pub use mutex::ExpiringMutex;
pub use store::Store;
