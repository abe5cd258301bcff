//! Error types for joblock.
//!
//! Contention (a denied lock, a denied admission, a lease that lapsed before
//! release) is not an error. Those outcomes are values plus hook calls.
//! Everything here unwinds to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
