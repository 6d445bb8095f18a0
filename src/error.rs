//! Error types for the replay pipeline.

use thiserror::Error;

/// Errors that halt a replay.
///
/// Every variant is fatal: the driver stops at the current height and the
/// in-flight block is never handed to the sink.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Network or daemon failure while fetching ledger data.
    #[error("Ledger source unavailable: {0}")]
    SourceUnavailable(String),

    /// Requested height is above the chain tip.
    #[error("Block not found at height {height}")]
    NotFound { height: u64 },

    /// A batched transaction fetch did not return a requested hash.
    #[error("Unknown transaction reference: {0}")]
    UnknownReference(String),

    /// An input references an output index that has not been allocated yet.
    #[error(
        "Replay ordering violation: ring member {amount}-{index} referenced with only \
         {size_anon} outputs of that amount"
    )]
    ReplayOrderingViolation {
        amount: u64,
        index: u64,
        size_anon: u64,
    },

    /// An input without any ring members.
    #[error("Input of amount {amount} has an empty ring")]
    EmptyRing { amount: u64 },

    /// The source handed over a block out of sequence.
    #[error("Unexpected block height: expected {expected}, found {found}")]
    UnexpectedHeight { expected: u64, found: u64 },

    /// Spend deduction attributed more than one output to an input.
    #[error("Spend analysis is inconsistent: input {input} spends {count} outputs")]
    InconsistentSpends { input: String, count: usize },

    /// Source data that could not be decoded.
    #[error("Malformed ledger data: {0}")]
    Malformed(String),

    /// Writing records failed.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Errors raised by record sinks.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Connection pool failure.
    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl From<reqwest::Error> for ReplayError {
    fn from(err: reqwest::Error) -> Self {
        ReplayError::SourceUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for ReplayError {
    fn from(err: serde_json::Error) -> Self {
        ReplayError::Malformed(err.to_string())
    }
}

/// Result type for replay operations.
pub type ReplayResult<T> = Result<T, ReplayError>;
