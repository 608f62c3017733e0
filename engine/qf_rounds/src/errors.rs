//! Engine-wide error types.
//!
//! Every variant is terminal for the operation that raised it: the engine
//! never retries internally, and a failed donation batch is rolled back in
//! full before the error reaches the caller.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("no round template configured")]
    NoTemplateConfigured,

    #[error("round initialization failed: {0}")]
    InitializationFailed(String),

    #[error("already initialized")]
    AlreadyInitialized,

    #[error("caller is not the authorized round")]
    Unauthorized,

    #[error("reentrant call rejected")]
    ReentrantCall,

    #[error("malformed donation record: {0}")]
    MalformedDonation(String),

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("native value mismatch: declared {declared}, spent {spent}")]
    ValueMismatch { declared: i128, spent: i128 },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
