use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Invalid persistence configuration: {0}")]
    Configuration(String),

    #[error("Unsupported correlation: {0}")]
    UnsupportedCorrelation(String),

    #[error(
        "Unable to acquire exclusive write lock for saga with id '{saga_id}' within allocated time '{timeout:?}'"
    )]
    LockAcquisitionTimeout { saga_id: Uuid, timeout: Duration },

    #[error("Lock acquisition for saga with id '{0}' was cancelled")]
    LockAcquisitionCancelled(Uuid),

    #[error("Concurrency conflict while {operation} (status {status})")]
    ConcurrencyConflict { operation: String, status: u16 },

    #[error("Bad request while {operation}: likely the partition key did not match (status {status})")]
    BadRequest { operation: String, status: u16 },

    #[error("Batch operation failed while {operation} (status {status})")]
    BatchOperation { operation: String, status: u16 },

    #[error(
        "No concurrency token recorded for saga with id '{0}'; the saga must be read through the persister before it can be updated"
    )]
    MissingConcurrencyToken(Uuid),

    #[error("Document store failure: {0}")]
    Store(String),

    #[error("Serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
