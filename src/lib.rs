// ============================================================================
// Sagastore Library
// ============================================================================

pub mod config;
pub mod core;
pub mod identity;
pub mod lock;
pub mod operations;
pub mod persister;
pub mod session;
pub mod store;

// Re-export main types for convenience
pub use config::PersistenceConfig;
pub use self::core::{
    ConcurrencyToken, CorrelationProperty, PartitionKey, PartitionKeyPath, PersistenceError,
    Result,
};
pub use identity::SagaIdGenerator;
pub use lock::{LockManager, LockOutcome};
pub use operations::SagaOperation;
pub use persister::{SagaAccessContext, SagaData, SagaPersister};
pub use session::StorageSession;
pub use store::memory::InMemoryDocumentStore;
pub use store::DocumentStore;
