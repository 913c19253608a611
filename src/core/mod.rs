pub mod error;
pub mod types;

pub use error::{PersistenceError, Result};
pub use types::{ConcurrencyToken, CorrelationProperty, PartitionKey, PartitionKeyPath};
