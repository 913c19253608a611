use crate::core::{ConcurrencyToken, PartitionKey};
use std::collections::HashMap;
use uuid::Uuid;

/// Per-message state threaded between the read and write paths.
///
/// Reads record each document's concurrency token here so writes can enforce
/// optimistic concurrency without a second read. Migration-mode reads also
/// record that a record's durable key differs from the requested id. The
/// context lives for one message-processing scope and is passed explicitly
/// rather than through an ambient bag.
#[derive(Debug, Default)]
pub struct SagaAccessContext {
    partition_key: Option<PartitionKey>,
    concurrency_tokens: HashMap<Uuid, ConcurrencyToken>,
    migrated_saga_ids: HashMap<Uuid, Uuid>,
}

impl SagaAccessContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit partition key for every saga touched in this scope
    /// instead of the saga-id default.
    pub fn with_partition_key(partition_key: PartitionKey) -> Self {
        Self {
            partition_key: Some(partition_key),
            ..Self::default()
        }
    }

    /// The partition key targeting `saga_id`: the scope's explicit value when
    /// present, else the saga id itself.
    pub fn partition_key_for(&self, saga_id: Uuid) -> PartitionKey {
        self.partition_key
            .clone()
            .unwrap_or_else(|| PartitionKey::from(saga_id))
    }

    pub fn record_concurrency_token(&mut self, saga_id: Uuid, token: ConcurrencyToken) {
        self.concurrency_tokens.insert(saga_id, token);
    }

    pub fn concurrency_token(&self, saga_id: Uuid) -> Option<&ConcurrencyToken> {
        self.concurrency_tokens.get(&saga_id)
    }

    /// Note that the record keyed `native_id` was located through its
    /// legacy-migrated identifier `requested_id`.
    pub fn record_migrated_saga_id(&mut self, native_id: Uuid, requested_id: Uuid) {
        self.migrated_saga_ids.insert(native_id, requested_id);
    }

    pub fn migrated_saga_id(&self, native_id: Uuid) -> Option<Uuid> {
        self.migrated_saga_ids.get(&native_id).copied()
    }
}
