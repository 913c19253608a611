// ============================================================================
// Storage Session (Unit of Work)
// ============================================================================

use crate::core::{PartitionKey, PartitionKeyPath, Result};
use crate::operations::SagaOperation;
use crate::store::DocumentStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Accumulates saga operations for one logical transaction and commits them
/// as atomic document-store batches.
///
/// One session lives for one message-processing scope. Operations queued but
/// never committed are discarded when the session drops.
pub struct StorageSession {
    store: Arc<dyn DocumentStore>,
    partition_key_path: PartitionKeyPath,
    operations: Vec<SagaOperation>,
}

impl StorageSession {
    pub fn new(store: Arc<dyn DocumentStore>, partition_key_path: PartitionKeyPath) -> Self {
        Self {
            store,
            partition_key_path,
            operations: Vec::new(),
        }
    }

    /// The store reads go directly against.
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn partition_key_path(&self) -> &PartitionKeyPath {
        &self.partition_key_path
    }

    pub fn add_operation(&mut self, operation: SagaOperation) {
        self.operations.push(operation);
    }

    pub fn pending_operations(&self) -> usize {
        self.operations.len()
    }

    /// Commit all queued operations.
    ///
    /// Operations are grouped by partition key; each group is applied as one
    /// atomic all-or-nothing batch. There is no atomicity across partition
    /// keys. The first classified failure is returned; dependent failures
    /// inside a batch are side effects of the reported one and stay silent.
    pub async fn commit(&mut self) -> Result<()> {
        if self.operations.is_empty() {
            return Ok(());
        }

        let mut groups: Vec<(PartitionKey, Vec<SagaOperation>)> = Vec::new();
        let mut index: HashMap<PartitionKey, usize> = HashMap::new();
        for operation in self.operations.drain(..) {
            let key = operation.partition_key().clone();
            match index.get(&key) {
                Some(&i) => groups[i].1.push(operation),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, vec![operation]));
                }
            }
        }

        for (partition_key, operations) in groups {
            debug!(
                partition_key = %partition_key,
                operations = operations.len(),
                "committing saga batch"
            );

            let batch = operations
                .iter()
                .cloned()
                .map(|op| op.apply(&self.partition_key_path))
                .collect::<Result<Vec<_>>>()?;

            let results = self.store.commit_batch(&partition_key, batch).await?;

            for (operation, result) in operations.iter().zip(&results) {
                operation.classify_conflict(result)?;
            }
        }

        Ok(())
    }
}
