// ============================================================================
// Saga Write Operations
// ============================================================================
//
// Logical intents queued against a storage session. The operation set is
// closed and small, so dispatch is a plain `match` rather than trait objects.
//
// ============================================================================

use crate::core::types::ID_FIELD;
use crate::core::{ConcurrencyToken, PartitionKey, PartitionKeyPath, PersistenceError, Result};
use crate::store::{BatchOperation, BatchOperationResult};
use http::StatusCode;
use serde_json::Value;
use uuid::Uuid;

/// A not-yet-committed intent against one saga record, bound to the partition
/// key it targets. Held by the storage session until batch commit and
/// consumed exactly once.
#[derive(Debug, Clone)]
pub enum SagaOperation {
    /// Insert-or-fail; an existing document is a reportable conflict.
    Save {
        saga_id: Uuid,
        partition_key: PartitionKey,
        document: Value,
    },
    /// Replace, guarded by the concurrency token captured at read time.
    /// Carries no token under pessimistic locking, where the held lease is
    /// the concurrency mechanism.
    Update {
        saga_id: Uuid,
        partition_key: PartitionKey,
        document: Value,
        concurrency_token: Option<ConcurrencyToken>,
    },
    /// Delete the record.
    Complete {
        saga_id: Uuid,
        partition_key: PartitionKey,
    },
}

impl SagaOperation {
    pub fn saga_id(&self) -> Uuid {
        match self {
            SagaOperation::Save { saga_id, .. }
            | SagaOperation::Update { saga_id, .. }
            | SagaOperation::Complete { saga_id, .. } => *saga_id,
        }
    }

    pub fn partition_key(&self) -> &PartitionKey {
        match self {
            SagaOperation::Save { partition_key, .. }
            | SagaOperation::Update { partition_key, .. }
            | SagaOperation::Complete { partition_key, .. } => partition_key,
        }
    }

    fn describe(&self) -> String {
        match self {
            SagaOperation::Save { saga_id, .. } => format!("saving saga '{saga_id}'"),
            SagaOperation::Update { saga_id, .. } => format!("updating saga '{saga_id}'"),
            SagaOperation::Complete { saga_id, .. } => format!("completing saga '{saga_id}'"),
        }
    }

    /// Turn the intent into a store-level batch operation, canonicalizing the
    /// id field and injecting the partition-path value when the document does
    /// not carry it.
    pub fn apply(self, partition_key_path: &PartitionKeyPath) -> Result<BatchOperation> {
        match self {
            SagaOperation::Save {
                saga_id,
                partition_key,
                mut document,
            } => {
                prepare_document(&mut document, saga_id, &partition_key, partition_key_path)?;
                Ok(BatchOperation::Create {
                    id: saga_id.to_string(),
                    document,
                })
            }
            SagaOperation::Update {
                saga_id,
                partition_key,
                mut document,
                concurrency_token,
            } => {
                prepare_document(&mut document, saga_id, &partition_key, partition_key_path)?;
                Ok(BatchOperation::Replace {
                    id: saga_id.to_string(),
                    document,
                    if_match: concurrency_token,
                })
            }
            SagaOperation::Complete { saga_id, .. } => Ok(BatchOperation::Delete {
                id: saga_id.to_string(),
            }),
        }
    }

    /// Map a per-operation batch outcome onto the caller-facing taxonomy.
    ///
    /// A dependent failure (status 424) means a sibling operation in the same
    /// atomic batch failed; the sibling's own failure is what gets reported,
    /// so it is swallowed here.
    pub fn classify_conflict(&self, result: &BatchOperationResult) -> Result<()> {
        if result.is_success() || result.status == StatusCode::FAILED_DEPENDENCY {
            return Ok(());
        }

        let status = result.status.as_u16();
        match result.status {
            StatusCode::BAD_REQUEST => Err(PersistenceError::BadRequest {
                operation: self.describe(),
                status,
            }),
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                Err(PersistenceError::ConcurrencyConflict {
                    operation: self.describe(),
                    status,
                })
            }
            _ => Err(PersistenceError::BatchOperation {
                operation: self.describe(),
                status,
            }),
        }
    }
}

fn prepare_document(
    document: &mut Value,
    saga_id: Uuid,
    partition_key: &PartitionKey,
    partition_key_path: &PartitionKeyPath,
) -> Result<()> {
    let Some(object) = document.as_object_mut() else {
        return Err(PersistenceError::Serialization(serde::ser::Error::custom(
            "saga data must serialize to a JSON object",
        )));
    };
    object.insert(ID_FIELD.to_string(), Value::String(saga_id.to_string()));

    enrich_with_partition_key(document, partition_key_path, partition_key);
    Ok(())
}

/// Inject the partition-path value into the document when absent.
///
/// Idempotent: a document already carrying a value at the path is left
/// untouched, even if that value does not match; the store rejects the
/// mismatch at commit time.
pub fn enrich_with_partition_key(
    document: &mut Value,
    partition_key_path: &PartitionKeyPath,
    partition_key: &PartitionKey,
) {
    let segments: Vec<&str> = partition_key_path.segments().collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };

    let mut current = &mut *document;
    for segment in parents {
        let Some(object) = current.as_object_mut() else {
            return;
        };
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }

    if let Some(object) = current.as_object_mut() {
        object
            .entry(leaf.to_string())
            .or_insert_with(|| partition_key.as_json());
    }
}
