use super::{
    BatchOperation, BatchOperationResult, DocumentStore, FoundDocument, PatchCondition,
    PatchOperation, PatchOutcome, Predicate, ReadOutcome,
};
use crate::core::types::{ID_FIELD, METADATA_KEY};
use crate::core::{ConcurrencyToken, PartitionKey, PartitionKeyPath, PersistenceError, Result};
use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredDocument {
    document: Value,
    etag: ConcurrencyToken,
}

/// In-memory implementation of the [`DocumentStore`] contract.
///
/// Documents are grouped by partition-key value; batches validate every
/// operation against the current state and apply all-or-nothing, mirroring
/// the per-operation status codes a real store reports.
pub struct InMemoryDocumentStore {
    partition_key_path: PartitionKeyPath,
    partitions: RwLock<HashMap<String, HashMap<String, StoredDocument>>>,
    next_etag: AtomicU64,
}

impl InMemoryDocumentStore {
    pub fn new(partition_key_path: PartitionKeyPath) -> Self {
        Self {
            partition_key_path,
            partitions: RwLock::new(HashMap::new()),
            next_etag: AtomicU64::new(1),
        }
    }

    pub fn partition_key_path(&self) -> &PartitionKeyPath {
        &self.partition_key_path
    }

    fn mint_etag(&self) -> ConcurrencyToken {
        let n = self.next_etag.fetch_add(1, Ordering::SeqCst);
        ConcurrencyToken::new(format!("\"{n:016x}\""))
    }

    /// Status a single batch operation would produce against the current
    /// partition state, without applying it.
    fn validate_operation(
        &self,
        partition: Option<&HashMap<String, StoredDocument>>,
        partition_key: &PartitionKey,
        operation: &BatchOperation,
    ) -> StatusCode {
        if let Some(document) = operation_document(operation) {
            if document.get(ID_FIELD).and_then(Value::as_str) != Some(operation.id()) {
                return StatusCode::BAD_REQUEST;
            }

            // The store requires the partitioning field to be physically
            // present and consistent with the batch's partition key.
            match json_get(document, &self.partition_key_path) {
                Some(value) if *value == partition_key.as_json() => {}
                _ => return StatusCode::BAD_REQUEST,
            }
        }

        let existing = partition.and_then(|p| p.get(operation.id()));

        match operation {
            BatchOperation::Create { .. } => {
                if existing.is_some() {
                    StatusCode::CONFLICT
                } else {
                    StatusCode::CREATED
                }
            }
            BatchOperation::Replace { if_match, .. } => match existing {
                None => StatusCode::NOT_FOUND,
                Some(stored) => match if_match {
                    Some(token) if *token != stored.etag => StatusCode::PRECONDITION_FAILED,
                    _ => StatusCode::OK,
                },
            },
            BatchOperation::Delete { .. } => {
                if existing.is_none() {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::NO_CONTENT
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn read_item(&self, id: &str, partition_key: &PartitionKey) -> Result<ReadOutcome> {
        let partitions = self.partitions.read().await;

        match partitions
            .get(partition_key.as_str())
            .and_then(|p| p.get(id))
        {
            Some(stored) => Ok(ReadOutcome::Found(FoundDocument {
                document: stored.document.clone(),
                etag: stored.etag.clone(),
            })),
            None => Ok(ReadOutcome::NotFound),
        }
    }

    async fn patch_item(
        &self,
        id: &str,
        partition_key: &PartitionKey,
        operations: Vec<PatchOperation>,
        condition: PatchCondition,
    ) -> Result<PatchOutcome> {
        let mut partitions = self.partitions.write().await;

        let Some(stored) = partitions
            .get_mut(partition_key.as_str())
            .and_then(|p| p.get_mut(id))
        else {
            return Ok(PatchOutcome::NotFound);
        };

        let PatchCondition::FieldAbsentOrLessThan { path, bound } = &condition;
        let field_path = PartitionKeyPath::new(path.clone());
        if let Some(current) = json_get(&stored.document, &field_path).and_then(Value::as_i64) {
            if current >= *bound {
                return Ok(PatchOutcome::PreconditionFailed);
            }
        }

        for operation in operations {
            let PatchOperation::Set { path, value } = operation;
            json_set(&mut stored.document, &PartitionKeyPath::new(path), value)?;
        }
        stored.etag = self.mint_etag();

        Ok(PatchOutcome::Applied(FoundDocument {
            document: stored.document.clone(),
            etag: stored.etag.clone(),
        }))
    }

    async fn query_items(&self, predicate: &Predicate, limit: usize) -> Result<Vec<FoundDocument>> {
        let partitions = self.partitions.read().await;
        let Predicate::MetadataEquals { key, value } = predicate;

        let mut matches: Vec<(String, FoundDocument)> = Vec::new();
        for partition in partitions.values() {
            for (id, stored) in partition {
                let metadata_value = stored
                    .document
                    .get(METADATA_KEY)
                    .and_then(|metadata| metadata.get(key));
                if metadata_value == Some(value) {
                    matches.push((
                        id.clone(),
                        FoundDocument {
                            document: stored.document.clone(),
                            etag: stored.etag.clone(),
                        },
                    ));
                }
            }
        }

        // Ascending id order keeps multi-match results deterministic.
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        matches.truncate(limit);
        Ok(matches.into_iter().map(|(_, found)| found).collect())
    }

    async fn commit_batch(
        &self,
        partition_key: &PartitionKey,
        operations: Vec<BatchOperation>,
    ) -> Result<Vec<BatchOperationResult>> {
        let mut partitions = self.partitions.write().await;
        let existing_partition = partitions.get(partition_key.as_str());

        let statuses: Vec<StatusCode> = operations
            .iter()
            .map(|op| self.validate_operation(existing_partition, partition_key, op))
            .collect();

        if statuses.iter().any(|status| !status.is_success()) {
            // Atomic batch: nothing is applied; siblings of the failing
            // operation report a dependent failure.
            return Ok(statuses
                .iter()
                .map(|status| BatchOperationResult {
                    status: if status.is_success() {
                        StatusCode::FAILED_DEPENDENCY
                    } else {
                        *status
                    },
                    etag: None,
                })
                .collect());
        }

        let partition = partitions
            .entry(partition_key.as_str().to_string())
            .or_default();

        let mut results = Vec::with_capacity(operations.len());
        for (operation, status) in operations.into_iter().zip(statuses) {
            let etag = match operation {
                BatchOperation::Create { id, document }
                | BatchOperation::Replace { id, document, .. } => {
                    let etag = self.mint_etag();
                    partition.insert(
                        id,
                        StoredDocument {
                            document,
                            etag: etag.clone(),
                        },
                    );
                    Some(etag)
                }
                BatchOperation::Delete { id } => {
                    partition.remove(&id);
                    None
                }
            };
            results.push(BatchOperationResult { status, etag });
        }

        Ok(results)
    }
}

fn operation_document(operation: &BatchOperation) -> Option<&Value> {
    match operation {
        BatchOperation::Create { document, .. } => Some(document),
        BatchOperation::Replace { document, .. } => Some(document),
        BatchOperation::Delete { .. } => None,
    }
}

/// Read the value at a slash-separated field path.
pub(crate) fn json_get<'a>(document: &'a Value, path: &PartitionKeyPath) -> Option<&'a Value> {
    let mut current = document;
    for segment in path.segments() {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Write `value` at a slash-separated field path, creating intermediate
/// objects as needed.
pub(crate) fn json_set(document: &mut Value, path: &PartitionKeyPath, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.segments().collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return Err(PersistenceError::Store(format!(
            "invalid field path '{path}'"
        )));
    };

    let mut current = document;
    for segment in parents {
        let Some(object) = current.as_object_mut() else {
            return Err(PersistenceError::Store(format!(
                "field path '{path}' traverses a non-object value"
            )));
        };
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }

    match current.as_object_mut() {
        Some(object) => {
            object.insert(leaf.to_string(), value);
            Ok(())
        }
        None => Err(PersistenceError::Store(format!(
            "field path '{path}' traverses a non-object value"
        ))),
    }
}
