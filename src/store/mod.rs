// ============================================================================
// Document Store Boundary
// ============================================================================
//
// The persistence core depends on this contract only, never on a concrete
// store's native API shape. A store must offer point reads, conditional
// partial updates, predicate queries and atomic single-partition batches.
//
// ============================================================================

pub mod memory;

use crate::core::{ConcurrencyToken, PartitionKey, Result};
use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value;

/// A document returned by a read, patch or query, together with its
/// concurrency token.
#[derive(Debug, Clone)]
pub struct FoundDocument {
    pub document: Value,
    pub etag: ConcurrencyToken,
}

/// Outcome of a point read.
#[derive(Debug)]
pub enum ReadOutcome {
    Found(FoundDocument),
    NotFound,
}

/// Outcome of a conditional partial update. The server evaluates the
/// precondition; a failed precondition is distinguishable from a missing
/// document.
#[derive(Debug)]
pub enum PatchOutcome {
    Applied(FoundDocument),
    PreconditionFailed,
    NotFound,
}

/// A single partial-update instruction.
#[derive(Debug, Clone)]
pub enum PatchOperation {
    /// Set the field at `path` (slash-separated) to `value`, creating it if
    /// absent.
    Set { path: String, value: Value },
}

/// Server-evaluated precondition for a patch.
#[derive(Debug, Clone)]
pub enum PatchCondition {
    /// Passes when the field at `path` is absent or holds an integer strictly
    /// below `bound`.
    FieldAbsentOrLessThan { path: String, bound: i64 },
}

/// Predicate for a query over all partitions.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Matches documents whose metadata object carries `key` equal to `value`.
    MetadataEquals { key: String, value: Value },
}

/// One operation inside an atomic single-partition batch.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    /// Insert-or-fail.
    Create { id: String, document: Value },
    /// Replace, optionally guarded by a concurrency token.
    Replace {
        id: String,
        document: Value,
        if_match: Option<ConcurrencyToken>,
    },
    Delete { id: String },
}

impl BatchOperation {
    pub fn id(&self) -> &str {
        match self {
            BatchOperation::Create { id, .. } => id,
            BatchOperation::Replace { id, .. } => id,
            BatchOperation::Delete { id } => id,
        }
    }
}

/// Per-operation outcome of a batch commit.
#[derive(Debug, Clone)]
pub struct BatchOperationResult {
    pub status: StatusCode,
    pub etag: Option<ConcurrencyToken>,
}

impl BatchOperationResult {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// The document store contract required by the saga persistence core.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read by id within one partition.
    async fn read_item(&self, id: &str, partition_key: &PartitionKey) -> Result<ReadOutcome>;

    /// Conditional partial update. The precondition is evaluated server-side
    /// against the current document.
    async fn patch_item(
        &self,
        id: &str,
        partition_key: &PartitionKey,
        operations: Vec<PatchOperation>,
        condition: PatchCondition,
    ) -> Result<PatchOutcome>;

    /// Predicate query across partitions, returning at most `limit` matches.
    async fn query_items(&self, predicate: &Predicate, limit: usize) -> Result<Vec<FoundDocument>>;

    /// Apply all operations atomically within one partition. Returns one
    /// result per operation, in order. No effect is persisted unless every
    /// operation succeeds.
    async fn commit_batch(
        &self,
        partition_key: &PartitionKey,
        operations: Vec<BatchOperation>,
    ) -> Result<Vec<BatchOperationResult>>;
}
