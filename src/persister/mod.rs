// ============================================================================
// Saga Persister
// ============================================================================
//
// The saga-facing API: resolve a saga record by id or correlation property,
// queue save/update/complete intents against a storage session. Reads go
// directly to the store; writes are deferred until the session commits.
//
// ============================================================================

mod context;

pub use context::SagaAccessContext;

use crate::config::PersistenceConfig;
use crate::core::types::{ID_FIELD, METADATA_KEY, MIGRATED_SAGA_ID_KEY};
use crate::core::{CorrelationProperty, PersistenceError, Result};
use crate::identity::SagaIdGenerator;
use crate::lock::{LockManager, LockOutcome};
use crate::operations::SagaOperation;
use crate::session::StorageSession;
use crate::store::{DocumentStore, FoundDocument, Predicate, ReadOutcome};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Application-defined saga state.
///
/// The serialized form must be a JSON object; the persister canonicalizes its
/// `id` field on write. `saga_type_name` must be stable across versions and
/// processes, since it feeds identity derivation.
pub trait SagaData: Serialize + DeserializeOwned + Send + Sync {
    fn saga_type_name() -> &'static str;
    fn saga_id(&self) -> Uuid;
}

/// Saga persistence over a [`DocumentStore`].
///
/// Concurrency is optimistic by default: every read records the document's
/// concurrency token in the [`SagaAccessContext`] and updates carry it so a
/// conflicting write fails the batch. With pessimistic locking enabled, reads
/// instead acquire a lease through the [`LockManager`]; committing an update
/// or completion releases the lease, since the replacement document carries
/// no `reserveUntil` field.
pub struct SagaPersister {
    config: PersistenceConfig,
    lock_manager: Option<LockManager>,
}

impl SagaPersister {
    /// Validates the configuration eagerly; an invalid configuration fails
    /// here, before any operation is attempted.
    pub fn new(config: PersistenceConfig) -> Result<Self> {
        config.validate()?;
        let lock_manager = if config.pessimistic_locking_enabled {
            Some(LockManager::from_config(&config)?)
        } else {
            None
        };
        Ok(Self {
            config,
            lock_manager,
        })
    }

    /// Construction with an injected lock manager, for deterministic retry
    /// jitter in tests.
    pub fn with_lock_manager(config: PersistenceConfig, lock_manager: LockManager) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            lock_manager: Some(lock_manager),
        })
    }

    /// Resolve a saga record by its identifier.
    ///
    /// Returns `None` when no record exists. With migration mode enabled, a
    /// direct miss falls back to a predicate query over the legacy-migrated
    /// id metadata.
    pub async fn get_by_id<T: SagaData>(
        &self,
        session: &StorageSession,
        saga_id: Uuid,
        context: &mut SagaAccessContext,
        cancellation: &CancellationToken,
    ) -> Result<Option<T>> {
        let store = session.store();

        if let Some(lock_manager) = &self.lock_manager {
            return self
                .get_with_lease(store, lock_manager, saga_id, context, cancellation)
                .await;
        }

        let partition_key = context.partition_key_for(saga_id);
        match store.read_item(&saga_id.to_string(), &partition_key).await? {
            ReadOutcome::Found(found) => Ok(Some(read_saga(found, context)?)),
            ReadOutcome::NotFound if self.config.migration_mode_enabled => {
                self.find_saga_in_migration_mode(store, saga_id, context)
                    .await
            }
            ReadOutcome::NotFound => Ok(None),
        }
    }

    /// Resolve a saga record by its correlation property. The identifier is
    /// derived exactly as at save time, then the lookup behaves as
    /// [`get_by_id`](Self::get_by_id).
    pub async fn get_by_correlation<T: SagaData>(
        &self,
        session: &StorageSession,
        correlation: &CorrelationProperty,
        context: &mut SagaAccessContext,
        cancellation: &CancellationToken,
    ) -> Result<Option<T>> {
        let saga_id = SagaIdGenerator::generate::<T>(correlation);
        self.get_by_id(session, saga_id, context, cancellation).await
    }

    /// Queue an insert-or-fail for a new saga. An already existing record
    /// surfaces as a concurrency conflict at commit time.
    pub fn save<T: SagaData>(
        &self,
        session: &mut StorageSession,
        saga_data: &T,
        context: &SagaAccessContext,
    ) -> Result<()> {
        let saga_id = saga_data.saga_id();
        session.add_operation(SagaOperation::Save {
            saga_id,
            partition_key: context.partition_key_for(saga_id),
            document: serde_json::to_value(saga_data)?,
        });
        Ok(())
    }

    /// Queue a replace for an existing saga.
    ///
    /// In optimistic mode the token captured at read time must be present in
    /// the context. Records located through migration mode keep their
    /// legacy-migrated id metadata so later legacy lookups still resolve.
    pub fn update<T: SagaData>(
        &self,
        session: &mut StorageSession,
        saga_data: &T,
        context: &SagaAccessContext,
    ) -> Result<()> {
        let saga_id = saga_data.saga_id();
        let mut document = serde_json::to_value(saga_data)?;

        if let Some(legacy_id) = context.migrated_saga_id(saga_id) {
            if let Some(object) = document.as_object_mut() {
                object.insert(
                    METADATA_KEY.to_string(),
                    json!({ MIGRATED_SAGA_ID_KEY: legacy_id.to_string() }),
                );
            }
        }

        let concurrency_token = if self.config.pessimistic_locking_enabled {
            // The held lease serializes access; no token check required.
            None
        } else {
            Some(
                context
                    .concurrency_token(saga_id)
                    .cloned()
                    .ok_or(PersistenceError::MissingConcurrencyToken(saga_id))?,
            )
        };

        session.add_operation(SagaOperation::Update {
            saga_id,
            partition_key: context.partition_key_for(saga_id),
            document,
            concurrency_token,
        });
        Ok(())
    }

    /// Queue the deletion of a completed saga.
    pub fn complete<T: SagaData>(
        &self,
        session: &mut StorageSession,
        saga_data: &T,
        context: &SagaAccessContext,
    ) -> Result<()> {
        let saga_id = saga_data.saga_id();
        session.add_operation(SagaOperation::Complete {
            saga_id,
            partition_key: context.partition_key_for(saga_id),
        });
        Ok(())
    }

    async fn get_with_lease<T: SagaData>(
        &self,
        store: &dyn DocumentStore,
        lock_manager: &LockManager,
        saga_id: Uuid,
        context: &mut SagaAccessContext,
        cancellation: &CancellationToken,
    ) -> Result<Option<T>> {
        let partition_key = context.partition_key_for(saga_id);
        match lock_manager
            .acquire_or_renew(store, saga_id, &partition_key, cancellation)
            .await?
        {
            LockOutcome::Acquired(found) => Ok(Some(read_saga(found, context)?)),
            LockOutcome::NotFound if self.config.migration_mode_enabled => {
                // The record may exist under its post-migration identity.
                // Resolve the native id through the same predicate query the
                // optimistic path uses, then acquire the lease on it.
                let Some(found) = self.query_migrated(store, saga_id).await? else {
                    return Ok(None);
                };
                let native_id = document_id(&found.document)?;
                let native_partition_key = context.partition_key_for(native_id);

                match lock_manager
                    .acquire_or_renew(store, native_id, &native_partition_key, cancellation)
                    .await?
                {
                    LockOutcome::Acquired(found) => {
                        let saga_data = read_saga::<T>(found, context)?;
                        context.record_migrated_saga_id(native_id, saga_id);
                        Ok(Some(saga_data))
                    }
                    // Deleted between the query and the lease attempt.
                    LockOutcome::NotFound => Ok(None),
                }
            }
            LockOutcome::NotFound => Ok(None),
        }
    }

    async fn find_saga_in_migration_mode<T: SagaData>(
        &self,
        store: &dyn DocumentStore,
        saga_id: Uuid,
        context: &mut SagaAccessContext,
    ) -> Result<Option<T>> {
        let Some(found) = self.query_migrated(store, saga_id).await? else {
            return Ok(None);
        };

        let native_id = document_id(&found.document)?;
        debug!(
            requested = %saga_id,
            native = %native_id,
            "resolved saga through its legacy-migrated id"
        );

        let saga_data = read_saga::<T>(found, context)?;
        context.record_migrated_saga_id(native_id, saga_id);
        Ok(Some(saga_data))
    }

    /// Locate the record tagged with `saga_id` as its legacy identifier. At
    /// most one match is expected; when the store returns several, the first
    /// in the store's deterministic order is taken.
    async fn query_migrated(
        &self,
        store: &dyn DocumentStore,
        saga_id: Uuid,
    ) -> Result<Option<FoundDocument>> {
        let predicate = Predicate::MetadataEquals {
            key: MIGRATED_SAGA_ID_KEY.to_string(),
            value: Value::String(saga_id.to_string()),
        };
        let mut matches = store.query_items(&predicate, 2).await?;
        if matches.len() > 1 {
            warn!(
                requested = %saga_id,
                "multiple records share the same legacy-migrated id, taking the first"
            );
            matches.truncate(1);
        }
        Ok(matches.pop())
    }
}

/// Deserialize a found document and record its concurrency token in the
/// context, keyed by the record's identifier.
fn read_saga<T: SagaData>(found: FoundDocument, context: &mut SagaAccessContext) -> Result<T> {
    let saga_data: T = serde_json::from_value(found.document)?;
    context.record_concurrency_token(saga_data.saga_id(), found.etag);
    Ok(saga_data)
}

fn document_id(document: &Value) -> Result<Uuid> {
    document
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| {
            PersistenceError::Store("document carries no parseable id field".to_string())
        })
}
