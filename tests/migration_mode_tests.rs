/// Migration mode tests
///
/// Records imported from a legacy store carry their old identifier in
/// metadata; migration mode locates them through it when a direct lookup
/// misses.
/// Run with: cargo test --test migration_mode_tests
use sagastore::store::{BatchOperation, DocumentStore, ReadOutcome};
use sagastore::{
    InMemoryDocumentStore, PartitionKey, PartitionKeyPath, PersistenceConfig, SagaAccessContext,
    SagaData, SagaPersister, StorageSession,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderSaga {
    id: Uuid,
    #[serde(rename = "orderNumber")]
    order_number: String,
    status: String,
}

impl SagaData for OrderSaga {
    fn saga_type_name() -> &'static str {
        "OrderSaga"
    }

    fn saga_id(&self) -> Uuid {
        self.id
    }
}

fn store() -> Arc<InMemoryDocumentStore> {
    Arc::new(InMemoryDocumentStore::new(PartitionKeyPath::default()))
}

fn session_for(store: &Arc<InMemoryDocumentStore>) -> StorageSession {
    StorageSession::new(store.clone(), PartitionKeyPath::default())
}

/// Import a record the way the migration CLI would: native id as the
/// document id and partition key, the legacy identifier in metadata.
async fn import_migrated_record(
    store: &InMemoryDocumentStore,
    native_id: Uuid,
    legacy_id: Uuid,
) -> OrderSaga {
    let saga = OrderSaga {
        id: native_id,
        order_number: "legacy-042".to_string(),
        status: "migrated".to_string(),
    };
    let document = json!({
        "id": native_id.to_string(),
        "partitionKey": native_id.to_string(),
        "orderNumber": saga.order_number,
        "status": saga.status,
        "_metadata": { "legacyMigratedId": legacy_id.to_string() },
    });

    let results = store
        .commit_batch(
            &PartitionKey::from(native_id),
            vec![BatchOperation::Create {
                id: native_id.to_string(),
                document,
            }],
        )
        .await
        .unwrap();
    assert!(results[0].is_success());
    saga
}

#[tokio::test]
async fn test_legacy_id_lookup_resolves_when_migration_mode_enabled() {
    let store = store();
    let native_id = Uuid::new_v4();
    let legacy_id = Uuid::new_v4();
    let saga = import_migrated_record(&store, native_id, legacy_id).await;

    let persister =
        SagaPersister::new(PersistenceConfig::default().migration_mode(true)).unwrap();

    let mut context = SagaAccessContext::new();
    let found: Option<OrderSaga> = persister
        .get_by_id(
            &session_for(&store),
            legacy_id,
            &mut context,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(found, Some(saga));
    // The context knows the durable key differs from the requested id and
    // holds the record's concurrency token under its native id.
    assert_eq!(context.migrated_saga_id(native_id), Some(legacy_id));
    assert!(context.concurrency_token(native_id).is_some());
}

#[tokio::test]
async fn test_legacy_id_lookup_misses_when_migration_mode_disabled() {
    let store = store();
    let native_id = Uuid::new_v4();
    let legacy_id = Uuid::new_v4();
    import_migrated_record(&store, native_id, legacy_id).await;

    let persister = SagaPersister::new(PersistenceConfig::default()).unwrap();

    let found: Option<OrderSaga> = persister
        .get_by_id(
            &session_for(&store),
            legacy_id,
            &mut SagaAccessContext::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_native_id_lookup_still_works_in_migration_mode() {
    let store = store();
    let native_id = Uuid::new_v4();
    let legacy_id = Uuid::new_v4();
    let saga = import_migrated_record(&store, native_id, legacy_id).await;

    let persister =
        SagaPersister::new(PersistenceConfig::default().migration_mode(true)).unwrap();

    let mut context = SagaAccessContext::new();
    let found: Option<OrderSaga> = persister
        .get_by_id(
            &session_for(&store),
            native_id,
            &mut context,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(found, Some(saga));
    // A direct hit involves no migration substitution.
    assert_eq!(context.migrated_saga_id(native_id), None);
}

#[tokio::test]
async fn test_update_preserves_legacy_metadata() {
    let store = store();
    let native_id = Uuid::new_v4();
    let legacy_id = Uuid::new_v4();
    import_migrated_record(&store, native_id, legacy_id).await;

    let persister =
        SagaPersister::new(PersistenceConfig::default().migration_mode(true)).unwrap();

    let mut context = SagaAccessContext::new();
    let mut loaded: OrderSaga = persister
        .get_by_id(
            &session_for(&store),
            legacy_id,
            &mut context,
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();

    loaded.status = "processed".to_string();
    let mut session = session_for(&store);
    persister.update(&mut session, &loaded, &context).unwrap();
    session.commit().await.unwrap();

    // The rewritten document still carries the legacy marker.
    let ReadOutcome::Found(found) = store
        .read_item(&native_id.to_string(), &PartitionKey::from(native_id))
        .await
        .unwrap()
    else {
        panic!("document must exist");
    };
    assert_eq!(
        found.document["_metadata"]["legacyMigratedId"],
        legacy_id.to_string()
    );

    // And the legacy lookup keeps resolving after the update.
    let refound: Option<OrderSaga> = persister
        .get_by_id(
            &session_for(&store),
            legacy_id,
            &mut SagaAccessContext::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(refound.map(|s| s.status), Some("processed".to_string()));
}

#[tokio::test]
async fn test_pessimistic_fallback_leases_the_resolved_record() {
    let store = store();
    let native_id = Uuid::new_v4();
    let legacy_id = Uuid::new_v4();
    let saga = import_migrated_record(&store, native_id, legacy_id).await;

    let config = PersistenceConfig::default()
        .migration_mode(true)
        .pessimistic_locking(true)
        .lease_lock_time(Duration::from_secs(30))
        .lease_lock_acquisition_minimum_refresh_delay(Duration::from_millis(50))
        .lease_lock_acquisition_maximum_refresh_delay(Duration::from_millis(100));
    let persister = SagaPersister::new(config).unwrap();

    let mut context = SagaAccessContext::new();
    let found: Option<OrderSaga> = persister
        .get_by_id(
            &session_for(&store),
            legacy_id,
            &mut context,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(found, Some(saga));
    assert_eq!(context.migrated_saga_id(native_id), Some(legacy_id));

    // The lease was taken on the resolved native record.
    let ReadOutcome::Found(found) = store
        .read_item(&native_id.to_string(), &PartitionKey::from(native_id))
        .await
        .unwrap()
    else {
        panic!("document must exist");
    };
    assert!(found.document.get("reserveUntil").is_some());
}
