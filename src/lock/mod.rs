// ============================================================================
// Pessimistic Lease Lock
// ============================================================================

use crate::config::PersistenceConfig;
use crate::core::types::RESERVE_UNTIL_FIELD;
use crate::core::{PartitionKey, PersistenceError, Result};
use crate::store::{DocumentStore, FoundDocument, PatchCondition, PatchOperation, PatchOutcome};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of a lease acquisition attempt.
#[derive(Debug)]
pub enum LockOutcome {
    /// The lease was acquired or renewed; the returned document reflects the
    /// state after the patch.
    Acquired(FoundDocument),
    /// The record does not exist. Never retried here.
    NotFound,
}

/// Acquires a time-bounded exclusive lease on a saga record through the
/// store's conditional-patch mechanism.
///
/// The lease lives in the record's `reserveUntil` field as integer Unix
/// seconds. Only a patch whose precondition sees the field absent or expired
/// succeeds, so correctness holds across independent processes competing for
/// the same record. The jitter source is owned and seedable, keeping the
/// retry loop deterministic in tests.
pub struct LockManager {
    lease_lock_time: Duration,
    acquisition_timeout: Duration,
    minimum_refresh_delay: Duration,
    maximum_refresh_delay: Duration,
    rng: Mutex<StdRng>,
}

impl LockManager {
    pub fn from_config(config: &PersistenceConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Construction with a caller-provided jitter source, for deterministic
    /// retry delays in tests. The configuration is validated here so an
    /// inverted delay range fails with `Configuration` instead of panicking
    /// inside the sampler later.
    pub fn with_rng(config: &PersistenceConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            lease_lock_time: config.lease_lock_time,
            acquisition_timeout: config.lease_lock_acquisition_timeout,
            minimum_refresh_delay: config.lease_lock_acquisition_minimum_refresh_delay,
            maximum_refresh_delay: config.lease_lock_acquisition_maximum_refresh_delay,
            rng: Mutex::new(rng),
        })
    }

    /// Repeatedly patch `reserveUntil = now + lease_lock_time` under the
    /// precondition that no other holder's lease is active, sleeping a
    /// jittered delay between attempts.
    ///
    /// Returns [`LockOutcome::NotFound`] immediately when the record does not
    /// exist, `LockAcquisitionTimeout` once the configured timeout elapses,
    /// and `LockAcquisitionCancelled` when the caller aborts the wait.
    pub async fn acquire_or_renew(
        &self,
        store: &dyn DocumentStore,
        saga_id: Uuid,
        partition_key: &PartitionKey,
        cancellation: &CancellationToken,
    ) -> Result<LockOutcome> {
        let started = Instant::now();
        let id = saga_id.to_string();

        loop {
            if cancellation.is_cancelled() {
                return Err(PersistenceError::LockAcquisitionCancelled(saga_id));
            }

            let now = Utc::now().timestamp();
            let reserve_until = now + self.lease_lock_time.as_secs() as i64;

            let attempt = store
                .patch_item(
                    &id,
                    partition_key,
                    vec![PatchOperation::Set {
                        path: format!("/{RESERVE_UNTIL_FIELD}"),
                        value: json!(reserve_until),
                    }],
                    PatchCondition::FieldAbsentOrLessThan {
                        path: format!("/{RESERVE_UNTIL_FIELD}"),
                        bound: now,
                    },
                )
                .await;

            match attempt {
                Ok(PatchOutcome::Applied(found)) => return Ok(LockOutcome::Acquired(found)),
                Ok(PatchOutcome::NotFound) => return Ok(LockOutcome::NotFound),
                Ok(PatchOutcome::PreconditionFailed) => {
                    debug!(saga_id = %saga_id, "lease held by another acquirer, backing off");
                }
                // Transient store failures are absorbed by the retry loop up
                // to the acquisition timeout.
                Err(PersistenceError::Store(reason)) => {
                    warn!(saga_id = %saga_id, %reason, "store failure during lease acquisition, retrying");
                }
                Err(other) => return Err(other),
            }

            if started.elapsed() >= self.acquisition_timeout {
                return Err(PersistenceError::LockAcquisitionTimeout {
                    saga_id,
                    timeout: self.acquisition_timeout,
                });
            }

            let delay = self.next_delay();
            tokio::select! {
                _ = cancellation.cancelled() => {
                    return Err(PersistenceError::LockAcquisitionCancelled(saga_id));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn next_delay(&self) -> Duration {
        let min = self.minimum_refresh_delay.as_millis() as u64;
        let max = self.maximum_refresh_delay.as_millis() as u64;
        let millis = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(min..=max),
            Err(_) => max,
        };
        Duration::from_millis(millis)
    }
}
