// ============================================================================
// Saga Identity Derivation
// ============================================================================

use crate::core::{CorrelationProperty, PersistenceError, Result};
use crate::persister::SagaData;
use sha1::{Digest, Sha1};
use uuid::Uuid;

/// Derives stable saga identifiers from a saga type name and the value of its
/// single correlation property.
///
/// The derivation is pure and salt-free: the same inputs produce the same
/// identifier in every process and across restarts, which is what makes
/// sagas addressable by correlation value before their id is known.
pub struct SagaIdGenerator;

impl SagaIdGenerator {
    /// Derive the identifier for a saga type from its correlation property.
    pub fn generate<T: SagaData>(correlation: &CorrelationProperty) -> Uuid {
        Self::derive(T::saga_type_name(), &correlation.value_as_string())
    }

    /// SHA-1 digest of `"{sagaTypeName}_{correlationValue}"`, truncated to
    /// 16 bytes and used as the identifier's binary layout.
    pub fn derive(saga_type_name: &str, correlation_value: &str) -> Uuid {
        let digest = Sha1::digest(format!("{saga_type_name}_{correlation_value}").as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Uuid::from_bytes(bytes)
    }
}

/// Sagas correlate on exactly one property. Zero or multiple properties are a
/// configuration-level mistake and fail fast rather than silently picking one.
pub fn single_correlation_property(
    properties: &[CorrelationProperty],
) -> Result<&CorrelationProperty> {
    match properties {
        [single] => Ok(single),
        [] => Err(PersistenceError::UnsupportedCorrelation(
            "a saga must define a correlation property; custom saga finders are not supported"
                .to_string(),
        )),
        _ => Err(PersistenceError::UnsupportedCorrelation(format!(
            "sagas correlated by more than one property are not supported (got {})",
            properties.len()
        ))),
    }
}
