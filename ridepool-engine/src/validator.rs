use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use ridepool_domain::ledger::{LedgerRef, MalformedReference, ReferenceRole};

use crate::store::{BookingStore, StoreError};

/// External ledger collaborator. Only consulted out-of-band: no inventory
/// mutation ever waits on a ledger round-trip, and the reference is treated
/// as an opaque correlation token either way.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Whether the ledger can resolve this transaction reference.
    async fn resolve(
        &self,
        reference: &LedgerRef,
        role: ReferenceRole,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// Default collaborator that accepts any well-formed reference without a
/// round-trip. A live chain client plugs in behind the trait.
pub struct NoopLedger;

#[async_trait]
impl LedgerService for NoopLedger {
    async fn resolve(
        &self,
        _reference: &LedgerRef,
        _role: ReferenceRole,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(true)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid ledger reference: {0:?}")]
    InvalidReference(String),

    #[error("ledger reference already correlates to another record")]
    ReferenceAlreadyUsed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Gatekeeper for ledger references entering off-chain records: syntactic
/// well-formedness, uniqueness against everything already claimed, and an
/// optional resolvability probe against the ledger itself.
pub struct ReferenceValidator {
    bookings: Arc<dyn BookingStore>,
    ledger: Arc<dyn LedgerService>,
}

impl ReferenceValidator {
    pub fn new(bookings: Arc<dyn BookingStore>, ledger: Arc<dyn LedgerService>) -> Self {
        Self { bookings, ledger }
    }

    /// The uniqueness check here fails fast; the store's constraint is the
    /// authority, and the coordinator handles the losing side of a race at
    /// persist time.
    pub async fn validate(
        &self,
        raw: &str,
        role: ReferenceRole,
    ) -> Result<LedgerRef, ValidationError> {
        let reference = LedgerRef::parse(raw)
            .map_err(|MalformedReference(raw)| ValidationError::InvalidReference(raw))?;

        if self.bookings.is_reference_used(&reference).await? {
            return Err(ValidationError::ReferenceAlreadyUsed);
        }

        match self.ledger.resolve(&reference, role).await {
            Ok(true) => Ok(reference),
            Ok(false) => Err(ValidationError::InvalidReference(raw.to_string())),
            Err(err) => {
                // Ledger unreachable: accept on format + uniqueness rather
                // than block the booking path on the chain.
                warn!(%reference, error = %err, "ledger resolution unavailable, accepting reference");
                Ok(reference)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use ridepool_domain::Booking;
    use uuid::Uuid;

    fn raw_ref(fill: &str) -> String {
        format!("0x{}", fill.repeat(32))
    }

    #[tokio::test]
    async fn test_rejects_malformed_reference() {
        let store = Arc::new(MemoryStore::new());
        let validator = ReferenceValidator::new(store, Arc::new(NoopLedger));

        let err = validator
            .validate("not-a-hash", ReferenceRole::BookingCreation)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_rejects_reference_already_claimed() {
        let store = Arc::new(MemoryStore::new());
        let reference = LedgerRef::parse(&raw_ref("aa")).unwrap();
        let booking = Booking::new(1, Uuid::new_v4(), Uuid::new_v4(), 1, reference);
        crate::store::BookingStore::insert_booking(store.as_ref(), &booking)
            .await
            .unwrap();

        let validator = ReferenceValidator::new(store, Arc::new(NoopLedger));
        let err = validator
            .validate(&raw_ref("aa"), ReferenceRole::BookingCreation)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::ReferenceAlreadyUsed));
    }

    #[tokio::test]
    async fn test_unresolvable_reference_rejected() {
        struct RejectingLedger;

        #[async_trait]
        impl LedgerService for RejectingLedger {
            async fn resolve(
                &self,
                _reference: &LedgerRef,
                _role: ReferenceRole,
            ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
                Ok(false)
            }
        }

        let store = Arc::new(MemoryStore::new());
        let validator = ReferenceValidator::new(store, Arc::new(RejectingLedger));
        let err = validator
            .validate(&raw_ref("bb"), ReferenceRole::RideCompletion)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_ledger_outage_fails_open() {
        struct DownLedger;

        #[async_trait]
        impl LedgerService for DownLedger {
            async fn resolve(
                &self,
                _reference: &LedgerRef,
                _role: ReferenceRole,
            ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
                Err("connection refused".into())
            }
        }

        let store = Arc::new(MemoryStore::new());
        let validator = ReferenceValidator::new(store, Arc::new(DownLedger));
        let reference = validator
            .validate(&raw_ref("cc"), ReferenceRole::BookingCreation)
            .await
            .unwrap();
        assert_eq!(reference.as_str(), raw_ref("cc"));
    }
}
