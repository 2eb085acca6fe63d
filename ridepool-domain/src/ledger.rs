use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token correlating an off-chain record to a transaction on the
/// external ledger. Normalized to lowercase so equality and uniqueness
/// checks are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerRef(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed ledger reference: {0:?}")]
pub struct MalformedReference(pub String);

impl LedgerRef {
    /// Accepts the transaction-hash format the ledger emits: `0x` followed
    /// by exactly 64 hex digits.
    pub fn parse(raw: &str) -> Result<Self, MalformedReference> {
        let hex = raw
            .strip_prefix("0x")
            .ok_or_else(|| MalformedReference(raw.to_string()))?;
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(MalformedReference(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Semantic role a reference is presented for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceRole {
    BookingCreation,
    RideCompletion,
}
