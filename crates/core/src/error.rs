//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic business rejection detected before any
/// mutation is persisted. Infrastructure failures (lock poisoning, commit
/// contention) live in the store layer instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced patient/visit/invoice/requisition/stock row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Input failed validation (non-positive quantity, missing field, bad enum value).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A uniqueness or state conflict (duplicate record, duplicate invoice, wrong state).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A requested or approved quantity exceeds what a ledger row holds.
    #[error("insufficient stock: {0}")]
    InsufficientStock(String),

    /// Stage advancement is blocked until payment completes.
    #[error("payment required: {0}")]
    PaymentRequired(String),

    /// The actor has no rights over a resource they do not own.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A domain invariant was violated (arithmetic overflow, corrupted state).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

/// Coarse classification of a [`DomainError`], used at the HTTP boundary and in logs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    InsufficientStock,
    PaymentRequired,
    Unauthorized,
    Invariant,
}

impl DomainError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn insufficient_stock(msg: impl Into<String>) -> Self {
        Self::InsufficientStock(msg.into())
    }

    pub fn payment_required(msg: impl Into<String>) -> Self {
        Self::PaymentRequired(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::Validation(_) | DomainError::InvalidId(_) => ErrorKind::Validation,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::InsufficientStock(_) => ErrorKind::InsufficientStock,
            DomainError::PaymentRequired(_) => ErrorKind::PaymentRequired,
            DomainError::Unauthorized(_) => ErrorKind::Unauthorized,
            DomainError::InvariantViolation(_) => ErrorKind::Invariant,
        }
    }

    /// The human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            DomainError::NotFound(m)
            | DomainError::Validation(m)
            | DomainError::Conflict(m)
            | DomainError::InsufficientStock(m)
            | DomainError::PaymentRequired(m)
            | DomainError::Unauthorized(m)
            | DomainError::InvariantViolation(m)
            | DomainError::InvalidId(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_id_is_classified_as_validation() {
        let err = DomainError::invalid_id("VisitSessionId: bad");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message(), "VisitSessionId: bad");
    }

    #[test]
    fn display_carries_kind_prefix() {
        let err = DomainError::payment_required("consultation fee not paid");
        assert_eq!(err.to_string(), "payment required: consultation fee not paid");
    }
}
